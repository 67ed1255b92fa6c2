mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use indicatif::{ProgressBar, ProgressStyle};
use shrinkvid_av::{bitrate, EncodeRequest, Encoder, Resolution};
use std::path::{Path, PathBuf};

/// Target size when none is given, as a fraction of the source size.
const DEFAULT_TARGET_RATIO: f64 = 0.4;

/// Warn when the final file exceeds the target by more than this ratio.
const OVERSIZE_WARNING_RATIO: f64 = 1.1;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "shrinkvid=debug,shrinkvid_av=debug".to_string()
        } else {
            "shrinkvid=info,shrinkvid_av=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Compress {
            input,
            size_mb,
            output,
            resolution,
            audio_bitrate,
            no_audio,
            dry_run,
        } => compress_file(
            &input,
            size_mb,
            output,
            resolution,
            audio_bitrate,
            no_audio,
            dry_run,
        ),
        Commands::Probe { file, json } => probe_file(&file, json),
        Commands::CheckTools => check_tools(),
    }
}

fn compress_file(
    input: &Path,
    size_mb: Option<f64>,
    output: Option<PathBuf>,
    resolution: Resolution,
    audio_bitrate: f64,
    no_audio: bool,
    dry_run: bool,
) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }

    tracing::info!("Probing {:?}", input);
    let info = shrinkvid_av::probe(input)?;

    println!("File: {}", info.path.display());
    println!(
        "Video: {} {} @ {:.0} kbps",
        info.video_codec,
        info.resolution_label(),
        info.video_bitrate_kbps()
    );
    match (&info.audio_codec, info.audio_bitrate_kbps()) {
        (Some(codec), Some(kbps)) => println!("Audio: {} @ {:.0} kbps", codec, kbps),
        (Some(codec), None) => println!("Audio: {}", codec),
        _ => println!("Audio: none"),
    }
    println!(
        "Duration: {}  Size: {:.1} MB",
        info.duration_label(),
        info.file_size_mb()
    );

    let target_size_mb = size_mb.unwrap_or(info.file_size_mb() * DEFAULT_TARGET_RATIO);
    if target_size_mb <= 0.0 {
        anyhow::bail!("Target size must be positive, got {} MB", target_size_mb);
    }

    let has_audio = info.has_audio && !no_audio;
    let plan = bitrate::solve(
        target_size_mb,
        info.duration_seconds,
        audio_bitrate,
        has_audio,
    );

    println!();
    println!("Target size: {:.1} MB", target_size_mb);
    println!(
        "Planned bitrate: {:.0} kbps video + {:.0} kbps audio",
        plan.video_bitrate_kbps, plan.audio_bitrate_kbps
    );
    if let Some(ref warning) = plan.warning {
        println!("Warning: {}", warning);
    }
    if !plan.is_feasible {
        anyhow::bail!(
            "Cannot fit {} into {:.1} MB",
            input.display(),
            target_size_mb
        );
    }

    if dry_run {
        println!("\n[DRY RUN] No encode performed");
        return Ok(());
    }

    let output = output.unwrap_or_else(|| default_output_path(input));
    let encoder = Encoder::new()?;
    let request = EncodeRequest {
        input: input.to_path_buf(),
        output: output.clone(),
        video_bitrate_kbps: plan.video_bitrate_kbps,
        audio_bitrate_kbps: plan.audio_bitrate_kbps,
        has_audio,
        duration_seconds: info.duration_seconds,
        resolution,
    };

    println!();
    let bar = ProgressBar::new(1000);
    bar.set_style(
        ProgressStyle::with_template("[{bar:40.cyan/blue}] {percent:>3}% {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    encoder.run(&request, |fraction| {
        bar.set_position((fraction * 1000.0) as u64);
        if fraction < 0.5 {
            bar.set_message(format!("pass 1/2 analyzing ({:.0}%)", fraction * 200.0));
        } else {
            bar.set_message(format!("pass 2/2 encoding ({:.0}%)", (fraction - 0.5) * 200.0));
        }
    })?;
    bar.finish_with_message("done");

    let final_bytes = std::fs::metadata(&output)?.len();
    let final_mb = final_bytes as f64 / (1024.0 * 1024.0);
    println!();
    println!("Output: {}", output.display());
    println!(
        "Size: {:.1} MB -> {:.1} MB (saved {:.0}%)",
        info.file_size_mb(),
        final_mb,
        (1.0 - final_mb / info.file_size_mb()) * 100.0
    );
    if final_mb > target_size_mb * OVERSIZE_WARNING_RATIO {
        println!(
            "Warning: output exceeds the target size ({:.1} MB > {:.1} MB)",
            final_mb, target_size_mb
        );
    } else {
        println!("Output is within the target size");
    }

    Ok(())
}

fn probe_file(file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let info = shrinkvid_av::probe(file)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("File: {}", info.path.display());
        println!("Duration: {}", info.duration_label());
        println!("Size: {:.1} MB", info.file_size_mb());
        println!(
            "Video: {} {} @ {:.0} kbps",
            info.video_codec,
            info.resolution_label(),
            info.video_bitrate_kbps()
        );
        match (&info.audio_codec, info.audio_bitrate_kbps()) {
            (Some(codec), Some(kbps)) => println!("Audio: {} @ {:.0} kbps", codec, kbps),
            (Some(codec), None) => println!("Audio: {}", codec),
            _ => println!("Audio: none"),
        }
        println!("Total bitrate: {:.0} kbps", info.total_bitrate_kbps());
    }

    Ok(())
}

fn check_tools() -> Result<()> {
    println!("Checking external tools...\n");

    let tools = shrinkvid_av::check_tools();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    if let Ok(encoder) = Encoder::new() {
        println!(
            "\nffmpeg -stats_period support: {}",
            if encoder.supports_stats_period() {
                "yes"
            } else {
                "no"
            }
        );
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg to enable compression.");
    }

    Ok(())
}

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{stem}_compressed.mp4"))
}

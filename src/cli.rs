use clap::{Parser, Subcommand};
use shrinkvid_av::Resolution;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "shrinkvid")]
#[command(author, version, about = "Compress videos to a target file size")]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compress a video to a target file size
    Compress {
        /// Input video file
        #[arg(required = true)]
        input: PathBuf,

        /// Target size in megabytes (default: 40% of the source size)
        #[arg(short = 's', long)]
        size_mb: Option<f64>,

        /// Output file (default: <input>_compressed.mp4)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output resolution preset (original, 1080p, 720p, 480p, 360p)
        #[arg(short, long, default_value_t = Resolution::Original)]
        resolution: Resolution,

        /// Audio bitrate in kbps
        #[arg(long, default_value_t = shrinkvid_av::DEFAULT_AUDIO_BITRATE_KBPS)]
        audio_bitrate: f64,

        /// Drop the audio track
        #[arg(long)]
        no_audio: bool,

        /// Show the plan without encoding
        #[arg(long)]
        dry_run: bool,
    },

    /// Probe a video file and display information
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,
}

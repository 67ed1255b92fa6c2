//! Two-pass encoding against a target size.

use crate::progress::parse_progress_line;
use crate::tools::require_tool;
use crate::{Error, Result};
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// Maximum number of re-encodes after an oversized result.
pub const MAX_RETRY_COUNT: u32 = 2;

/// Bitrate multiplier applied on each retry.
pub const RETRY_BITRATE_FACTOR: f64 = 0.95;

/// Accepted overshoot above the predicted output size.
pub const TARGET_SIZE_TOLERANCE: f64 = 0.05;

/// Output resolution preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resolution {
    /// Keep the source resolution.
    #[default]
    Original,
    /// 1920x1080.
    P1080,
    /// 1280x720.
    P720,
    /// 854x480.
    P480,
    /// 640x360.
    P360,
}

impl Resolution {
    /// Target dimensions, or `None` when the source resolution is kept.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            Self::Original => None,
            Self::P1080 => Some((1920, 1080)),
            Self::P720 => Some((1280, 720)),
            Self::P480 => Some((854, 480)),
            Self::P360 => Some((640, 360)),
        }
    }
}

impl std::str::FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "original" => Ok(Self::Original),
            "1080p" => Ok(Self::P1080),
            "720p" => Ok(Self::P720),
            "480p" => Ok(Self::P480),
            "360p" => Ok(Self::P360),
            _ => Err(format!(
                "unknown resolution preset: {s} (expected original, 1080p, 720p, 480p, or 360p)"
            )),
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Original => "original",
            Self::P1080 => "1080p",
            Self::P720 => "720p",
            Self::P480 => "480p",
            Self::P360 => "360p",
        };
        f.write_str(label)
    }
}

/// A two-pass encode job.
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    /// Source file.
    pub input: PathBuf,
    /// Destination file.
    pub output: PathBuf,
    /// Video bitrate for the first attempt, in kilobits per second.
    pub video_bitrate_kbps: f64,
    /// Audio bitrate in kilobits per second.
    pub audio_bitrate_kbps: f64,
    /// Whether the output carries an audio track.
    pub has_audio: bool,
    /// Source duration in seconds, used for progress and size checks.
    pub duration_seconds: f64,
    /// Output resolution preset.
    pub resolution: Resolution,
}

/// x264 writes `<prefix>-0.log` and `<prefix>-0.log.mbtree` during pass 1.
struct PassLog {
    prefix: PathBuf,
}

impl PassLog {
    const SUFFIXES: [&'static str; 2] = ["-0.log", "-0.log.mbtree"];

    fn new(dir: &Path, attempt: u32) -> Self {
        Self {
            prefix: dir.join(format!("pass-{attempt}")),
        }
    }

    fn prefix(&self) -> &Path {
        &self.prefix
    }

    fn files(&self) -> [PathBuf; 2] {
        Self::SUFFIXES.map(|suffix| {
            let mut path = self.prefix.clone().into_os_string();
            path.push(suffix);
            PathBuf::from(path)
        })
    }

    /// Remove the stats files. Safe to call when they were never written.
    fn remove(&self) {
        for path in self.files() {
            let _ = std::fs::remove_file(path);
        }
    }
}

impl Drop for PassLog {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Drives ffmpeg two-pass encodes.
///
/// Construction detects once whether the ffmpeg build understands
/// `-stats_period`; the answer is reused for every encode.
pub struct Encoder {
    program: PathBuf,
    supports_stats_period: bool,
}

impl Encoder {
    /// Locate ffmpeg on the PATH.
    ///
    /// # Errors
    ///
    /// Returns an error if ffmpeg is not installed.
    pub fn new() -> Result<Self> {
        let program = require_tool("ffmpeg")?;
        Ok(Self::with_program(program))
    }

    /// Use a specific ffmpeg binary.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let supports_stats_period = probe_stats_period(&program);
        Self {
            program,
            supports_stats_period,
        }
    }

    /// Whether the ffmpeg build understands `-stats_period`.
    pub fn supports_stats_period(&self) -> bool {
        self.supports_stats_period
    }

    /// Run a two-pass encode, reporting progress as fractions in `[0, 1]`.
    ///
    /// Pass 1 covers `[0.0, 0.5)` and pass 2 covers `[0.5, 1.0]`. If the
    /// output overshoots the predicted size by more than
    /// [`TARGET_SIZE_TOLERANCE`], both passes are rerun at
    /// [`RETRY_BITRATE_FACTOR`] times the bitrate, up to
    /// [`MAX_RETRY_COUNT`] times; each retry reports `0.0` first. An
    /// output that is still oversized after the last retry is returned
    /// as-is.
    ///
    /// # Errors
    ///
    /// Returns an error if ffmpeg exits with a non-zero status in either
    /// pass, or on I/O failure around the child process.
    pub fn run<F>(&self, request: &EncodeRequest, mut on_progress: F) -> Result<PathBuf>
    where
        F: FnMut(f64),
    {
        let scratch = tempfile::tempdir()?;
        let total_duration_us = request.duration_seconds * 1_000_000.0;
        let mut video_bitrate_kbps = request.video_bitrate_kbps;
        let mut attempt: u32 = 0;

        loop {
            let passlog = PassLog::new(scratch.path(), attempt);
            let args = self.pass_args(request, video_bitrate_kbps, 1, &passlog);
            self.run_pass(&args, 1, total_duration_us, &mut on_progress)?;
            let args = self.pass_args(request, video_bitrate_kbps, 2, &passlog);
            self.run_pass(&args, 2, total_duration_us, &mut on_progress)?;
            drop(passlog);

            let actual_bytes = std::fs::metadata(&request.output)?.len();
            let expected_bytes = expected_output_bytes(video_bitrate_kbps, request);
            if within_tolerance(actual_bytes, expected_bytes) {
                debug!(actual_bytes, "output within size tolerance");
                return Ok(request.output.clone());
            }
            if attempt >= MAX_RETRY_COUNT {
                warn!(
                    actual_bytes,
                    "output still oversized after {MAX_RETRY_COUNT} retries"
                );
                return Ok(request.output.clone());
            }
            attempt += 1;
            video_bitrate_kbps *= RETRY_BITRATE_FACTOR;
            info!(
                attempt,
                video_bitrate_kbps, "output oversized, retrying at reduced bitrate"
            );
            on_progress(0.0);
        }
    }

    fn pass_args(
        &self,
        request: &EncodeRequest,
        video_bitrate_kbps: f64,
        pass: u32,
        passlog: &PassLog,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-y".into()];
        if self.supports_stats_period {
            args.push("-stats_period".into());
            args.push("0.5".into());
        }
        args.push("-progress".into());
        args.push("pipe:1".into());
        args.push("-i".into());
        args.push(request.input.clone().into());
        args.push("-c:v".into());
        args.push("libx264".into());
        args.push("-b:v".into());
        args.push(format!("{}k", video_bitrate_kbps as u64).into());
        args.push("-pass".into());
        args.push(pass.to_string().into());
        args.push("-passlogfile".into());
        args.push(passlog.prefix().as_os_str().to_os_string());
        if let Some((width, _)) = request.resolution.dimensions() {
            args.push("-vf".into());
            args.push(format!("scale={width}:-2").into());
        }
        if pass == 1 {
            args.push("-an".into());
            args.push("-f".into());
            args.push("null".into());
            args.push(null_device().into());
        } else {
            if request.has_audio {
                args.push("-c:a".into());
                args.push("aac".into());
                args.push("-b:a".into());
                args.push(format!("{}k", request.audio_bitrate_kbps as u64).into());
            } else {
                args.push("-an".into());
            }
            args.push(request.output.clone().into());
        }
        args
    }

    fn run_pass<F>(
        &self,
        args: &[OsString],
        pass: u32,
        total_duration_us: f64,
        on_progress: &mut F,
    ) -> Result<()>
    where
        F: FnMut(f64),
    {
        debug!(pass, "spawning ffmpeg");
        let mut stderr_file = tempfile::NamedTempFile::new()?;
        let stderr_handle = stderr_file.reopen()?;

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::from(stderr_handle))
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::tool_not_found("ffmpeg")
                } else {
                    Error::Io(e)
                }
            })?;

        if let Some(stdout) = child.stdout.take() {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                let line = line?;
                if let Some(fraction) = parse_progress_line(&line, total_duration_us, pass) {
                    on_progress(fraction);
                }
            }
        }

        let status = child.wait()?;
        if !status.success() {
            let mut diagnostics = String::new();
            stderr_file.read_to_string(&mut diagnostics).ok();
            let diagnostics = diagnostics.trim();
            let diagnostics = if diagnostics.is_empty() {
                "(encoder log unreadable)"
            } else {
                diagnostics
            };
            return Err(Error::encoder_failed(pass, diagnostics));
        }
        Ok(())
    }
}

fn expected_output_bytes(video_bitrate_kbps: f64, request: &EncodeRequest) -> f64 {
    let audio_kbps = if request.has_audio {
        request.audio_bitrate_kbps
    } else {
        0.0
    };
    (video_bitrate_kbps + audio_kbps) * 1000.0 * request.duration_seconds / 8.0
}

fn within_tolerance(actual_bytes: u64, expected_bytes: f64) -> bool {
    actual_bytes as f64 <= expected_bytes * (1.0 + TARGET_SIZE_TOLERANCE)
}

/// Older ffmpeg builds reject `-stats_period`. Probe with a zero-length
/// lavfi source to find out.
fn probe_stats_period(program: &Path) -> bool {
    let result = Command::new(program)
        .args([
            "-stats_period",
            "1",
            "-f",
            "lavfi",
            "-i",
            "nullsrc=d=0",
            "-f",
            "null",
            "-",
        ])
        .output();

    match result {
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            !stderr.contains("Unrecognized option")
        }
        Err(_) => false,
    }
}

fn null_device() -> &'static str {
    if cfg!(windows) {
        "NUL"
    } else {
        "/dev/null"
    }
}

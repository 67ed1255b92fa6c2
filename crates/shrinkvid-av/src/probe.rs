//! Media probing via ffprobe.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Raw ffprobe JSON output.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

/// ffprobe reports numeric fields as JSON strings.
#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    bit_rate: Option<String>,
}

/// Information about a source video file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Path to the file.
    pub path: PathBuf,
    /// Duration in seconds.
    pub duration_seconds: f64,
    /// Video width in pixels.
    pub width: u32,
    /// Video height in pixels.
    pub height: u32,
    /// Video codec name.
    pub video_codec: String,
    /// Video bitrate in bits per second.
    pub video_bitrate: u64,
    /// File size in bytes.
    pub file_size: u64,
    /// Whether the file has an audio stream.
    pub has_audio: bool,
    /// Audio codec name, if any.
    pub audio_codec: Option<String>,
    /// Audio bitrate in bits per second, if known.
    pub audio_bitrate: Option<u64>,
}

impl SourceInfo {
    /// Resolution as a "WxH" label.
    pub fn resolution_label(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// File size in megabytes.
    pub fn file_size_mb(&self) -> f64 {
        self.file_size as f64 / (1024.0 * 1024.0)
    }

    /// Video bitrate in kilobits per second.
    pub fn video_bitrate_kbps(&self) -> f64 {
        self.video_bitrate as f64 / 1000.0
    }

    /// Audio bitrate in kilobits per second, if known.
    pub fn audio_bitrate_kbps(&self) -> Option<f64> {
        self.audio_bitrate.map(|b| b as f64 / 1000.0)
    }

    /// Combined bitrate of the known streams in kilobits per second.
    pub fn total_bitrate_kbps(&self) -> f64 {
        self.video_bitrate_kbps() + self.audio_bitrate_kbps().unwrap_or(0.0)
    }

    /// Duration as a human-readable label like "1h02m03s".
    pub fn duration_label(&self) -> String {
        let total = self.duration_seconds.round() as u64;
        let hours = total / 3600;
        let minutes = (total % 3600) / 60;
        let seconds = total % 60;
        if hours > 0 {
            format!("{}h{:02}m{:02}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m{:02}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }
}

/// Probe a video file with ffprobe.
///
/// # Errors
///
/// Returns an error if ffprobe is not installed, fails to run, or the
/// file has no video stream.
pub fn probe(path: &Path) -> Result<SourceInfo> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found("ffprobe")
            } else {
                Error::Io(e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::tool_failed(
            "ffprobe",
            format!("exit code {:?}: {}", output.status.code(), stderr.trim()),
        ));
    }

    let stdout = std::str::from_utf8(&output.stdout)
        .map_err(|e| Error::parse_error("ffprobe", format!("invalid UTF-8 output: {e}")))?;

    parse_ffprobe_output(stdout, path)
}

fn parse_ffprobe_output(json: &str, path: &Path) -> Result<SourceInfo> {
    let raw: FfprobeOutput = serde_json::from_str(json)?;

    let video = raw
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| Error::no_video_stream(path))?;
    let audio = raw.streams.iter().find(|s| s.codec_type == "audio");

    let duration_seconds = parse_field(&raw.format.duration).unwrap_or(0.0);
    let file_size = parse_field(&raw.format.size).unwrap_or(0);
    let container_bitrate: u64 = parse_field(&raw.format.bit_rate).unwrap_or(0);

    let audio_bitrate: Option<u64> = audio.and_then(|s| parse_field(&s.bit_rate));

    // Some containers only report an overall bitrate. Attribute what is
    // left after audio to the video stream.
    let video_bitrate = parse_field(&video.bit_rate)
        .unwrap_or_else(|| container_bitrate.saturating_sub(audio_bitrate.unwrap_or(0)));

    Ok(SourceInfo {
        path: path.to_path_buf(),
        duration_seconds,
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        video_codec: video
            .codec_name
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        video_bitrate,
        file_size,
        has_audio: audio.is_some(),
        audio_codec: audio.and_then(|s| s.codec_name.clone()),
        audio_bitrate,
    })
}

fn parse_field<T: std::str::FromStr>(field: &Option<String>) -> Option<T> {
    field.as_deref().and_then(|s| s.parse().ok())
}

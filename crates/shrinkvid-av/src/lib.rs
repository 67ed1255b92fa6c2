//! Shrink videos to a target file size with two-pass ffmpeg encoding.
//!
//! The pipeline has three steps: probe the source with ffprobe, solve
//! for a video bitrate that fits the target size, then drive a two-pass
//! libx264 encode with live progress. Oversized results are re-encoded
//! at a reduced bitrate.
//!
//! ```no_run
//! use shrinkvid_av::{bitrate, EncodeRequest, Encoder, Resolution};
//!
//! # fn main() -> shrinkvid_av::Result<()> {
//! let info = shrinkvid_av::probe("input.mp4")?;
//! let plan = bitrate::solve(25.0, info.duration_seconds, 128.0, info.has_audio);
//!
//! let encoder = Encoder::new()?;
//! let request = EncodeRequest {
//!     input: info.path.clone(),
//!     output: "output.mp4".into(),
//!     video_bitrate_kbps: plan.video_bitrate_kbps,
//!     audio_bitrate_kbps: plan.audio_bitrate_kbps,
//!     has_audio: info.has_audio,
//!     duration_seconds: info.duration_seconds,
//!     resolution: Resolution::Original,
//! };
//! encoder.run(&request, |fraction| {
//!     println!("{:.0}%", fraction * 100.0);
//! })?;
//! # Ok(())
//! # }
//! ```

mod error;

pub mod bitrate;
pub mod encode;
pub mod probe;
pub mod progress;
pub mod tools;

pub use bitrate::{
    BitratePlan, CONTAINER_OVERHEAD, DEFAULT_AUDIO_BITRATE_KBPS, MIN_VIDEO_BITRATE_KBPS,
};
pub use encode::{
    EncodeRequest, Encoder, Resolution, MAX_RETRY_COUNT, RETRY_BITRATE_FACTOR,
    TARGET_SIZE_TOLERANCE,
};
pub use error::{Error, Result};
pub use probe::SourceInfo;
pub use tools::{check_tool, check_tools, require_tool, ToolInfo};

/// Probe a video file with ffprobe.
///
/// Convenience wrapper around [`probe::probe`].
///
/// # Errors
///
/// Returns an error if ffprobe is unavailable, fails, or the file has
/// no video stream.
pub fn probe<P: AsRef<std::path::Path>>(path: P) -> Result<SourceInfo> {
    probe::probe(path.as_ref())
}

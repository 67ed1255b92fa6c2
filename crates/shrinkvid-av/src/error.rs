use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from probing, planning, and encoding.
#[derive(Debug, Error)]
pub enum Error {
    /// A required external tool is not installed.
    #[error("{tool} not found; install it and make sure it is on the PATH")]
    ToolNotFound { tool: String },

    /// An external tool ran but reported failure.
    #[error("{tool} failed: {message}")]
    ToolFailed { tool: String, message: String },

    /// An external tool produced output this crate could not read.
    #[error("failed to parse {tool} output: {message}")]
    ParseError { tool: String, message: String },

    /// The probed file has no video stream.
    #[error("no video stream found in {}", path.display())]
    NoVideoStream { path: PathBuf },

    /// ffmpeg exited with a non-zero status during an encode pass.
    #[error("encoder failed in pass {pass}: {diagnostics}")]
    EncoderFailed { pass: u32, diagnostics: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    pub(crate) fn tool_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub(crate) fn parse_error(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseError {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub(crate) fn no_video_stream(path: &Path) -> Self {
        Self::NoVideoStream {
            path: path.to_path_buf(),
        }
    }

    pub(crate) fn encoder_failed(pass: u32, diagnostics: impl Into<String>) -> Self {
        Self::EncoderFailed {
            pass,
            diagnostics: diagnostics.into(),
        }
    }
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum BenchmarkError {
    #[error("invalid benchmark URI `{uri}`: {reason}")]
    InvalidUri { uri: String, reason: &'static str },

    #[error("unknown benchmark `{0}`")]
    NotFound(String),

    #[error("benchmark file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("failed to read benchmark file {}: {reason}", .path.display())]
    Read { path: PathBuf, reason: String },

    #[error("failed to parse benchmark `{uri}`: {reason}")]
    Parse { uri: String, reason: String },

    #[error("benchmark `{uri}` failed verification: {reason}")]
    Verification { uri: String, reason: String },

    #[error("invalid benchmark directory pattern `{pattern}`: {reason}")]
    Pattern { pattern: String, reason: String },
}

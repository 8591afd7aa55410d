use std::time::Duration;
use thiserror::Error;

use crate::transcoder::Program;

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: Program,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: Program,
        status: String,
        stderr: String,
    },

    #[error("Processing cancelled")]
    Cancelled,

    #[error("Processing timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Failed to decode media: {0}")]
    Decode(String),

    #[error("Upload exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("Transcoder produced no output at {0}")]
    EmptyOutput(String),

    #[error("Probe failed: {0}")]
    Probe(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessingError {
    /// Cancelled by the caller or stopped by the per-command deadline.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ProcessingError::Cancelled | ProcessingError::TimedOut(_))
    }
}

pub type ProcessingResult<T> = Result<T, ProcessingError>;

/// Keep the tail of a subprocess' stderr; ffmpeg prints its banner first.
pub(crate) fn stderr_tail(stderr: &str) -> String {
    const MAX: usize = 2000;
    let trimmed = stderr.trim();
    if trimmed.len() <= MAX {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - MAX;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &trimmed[start..])
}

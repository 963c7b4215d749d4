use std::path::PathBuf;
use std::time::Duration;

/// Errors produced while formatting, queueing or writing audit events.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("failed to create parent directories for {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open audit log file {}: {source}", path.display())]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to format audit event: {0}")]
    Format(String),

    #[error("failed to write to audit log: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to flush audit log: {0}")]
    Flush(#[source] std::io::Error),

    #[error("audit sink is closed")]
    Closed,

    #[error("audit queue is at capacity")]
    QueueFull,

    #[error("timed out after {0:?} waiting for audit queue capacity")]
    Timeout(Duration),

    #[error("queue capacity must be greater than zero")]
    InvalidCapacity,

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("{0} audit event(s) could not be written to the log")]
    Unwritten(usize),

    #[error("audit worker terminated abnormally: {0}")]
    Worker(String),
}

impl AuditError {
    /// Shorthand for [`AuditError::InvalidPattern`].
    pub fn invalid_pattern(pattern: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}

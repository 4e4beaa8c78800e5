//! Error taxonomy of the sync engine.

use thiserror::Error;

/// Errors raised by HTTP reads/mutations and by the event transport.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The request never produced a response (connect, timeout, body).
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The response body did not match the expected shape.
    #[error("decode: {0}")]
    Decode(#[from] serde_json::Error),

    /// Socket-level problem on the event channel. Never a task failure.
    #[error("transport: {0}")]
    Transport(String),

    /// The reconciler task is gone.
    #[error("sync engine stopped")]
    Stopped,
}

impl SyncError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
            || matches!(self, SyncError::Http { status: 404, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(!SyncError::Transport("reset".into()).is_not_found());
        assert!(SyncError::NotFound("task t-1".into()).is_not_found());
        assert!(SyncError::Http {
            status: 404,
            message: String::new()
        }
        .is_not_found());
        assert_eq!(
            SyncError::Http {
                status: 502,
                message: "bad gateway".into()
            }
            .to_string(),
            "http 502: bad gateway"
        );
    }
}

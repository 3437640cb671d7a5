// ABOUTME: Error taxonomy for tracking remote generation jobs
// ABOUTME: Keeps remote failures, timeouts and local listener problems distinct

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerError {
    /// A status query failed or returned something unusable. Retried, never fatal on its own.
    Transient(String),
    /// The remote system reported the job as failed.
    RemoteJobFailure(String),
    /// No terminal status or notification arrived within the wait budget.
    Timeout {
        waited_secs: u64,
        last_error: Option<String>,
    },
    /// An inbound callback body could not be parsed.
    MalformedCallback(String),
    InvalidConfig(String),
    Listener(String),
}

impl TrackerError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TrackerError::Timeout { .. })
    }
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TrackerError::Transient(msg) => write!(f, "Transient error: {}", msg),
            TrackerError::RemoteJobFailure(msg) => write!(f, "Generation failed: {}", msg),
            TrackerError::Timeout {
                waited_secs,
                last_error: Some(err),
            } => write!(
                f,
                "Timed out after {}s without a final result (last error: {}). The job may still be running",
                waited_secs, err
            ),
            TrackerError::Timeout { waited_secs, .. } => write!(
                f,
                "Timed out after {}s without a final result. The job may still be running",
                waited_secs
            ),
            TrackerError::MalformedCallback(msg) => write!(f, "Malformed callback: {}", msg),
            TrackerError::InvalidConfig(msg) => write!(f, "Invalid tracker configuration: {}", msg),
            TrackerError::Listener(msg) => write!(f, "Callback listener error: {}", msg),
        }
    }
}

impl std::error::Error for TrackerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_mentions_last_error() {
        let err = TrackerError::Timeout {
            waited_secs: 60,
            last_error: Some("connection refused".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("60s"));
        assert!(msg.contains("connection refused"));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_remote_failure_is_not_timeout() {
        let err = TrackerError::RemoteJobFailure("quota exceeded".to_string());
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "Generation failed: quota exceeded");
    }
}

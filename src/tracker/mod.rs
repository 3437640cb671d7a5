// ABOUTME: Tracks a remote generation job until it succeeds, fails or times out
// ABOUTME: Shared types for the polling and callback strategies

pub mod callback;
pub mod poll;

pub use callback::{await_notification, start_listener, ListenerHandle, Mailbox};
pub use poll::{await_completion, await_completion_with, PollProgress, StatusSource};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::warn;

use crate::error::TrackerError;
use crate::remote::models::Artifact;

/// Opaque task id issued by the remote system when a request is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl JobStatus {
    /// Maps the remote status string. Matching is case-sensitive.
    pub fn from_remote(status: Option<&str>) -> Self {
        match status {
            Some("SUCCESS") => JobStatus::Succeeded,
            Some("FAILED") => JobStatus::Failed,
            Some("PENDING") => JobStatus::Pending,
            Some("GENERATING") => JobStatus::Running,
            other => {
                warn!("Unrecognized remote status {:?}, still waiting", other);
                JobStatus::Unknown
            }
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
            JobStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Terminal outcome of a tracked job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
    Succeeded(Vec<Artifact>),
    Failed(String),
}

impl JobResult {
    /// Turns a remote failure into `TrackerError::RemoteJobFailure` so callers can use `?`.
    pub fn into_artifacts(self) -> Result<Vec<Artifact>, TrackerError> {
        match self {
            JobResult::Succeeded(artifacts) => Ok(artifacts),
            JobResult::Failed(msg) => Err(TrackerError::RemoteJobFailure(msg)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub poll_interval_secs: u64,
    pub max_wait_secs: u64,
    /// Only used by the callback strategy.
    #[serde(default)]
    pub listen_port: Option<u16>,
}

impl TrackerConfig {
    pub fn new(poll_interval_secs: u64, max_wait_secs: u64) -> Self {
        Self {
            poll_interval_secs,
            max_wait_secs,
            listen_port: None,
        }
    }

    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = Some(port);
        self
    }

    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.poll_interval_secs == 0 {
            return Err(TrackerError::InvalidConfig(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if self.max_wait_secs == 0 {
            return Err(TrackerError::InvalidConfig(
                "maximum wait must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(JobStatus::from_remote(Some("SUCCESS")), JobStatus::Succeeded);
        assert_eq!(JobStatus::from_remote(Some("FAILED")), JobStatus::Failed);
        assert_eq!(JobStatus::from_remote(Some("PENDING")), JobStatus::Pending);
        assert_eq!(JobStatus::from_remote(Some("GENERATING")), JobStatus::Running);
        assert_eq!(JobStatus::from_remote(Some("success")), JobStatus::Unknown);
        assert_eq!(JobStatus::from_remote(Some("TEXT_SUCCESS")), JobStatus::Unknown);
        assert_eq!(JobStatus::from_remote(None), JobStatus::Unknown);
    }

    #[test]
    fn test_config_rejects_zero_values() {
        assert!(TrackerConfig::new(10, 60).validate().is_ok());
        assert!(matches!(
            TrackerConfig::new(0, 60).validate(),
            Err(TrackerError::InvalidConfig(_))
        ));
        assert!(matches!(
            TrackerConfig::new(10, 0).validate(),
            Err(TrackerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_failed_result_converts_to_remote_failure() {
        let err = JobResult::Failed("content policy".to_string())
            .into_artifacts()
            .unwrap_err();
        assert_eq!(err, TrackerError::RemoteJobFailure("content policy".to_string()));
    }
}

// ABOUTME: Polling strategy: query the status endpoint until a terminal state or timeout
// ABOUTME: Transient query failures are retried on the next interval, never surfaced early

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{JobHandle, JobResult, JobStatus, TrackerConfig};
use crate::error::TrackerError;
use crate::remote::models::TaskRecord;

/// Anything that can report the current record of a remote job.
pub trait StatusSource {
    fn fetch_status(
        &self,
        handle: &JobHandle,
    ) -> impl Future<Output = anyhow::Result<TaskRecord>> + Send;
}

/// Snapshot handed to the progress callback after each check.
#[derive(Debug, Clone, Copy)]
pub struct PollProgress {
    pub attempt: u32,
    pub elapsed: Duration,
    pub status: JobStatus,
}

pub async fn await_completion<S: StatusSource>(
    source: &S,
    handle: &JobHandle,
    config: &TrackerConfig,
) -> Result<JobResult, TrackerError> {
    await_completion_with(source, handle, config, |_| {}).await
}

pub async fn await_completion_with<S, F>(
    source: &S,
    handle: &JobHandle,
    config: &TrackerConfig,
    mut on_poll: F,
) -> Result<JobResult, TrackerError>
where
    S: StatusSource,
    F: FnMut(&PollProgress),
{
    config.validate()?;

    let started = Instant::now();
    let max_wait = config.max_wait();
    let mut attempt = 0u32;
    let mut last_error: Option<String> = None;

    info!(
        "Polling task {} every {}s for up to {}s",
        handle, config.poll_interval_secs, config.max_wait_secs
    );

    while started.elapsed() < max_wait {
        attempt += 1;

        let status = match source.fetch_status(handle).await {
            Ok(record) => {
                let status = JobStatus::from_remote(record.status.as_deref());
                match status {
                    JobStatus::Succeeded if !record.artifacts().is_empty() => {
                        on_poll(&PollProgress {
                            attempt,
                            elapsed: started.elapsed(),
                            status,
                        });
                        info!(
                            "Task {} completed in {}s with {} artifact(s)",
                            handle,
                            started.elapsed().as_secs(),
                            record.artifacts().len()
                        );
                        return Ok(JobResult::Succeeded(record.artifacts().to_vec()));
                    }
                    JobStatus::Succeeded => {
                        // Results are attached some time after the status flips.
                        warn!("Task {} reports SUCCESS but has no artifacts yet", handle);
                    }
                    JobStatus::Failed => {
                        on_poll(&PollProgress {
                            attempt,
                            elapsed: started.elapsed(),
                            status,
                        });
                        let msg = record
                            .error_message
                            .unwrap_or_else(|| "Unknown error".to_string());
                        warn!("Task {} failed: {}", handle, msg);
                        return Ok(JobResult::Failed(msg));
                    }
                    _ => debug!("Task {} status: {}", handle, status),
                }
                status
            }
            Err(e) => {
                let detail = format!("{:#}", e);
                debug!("Task {} status check failed, retrying: {}", handle, detail);
                last_error = Some(detail);
                JobStatus::Unknown
            }
        };

        on_poll(&PollProgress {
            attempt,
            elapsed: started.elapsed(),
            status,
        });

        let remaining = max_wait.saturating_sub(started.elapsed());
        tokio::time::sleep(config.poll_interval().min(remaining)).await;
    }

    Err(TrackerError::Timeout {
        waited_secs: started.elapsed().as_secs(),
        last_error,
    })
}

// ABOUTME: HTTP client for the Suno generation API
// ABOUTME: Handles job submission, status queries and downloading finished tracks

use anyhow::{Context, Result};
use reqwest::Client;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::models::{ApiEnvelope, Artifact, GenerateRequest, SubmitData, TaskRecord};
use crate::tracker::{JobHandle, StatusSource};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

pub struct SunoClient {
    client: Client,
    api_base_url: String,
    api_key: String,
}

impl SunoClient {
    pub fn new(api_base_url: String, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub async fn submit_job(&self, request: &GenerateRequest) -> Result<JobHandle> {
        let url = format!("{}/generate", self.api_base_url);

        info!("Submitting generation request: {} ({})", request.title, request.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .context("Failed to submit generation request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Generation request failed with status {}: {}", status, body);
        }

        let envelope: ApiEnvelope<SubmitData> = response
            .json()
            .await
            .context("Failed to parse generation response")?;

        if !envelope.is_ok() {
            anyhow::bail!("API error {}: {}", envelope.code, envelope.message());
        }

        let data = envelope
            .data
            .context("Generation response did not include a task id")?;

        info!("Task created: {}", data.task_id);
        Ok(JobHandle::new(data.task_id))
    }

    pub async fn get_task_status(&self, handle: &JobHandle) -> Result<TaskRecord> {
        let url = format!("{}/generate/record-info", self.api_base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[("taskId", handle.as_str())])
            .send()
            .await
            .context("Failed to get task status")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Failed to get task status {}: {}", status, body);
        }

        let envelope: ApiEnvelope<TaskRecord> = response
            .json()
            .await
            .context("Failed to parse task status")?;

        if !envelope.is_ok() {
            anyhow::bail!("API error {}: {}", envelope.code, envelope.message());
        }

        envelope.data.context("Task status response had no data")
    }

    /// Downloads every artifact into `output_dir`. Individual failures are logged and skipped.
    pub async fn download_artifacts(
        &self,
        artifacts: &[Artifact],
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;

        info!("Downloading {} track(s)", artifacts.len());

        let mut downloaded = Vec::new();
        for (i, artifact) in artifacts.iter().enumerate() {
            if artifact.audio_url.is_empty() {
                warn!("Track {}: no audio URL", i + 1);
                continue;
            }

            let path = output_dir.join(artifact_file_name(artifact, i + 1));
            match self.download_one(&artifact.audio_url, &path).await {
                Ok(bytes) => {
                    info!(
                        "Saved {} ({:.2} MB)",
                        path.display(),
                        bytes as f64 / (1024.0 * 1024.0)
                    );
                    if let Some(duration) = artifact.duration {
                        info!("  Duration: {}s", duration);
                    }
                    if let Some(tags) = &artifact.tags {
                        info!("  Tags: {}", tags);
                    }
                    downloaded.push(path);
                }
                Err(e) => warn!("Download of {} failed: {:#}", path.display(), e),
            }
        }

        Ok(downloaded)
    }

    async fn download_one(&self, url: &str, path: &Path) -> Result<usize> {
        let response = self
            .client
            .get(url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await
            .context("Request failed")?
            .error_for_status()
            .context("Server rejected download")?;

        let bytes = response.bytes().await.context("Failed to read body")?;
        tokio::fs::write(path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(bytes.len())
    }
}

impl StatusSource for SunoClient {
    fn fetch_status(&self, handle: &JobHandle) -> impl Future<Output = Result<TaskRecord>> + Send {
        self.get_task_status(handle)
    }
}

/// `<title>.mp3` with path-hostile characters replaced, or `track_<n>.mp3`.
pub fn artifact_file_name(artifact: &Artifact, index: usize) -> String {
    let stem = artifact
        .title
        .as_deref()
        .map(sanitize_file_stem)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("track_{}", index));
    format!("{}.mp3", stem)
}

pub fn sanitize_file_stem(title: &str) -> String {
    title.trim().replace(' ', "_").replace(['/', '\\'], "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = SunoClient::new(
            "https://api.sunoapi.org/api/v1/".to_string(),
            "key".to_string(),
        )
        .unwrap();
        assert_eq!(client.api_base_url, "https://api.sunoapi.org/api/v1");
    }

    #[test]
    fn test_file_names() {
        let mut artifact = Artifact::new("http://x/a.mp3");
        assert_eq!(artifact_file_name(&artifact, 2), "track_2.mp3");

        artifact.title = Some("Hard Trap Moscow".to_string());
        assert_eq!(artifact_file_name(&artifact, 1), "Hard_Trap_Moscow.mp3");

        artifact.title = Some("AC/DC tribute".to_string());
        assert_eq!(artifact_file_name(&artifact, 1), "AC-DC_tribute.mp3");

        artifact.title = Some("   ".to_string());
        assert_eq!(artifact_file_name(&artifact, 3), "track_3.mp3");
    }

    #[tokio::test]
    async fn test_unreachable_api_is_an_error() {
        let client = SunoClient::new("http://127.0.0.1:1".to_string(), "key".to_string()).unwrap();
        let result = client.get_task_status(&JobHandle::new("abc")).await;
        assert!(result.is_err());
    }
}

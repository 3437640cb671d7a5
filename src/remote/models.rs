// ABOUTME: Data structures for generation requests, status records and callbacks
// ABOUTME: These are serialized to JSON for API communication

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Body of `POST /generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub title: String,
    pub style: String,
    pub model: String,
    pub custom_mode: bool,
    pub instrumental: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_tags: Option<String>,
    pub prompt: String,
    pub call_back_url: String,
}

/// Common `{code, msg, data}` wrapper used by every API response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    pub fn is_ok(&self) -> bool {
        self.code == 200
    }

    pub fn message(&self) -> &str {
        self.msg.as_deref().unwrap_or("Unknown error")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitData {
    #[serde(rename = "taskId")]
    pub task_id: String,
}

/// `data` of `GET /generate/record-info`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskRecord {
    #[serde(default, rename = "taskId")]
    pub task_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub response: Option<TaskResponse>,
    #[serde(default, rename = "errorMessage")]
    pub error_message: Option<String>,
}

impl TaskRecord {
    pub fn artifacts(&self) -> &[Artifact] {
        self.response
            .as_ref()
            .and_then(|r| r.data.as_deref())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskResponse {
    #[serde(default, alias = "sunoData")]
    pub data: Option<Vec<Artifact>>,
}

/// One produced track. Unknown fields are kept so the raw result can be persisted intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(alias = "audioUrl")]
    pub audio_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(default, alias = "imageUrl", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, alias = "modelName", skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Artifact {
    pub fn new(audio_url: impl Into<String>) -> Self {
        Self {
            audio_url: audio_url.into(),
            id: None,
            title: None,
            duration: None,
            tags: None,
            image_url: None,
            model_name: None,
            extra: HashMap::new(),
        }
    }
}

/// Body the remote system POSTs to the callback URL.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackPayload {
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Option<CallbackData>,
}

/// The artifact list arrives either directly as `data` or nested one level deeper.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CallbackData {
    Artifacts(Vec<Artifact>),
    Nested {
        #[serde(default)]
        data: Option<Vec<Artifact>>,
    },
}

impl CallbackPayload {
    pub fn artifacts(&self) -> &[Artifact] {
        match &self.data {
            Some(CallbackData::Artifacts(list)) => list,
            Some(CallbackData::Nested { data: Some(list) }) => list,
            _ => &[],
        }
    }
}

// ABOUTME: Remote generation service module
// ABOUTME: Wire models and the HTTP client for the Suno API

pub mod client;
pub mod models;

pub use client::SunoClient;
pub use models::{Artifact, GenerateRequest, TaskRecord};

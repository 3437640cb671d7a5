// ABOUTME: Library root for submitting Suno generation jobs and tracking them to completion
// ABOUTME: Exposes the tracker, remote client, persona store and settings

pub mod config;
pub mod error;
pub mod persona;
pub mod remote;
pub mod tracker;

pub use error::TrackerError;
pub use tracker::{JobHandle, JobResult, JobStatus, TrackerConfig};

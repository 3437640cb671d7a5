// ABOUTME: Layered settings: built-in values, optional TOML file, then environment
// ABOUTME: CLI flags are applied on top by the binary

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::persona::DEFAULT_STORE_FILE;
use crate::tracker::TrackerConfig;

pub const DEFAULT_CONFIG_FILE: &str = "suno.toml";
pub const DEFAULT_BASE_URL: &str = "https://api.sunoapi.org/api/v1";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_MAX_WAIT_SECS: u64 = 360;
pub const DEFAULT_LISTEN_PORT: u16 = 8877;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub tracker: TrackerSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiSection {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Host name the remote system uses to reach the callback listener.
    pub callback_host: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackerSection {
    pub poll_interval_secs: Option<u64>,
    pub max_wait_secs: Option<u64>,
    pub listen_port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSection {
    pub directory: Option<PathBuf>,
    pub persona_store: Option<PathBuf>,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub callback_host: String,
    pub tracker: TrackerConfig,
    pub output_dir: PathBuf,
    pub persona_store: PathBuf,
}

impl Settings {
    /// Reads `path` if given, else `suno.toml` in the working directory when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => FileConfig::from_path(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                FileConfig::from_path(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => FileConfig::default(),
        };
        Ok(Self::from_sources(file, |key| std::env::var(key).ok()))
    }

    pub fn from_sources(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let tracker = TrackerConfig::new(
            file.tracker
                .poll_interval_secs
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            file.tracker.max_wait_secs.unwrap_or(DEFAULT_MAX_WAIT_SECS),
        )
        .with_listen_port(file.tracker.listen_port.unwrap_or(DEFAULT_LISTEN_PORT));

        Self {
            base_url: env("SUNO_BASE_URL")
                .or(file.api.base_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: env("SUNO_API_KEY")
                .or(file.api.api_key)
                .filter(|k| !k.trim().is_empty()),
            callback_host: env("SUNO_CALLBACK_HOST")
                .or(file.api.callback_host)
                .unwrap_or_else(|| "localhost".to_string()),
            tracker,
            output_dir: file
                .output
                .directory
                .unwrap_or_else(|| PathBuf::from("generated_music")),
            persona_store: file
                .output
                .persona_store
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_FILE)),
        }
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().context(
            "No API key configured. Set SUNO_API_KEY or add api_key under [api] in suno.toml",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_builtin_values() {
        let settings = Settings::from_sources(FileConfig::default(), no_env);
        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.tracker.poll_interval_secs, 10);
        assert_eq!(settings.tracker.max_wait_secs, 360);
        assert_eq!(settings.tracker.listen_port, Some(8877));
        assert!(settings.require_api_key().is_err());
    }

    #[test]
    fn test_file_then_env_precedence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("suno.toml");
        std::fs::write(
            &path,
            r#"
[api]
base_url = "https://file.example/api/v1"
api_key = "file-key"

[tracker]
poll_interval_secs = 5
max_wait_secs = 120

[output]
directory = "tracks"
"#,
        )
        .unwrap();

        let file = FileConfig::from_path(&path).unwrap();
        let env: HashMap<&str, &str> = [("SUNO_API_KEY", "env-key")].into_iter().collect();
        let settings = Settings::from_sources(file, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(settings.base_url, "https://file.example/api/v1");
        assert_eq!(settings.require_api_key().unwrap(), "env-key");
        assert_eq!(settings.tracker.poll_interval_secs, 5);
        assert_eq!(settings.tracker.max_wait_secs, 120);
        assert_eq!(settings.output_dir, PathBuf::from("tracks"));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("suno.toml");
        std::fs::write(&path, "[tracker]\npoll_every = 3\n").unwrap();
        assert!(FileConfig::from_path(&path).is_err());
    }
}

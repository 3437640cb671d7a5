// ABOUTME: Named style presets ("personas") stored in a JSON file
// ABOUTME: A persona expands into the style string of a generation request

use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_STORE_FILE: &str = "suno_personas.json";

/// Local time without offset, e.g. `2025-01-05T10:00:00.123456`.
pub const CREATED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

fn default_model() -> String {
    "V4".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub style: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub bpm: Option<u32>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub vocal_characteristics: Option<String>,
    #[serde(default)]
    pub instrumental_elements: Vec<String>,
    #[serde(default)]
    pub mixing_notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Local creation time in `CREATED_AT_FORMAT`.
    #[serde(default)]
    pub created_at: String,
    /// Task ids generated with this persona.
    #[serde(default)]
    pub track_ids: Vec<String>,
}

impl Persona {
    pub fn new(name: impl Into<String>, style: impl Into<String>) -> Self {
        let created_at = Local::now()
            .naive_local()
            .format(CREATED_AT_FORMAT)
            .to_string();
        Self {
            name: name.into(),
            style: style.into(),
            model: default_model(),
            bpm: None,
            key: None,
            vocal_characteristics: None,
            instrumental_elements: Vec::new(),
            mixing_notes: None,
            tags: Vec::new(),
            description: None,
            created_at,
            track_ids: Vec::new(),
        }
    }

    /// Empty fields and a zero BPM are left out.
    pub fn style_string(&self) -> String {
        let filled = |field: &Option<String>| field.clone().filter(|v| !v.trim().is_empty());

        let mut parts = vec![self.style.clone()];
        parts.extend(filled(&self.vocal_characteristics));
        let elements: Vec<&str> = self
            .instrumental_elements
            .iter()
            .map(String::as_str)
            .filter(|e| !e.trim().is_empty())
            .collect();
        if !elements.is_empty() {
            parts.push(elements.join(", "));
        }
        parts.extend(filled(&self.mixing_notes));

        let mut style = parts.join(", ");
        if let Some(key) = filled(&self.key) {
            style.push_str(&format!(", {}", key));
        }
        if let Some(bpm) = self.bpm.filter(|b| *b > 0) {
            style.push_str(&format!(", {} bpm", bpm));
        }
        style
    }

    pub fn add_track(&mut self, track_id: &str) {
        if !self.track_ids.iter().any(|id| id == track_id) {
            self.track_ids.push(track_id.to_string());
        }
    }
}

pub struct PersonaStore {
    path: PathBuf,
    personas: BTreeMap<String, Persona>,
}

impl PersonaStore {
    /// Loads the store at `path`, or starts empty if the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let personas = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read persona store {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse persona store {}", path.display()))?
        } else {
            BTreeMap::new()
        };
        debug!("Loaded {} persona(s) from {}", personas.len(), path.display());
        Ok(Self { path, personas })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self) -> Result<()> {
        let raw = serde_json::to_string_pretty(&self.personas)?;
        std::fs::write(&self.path, raw)
            .with_context(|| format!("Failed to write persona store {}", self.path.display()))
    }

    pub fn add(&mut self, persona: Persona) -> Result<()> {
        info!("Saving persona '{}'", persona.name);
        self.personas.insert(persona.name.clone(), persona);
        self.save()
    }

    pub fn get(&self, name: &str) -> Option<&Persona> {
        self.personas.get(name)
    }

    pub fn list(&self) -> Vec<&str> {
        self.personas.keys().map(String::as_str).collect()
    }

    pub fn update(&mut self, name: &str, apply: impl FnOnce(&mut Persona)) -> Result<()> {
        let persona = self
            .personas
            .get_mut(name)
            .with_context(|| format!("Persona '{}' not found", name))?;
        apply(persona);
        self.save()
    }

    pub fn remove(&mut self, name: &str) -> Result<Persona> {
        let persona = self
            .personas
            .remove(name)
            .with_context(|| format!("Persona '{}' not found", name))?;
        self.save()?;
        Ok(persona)
    }

    pub fn export(&self, name: &str, output: &Path) -> Result<()> {
        let persona = self
            .get(name)
            .with_context(|| format!("Persona '{}' not found", name))?;
        let raw = serde_json::to_string_pretty(persona)?;
        std::fs::write(output, raw)
            .with_context(|| format!("Failed to write {}", output.display()))
    }

    pub fn import(&mut self, input: &Path) -> Result<String> {
        let raw = std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read {}", input.display()))?;
        let persona: Persona = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse persona {}", input.display()))?;
        let name = persona.name.clone();
        self.add(persona)?;
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn drill() -> Persona {
        let mut persona = Persona::new("Drill", "Russian drill-rap, ultra-aggressive");
        persona.model = "V4_5PLUS".to_string();
        persona.bpm = Some(142);
        persona.key = Some("D Minor".to_string());
        persona.vocal_characteristics = Some("snarling vocals".to_string());
        persona.instrumental_elements = vec!["balalaika motifs".to_string(), "sharp hats".to_string()];
        persona.mixing_notes = Some("cold dark mix".to_string());
        persona
    }

    #[test]
    fn test_style_string() {
        assert_eq!(
            drill().style_string(),
            "Russian drill-rap, ultra-aggressive, snarling vocals, balalaika motifs, sharp hats, cold dark mix, D Minor, 142 bpm"
        );
        assert_eq!(Persona::new("Plain", "lofi").style_string(), "lofi");
    }

    #[test]
    fn test_style_string_skips_blank_fields() {
        let mut persona = Persona::new("Sparse", "ambient");
        persona.vocal_characteristics = Some(String::new());
        persona.instrumental_elements = vec!["".to_string(), "pads".to_string()];
        persona.mixing_notes = Some("  ".to_string());
        persona.key = Some(String::new());
        persona.bpm = Some(0);
        assert_eq!(persona.style_string(), "ambient, pads");
    }

    #[test]
    fn test_created_at_is_iso_local_time() {
        let persona = Persona::new("Fresh", "lofi");
        assert!(
            chrono::NaiveDateTime::parse_from_str(&persona.created_at, CREATED_AT_FORMAT).is_ok(),
            "unexpected timestamp {}",
            persona.created_at
        );
        assert!(persona.created_at.contains('T'));
    }

    #[test]
    fn test_add_track_deduplicates() {
        let mut persona = drill();
        persona.add_track("t1");
        persona.add_track("t1");
        persona.add_track("t2");
        assert_eq!(persona.track_ids, vec!["t1", "t2"]);
    }

    #[test]
    fn test_store_persists_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("personas.json");

        let mut store = PersonaStore::open(&path).unwrap();
        assert!(store.list().is_empty());
        store.add(drill()).unwrap();
        store.update("Drill", |p| p.add_track("task-9")).unwrap();

        let reopened = PersonaStore::open(&path).unwrap();
        assert_eq!(reopened.list(), vec!["Drill"]);
        assert_eq!(reopened.get("Drill").unwrap().track_ids, vec!["task-9"]);
    }

    #[test]
    fn test_unknown_persona_errors() {
        let dir = TempDir::new().unwrap();
        let mut store = PersonaStore::open(dir.path().join("p.json")).unwrap();
        assert!(store.remove("missing").is_err());
        assert!(store.update("missing", |_| {}).is_err());
        assert!(store.export("missing", &dir.path().join("out.json")).is_err());
    }

    #[test]
    fn test_export_then_import_into_other_store() {
        let dir = TempDir::new().unwrap();
        let mut source = PersonaStore::open(dir.path().join("a.json")).unwrap();
        source.add(drill()).unwrap();
        let exported = dir.path().join("drill.json");
        source.export("Drill", &exported).unwrap();

        let mut target = PersonaStore::open(dir.path().join("b.json")).unwrap();
        let name = target.import(&exported).unwrap();
        assert_eq!(name, "Drill");
        assert_eq!(target.get("Drill"), source.get("Drill"));
    }

    #[test]
    fn test_reads_minimal_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p.json");
        std::fs::write(
            &path,
            r#"{"Chill": {"name": "Chill", "style": "lofi", "created_at": "2025-01-05T10:00:00"}}"#,
        )
        .unwrap();

        let store = PersonaStore::open(&path).unwrap();
        let persona = store.get("Chill").unwrap();
        assert_eq!(persona.model, "V4");
        assert!(persona.track_ids.is_empty());
    }
}

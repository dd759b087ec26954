//! System prompt storage.
//!
//! The prompt lives in a small JSON file (`{"system_prompt": "..."}`) that is read once
//! at startup. Admins can replace it at runtime, which rewrites the file.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{error, info};

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a friendly and helpful AI assistant. Answer clearly and concisely.";

#[derive(Debug, Serialize, Deserialize)]
struct PromptFile {
    system_prompt: String,
}

pub struct PromptStore {
    path: PathBuf,
    text: RwLock<String>,
}

impl PromptStore {
    /// Reads the prompt file, falling back to [`DEFAULT_SYSTEM_PROMPT`] when it is
    /// missing or unreadable.
    pub fn load(path: &Path) -> Self {
        let text = match Self::read(path) {
            Ok(text) => {
                info!("Loaded system prompt from {}", path.display());
                text
            }
            Err(e) => {
                error!(
                    "Failed to load system prompt from {}: {}. Using default prompt.",
                    path.display(),
                    e
                );
                DEFAULT_SYSTEM_PROMPT.to_string()
            }
        };

        Self {
            path: path.to_path_buf(),
            text: RwLock::new(text),
        }
    }

    fn read(path: &Path) -> anyhow::Result<String> {
        let content = fs::read_to_string(path)?;
        let file: PromptFile = serde_json::from_str(&content)?;
        Ok(file.system_prompt)
    }

    pub fn get(&self) -> String {
        self.text.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Persists the new prompt, then swaps it in. The in-memory prompt is left alone if
    /// the write fails.
    pub fn update(&self, new_prompt: &str) -> anyhow::Result<()> {
        let file = PromptFile {
            system_prompt: new_prompt.to_string(),
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;

        *self.text.write().unwrap_or_else(|e| e.into_inner()) = new_prompt.to_string();
        info!("System prompt updated ({} chars)", new_prompt.chars().count());
        Ok(())
    }
}

/// One line telling the model what "now" is, e.g.
/// `Today is Wed 2025-02-05; the time is 14:30 UTC.`
pub fn datetime_line(now: DateTime<Utc>) -> String {
    format!(
        "Today is {} {}; the time is {} UTC.",
        now.weekday(),
        now.date_naive(),
        now.format("%H:%M")
    )
}

/// The system prompt as sent to the provider, optionally followed by the date/time line.
pub fn compose_system_prompt(base: &str, include_datetime: bool) -> String {
    if include_datetime {
        format!("{}\n\n{}", base, datetime_line(Utc::now()))
    } else {
        base.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_load_prompt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.json");
        fs::write(&path, r#"{"system_prompt": "Be a pirate."}"#).unwrap();

        let store = PromptStore::load(&path);
        assert_eq!(store.get(), "Be a pirate.");
    }

    #[test]
    fn test_missing_or_malformed_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let missing = PromptStore::load(&dir.path().join("missing.json"));
        assert_eq!(missing.get(), DEFAULT_SYSTEM_PROMPT);

        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"prompt": 3}"#).unwrap();
        assert_eq!(PromptStore::load(&path).get(), DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_update_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assistant").join("prompt.json");

        let store = PromptStore::load(&path);
        store.update("Answer in haiku.").unwrap();
        assert_eq!(store.get(), "Answer in haiku.");

        let reloaded = PromptStore::load(&path);
        assert_eq!(reloaded.get(), "Answer in haiku.");
    }

    #[test]
    fn test_datetime_line() {
        let now = Utc.with_ymd_and_hms(2025, 2, 5, 14, 30, 15).unwrap();
        assert_eq!(
            datetime_line(now),
            "Today is Wed 2025-02-05; the time is 14:30 UTC."
        );
    }

    #[test]
    fn test_compose_system_prompt() {
        assert_eq!(compose_system_prompt("base", false), "base");
        let composed = compose_system_prompt("base", true);
        assert!(composed.starts_with("base\n\n"));
        assert!(composed.contains("Today is "));
        assert!(composed.ends_with(" UTC."));
    }
}

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::url::UrlNormalizer;

/// What a mutation does when the record it read was changed underneath it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ConflictPolicy {
    /// Plain read, mutate, write. A concurrent writer can be overwritten.
    #[default]
    LastWriteWins,
    /// Write only if the record still matches what was read; otherwise
    /// re-read and re-apply, up to `max_retries` times.
    DetectConflicts { max_retries: usize },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// `chrome.storage.sync`: synced across devices, small per-item quota.
    Sync,
    #[default]
    IndexedDb,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexedDbConfig {
    pub db_name: String,
    pub store_name: String,
}

impl Default for IndexedDbConfig {
    fn default() -> Self {
        Self {
            db_name: "AppStorage".to_string(),
            store_name: "keyValueStore".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotesConfig {
    pub storage_key: String,
    pub strip_trailing_slash: bool,
    pub conflict_policy: ConflictPolicy,
    pub backend: BackendKind,
    pub indexed_db: IndexedDbConfig,
    pub sync_quota_bytes: usize,
    /// Most verbose level forwarded to the browser console.
    pub log_level: String,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            storage_key: "notes".to_string(),
            strip_trailing_slash: true,
            conflict_policy: ConflictPolicy::default(),
            backend: BackendKind::default(),
            indexed_db: IndexedDbConfig::default(),
            sync_quota_bytes: 8192,
            log_level: "warn".to_string(),
        }
    }
}

impl NotesConfig {
    /// Parses a settings document. Blank input gives the defaults, and any
    /// field left out keeps its default.
    pub fn from_json(settings: &str) -> Result<Self, serde_json::Error> {
        if settings.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(settings)
    }

    pub fn normalizer(&self) -> UrlNormalizer {
        UrlNormalizer::new(self.strip_trailing_slash)
    }

    /// `log_level` as a filter; an unrecognised name falls back to `WARN`.
    pub fn log_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::WARN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_empty_object_give_defaults() {
        assert_eq!(NotesConfig::from_json("").unwrap(), NotesConfig::default());
        assert_eq!(NotesConfig::from_json("{}").unwrap(), NotesConfig::default());
    }

    #[test]
    fn partial_settings_keep_other_defaults() {
        let config = NotesConfig::from_json(
            r#"{
                "backend": "sync",
                "strip_trailing_slash": false,
                "conflict_policy": { "mode": "detect_conflicts", "max_retries": 3 },
                "indexed_db": { "db_name": "Notes" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.backend, BackendKind::Sync);
        assert_eq!(config.storage_key, "notes");
        assert_eq!(
            config.conflict_policy,
            ConflictPolicy::DetectConflicts { max_retries: 3 }
        );
        assert_eq!(config.indexed_db.db_name, "Notes");
        assert_eq!(config.indexed_db.store_name, "keyValueStore");
        assert_eq!(
            config.normalizer().normalize("https://a.test/x/"),
            "https://a.test/x/"
        );
    }

    #[test]
    fn log_level_parses_with_fallback() {
        assert_eq!(NotesConfig::default().log_filter(), LevelFilter::WARN);
        let config = NotesConfig::from_json(r#"{ "log_level": "debug" }"#).unwrap();
        assert_eq!(config.log_filter(), LevelFilter::DEBUG);
        let config = NotesConfig::from_json(r#"{ "log_level": "off" }"#).unwrap();
        assert_eq!(config.log_filter(), LevelFilter::OFF);
        let config = NotesConfig::from_json(r#"{ "log_level": "chatty" }"#).unwrap();
        assert_eq!(config.log_filter(), LevelFilter::WARN);
    }

    #[test]
    fn rejects_malformed_settings() {
        assert!(NotesConfig::from_json("{ not json").is_err());
        assert!(NotesConfig::from_json(r#"{ "backend": "floppy" }"#).is_err());
    }
}

//! Application configuration stored as a JSON settings file in the user's
//! config directory. A missing or unreadable file is replaced with defaults
//! so the app always starts.
//!
//! The settings file doubles as the key-selection surface: "has a key been
//! selected" means the Gemini api key is non-empty, and "open the
//! key-selection UI" opens this file with the system default editor.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub gemini: GeminiParams,
    #[serde(default = "default_voice_locale")]
    pub voice_locale: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gemini: GeminiParams::default(),
            voice_locale: default_voice_locale(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeminiParams {
    pub api_key: String,
    pub model: String,
}

impl Default for GeminiParams {
    fn default() -> Self {
        Self {
            api_key: "".to_string(),
            model: "gemini-3-flash-preview".to_string(),
        }
    }
}

fn default_voice_locale() -> String {
    "en-IN".to_string()
}

impl AppConfig {
    pub fn has_api_key(&self) -> bool {
        !self.gemini.api_key.trim().is_empty()
    }
}

pub fn app_data_dir() -> PathBuf {
    let data_dir = dirs_next::data_dir().expect("Failed to find data directory");
    let app_data_dir = data_dir.join("Minda").join("data");
    if !app_data_dir.exists() {
        fs::create_dir_all(&app_data_dir).expect("Failed to create app data directory");
    }
    app_data_dir
}

pub fn app_config_path() -> PathBuf {
    let config_dir = dirs_next::config_dir().expect("Failed to find config directory");
    let app_config_dir = config_dir.join("Minda").join("configuration");
    if !app_config_dir.exists() {
        fs::create_dir_all(&app_config_dir).expect("Failed to create app config directory");
    }
    app_config_dir.join("settings.json")
}

/// Loads the settings file, writing defaults back when it is absent or does
/// not parse. Corrupt settings are overwritten rather than surfaced.
pub fn load_or_initialize(config_path: &Path) -> AppConfig {
    if config_path.exists() {
        let content = fs::read_to_string(config_path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_else(|_| {
            let default_config = AppConfig::default();
            fs::write(
                config_path,
                serde_json::to_string_pretty(&default_config).unwrap(),
            )
            .ok();
            default_config
        })
    } else {
        let default_config = AppConfig::default();
        fs::write(
            config_path,
            serde_json::to_string_pretty(&default_config).unwrap(),
        )
        .expect("Failed to write default config file");
        default_config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initializes_defaults_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let config = load_or_initialize(&path);

        assert!(path.exists());
        assert!(!config.has_api_key());
        assert_eq!(config.gemini.model, "gemini-3-flash-preview");
        assert_eq!(config.voice_locale, "en-IN");
    }

    #[test]
    fn reads_existing_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"gemini":{"api_key":"k-123","model":"gemini-1.5-flash"},"voice_locale":"en-US"}"#,
        )
        .unwrap();

        let config = load_or_initialize(&path);

        assert!(config.has_api_key());
        assert_eq!(config.gemini.model, "gemini-1.5-flash");
        assert_eq!(config.voice_locale, "en-US");
    }

    #[test]
    fn rewrites_corrupt_settings_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();

        let config = load_or_initialize(&path);

        assert!(!config.has_api_key());
        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(serde_json::from_str::<AppConfig>(&rewritten).is_ok());
    }

    #[test]
    fn locale_defaults_when_absent_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"gemini":{"api_key":"","model":"m"}}"#).unwrap();

        let config = load_or_initialize(&path);

        assert_eq!(config.voice_locale, "en-IN");
    }
}

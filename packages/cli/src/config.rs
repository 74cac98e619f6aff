use revisor_editor::EngineOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_CONFIG_NAME: &str = "revisor.config.json";

/// Revisor configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Retry whitespace-bearing searches with flexible whitespace
    #[serde(default = "default_true")]
    pub fuzzy_whitespace: bool,

    /// Longest before/after preview kept on a change
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,

    /// Log filter used when RUST_LOG is not set
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_true() -> bool {
    true
}

fn default_preview_chars() -> usize {
    EngineOptions::default().preview_chars
}

fn default_log_filter() -> String {
    "warn".to_string()
}

impl Config {
    /// Load config from a directory
    pub fn load(cwd: &str) -> anyhow::Result<Self> {
        let config_path = PathBuf::from(cwd).join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            fuzzy_whitespace: self.fuzzy_whitespace,
            preview_chars: self.preview_chars,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fuzzy_whitespace: default_true(),
            preview_chars: default_preview_chars(),
            log_filter: default_log_filter(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "fuzzyWhitespace": false,
            "previewChars": 40,
            "logFilter": "revisor_editor=debug"
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(!config.fuzzy_whitespace);
        assert_eq!(config.preview_chars, 40);
        assert_eq!(config.log_filter, "revisor_editor=debug");
    }

    #[test]
    fn test_default_config() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert!(config.fuzzy_whitespace);
        assert_eq!(config.preview_chars, 80);
        assert_eq!(config.log_filter, "warn");
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path().display().to_string();
        assert_eq!(Config::load(&cwd).unwrap().preview_chars, 80);

        std::fs::write(dir.path().join(DEFAULT_CONFIG_NAME), r#"{"previewChars": 12}"#).unwrap();
        let config = Config::load(&cwd).unwrap();
        assert_eq!(config.engine_options().preview_chars, 12);
        assert!(config.engine_options().fuzzy_whitespace);
    }
}

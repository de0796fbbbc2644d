//! Configuration file and environment support

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanionConfig {
    /// Base URL of the Generative Language API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// API key; usually supplied through the environment instead
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model used to describe uploaded images
    #[serde(default = "default_describe_model")]
    pub describe_model: String,

    /// Model used for chat-driven edits
    #[serde(default = "default_edit_model")]
    pub edit_model: String,

    /// Model used for text-to-image generation
    #[serde(default = "default_generate_model")]
    pub generate_model: String,

    /// Upper bound for a single remote call, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Where generated and edited images are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_describe_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_edit_model() -> String {
    "gemini-2.5-flash-image".to_string()
}

fn default_generate_model() -> String {
    "imagen-4.0-generate-001".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_output_dir() -> PathBuf {
    dirs::picture_dir()
        .map(|p| p.join("art-companion"))
        .unwrap_or_else(|| PathBuf::from("./art-companion"))
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: None,
            describe_model: default_describe_model(),
            edit_model: default_edit_model(),
            generate_model: default_generate_model(),
            request_timeout_secs: default_request_timeout_secs(),
            output_dir: default_output_dir(),
        }
    }
}

impl CompanionConfig {
    /// Default location: `<config dir>/art-companion/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("art-companion").join("config.toml"))
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load from `path`, or from the default location if it exists, or fall back to defaults.
    ///
    /// An explicit path that cannot be read is an error; a missing default file is not.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => {
                    tracing::debug!("Loading config from {}", path.display());
                    Self::from_file(path)
                }
                None => Ok(Self::default()),
            },
        }
    }

    /// Overlay values from the process environment
    pub fn with_env(self) -> Self {
        self.with_env_from(|name| std::env::var(name).ok())
    }

    fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("GEMINI_API_KEY")
            .or_else(|| non_empty("API_KEY"))
            .or_else(|| non_empty("GOOGLE_API_KEY"))
        {
            self.api_key = Some(key.trim().to_string());
        }
        if let Some(base) = non_empty("GEMINI_API_BASE") {
            self.api_base = base.trim().trim_end_matches('/').to_string();
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = CompanionConfig::from_toml("").unwrap();
        assert_eq!(config.describe_model, "gemini-2.5-flash");
        assert_eq!(config.edit_model, "gemini-2.5-flash-image");
        assert_eq!(config.generate_model, "imagen-4.0-generate-001");
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_partial_file_overrides() {
        let config = CompanionConfig::from_toml(
            r#"
            edit_model = "gemini-3-pro-image-preview"
            request_timeout_secs = 30
            output_dir = "/tmp/art"
            "#,
        )
        .unwrap();
        assert_eq!(config.edit_model, "gemini-3-pro-image-preview");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.output_dir, PathBuf::from("/tmp/art"));
        assert_eq!(config.describe_model, "gemini-2.5-flash");
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            CompanionConfig::from_toml("request_timeout_secs = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_precedence() {
        let env: HashMap<&str, &str> = [
            ("API_KEY", "fallback"),
            ("GEMINI_API_KEY", " primary "),
            ("GEMINI_API_BASE", "http://localhost:8080/v1beta/"),
        ]
        .into_iter()
        .collect();

        let config = CompanionConfig::default().with_env_from(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.api_key.as_deref(), Some("primary"));
        assert_eq!(config.api_base, "http://localhost:8080/v1beta");
    }

    #[test]
    fn test_env_skips_blank_values() {
        let env: HashMap<&str, &str> = [("GEMINI_API_KEY", ""), ("GOOGLE_API_KEY", "google")]
            .into_iter()
            .collect();

        let config = CompanionConfig::default().with_env_from(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.api_key.as_deref(), Some("google"));
    }

    #[test]
    fn test_zero_timeout_is_clamped() {
        let config = CompanionConfig {
            request_timeout_secs: 0,
            ..CompanionConfig::default()
        };
        assert_eq!(config.request_timeout(), Duration::from_secs(1));
    }
}

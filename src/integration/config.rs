//! Configuration for the client
//!
//! Provides centralized configuration for all components. Values come from
//! built-in defaults, an optional TOML file and environment overrides, in
//! that order.

use crate::{AyurError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// Stage labels shown when the service has not reported its own
pub const FALLBACK_STAGES: [&str; 4] = [
    "Retrieving relevant Ayurvedic knowledge...",
    "Analyzing Sanskrit literature...",
    "Preparing Ayurvedic insights...",
    "Generating personalized response...",
];

/// Configuration for the complete client
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Root URL of the answering service, without trailing slash
    pub base_url: String,

    /// Scheme placed before the token in the Authorization header
    pub auth_scheme: String,

    /// Upper bound for one answer request
    pub answer_timeout: Duration,

    /// Upper bound for one speech synthesis request
    pub speech_timeout: Duration,

    /// Delay before the first fallback stage
    pub fallback_first_delay: Duration,

    /// Spacing between fallback stages
    pub fallback_stage_spacing: Duration,

    /// Stage labels used when the service reported none
    pub fallback_stages: Vec<String>,

    /// How long the final processing status stays visible
    pub status_clear_delay: Duration,

    /// Grace period between a forced sign-out and the redirect signal
    pub redirect_grace: Duration,

    /// Language requested from the speech service
    pub speech_language: String,

    /// Ask the service to synthesize audio alongside each answer
    pub enable_tts: bool,

    /// Where the token and identity are persisted
    pub credentials_path: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_scheme: "Token".to_string(),
            answer_timeout: Duration::from_secs(60),
            speech_timeout: Duration::from_secs(60),
            fallback_first_delay: Duration::from_millis(500),
            fallback_stage_spacing: Duration::from_millis(1500),
            fallback_stages: FALLBACK_STAGES.iter().map(|s| s.to_string()).collect(),
            status_clear_delay: Duration::from_millis(1500),
            redirect_grace: Duration::from_secs(3),
            speech_language: "en".to_string(),
            enable_tts: true,
            credentials_path: default_credentials_path(),
        }
    }
}

/// On-disk shape of the configuration; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    base_url: Option<String>,
    auth_scheme: Option<String>,
    answer_timeout_ms: Option<u64>,
    speech_timeout_ms: Option<u64>,
    fallback_first_delay_ms: Option<u64>,
    fallback_stage_spacing_ms: Option<u64>,
    fallback_stages: Option<Vec<String>>,
    status_clear_delay_ms: Option<u64>,
    redirect_grace_ms: Option<u64>,
    speech_language: Option<String>,
    enable_tts: Option<bool>,
    credentials_path: Option<PathBuf>,
}

fn default_credentials_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ayur")
        .join("credentials.json")
}

impl ClientConfig {
    /// Create a configuration pointing at the given service
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::default().with_base_url(base_url)
    }

    /// Load a configuration from a TOML file, filling gaps with defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AyurError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| AyurError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| AyurError::Config(e.to_string()))?;
        Ok(Self::default().merge(file))
    }

    fn merge(mut self, file: ConfigFile) -> Self {
        let ms = Duration::from_millis;
        if let Some(url) = file.base_url {
            self = self.with_base_url(url);
        }
        if let Some(scheme) = file.auth_scheme {
            self.auth_scheme = scheme;
        }
        if let Some(v) = file.answer_timeout_ms {
            self.answer_timeout = ms(v);
        }
        if let Some(v) = file.speech_timeout_ms {
            self.speech_timeout = ms(v);
        }
        if let Some(v) = file.fallback_first_delay_ms {
            self.fallback_first_delay = ms(v);
        }
        if let Some(v) = file.fallback_stage_spacing_ms {
            self.fallback_stage_spacing = ms(v);
        }
        if let Some(stages) = file.fallback_stages {
            self.fallback_stages = stages;
        }
        if let Some(v) = file.status_clear_delay_ms {
            self.status_clear_delay = ms(v);
        }
        if let Some(v) = file.redirect_grace_ms {
            self.redirect_grace = ms(v);
        }
        if let Some(lang) = file.speech_language {
            self.speech_language = lang;
        }
        if let Some(enabled) = file.enable_tts {
            self.enable_tts = enabled;
        }
        if let Some(path) = file.credentials_path {
            self.credentials_path = path;
        }
        self
    }

    /// Apply `AYUR_BASE_URL` and `AYUR_CREDENTIALS` overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("AYUR_BASE_URL") {
            self = self.with_base_url(url);
        }
        if let Ok(path) = std::env::var("AYUR_CREDENTIALS") {
            self.credentials_path = PathBuf::from(path);
        }
        self
    }

    /// Set the service root URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set where credentials are persisted
    pub fn with_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = path.into();
        self
    }

    /// Set the answer request ceiling
    pub fn with_answer_timeout(mut self, timeout: Duration) -> Self {
        self.answer_timeout = timeout;
        self
    }

    /// Do not request audio alongside answers
    pub fn without_tts(mut self) -> Self {
        self.enable_tts = false;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(AyurError::Config(format!(
                "Base URL must be http(s): {}",
                self.base_url
            )));
        }
        if self.answer_timeout.is_zero() {
            return Err(AyurError::Config("Answer timeout must be positive".into()));
        }
        if self.speech_timeout.is_zero() {
            return Err(AyurError::Config("Speech timeout must be positive".into()));
        }
        if self.fallback_stages.is_empty() {
            return Err(AyurError::Config(
                "At least one fallback stage is required".into(),
            ));
        }
        if self.auth_scheme.trim().is_empty() {
            return Err(AyurError::Config("Auth scheme is required".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.answer_timeout, Duration::from_secs(60));
        assert_eq!(config.fallback_stages.len(), 4);
        assert!(config.enable_tts);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new("https://ayur.example/api/")
            .with_answer_timeout(Duration::from_secs(5))
            .without_tts();

        assert_eq!(config.base_url, "https://ayur.example/api");
        assert_eq!(config.answer_timeout, Duration::from_secs(5));
        assert!(!config.enable_tts);
    }

    #[test]
    fn test_toml_overrides_only_given_keys() {
        let config = ClientConfig::from_toml_str(
            r#"
            base_url = "https://ayur.example/api"
            redirect_grace_ms = 100
            fallback_stages = ["Thinking..."]
            "#,
        )
        .unwrap();

        assert_eq!(config.base_url, "https://ayur.example/api");
        assert_eq!(config.redirect_grace, Duration::from_millis(100));
        assert_eq!(config.fallback_stages, vec!["Thinking...".to_string()]);
        assert_eq!(config.answer_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = ClientConfig::from_toml_str("colour = \"green\"").unwrap_err();
        assert!(matches!(err, AyurError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ClientConfig::new("ftp://nowhere");
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.fallback_stages.clear();
        assert!(config.validate().is_err());

        let config = ClientConfig::default().with_answer_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}

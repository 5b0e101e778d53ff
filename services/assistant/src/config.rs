//! services/assistant/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use pagecite_core::citation::{ProviderKind, ProviderSettings};
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub log_level: Level,
    pub provider: ProviderSettings,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Select the Provider ---
        let provider_str = lookup("PAGECITE_PROVIDER").unwrap_or_else(|| "openai".to_string());
        let kind = provider_str
            .parse::<ProviderKind>()
            .map_err(|e| ConfigError::InvalidValue("PAGECITE_PROVIDER".to_string(), e))?;

        // --- Load the Credential (optional; absent keys select demo mode) ---
        let credential = lookup(kind.credential_var()).filter(|key| !key.trim().is_empty());

        let mut provider = ProviderSettings::for_kind(kind).with_credential(credential);
        if let Some(model) = lookup("PAGECITE_MODEL").filter(|m| !m.trim().is_empty()) {
            provider = provider.with_model(model.trim());
        }

        Ok(Self {
            log_level,
            provider,
        })
    }

    /// Fails when the selected provider has no usable credential.
    pub fn require_credential(&self) -> Result<&str, ConfigError> {
        self.provider
            .usable_credential()
            .ok_or_else(|| ConfigError::MissingVar(self.provider.kind.credential_var().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_to_openai_without_a_key() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.provider.kind, ProviderKind::OpenAi);
        assert!(config.provider.usable_credential().is_none());
        assert!(matches!(
            config.require_credential(),
            Err(ConfigError::MissingVar(var)) if var == "OPENAI_API_KEY"
        ));
    }

    #[test]
    fn reads_the_key_of_the_selected_provider() {
        let config = Config::from_lookup(lookup(&[
            ("PAGECITE_PROVIDER", "groq"),
            ("OPENAI_API_KEY", "sk-openai-0123456789abcdef"),
            ("GROQ_API_KEY", "gsk_0123456789abcdefghijkl"),
            ("PAGECITE_MODEL", " llama-3.1-8b-instant "),
        ]))
        .unwrap();

        assert_eq!(config.provider.kind, ProviderKind::Groq);
        assert_eq!(config.require_credential().unwrap(), "gsk_0123456789abcdefghijkl");
        assert_eq!(config.provider.model, "llama-3.1-8b-instant");
    }

    #[test]
    fn rejects_unknown_providers_and_levels() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("PAGECITE_PROVIDER", "bard")])),
            Err(ConfigError::InvalidValue(var, _)) if var == "PAGECITE_PROVIDER"
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("RUST_LOG", "loud")])),
            Err(ConfigError::InvalidValue(var, _)) if var == "RUST_LOG"
        ));
    }
}

//! crates/pagecite_core/src/citation/provider.rs
//!
//! Provider selection for the text-generation call. The selected provider is an
//! explicit value threaded into `ask`, never ambient state.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// The OpenAI-compatible endpoints the assistant knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAi,
    Groq,
    OpenRouter,
}

impl ProviderKind {
    /// The environment variable the credential is read from.
    pub fn credential_var(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Groq => "GROQ_API_KEY",
            ProviderKind::OpenRouter => "OPENROUTER_API_KEY",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "groq" => Ok(ProviderKind::Groq),
            "openrouter" => Ok(ProviderKind::OpenRouter),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

/// Everything needed to call one provider.
#[derive(Clone, PartialEq)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub display_name: String,
    pub endpoint: String,
    pub model: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub credential: Option<String>,
}

impl ProviderSettings {
    /// Default settings for `kind`, without a credential.
    pub fn for_kind(kind: ProviderKind) -> Self {
        let (display_name, endpoint, model) = match kind {
            ProviderKind::OpenAi => ("OpenAI", "https://api.openai.com/v1", "gpt-4o-mini"),
            ProviderKind::Groq => (
                "Groq",
                "https://api.groq.com/openai/v1",
                "llama-3.3-70b-versatile",
            ),
            ProviderKind::OpenRouter => (
                "OpenRouter",
                "https://openrouter.ai/api/v1",
                "openai/gpt-4o-mini",
            ),
        };
        Self {
            kind,
            display_name: display_name.to_string(),
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            max_output_tokens: 1000,
            temperature: 0.3,
            credential: None,
        }
    }

    pub fn with_credential(mut self, credential: Option<String>) -> Self {
        self.credential = credential;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// The credential, if one is configured and looks like a real key.
    pub fn usable_credential(&self) -> Option<&str> {
        self.credential
            .as_deref()
            .map(str::trim)
            .filter(|key| is_usable_credential(key))
    }
}

// Keeps keys out of logs.
impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("kind", &self.kind)
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("temperature", &self.temperature)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Rejects empty keys, keys with whitespace and the usual `.env` placeholders.
pub fn is_usable_credential(key: &str) -> bool {
    let lowered = key.to_lowercase();
    key.len() >= 20
        && !key.chars().any(char::is_whitespace)
        && !lowered.starts_with("your")
        && !lowered.contains("placeholder")
        && !lowered.contains("xxxx")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_names() {
        assert_eq!("OpenAI".parse::<ProviderKind>(), Ok(ProviderKind::OpenAi));
        assert_eq!(" groq ".parse::<ProviderKind>(), Ok(ProviderKind::Groq));
        assert!("anthropic-ish".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn placeholder_keys_are_not_usable() {
        let settings = ProviderSettings::for_kind(ProviderKind::OpenAi);
        assert_eq!(settings.usable_credential(), None);

        let placeholder = settings.clone().with_credential(Some("your_api_key_here_please".into()));
        assert_eq!(placeholder.usable_credential(), None);

        let short = settings.clone().with_credential(Some("sk-123".into()));
        assert_eq!(short.usable_credential(), None);

        let real = settings.with_credential(Some("sk-proj-0123456789abcdefghij".into()));
        assert_eq!(real.usable_credential(), Some("sk-proj-0123456789abcdefghij"));
    }

    #[test]
    fn debug_output_redacts_the_key() {
        let settings = ProviderSettings::for_kind(ProviderKind::Groq)
            .with_credential(Some("gsk_0123456789abcdefghijkl".into()));
        let printed = format!("{:?}", settings);
        assert!(!printed.contains("gsk_0123456789"));
        assert!(printed.contains("<redacted>"));
    }
}

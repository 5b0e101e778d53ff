//! services/assistant/src/adapters/llm.rs
//!
//! This module contains the adapter for OpenAI-compatible chat completion APIs
//! (OpenAI, Groq, OpenRouter). It implements the `TextGenerationService` port
//! from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use pagecite_core::citation::{PromptRequest, ProviderSettings};
use pagecite_core::ports::{PortError, PortResult, TextGenerationService};
use tracing::{info, warn};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// Sends prompts to whichever OpenAI-compatible endpoint the `ProviderSettings`
/// passed to each call points at.
#[derive(Clone, Default)]
pub struct OpenAiGenerationAdapter;

impl OpenAiGenerationAdapter {
    pub fn new() -> Self {
        Self
    }

    fn client_for(provider: &ProviderSettings) -> PortResult<Client<OpenAIConfig>> {
        let key = provider.usable_credential().ok_or(PortError::Unauthorized)?;
        let config = OpenAIConfig::new()
            .with_api_key(key)
            .with_api_base(&provider.endpoint);
        Ok(Client::with_config(config))
    }
}

/// Maps a client error onto the failure classes the chat reports.
pub fn classify_error(error: &OpenAIError) -> PortError {
    let message = error.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("insufficient_quota") || lowered.contains("quota") {
        PortError::QuotaExceeded
    } else if lowered.contains("401")
        || lowered.contains("invalid api key")
        || lowered.contains("incorrect api key")
        || lowered.contains("invalid_api_key")
        || lowered.contains("unauthorized")
    {
        PortError::Unauthorized
    } else if lowered.contains("429") || lowered.contains("rate limit") {
        PortError::RateLimited
    } else if lowered.contains("error sending request")
        || lowered.contains("connection")
        || lowered.contains("timed out")
        || lowered.contains("dns")
    {
        PortError::Network(message)
    } else {
        PortError::Unexpected(message)
    }
}

/// Builds the two-message chat request sent for one prompt.
pub fn build_request(
    provider: &ProviderSettings,
    request: &PromptRequest,
) -> PortResult<CreateChatCompletionRequest> {
    let messages = vec![
        ChatCompletionRequestSystemMessageArgs::default()
            .content(request.system.as_str())
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into(),
        ChatCompletionRequestUserMessageArgs::default()
            .content(request.user.as_str())
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into(),
    ];

    CreateChatCompletionRequestArgs::default()
        .model(&provider.model)
        .messages(messages)
        .max_tokens(provider.max_output_tokens)
        .temperature(provider.temperature)
        .build()
        .map_err(|e| PortError::Unexpected(e.to_string()))
}

//=========================================================================================
// `TextGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TextGenerationService for OpenAiGenerationAdapter {
    async fn generate(
        &self,
        provider: &ProviderSettings,
        request: &PromptRequest,
    ) -> PortResult<String> {
        let client = Self::client_for(provider)?;
        let completion = build_request(provider, request)?;

        info!(
            "Calling {} ({}) with a {}-char prompt.",
            provider.display_name,
            provider.model,
            request.user.len()
        );
        let response = client.chat().create(completion).await.map_err(|e: OpenAIError| {
            warn!("{} request failed: {}", provider.display_name, e);
            classify_error(&e)
        })?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| {
                PortError::Unexpected("The provider returned an empty answer.".to_string())
            })
    }
}

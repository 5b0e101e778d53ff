//! crates/pagecite_core/src/citation/mod.rs
//!
//! The citation protocol: prompt construction, the generation call path and
//! parsing of the page citation out of the reply.

pub mod mock;
pub mod parser;
pub mod prompt;
pub mod provider;

pub use mock::MockResponder;
pub use parser::{parse_response, ParsedAnswer};
pub use prompt::{build_prompt, sanitize_question, PromptRequest};
pub use provider::{ProviderKind, ProviderSettings};

use tracing::{info, warn};

use crate::domain::Document;
use crate::ports::{PortError, TextGenerationService};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AskError {
    #[error("Please enter a question.")]
    EmptyQuestion,
    #[error("Upload at least one document and wait for it to finish processing.")]
    NoReadyDocuments,
    #[error("No API key is configured for the selected provider.")]
    NoCredential,
    #[error("{}", describe_failure(.0))]
    Generation(#[from] PortError),
}

/// Checks everything that can be rejected locally, before any external call.
pub fn validate(
    question: &str,
    documents: &[Document],
    provider: &ProviderSettings,
) -> Result<(), AskError> {
    if sanitize_question(question).is_empty() {
        return Err(AskError::EmptyQuestion);
    }
    if !documents.iter().any(Document::is_ready) {
        return Err(AskError::NoReadyDocuments);
    }
    if provider.usable_credential().is_none() {
        return Err(AskError::NoCredential);
    }
    Ok(())
}

/// Answers `question` from the Ready documents in `documents`.
///
/// A missing or malformed credential does not fail the call: the randomized
/// `MockResponder` answers instead so the rest of the flow keeps working.
pub async fn ask(
    question: &str,
    documents: &[Document],
    provider: &ProviderSettings,
    generator: &dyn TextGenerationService,
) -> Result<ParsedAnswer, AskError> {
    let ready: Vec<&Document> = documents.iter().filter(|d| d.is_ready()).collect();

    let raw = match validate(question, documents, provider) {
        Ok(()) => {
            let request = build_prompt(question, &ready);
            info!(
                "Asking {} ({}) over {} documents.",
                provider.display_name,
                provider.model,
                ready.len()
            );
            generator.generate(provider, &request).await?
        }
        Err(AskError::NoCredential) => {
            warn!(
                "No usable credential for {}; answering in demo mode.",
                provider.display_name
            );
            MockResponder::new().respond(&ready)
        }
        Err(e) => return Err(e),
    };

    Ok(parse_response(&raw))
}

/// Turns a generation failure into a message fit for the chat history.
pub fn describe_failure(error: &PortError) -> String {
    match error {
        PortError::Unauthorized => {
            "The AI provider rejected the API key. Check that it is valid and has access to the selected model."
                .to_string()
        }
        PortError::RateLimited => {
            "The AI provider is rate limiting requests. Wait a moment and try again.".to_string()
        }
        PortError::QuotaExceeded => {
            "The API quota for this provider is exhausted. Check your plan or billing details."
                .to_string()
        }
        PortError::Network(_) => {
            "Could not reach the AI provider. Check your internet connection and try again."
                .to_string()
        }
        other => format!("The AI provider returned an error: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProcessingState;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct RecordingGenerator {
        calls: AtomicUsize,
        last_prompt: Mutex<Option<PromptRequest>>,
        reply: Result<String, PortError>,
    }

    impl RecordingGenerator {
        fn replying(reply: Result<String, PortError>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
                reply,
            }
        }
    }

    #[async_trait]
    impl TextGenerationService for RecordingGenerator {
        async fn generate(
            &self,
            _provider: &ProviderSettings,
            request: &PromptRequest,
        ) -> Result<String, PortError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = Some(request.clone());
            self.reply.clone()
        }
    }

    fn doc(name: &str, state: ProcessingState) -> Document {
        let mut doc = Document::new(name, Bytes::new());
        doc.page_count = 2;
        doc.extracted_text = "[Page 1]\none\n\n[Page 2]\ntwo".to_string();
        doc.state = state;
        doc
    }

    fn keyed() -> ProviderSettings {
        ProviderSettings::for_kind(ProviderKind::OpenAi)
            .with_credential(Some("sk-test-0123456789abcdefghij".into()))
    }

    #[tokio::test]
    async fn fails_fast_without_ready_documents() {
        let generator = RecordingGenerator::replying(Ok("unused".into()));
        let docs = vec![doc("a.pdf", ProcessingState::Processing)];

        let result = ask("What is X?", &docs, &keyed(), &generator).await;
        assert_eq!(result, Err(AskError::NoReadyDocuments));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejects_blank_questions() {
        let generator = RecordingGenerator::replying(Ok("unused".into()));
        let docs = vec![doc("a.pdf", ProcessingState::Ready)];

        let result = ask(" \n\t ", &docs, &keyed(), &generator).await;
        assert_eq!(result, Err(AskError::EmptyQuestion));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sends_only_ready_documents_and_parses_the_reply() {
        let generator =
            RecordingGenerator::replying(Ok("X is Y.\nSource: spec.pdf, Page 2".into()));
        let docs = vec![
            doc("spec.pdf", ProcessingState::Ready),
            doc("broken.pdf", ProcessingState::Failed("encrypted".into())),
        ];

        let answer = ask("What is X?", &docs, &keyed(), &generator).await.unwrap();
        assert_eq!(answer.content, "X is Y.");
        assert_eq!(answer.citation.unwrap().page_number, 2);

        let prompt = generator.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.user.contains("START OF DOCUMENT: spec.pdf"));
        assert!(!prompt.user.contains("broken.pdf"));
    }

    #[tokio::test]
    async fn missing_credential_degrades_to_demo_answers() {
        let generator = RecordingGenerator::replying(Ok("unused".into()));
        let docs = vec![doc("spec.pdf", ProcessingState::Ready)];
        let provider = ProviderSettings::for_kind(ProviderKind::Groq);

        let answer = ask("What is X?", &docs, &provider, &generator).await.unwrap();
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(answer.citation.unwrap().document_name, "spec.pdf");
    }

    #[tokio::test]
    async fn surfaces_generation_failures() {
        let generator = RecordingGenerator::replying(Err(PortError::RateLimited));
        let docs = vec![doc("spec.pdf", ProcessingState::Ready)];

        let error = ask("What is X?", &docs, &keyed(), &generator).await.unwrap_err();
        assert_eq!(error, AskError::Generation(PortError::RateLimited));
        assert!(error.to_string().contains("rate limiting"));
    }

    #[test]
    fn distinguishes_authorization_from_rate_limits() {
        assert_ne!(
            describe_failure(&PortError::Unauthorized),
            describe_failure(&PortError::RateLimited)
        );
        assert!(describe_failure(&PortError::QuotaExceeded).contains("quota"));
    }
}

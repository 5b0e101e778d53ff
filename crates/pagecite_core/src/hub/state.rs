//! crates/pagecite_core/src/hub/state.rs
//!
//! The application state and its reducer. `AppSnapshot::reduce` is pure: it
//! takes one `Command`, updates the state and returns the `Effect`s the runtime
//! has to carry out. Nothing in here awaits or touches an adapter.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::citation::{sanitize_question, AskError, ParsedAnswer};
use crate::domain::{
    ChatMessage, Citation, Document, DocumentId, Notification, NotificationLevel,
    ProcessingState, Role,
};
use crate::extraction::{Extraction, ExtractionError};

/// Most documents the collection may hold.
pub const MAX_FILES: usize = 10;
/// Largest accepted file, in bytes.
pub const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

const PDF_MIME: &str = "application/pdf";

//=========================================================================================
// Uploads
//=========================================================================================

/// A file handed over by the user.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub mime: Option<String>,
    pub bytes: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, mime: Option<&str>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime: mime.map(str::to_string),
            bytes: bytes.into(),
        }
    }

    /// Accepted by `.pdf` extension or by MIME type.
    pub fn is_pdf(&self) -> bool {
        self.name.to_lowercase().ends_with(".pdf")
            || self
                .mime
                .as_deref()
                .is_some_and(|m| m.eq_ignore_ascii_case(PDF_MIME))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("Only PDF files are supported: {}", .0.join(", "))]
    NotPdf(Vec<String>),
    #[error("Files larger than {} MB are not accepted: {}", MAX_FILE_BYTES / (1024 * 1024), .0.join(", "))]
    TooLarge(Vec<String>),
    #[error("You can keep at most {limit} documents; this upload would make {attempted}.")]
    TooManyFiles { limit: usize, attempted: usize },
}

/// Validates a whole batch. Any violation rejects every file in it.
pub fn validate_upload(existing: usize, files: &[UploadFile]) -> Result<(), UploadError> {
    let not_pdf: Vec<String> = files
        .iter()
        .filter(|f| !f.is_pdf())
        .map(|f| f.name.clone())
        .collect();
    if !not_pdf.is_empty() {
        return Err(UploadError::NotPdf(not_pdf));
    }

    let too_large: Vec<String> = files
        .iter()
        .filter(|f| f.bytes.len() > MAX_FILE_BYTES)
        .map(|f| f.name.clone())
        .collect();
    if !too_large.is_empty() {
        return Err(UploadError::TooLarge(too_large));
    }

    let attempted = existing + files.len();
    if attempted > MAX_FILES {
        return Err(UploadError::TooManyFiles {
            limit: MAX_FILES,
            attempted,
        });
    }
    Ok(())
}

//=========================================================================================
// Commands and Effects
//=========================================================================================

/// Everything that can change the application state.
#[derive(Debug, Clone)]
pub enum Command {
    Upload(Vec<UploadFile>),
    SelectDocument(DocumentId),
    RemoveDocument(DocumentId),
    ClearDocuments,
    SubmitQuestion(String),
    ClickCitation(Citation),
    DismissNotification(u64),
    ClearChat,
    ToggleSidebar,
    /// Sent by the runtime when a document's extraction finishes.
    ExtractionFinished {
        id: DocumentId,
        result: Result<Extraction, ExtractionError>,
    },
    /// Sent by the runtime when the generation call for `request` returns.
    AnswerReceived {
        request: u64,
        result: Result<ParsedAnswer, AskError>,
    },
}

/// Work the runtime performs on behalf of the reducer.
#[derive(Debug, Clone)]
pub enum Effect {
    Extract {
        id: DocumentId,
        bytes: Bytes,
    },
    Ask {
        request: u64,
        question: String,
        documents: Vec<Document>,
    },
}

/// A request for the viewer of `document_id` to scroll to `page`. `seq`
/// increases with every request so repeated clicks on the same citation are
/// still distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationRequest {
    pub seq: u64,
    pub document_id: DocumentId,
    pub page: u32,
}

//=========================================================================================
// State
//=========================================================================================

#[derive(Debug, Clone)]
pub struct AppSnapshot {
    pub documents: Vec<Arc<Document>>,
    pub messages: Vec<ChatMessage>,
    pub active_document: Option<DocumentId>,
    pub notifications: Vec<Notification>,
    pub is_thinking: bool,
    pub sidebar_open: bool,
    pub navigation: Option<NavigationRequest>,
    next_message_id: u64,
    next_notification_id: u64,
    next_request: u64,
    pending_request: Option<u64>,
}

impl Default for AppSnapshot {
    fn default() -> Self {
        Self {
            documents: Vec::new(),
            messages: Vec::new(),
            active_document: None,
            notifications: Vec::new(),
            is_thinking: false,
            sidebar_open: true,
            navigation: None,
            next_message_id: 0,
            next_notification_id: 0,
            next_request: 0,
            pending_request: None,
        }
    }
}

impl AppSnapshot {
    //=====================================================================================
    // Queries
    //=====================================================================================

    pub fn document(&self, id: DocumentId) -> Option<&Arc<Document>> {
        self.documents.iter().find(|d| d.id == id)
    }

    pub fn active(&self) -> Option<&Arc<Document>> {
        self.active_document.and_then(|id| self.document(id))
    }

    pub fn ready_documents(&self) -> impl Iterator<Item = &Arc<Document>> {
        self.documents.iter().filter(|d| d.is_ready())
    }

    /// False while an answer is outstanding or when no document is Ready.
    pub fn can_submit(&self) -> bool {
        !self.is_thinking && self.ready_documents().next().is_some()
    }

    /// Resolves a citation by exact name. Among duplicates the most recent
    /// upload wins, in collection order.
    pub fn resolve_citation(&self, citation: &Citation) -> Option<&Arc<Document>> {
        self.documents
            .iter()
            .rev()
            .find(|d| d.name == citation.document_name)
    }

    //=====================================================================================
    // Reducer
    //=====================================================================================

    pub fn reduce(&mut self, command: Command) -> Vec<Effect> {
        match command {
            Command::Upload(files) => self.upload(files),
            Command::SelectDocument(id) => {
                if self.document(id).is_some() {
                    self.active_document = Some(id);
                }
                Vec::new()
            }
            Command::RemoveDocument(id) => {
                self.remove_document(id);
                Vec::new()
            }
            Command::ClearDocuments => {
                info!("Clearing {} documents.", self.documents.len());
                self.documents.clear();
                self.active_document = None;
                self.navigation = None;
                Vec::new()
            }
            Command::SubmitQuestion(question) => self.submit_question(&question),
            Command::ClickCitation(citation) => {
                self.click_citation(&citation);
                Vec::new()
            }
            Command::DismissNotification(id) => {
                self.notifications.retain(|n| n.id != id);
                Vec::new()
            }
            Command::ClearChat => {
                self.messages.clear();
                self.is_thinking = false;
                self.pending_request = None;
                Vec::new()
            }
            Command::ToggleSidebar => {
                self.sidebar_open = !self.sidebar_open;
                Vec::new()
            }
            Command::ExtractionFinished { id, result } => {
                self.finish_extraction(id, result);
                Vec::new()
            }
            Command::AnswerReceived { request, result } => {
                self.receive_answer(request, result);
                Vec::new()
            }
        }
    }

    //=====================================================================================
    // Handlers
    //=====================================================================================

    fn upload(&mut self, files: Vec<UploadFile>) -> Vec<Effect> {
        if files.is_empty() {
            return Vec::new();
        }
        if let Err(e) = validate_upload(self.documents.len(), &files) {
            warn!("Upload rejected: {}", e);
            self.notify(NotificationLevel::Error, e.to_string());
            return Vec::new();
        }

        let mut effects = Vec::with_capacity(files.len());
        for file in files {
            let mut document = Document::new(file.name, file.bytes);
            document.state = ProcessingState::Processing;
            info!("Accepted '{}' ({} bytes).", document.name, document.bytes.len());
            effects.push(Effect::Extract {
                id: document.id,
                bytes: document.bytes.clone(),
            });
            if self.active_document.is_none() {
                self.active_document = Some(document.id);
            }
            self.documents.push(Arc::new(document));
        }
        effects
    }

    fn remove_document(&mut self, id: DocumentId) {
        let before = self.documents.len();
        self.documents.retain(|d| d.id != id);
        if self.documents.len() == before {
            return;
        }
        if self.active_document == Some(id) {
            self.active_document = self.documents.first().map(|d| d.id);
        }
        if self.navigation.is_some_and(|n| n.document_id == id) {
            self.navigation = None;
        }
    }

    fn finish_extraction(&mut self, id: DocumentId, result: Result<Extraction, ExtractionError>) {
        let Some(slot) = self.documents.iter_mut().find(|d| d.id == id) else {
            debug!("Dropping extraction result for removed document {}.", id);
            return;
        };
        if slot.state.is_terminal() {
            debug!("Dropping late extraction result for document {}.", id);
            return;
        }

        let document = Arc::make_mut(slot);
        let failure = match result {
            Ok(extraction) => {
                info!("'{}' is ready ({} pages).", document.name, extraction.page_count);
                document.page_count = extraction.page_count;
                document.extracted_text = extraction.text;
                document.state = ProcessingState::Ready;
                None
            }
            Err(e) => {
                warn!("Extraction of '{}' failed: {}", document.name, e);
                document.state = ProcessingState::Failed(e.to_string());
                Some(format!("Could not process {}: {}", document.name, e))
            }
        };
        if let Some(message) = failure {
            self.notify(NotificationLevel::Error, message);
        }
    }

    fn submit_question(&mut self, question: &str) -> Vec<Effect> {
        if self.is_thinking {
            self.notify(
                NotificationLevel::Info,
                "Please wait for the current answer before asking again.".to_string(),
            );
            return Vec::new();
        }

        let question = sanitize_question(question);
        if question.is_empty() {
            self.notify(NotificationLevel::Error, AskError::EmptyQuestion.to_string());
            return Vec::new();
        }
        let documents: Vec<Document> = self.ready_documents().map(|d| d.as_ref().clone()).collect();
        if documents.is_empty() {
            self.notify(NotificationLevel::Error, AskError::NoReadyDocuments.to_string());
            return Vec::new();
        }

        self.push_message(Role::User, question.clone(), None);
        self.is_thinking = true;
        self.next_request += 1;
        let request = self.next_request;
        self.pending_request = Some(request);

        vec![Effect::Ask {
            request,
            question,
            documents,
        }]
    }

    fn receive_answer(&mut self, request: u64, result: Result<ParsedAnswer, AskError>) {
        if self.pending_request != Some(request) {
            debug!("Dropping answer for abandoned request {}.", request);
            return;
        }
        self.pending_request = None;
        self.is_thinking = false;

        match result {
            Ok(answer) => self.push_message(Role::Assistant, answer.content, answer.citation),
            Err(e) => {
                let reason = e.to_string();
                self.push_message(
                    Role::Assistant,
                    format!("Sorry, I couldn't answer that question. {}", reason),
                    None,
                );
                self.notify(NotificationLevel::Error, reason);
            }
        }
    }

    fn click_citation(&mut self, citation: &Citation) {
        let Some(document_id) = self.resolve_citation(citation).map(|d| d.id) else {
            self.notify(
                NotificationLevel::Error,
                format!("The document \"{}\" is no longer loaded.", citation.document_name),
            );
            return;
        };

        self.active_document = Some(document_id);
        let seq = self.navigation.map_or(1, |n| n.seq + 1);
        self.navigation = Some(NavigationRequest {
            seq,
            document_id,
            page: citation.page_number,
        });
        info!(
            "Navigating to {}, page {}.",
            citation.document_name, citation.page_number
        );
    }

    //=====================================================================================
    // Helpers
    //=====================================================================================

    fn push_message(&mut self, role: Role, content: String, citation: Option<Citation>) {
        self.next_message_id += 1;
        self.messages.push(ChatMessage {
            id: self.next_message_id,
            role,
            content,
            created_at: Utc::now(),
            citation,
        });
    }

    fn notify(&mut self, level: NotificationLevel, message: String) {
        self.next_notification_id += 1;
        self.notifications.push(Notification {
            id: self.next_notification_id,
            level,
            message,
        });
    }
}

//=========================================================================================
// Tests
//=========================================================================================

pub mod citation;
pub mod domain;
pub mod extraction;
pub mod hub;
pub mod ports;
pub mod viewer;

pub use citation::{ask, AskError, ParsedAnswer, PromptRequest, ProviderKind, ProviderSettings};
pub use domain::{
    ChatMessage, Citation, Document, DocumentId, Notification, NotificationLevel, PageGeometry,
    ProcessingState, Role, Surface, TextFragment,
};
pub use extraction::{extract, Extraction, ExtractionError};
pub use hub::{AppSnapshot, Command, Hub, HubHandle, HubServices, UploadFile};
pub use ports::{
    DecodedDocument, DocumentDecoder, PagePainter, PortError, PortResult, TextGenerationService,
};
pub use viewer::{RenderScheduler, ViewerSession};

pub mod llm;
pub mod pdf;
pub mod render;
pub mod viewport;

pub use llm::OpenAiGenerationAdapter;
pub use pdf::LopdfDecoder;
pub use render::PdfiumPainter;
pub use viewport::StackedViewport;

//! services/assistant/src/bin/pagecite.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use assistant_lib::{
    adapters::{LopdfDecoder, OpenAiGenerationAdapter, PdfiumPainter, StackedViewport},
    config::Config,
    error::AppError,
};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use pagecite_core::{
    domain::{Document, NotificationLevel, Role},
    extraction,
    hub::{Command, Hub, HubServices, UploadFile},
    ports::PortError,
    viewer::{RenderEvent, ViewerSession},
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "pagecite")]
#[command(about = "Ask questions about PDF documents and get answers cited to a page")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the page-tagged text of one or more PDFs
    Extract {
        /// Input PDF files
        #[arg(required = true)]
        pdfs: Vec<PathBuf>,
    },
    /// Answer a question from one or more PDFs
    Ask {
        question: String,

        /// PDF files to answer from
        #[arg(short, long = "file", required = true)]
        files: Vec<PathBuf>,

        /// Print the answer message as JSON
        #[arg(long)]
        json: bool,

        /// Follow the answer's citation and paint the cited page to this PNG file
        #[arg(long, value_name = "PNG")]
        show_source: Option<PathBuf>,
    },
    /// Paint one page to a PNG file
    Render {
        /// Input PDF file
        pdf: PathBuf,

        /// 1-based page number
        #[arg(short, long, default_value_t = 1)]
        page: u32,

        /// Zoom scale, clamped to 0.5..=3.0
        #[arg(short, long, default_value_t = 1.0)]
        scale: f32,

        /// Output PNG file
        #[arg(short, long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let cli = Cli::parse();
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    info!("Configuration loaded ({:?}).", config.provider);

    // --- 2. Run the Requested Command ---
    match cli.command {
        Commands::Extract { pdfs } => run_extract(&pdfs).await,
        Commands::Ask {
            question,
            files,
            json,
            show_source,
        } => run_ask(&config, question, &files, json, show_source.as_deref()).await,
        Commands::Render {
            pdf,
            page,
            scale,
            out,
        } => run_render(&pdf, page, scale, &out).await,
    }
}

async fn read_pdf(path: &Path) -> Result<Bytes, AppError> {
    Ok(Bytes::from(tokio::fs::read(path).await?))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

//=========================================================================================
// extract
//=========================================================================================

async fn run_extract(pdfs: &[PathBuf]) -> Result<(), AppError> {
    let mut buffers = Vec::with_capacity(pdfs.len());
    for path in pdfs {
        buffers.push(read_pdf(path).await?);
    }

    let results = extraction::extract_many(&LopdfDecoder::new(), buffers).await;
    let mut failed = 0;
    for (path, result) in pdfs.iter().zip(results) {
        match result {
            Ok(extraction) => {
                if pdfs.len() > 1 {
                    println!("=== {} ===", display_name(path));
                }
                println!("{}", extraction.text);
                println!();
                println!("Pages: {}", extraction.page_count);
                println!();
            }
            Err(e) => {
                eprintln!("{}: {}", display_name(path), e);
                failed += 1;
            }
        }
    }
    if failed == pdfs.len() {
        return Err(AppError::Internal("no document could be extracted".to_string()));
    }
    Ok(())
}

//=========================================================================================
// ask
//=========================================================================================

async fn run_ask(
    config: &Config,
    question: String,
    files: &[PathBuf],
    json: bool,
    show_source: Option<&Path>,
) -> Result<(), AppError> {
    let mut uploads = Vec::with_capacity(files.len());
    for path in files {
        uploads.push(UploadFile::new(display_name(path), None, read_pdf(path).await?));
    }

    if let Err(e) = config.require_credential() {
        warn!("{}; answers come from the demo responder.", e);
    }

    let (handle, task) = Hub::spawn(HubServices {
        decoder: Arc::new(LopdfDecoder::new()),
        generator: Arc::new(OpenAiGenerationAdapter::new()),
        provider: config.provider.clone(),
    });

    // --- Upload and Wait for Extraction ---
    let count = uploads.len();
    handle.send(Command::Upload(uploads))?;
    let snapshot = handle
        .wait_for(|s| {
            !s.notifications.is_empty()
                || (s.documents.len() == count && s.documents.iter().all(|d| d.state.is_terminal()))
        })
        .await?;
    for note in &snapshot.notifications {
        eprintln!("{:?}: {}", note.level, note.message);
    }
    if snapshot.documents.is_empty() {
        return Err(AppError::Internal("no documents were accepted".to_string()));
    }
    // Let any remaining extractions finish before asking.
    handle
        .wait_for(|s| s.documents.iter().all(|d| d.state.is_terminal()))
        .await?;

    // --- Ask ---
    let notes_before = handle.snapshot().notifications.len();
    handle.send(Command::SubmitQuestion(question))?;
    let snapshot = handle
        .wait_for(|s| {
            !s.is_thinking
                && (s.messages.iter().any(|m| m.role == Role::Assistant)
                    || s.notifications.len() > notes_before)
        })
        .await?;
    if let Some(error) = snapshot.notifications[notes_before..]
        .iter()
        .find(|n| n.level == NotificationLevel::Error)
    {
        eprintln!("{}", error.message);
    }
    let Some(answer) = snapshot
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .cloned()
    else {
        handle.shutdown();
        return Err(AppError::Internal("no answer was produced".to_string()));
    };

    if json {
        let rendered = serde_json::to_string_pretty(&answer)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        println!("{}", rendered);
    } else {
        println!("{}", answer.content);
        if let Some(citation) = &answer.citation {
            println!();
            println!("Source: {}, Page {}", citation.document_name, citation.page_number);
        }
    }

    // --- Follow the Citation ---
    if let (Some(out), Some(citation)) = (show_source, answer.citation.clone()) {
        let notes_at_click = handle.snapshot().notifications.len();
        handle.send(Command::ClickCitation(citation))?;
        let snapshot = handle
            .wait_for(|s| s.navigation.is_some() || s.notifications.len() > notes_at_click)
            .await?;
        match snapshot.navigation {
            Some(navigation) => {
                let document = snapshot
                    .document(navigation.document_id)
                    .cloned()
                    .ok_or_else(|| AppError::Internal("cited document vanished".to_string()))?;
                let (mut session, mut viewport) = open_viewer(&document, 1.0).await?;
                if let Some(outcome) = session.follow(&mut viewport, &navigation).await {
                    save_painted(&mut session, outcome.page(), out).await?;
                }
            }
            None => eprintln!("The cited document is not loaded; nothing to show."),
        }
    }

    handle.shutdown();
    task.await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(())
}

//=========================================================================================
// viewer
//=========================================================================================

/// Opens `document` in a headless viewer that paints only the page it lands on.
async fn open_viewer(
    document: &Document,
    scale: f32,
) -> Result<(ViewerSession, StackedViewport), AppError> {
    let painter = Arc::new(PdfiumPainter::new(document.bytes.clone()));
    let mut session = ViewerSession::new(painter).with_prefetch_margin(0);
    session.set_zoom(scale);
    let mut viewport = StackedViewport::new();
    session
        .open_document(&mut viewport, &LopdfDecoder::new(), document)
        .await?;
    viewport.fit(session.state().total_pages, session.average_page_height());
    Ok((session, viewport))
}

/// Waits until `page` is painted and writes it out as a PNG.
async fn save_painted(session: &mut ViewerSession, page: u32, out: &Path) -> Result<(), AppError> {
    loop {
        match session.next_event().await {
            Some(RenderEvent::Painted { page: painted, .. }) if painted == page => break,
            Some(RenderEvent::Failed { page: failed, message }) if failed == page => {
                return Err(PortError::Unexpected(message).into());
            }
            Some(_) => continue,
            None => return Err(PortError::Cancelled.into()),
        }
    }
    let surface = session
        .surface(page)
        .ok_or_else(|| AppError::Internal("painted surface missing".to_string()))?;

    let image = image::RgbaImage::from_raw(surface.width, surface.height, surface.pixels.clone())
        .ok_or_else(|| AppError::Internal("surface size does not match its pixels".to_string()))?;
    image.save(out)?;
    info!("Saved page {} at scale {} to {}.", page, session.state().scale, out.display());
    println!("{}", out.display());
    Ok(())
}

//=========================================================================================
// render
//=========================================================================================

async fn run_render(pdf: &Path, page: u32, scale: f32, out: &Path) -> Result<(), AppError> {
    let document = Document::new(display_name(pdf), read_pdf(pdf).await?);
    let (mut session, mut viewport) = open_viewer(&document, scale).await?;
    let page_count = session.state().total_pages;
    if !(1..=page_count).contains(&page) {
        return Err(PortError::NotFound(format!("page {} of {}", page, page_count)).into());
    }

    session.go_to(&mut viewport, page).await;
    save_painted(&mut session, page, out).await
}

//! crates/pagecite_core/src/hub/mod.rs
//!
//! The application state hub. A single task owns the `AppSnapshot`, applies
//! commands through the reducer, publishes every new state on a `watch`
//! channel and runs the resulting effects as background tasks whose results
//! come back as commands.

pub mod state;

pub use state::{
    validate_upload, AppSnapshot, Command, Effect, NavigationRequest, UploadError, UploadFile,
    MAX_FILES, MAX_FILE_BYTES,
};

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::citation::{self, ProviderSettings};
use crate::extraction;
use crate::ports::{DocumentDecoder, TextGenerationService};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    #[error("The hub has shut down")]
    Closed,
}

/// The adapters and settings effects run against.
#[derive(Clone)]
pub struct HubServices {
    pub decoder: Arc<dyn DocumentDecoder>,
    pub generator: Arc<dyn TextGenerationService>,
    pub provider: ProviderSettings,
}

//=========================================================================================
// Handle
//=========================================================================================

/// A cheap, cloneable handle for sending commands and reading snapshots.
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<Arc<AppSnapshot>>,
    shutdown: CancellationToken,
}

impl HubHandle {
    pub fn send(&self, command: Command) -> Result<(), HubError> {
        self.commands.send(command).map_err(|_| HubError::Closed)
    }

    /// The latest published state.
    pub fn snapshot(&self) -> Arc<AppSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<AppSnapshot>> {
        self.snapshots.clone()
    }

    /// Waits until a published state satisfies `predicate` and returns it.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&AppSnapshot) -> bool,
    ) -> Result<Arc<AppSnapshot>, HubError> {
        let mut receiver = self.snapshots.clone();
        let snapshot = receiver
            .wait_for(|s| predicate(s.as_ref()))
            .await
            .map_err(|_| HubError::Closed)?;
        Ok(snapshot.clone())
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

//=========================================================================================
// Runtime
//=========================================================================================

pub struct Hub {
    state: AppSnapshot,
    services: HubServices,
    commands_rx: mpsc::UnboundedReceiver<Command>,
    // Effect results are fed back through the same queue as user commands.
    commands_tx: mpsc::UnboundedSender<Command>,
    snapshots_tx: watch::Sender<Arc<AppSnapshot>>,
    shutdown: CancellationToken,
}

impl Hub {
    pub fn new(services: HubServices) -> (Self, HubHandle) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let state = AppSnapshot::default();
        let (snapshots_tx, snapshots_rx) = watch::channel(Arc::new(state.clone()));
        let shutdown = CancellationToken::new();

        let handle = HubHandle {
            commands: commands_tx.clone(),
            snapshots: snapshots_rx,
            shutdown: shutdown.clone(),
        };
        let hub = Self {
            state,
            services,
            commands_rx,
            commands_tx,
            snapshots_tx,
            shutdown,
        };
        (hub, handle)
    }

    /// Creates a hub and runs it on the current tokio runtime.
    pub fn spawn(services: HubServices) -> (HubHandle, JoinHandle<()>) {
        let (hub, handle) = Self::new(services);
        (handle, tokio::spawn(hub.run()))
    }

    /// Processes commands until `shutdown` is called.
    pub async fn run(mut self) {
        info!("State hub started.");
        loop {
            let command = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                command = self.commands_rx.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };
            self.dispatch(command);
        }
        info!("State hub stopped.");
    }

    /// Applies one command, publishes the new state and starts its effects.
    pub fn dispatch(&mut self, command: Command) {
        let effects = self.state.reduce(command);
        self.snapshots_tx.send_replace(Arc::new(self.state.clone()));
        for effect in effects {
            self.start(effect);
        }
    }

    fn start(&self, effect: Effect) {
        let tx = self.commands_tx.clone();
        let cancel = self.shutdown.clone();
        match effect {
            Effect::Extract { id, bytes } => {
                let decoder = self.services.decoder.clone();
                tokio::spawn(async move {
                    debug!("Extraction of {} started.", id);
                    let result = tokio::select! {
                        _ = cancel.cancelled() => return,
                        result = extraction::extract(decoder.as_ref(), bytes) => result,
                    };
                    let _ = tx.send(Command::ExtractionFinished { id, result });
                });
            }
            Effect::Ask {
                request,
                question,
                documents,
            } => {
                let generator = self.services.generator.clone();
                let provider = self.services.provider.clone();
                tokio::spawn(async move {
                    debug!("Question {} sent.", request);
                    let result = tokio::select! {
                        _ = cancel.cancelled() => return,
                        result = citation::ask(&question, &documents, &provider, generator.as_ref()) => result,
                    };
                    let _ = tx.send(Command::AnswerReceived { request, result });
                });
            }
        }
    }
}

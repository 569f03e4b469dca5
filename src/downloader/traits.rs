// Engine, catalog and event seams

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::codecs::CodecAvailability;
use super::errors::DownloadError;
use super::models::{EngineOptions, SessionEvent, SessionSnapshot};

/// Receives raw engine output, one line at a time
pub trait LineSink: Send {
    /// Returning an error aborts the current engine call
    fn consume(&mut self, line: &str) -> Result<(), DownloadError>;

    /// Polled by engines between lines
    fn should_stop(&self) -> bool {
        false
    }
}

/// Trait for the external download/transcode engine
#[async_trait]
pub trait Engine: Send + Sync {
    /// Name of the engine (for logging)
    fn name(&self) -> &'static str;

    /// Download a single URL, streaming log lines into `sink`
    async fn download(
        &self,
        url: &str,
        options: &EngineOptions,
        sink: &mut dyn LineSink,
    ) -> Result<(), DownloadError>;
}

/// Source of the per-session codec catalog
#[async_trait]
pub trait CodecProbe: Send + Sync {
    async fn detect(&self) -> CodecAvailability;
}

/// Publishes session events to the foreground subscriber and keeps the
/// orchestrator's snapshot in step with what was sent
#[derive(Clone)]
pub struct ProgressEmitter {
    tx: mpsc::UnboundedSender<SessionEvent>,
    snapshot: Arc<Mutex<SessionSnapshot>>,
}

impl ProgressEmitter {
    pub fn new(tx: mpsc::UnboundedSender<SessionEvent>, snapshot: Arc<Mutex<SessionSnapshot>>) -> Self {
        Self { tx, snapshot }
    }

    pub fn emit(&self, event: SessionEvent) {
        if let Ok(mut snapshot) = self.snapshot.lock() {
            snapshot.apply(&event);
        }
        // A dropped receiver only means nobody is watching
        let _ = self.tx.send(event);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

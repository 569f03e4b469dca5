// Session orchestrator - one download request from submission to final status
//
// Single-flight: at most one session is active. The session runs on its own
// tokio task, feeds URLs to the engine one at a time and retries the whole
// batch once with a software encoder when a hardware encoder fails.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::codecs::CodecAvailability;
use super::diagnostics::describe_failure;
use super::errors::{DownloadError, SessionError};
use super::format_selector::build_engine_options;
use super::models::{
    CancelFlag, CodecChoice, DownloadRequest, LogLevel, SessionEvent, SessionSnapshot,
    SessionStatus,
};
use super::progress::{timestamp, ProgressInterpreter};
use super::traits::{CodecProbe, Engine, ProgressEmitter};
use super::urls::filter_valid_urls;
use super::utils::ensure_dir;

/// What happens when a hardware encoder fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackPolicy {
    /// Batch restarts allowed per session
    pub max_retries: u32,
    /// Codec used for the restart
    pub substitute: CodecChoice,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            substitute: CodecChoice::SOFTWARE_DEFAULT,
        }
    }
}

impl FallbackPolicy {
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Whether a failure with `codec` after `retries` restarts earns another try
    pub fn applies(&self, codec: Option<CodecChoice>, err: &DownloadError, retries: u32) -> bool {
        retries < self.max_retries
            && codec.map_or(false, |c| c.is_hardware() && c != self.substitute)
            && err.is_fallback_eligible()
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub download_dir: PathBuf,
    pub transcoder_path: Option<PathBuf>,
    pub fallback: FallbackPolicy,
}

impl OrchestratorConfig {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            transcoder_path: None,
            fallback: FallbackPolicy::default(),
        }
    }

    pub fn with_transcoder(mut self, path: Option<PathBuf>) -> Self {
        self.transcoder_path = path;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }
}

/// Final status of a session, or why it never started
pub type SessionOutcome = Result<SessionStatus, SessionError>;

/// Holds the single-flight flag; dropping it releases the slot
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Running session
pub struct SessionHandle {
    task: JoinHandle<SessionStatus>,
}

impl SessionHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the final status
    pub async fn wait(self) -> SessionStatus {
        match self.task.await {
            Ok(status) => status,
            Err(e) => SessionStatus::Failed(format!("Session task failed: {}", e)),
        }
    }
}

#[derive(Clone)]
pub struct SessionOrchestrator {
    engine: Arc<dyn Engine>,
    probe: Arc<dyn CodecProbe>,
    config: Arc<OrchestratorConfig>,
    busy: Arc<AtomicBool>,
    cancel: CancelFlag,
    emitter: ProgressEmitter,
}

impl SessionOrchestrator {
    /// Create an orchestrator and the receiving end of its event stream
    pub fn new(
        engine: Arc<dyn Engine>,
        probe: Arc<dyn CodecProbe>,
        config: OrchestratorConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let snapshot = Arc::new(Mutex::new(SessionSnapshot::default()));
        let orchestrator = Self {
            engine,
            probe,
            config: Arc::new(config),
            busy: Arc::new(AtomicBool::new(false)),
            cancel: CancelFlag::new(),
            emitter: ProgressEmitter::new(tx, snapshot),
        };
        (orchestrator, rx)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Validate `request` and spawn its session.
    ///
    /// Fails with [`SessionError::Busy`] while another session is active and
    /// with [`SessionError::NoValidUrl`] when no URL has an accepted shape.
    /// Neither case touches the active session or spawns anything.
    pub fn start(&self, request: DownloadRequest) -> Result<SessionHandle, SessionError> {
        let guard = BusyGuard::acquire(&self.busy).ok_or_else(|| {
            log::warn!("[Session] Rejected: already running");
            SessionError::Busy
        })?;

        let urls = filter_valid_urls(&request.urls);
        if urls.is_empty() {
            log::warn!("[Session] Rejected: no valid URL in {} line(s)", request.urls.len());
            return Err(SessionError::NoValidUrl);
        }
        if urls.len() < request.urls.len() {
            log::info!("[Session] Dropped {} invalid URL(s)", request.urls.len() - urls.len());
        }

        self.cancel.reset();
        let request = DownloadRequest { urls, ..request };
        let session = self.clone();
        let task = tokio::spawn(async move { session.execute(request, guard).await });
        Ok(SessionHandle { task })
    }

    /// Start a session and wait for its final status
    pub async fn run(&self, request: DownloadRequest) -> SessionOutcome {
        let handle = self.start(request)?;
        Ok(handle.wait().await)
    }

    /// Ask the active session to stop; takes effect at the next line or URL
    pub fn cancel(&self) {
        if self.is_busy() {
            log::info!("[Session] Cancel requested");
        }
        self.cancel.cancel();
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.emitter.snapshot()
    }

    fn log(&self, level: LogLevel, text: impl Into<String>) {
        let text = text.into();
        match level {
            LogLevel::Info => log::info!("[Session] {}", text),
            LogLevel::Warning => log::warn!("[Session] {}", text),
            LogLevel::Error => log::error!("[Session] {}", text),
        }
        self.emitter.emit(SessionEvent::Log {
            level,
            text: format!("{}{}", timestamp(), text),
        });
    }

    async fn execute(self, request: DownloadRequest, guard: BusyGuard) -> SessionStatus {
        let status = self.resolve(&request).await;
        // Slot is free before anyone sees the final event
        drop(guard);
        self.emitter.emit(SessionEvent::Finished {
            status: status.clone(),
        });
        status
    }

    async fn resolve(&self, request: &DownloadRequest) -> SessionStatus {
        self.emitter.emit(SessionEvent::Started {
            total: request.urls.len(),
            codec: request.codec.clone(),
        });
        self.log(LogLevel::Info, "🚀 Starting download...");

        if let Err(e) = ensure_dir(&self.config.download_dir) {
            let reason = format!(
                "Cannot create download folder {}: {}",
                self.config.download_dir.display(),
                e
            );
            self.log(LogLevel::Error, format!("❌ {}", reason));
            return SessionStatus::Failed(reason);
        }

        // Probed once; a fallback retry reuses it. Dropping detection on cancel
        // kills any transcoder it is still waiting on.
        let catalog = tokio::select! {
            catalog = self.probe.detect() => catalog,
            _ = self.cancel.cancelled() => {
                log::info!("[Session] Canceled during codec detection");
                self.log(LogLevel::Info, "⏹️ Download canceled!");
                return SessionStatus::Canceled;
            }
        };

        let mut codec = request.codec.clone();
        let mut retries = 0;
        loop {
            match self.download_batch(request, &codec, &catalog).await {
                Ok(()) => {
                    self.log(LogLevel::Info, "✅ Download completed!");
                    return SessionStatus::Done;
                }
                Err(e) if e.is_cancelled() || self.cancel.is_cancelled() => {
                    self.log(LogLevel::Info, "⏹️ Download canceled!");
                    return SessionStatus::Canceled;
                }
                Err(e) => {
                    let policy = self.config.fallback;
                    if policy.applies(CodecChoice::from_label(&codec), &e, retries) {
                        retries += 1;
                        let substitute = policy.substitute.label().to_string();
                        self.log(
                            LogLevel::Warning,
                            format!("⚠️ {} failed ({}), falling back to {}", codec, e, substitute),
                        );
                        self.emitter.emit(SessionEvent::Fallback {
                            from: codec.clone(),
                            to: substitute.clone(),
                        });
                        codec = substitute;
                        continue;
                    }

                    let reason = describe_failure(&e);
                    self.log(LogLevel::Error, format!("❌ Error: {}", reason));
                    return SessionStatus::Failed(reason);
                }
            }
        }
    }

    async fn download_batch(
        &self,
        request: &DownloadRequest,
        codec: &str,
        catalog: &CodecAvailability,
    ) -> Result<(), DownloadError> {
        let total = request.urls.len();
        for (i, url) in request.urls.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }

            self.emitter.emit(SessionEvent::ItemStarted {
                index: i + 1,
                total,
                url: url.clone(),
            });
            log::info!("[Session] [{}/{}] {} with {}", i + 1, total, url, self.engine.name());

            let options = build_engine_options(codec, &request.resolution, catalog)
                .with_output_dir(&self.config.download_dir)
                .with_transcoder(self.config.transcoder_path.clone());
            let mut interpreter = ProgressInterpreter::new(self.cancel.clone(), self.emitter.clone());

            self.engine.download(url, &options, &mut interpreter).await?;

            if self.cancel.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }
            self.emitter.emit(SessionEvent::ItemFinished {
                index: i + 1,
                url: url.clone(),
            });
        }
        Ok(())
    }
}

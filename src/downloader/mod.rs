// Downloader module - session, engine and codec plumbing

pub mod backends;
pub mod codecs;
pub mod diagnostics;
pub mod errors;
pub mod format_selector;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod tools;
pub mod traits;
pub mod urls;
pub mod utils;

pub use backends::YtDlpEngine;
pub use codecs::{detect_available_codecs, CodecAvailability, TranscoderProbe};
pub use errors::{DownloadError, SessionError};
pub use format_selector::build_engine_options;
pub use models::{
    CodecChoice, DownloadRequest, EngineOptions, Phase, ResolutionChoice, SessionEvent,
    SessionSnapshot, SessionStatus,
};
pub use orchestrator::{
    FallbackPolicy, OrchestratorConfig, SessionHandle, SessionOrchestrator, SessionOutcome,
};
pub use progress::ProgressInterpreter;
pub use tools::{ToolManager, ToolType};
pub use traits::{CodecProbe, Engine, LineSink, ProgressEmitter};
pub use urls::filter_valid_urls;

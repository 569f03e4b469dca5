// Error types for download sessions

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    /// Cancel flag observed while the engine was running
    #[error("Canceled by user")]
    Cancelled,

    /// yt-dlp or ffmpeg not found in system
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// The transcoder rejected the selected encoder
    #[error("Encoder failed: {0}")]
    EncoderFailed(String),

    /// Network timeout while talking to YouTube
    #[error("Network timeout: {0}")]
    NetworkTimeout(String),

    /// The engine does not know how to handle the URL
    #[error("Unsupported URL: {0}")]
    UnsupportedUrl(String),

    /// A child process did not finish in time
    #[error("Timed out after {0}s")]
    TimedOut(u64),

    /// Command execution failed
    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// Unknown error with details
    #[error("{0}")]
    Unknown(String),
}

impl DownloadError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether retrying with a different encoder could change the result.
    /// Cancellation and a missing engine binary never qualify.
    pub fn is_fallback_eligible(&self) -> bool {
        !matches!(self, Self::Cancelled | Self::ToolNotFound(_))
    }
}

// Classify raw engine stderr into an error kind
impl From<String> for DownloadError {
    fn from(s: String) -> Self {
        let lower = s.to_lowercase();

        if lower.contains("canceled by user") || lower.contains("cancelled by user") {
            return Self::Cancelled;
        }

        if lower.contains("unknown encoder")
            || lower.contains("error initializing output stream")
            || lower.contains("conversion failed")
            || lower.contains("postprocessing:")
            || lower.contains("cannot load")
            || lower.contains("no nvenc capable devices")
            || lower.contains("h264_amf")
            || lower.contains("hevc_amf")
            || lower.contains("failed to initialise amf")
            || lower.contains("_qsv")
            || lower.contains("mfx session")
        {
            return Self::EncoderFailed(s);
        }

        if lower.contains("timeout") || lower.contains("timed out") {
            return Self::NetworkTimeout(s);
        }

        if lower.contains("unsupported url") || lower.contains("is not a valid url") {
            return Self::UnsupportedUrl(s);
        }

        if lower.contains("command not found") || lower.contains("no such file or directory") {
            return Self::ToolNotFound(s);
        }

        Self::Unknown(s)
    }
}

impl From<&str> for DownloadError {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

/// Reasons a session could not be started at all
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("A download is already running")]
    Busy,

    #[error("Please enter at least 1 YouTube URL")]
    NoValidUrl,
}

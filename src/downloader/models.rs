// Common data models for download sessions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Height ceiling used when a resolution label is not recognised
pub const DEFAULT_HEIGHT: u32 = 1080;

/// Audio bitrate/quality used for both extraction profiles and the video audio tail
pub const AUDIO_QUALITY: &str = "192";

/// Format choices offered to the user, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CodecChoice {
    H264Cpu,
    H264Nvenc,
    H264Amf,
    H264Qsv,
    H265Cpu,
    H265Nvenc,
    H265Amf,
    H265Qsv,
    Vp9Cpu,
    Mp3Audio,
    AacAudio,
    OpusAudio,
}

impl CodecChoice {
    pub const ALL: [CodecChoice; 12] = [
        Self::H264Cpu,
        Self::H264Nvenc,
        Self::H264Amf,
        Self::H264Qsv,
        Self::H265Cpu,
        Self::H265Nvenc,
        Self::H265Amf,
        Self::H265Qsv,
        Self::Vp9Cpu,
        Self::Mp3Audio,
        Self::AacAudio,
        Self::OpusAudio,
    ];

    /// Software encoder that never needs a GPU
    pub const SOFTWARE_DEFAULT: CodecChoice = Self::H264Cpu;

    /// Label shown in menus and stored in preferences
    pub fn label(&self) -> &'static str {
        match self {
            Self::H264Cpu => "H.264 (CPU libx264)",
            Self::H264Nvenc => "H.264 (NVIDIA NVENC)",
            Self::H264Amf => "H.264 (AMD AMF)",
            Self::H264Qsv => "H.264 (Intel QSV)",
            Self::H265Cpu => "H.265 (CPU libx265)",
            Self::H265Nvenc => "H.265 (NVIDIA NVENC)",
            Self::H265Amf => "H.265 (AMD AMF)",
            Self::H265Qsv => "H.265 (Intel QSV)",
            Self::Vp9Cpu => "VP9 (CPU libvpx-vp9)",
            Self::Mp3Audio => "MP3 (Audio Only)",
            Self::AacAudio => "AAC (Audio Only)",
            Self::OpusAudio => "Opus (Audio Only)",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL.iter().copied().find(|c| c.label() == label)
    }

    /// ffmpeg video arguments for this choice, `None` for audio-only choices
    pub fn encoder_args(&self) -> Option<&'static [&'static str]> {
        match self {
            Self::H264Cpu => Some(&["-c:v", "libx264", "-preset", "medium"]),
            Self::H264Nvenc => Some(&["-c:v", "h264_nvenc", "-preset", "p4"]),
            Self::H264Amf => Some(&["-c:v", "h264_amf", "-quality", "balanced", "-pix_fmt", "yuv420p"]),
            Self::H264Qsv => Some(&["-c:v", "h264_qsv"]),
            Self::H265Cpu => Some(&["-c:v", "libx265", "-crf", "28", "-preset", "medium"]),
            Self::H265Nvenc => Some(&["-c:v", "hevc_nvenc", "-preset", "p4"]),
            Self::H265Amf => Some(&["-c:v", "hevc_amf", "-quality", "balanced", "-pix_fmt", "yuv420p"]),
            Self::H265Qsv => Some(&["-c:v", "hevc_qsv"]),
            Self::Vp9Cpu => Some(&["-c:v", "libvpx-vp9", "-b:v", "2M"]),
            Self::Mp3Audio | Self::AacAudio | Self::OpusAudio => None,
        }
    }

    /// ffmpeg encoder name (the value after `-c:v`)
    pub fn encoder(&self) -> Option<&'static str> {
        self.encoder_args().and_then(|args| args.get(1).copied())
    }

    /// Target container for audio extraction
    pub fn audio_format(&self) -> Option<&'static str> {
        match self {
            Self::Mp3Audio => Some("mp3"),
            Self::AacAudio => Some("aac"),
            Self::OpusAudio => Some("opus"),
            _ => None,
        }
    }

    pub fn is_audio_only(&self) -> bool {
        self.audio_format().is_some()
    }

    /// NVENC, AMF and QSV need a GPU and a matching driver
    pub fn is_hardware(&self) -> bool {
        matches!(
            self,
            Self::H264Nvenc
                | Self::H264Amf
                | Self::H264Qsv
                | Self::H265Nvenc
                | Self::H265Amf
                | Self::H265Qsv
        )
    }
}

impl fmt::Display for CodecChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Resolution ceilings offered to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum ResolutionChoice {
    P144,
    P240,
    P360,
    P480,
    P720,
    #[default]
    P1080,
    P1440,
    P2160,
    P4320,
}

impl ResolutionChoice {
    pub const ALL: [ResolutionChoice; 9] = [
        Self::P144,
        Self::P240,
        Self::P360,
        Self::P480,
        Self::P720,
        Self::P1080,
        Self::P1440,
        Self::P2160,
        Self::P4320,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::P144 => "144p",
            Self::P240 => "240p",
            Self::P360 => "360p",
            Self::P480 => "480p",
            Self::P720 => "720p",
            Self::P1080 => "1080p",
            Self::P1440 => "1440p (2K)",
            Self::P2160 => "2160p (4K)",
            Self::P4320 => "4320p (8K)",
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Self::P144 => 144,
            Self::P240 => 240,
            Self::P360 => 360,
            Self::P480 => 480,
            Self::P720 => 720,
            Self::P1080 => 1080,
            Self::P1440 => 1440,
            Self::P2160 => 2160,
            Self::P4320 => 4320,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL.iter().copied().find(|r| r.label() == label)
    }
}

impl fmt::Display for ResolutionChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Map a resolution label to its pixel-height ceiling
pub fn resolution_to_height(label: &str) -> u32 {
    ResolutionChoice::from_label(label)
        .map(|r| r.height())
        .unwrap_or(DEFAULT_HEIGHT)
}

/// One user submission. Labels are kept as typed so unknown values can
/// fall through to the permissive defaults of the format policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub urls: Vec<String>,
    pub codec: String,
    pub resolution: String,
}

impl DownloadRequest {
    pub fn new(urls: Vec<String>, codec: impl Into<String>, resolution: impl Into<String>) -> Self {
        Self {
            urls,
            codec: codec.into(),
            resolution: resolution.into(),
        }
    }

    /// Split a multi-line text box into URLs, dropping blank lines
    pub fn from_text(text: &str, codec: impl Into<String>, resolution: impl Into<String>) -> Self {
        let urls = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        Self::new(urls, codec, resolution)
    }

    pub fn codec_choice(&self) -> Option<CodecChoice> {
        CodecChoice::from_label(&self.codec)
    }
}

/// Audio extraction postprocessor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractAudioProfile {
    /// Target container: mp3, aac or opus
    pub codec: String,
    /// Quality tier passed to the extractor (kbps)
    pub quality: String,
}

/// Everything the engine needs to download one URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub stream_selector: String,
    pub output_template: String,
    pub merge_container: String,
    pub postprocessors: Vec<ExtractAudioProfile>,
    /// ffmpeg arguments for the video re-encode; empty lets the engine pick
    pub postprocessor_args: Vec<String>,
    pub transcoder_path: Option<PathBuf>,
    /// `None` for audio-only selections
    pub height_ceiling: Option<u32>,
}

/// Coarse lifecycle stage shown next to the progress bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Preparing,
    Downloading,
    PostProcessing,
    Done,
    Canceled,
    Failed,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "",
            Self::Preparing => "🔍 Preparing...",
            Self::Downloading => "⬇️ Downloading...",
            Self::PostProcessing => "🛠️ Processing...",
            Self::Done => "✅ Done!",
            Self::Canceled => "⏹️ Download canceled!",
            Self::Failed => "❌ Error",
        }
    }
}

/// Runtime status of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason")]
pub enum SessionStatus {
    Idle,
    Preparing,
    Downloading,
    PostProcessing,
    Canceled,
    Done,
    Failed(String),
}

impl SessionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Preparing | Self::Downloading | Self::PostProcessing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled | Self::Done | Self::Failed(_))
    }

    pub fn phase(&self) -> Phase {
        match self {
            Self::Idle => Phase::Idle,
            Self::Preparing => Phase::Preparing,
            Self::Downloading => Phase::Downloading,
            Self::PostProcessing => Phase::PostProcessing,
            Self::Canceled => Phase::Canceled,
            Self::Done => Phase::Done,
            Self::Failed(_) => Phase::Failed,
        }
    }

    fn from_phase(phase: Phase) -> Option<Self> {
        match phase {
            Phase::Preparing => Some(Self::Preparing),
            Phase::Downloading => Some(Self::Downloading),
            Phase::PostProcessing => Some(Self::PostProcessing),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// Events published by a running session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Started { total: usize, codec: String },
    PhaseChanged { phase: Phase },
    ProgressChanged { fraction: f32, percent: Option<f32> },
    SpeedChanged { speed: String },
    Log { level: LogLevel, text: String },
    ItemStarted { index: usize, total: usize, url: String },
    ItemFinished { index: usize, url: String },
    Fallback { from: String, to: String },
    Finished { status: SessionStatus },
}

/// Point-in-time view of the current (or last) session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub progress: f32,
    pub phase_label: String,
    pub speed: Option<String>,
    pub codec: Option<String>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            status: SessionStatus::Idle,
            progress: 0.0,
            phase_label: String::new(),
            speed: None,
            codec: None,
        }
    }
}

impl SessionSnapshot {
    /// Fold one event into the snapshot
    pub fn apply(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Started { codec, .. } => {
                *self = Self {
                    status: SessionStatus::Preparing,
                    progress: 0.0,
                    phase_label: Phase::Preparing.label().to_string(),
                    speed: None,
                    codec: Some(codec.clone()),
                };
            }
            SessionEvent::PhaseChanged { phase } => {
                if let Some(status) = SessionStatus::from_phase(*phase) {
                    self.status = status;
                }
                self.phase_label = phase.label().to_string();
            }
            SessionEvent::ProgressChanged { fraction, .. } => {
                self.progress = fraction.clamp(0.0, 1.0);
            }
            SessionEvent::SpeedChanged { speed } => {
                self.speed = Some(speed.clone());
            }
            SessionEvent::Fallback { to, .. } => {
                self.codec = Some(to.clone());
            }
            SessionEvent::Finished { status } => {
                self.progress = match status {
                    SessionStatus::Done => 1.0,
                    SessionStatus::Canceled => 0.0,
                    _ => self.progress,
                };
                self.phase_label = status.phase().label().to_string();
                self.status = status.clone();
            }
            SessionEvent::Log { .. }
            | SessionEvent::ItemStarted { .. }
            | SessionEvent::ItemFinished { .. } => {}
        }
    }
}

#[derive(Debug, Default)]
struct CancelState {
    flag: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation flag shared between a session and its interpreter
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<CancelState>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.flag.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn reset(&self) {
        self.0.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.flag.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        loop {
            // Registered before the check so a concurrent cancel is not missed
            let notified = self.0.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_labels_map_to_documented_heights() {
        let expected = [
            ("144p", 144),
            ("240p", 240),
            ("360p", 360),
            ("480p", 480),
            ("720p", 720),
            ("1080p", 1080),
            ("1440p (2K)", 1440),
            ("2160p (4K)", 2160),
            ("4320p (8K)", 4320),
        ];
        for (label, height) in expected {
            assert_eq!(resolution_to_height(label), height, "{}", label);
        }
    }

    #[test]
    fn test_unknown_resolution_defaults_to_1080() {
        assert_eq!(resolution_to_height("999p"), 1080);
        assert_eq!(resolution_to_height(""), 1080);
        assert_eq!(resolution_to_height("4K"), 1080);
    }

    #[test]
    fn test_codec_labels_parse_back() {
        for codec in CodecChoice::ALL {
            assert_eq!(CodecChoice::from_label(codec.label()), Some(codec));
        }
        assert_eq!(CodecChoice::from_label("AV1 (CPU)"), None);
    }

    #[test]
    fn test_hardware_and_audio_classification() {
        assert!(CodecChoice::H265Amf.is_hardware());
        assert!(CodecChoice::H264Nvenc.is_hardware());
        assert!(!CodecChoice::H264Cpu.is_hardware());
        assert!(!CodecChoice::Vp9Cpu.is_hardware());
        assert!(CodecChoice::OpusAudio.is_audio_only());
        assert_eq!(CodecChoice::OpusAudio.encoder(), None);
        assert_eq!(CodecChoice::H265Qsv.encoder(), Some("hevc_qsv"));
    }

    #[test]
    fn test_request_from_text_skips_blank_lines() {
        let request = DownloadRequest::from_text(
            "https://youtu.be/abc\n\n   \n  https://youtu.be/def  \n",
            "H.264 (CPU libx264)",
            "720p",
        );
        assert_eq!(request.urls, vec!["https://youtu.be/abc", "https://youtu.be/def"]);
        assert_eq!(request.codec_choice(), Some(CodecChoice::H264Cpu));
    }

    #[test]
    fn test_snapshot_finished_done_fills_bar() {
        let mut snapshot = SessionSnapshot::default();
        snapshot.apply(&SessionEvent::Started { total: 1, codec: "x".into() });
        snapshot.apply(&SessionEvent::ProgressChanged { fraction: 0.5, percent: Some(50.0) });
        assert_eq!(snapshot.status, SessionStatus::Preparing);
        snapshot.apply(&SessionEvent::Finished { status: SessionStatus::Done });
        assert_eq!(snapshot.progress, 1.0);
        assert_eq!(snapshot.phase_label, Phase::Done.label());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let flag = CancelFlag::new();
        let waiter = tokio::spawn({
            let flag = flag.clone();
            async move { flag.cancelled().await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        flag.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(2), waiter)
            .await
            .expect("waiter not woken")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_returns_at_once_when_already_set() {
        let flag = CancelFlag::new();
        flag.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), flag.cancelled())
            .await
            .expect("flag already set");
    }
}

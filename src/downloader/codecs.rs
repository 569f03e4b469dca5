// Codec catalog - which encoders actually work on this machine
//
// Every video candidate is proven by a one-second synthetic encode into a null
// sink. Audio-only choices need no encoder of their own and are always kept.
// The result depends on drivers and hardware, so it is rebuilt per session.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::models::CodecChoice;
use super::traits::CodecProbe;
use super::utils::run_output_with_timeout;

/// Upper bound for a single encoder probe
pub const PROBE_TIMEOUT_SECS: u64 = 15;

/// How a usable choice is produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderProfile {
    /// Re-encode video with these ffmpeg arguments
    Video(Vec<String>),
    /// Extract the audio track, no video encoder involved
    AudioExtraction,
}

impl EncoderProfile {
    fn for_choice(choice: CodecChoice) -> Self {
        match choice.encoder_args() {
            Some(args) => Self::Video(args.iter().map(|a| a.to_string()).collect()),
            None => Self::AudioExtraction,
        }
    }
}

/// Usable codec choices, ordered for display
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodecAvailability {
    entries: BTreeMap<CodecChoice, EncoderProfile>,
}

impl CodecAvailability {
    /// Catalog used when no transcoder can be probed: one software video
    /// codec plus every audio-only option
    pub fn safe_fallback() -> Self {
        let mut catalog = Self::default();
        catalog.insert(CodecChoice::SOFTWARE_DEFAULT);
        for choice in CodecChoice::ALL.iter().filter(|c| c.is_audio_only()) {
            catalog.insert(*choice);
        }
        catalog
    }

    /// Catalog containing exactly the given choices
    pub fn from_choices(choices: impl IntoIterator<Item = CodecChoice>) -> Self {
        let mut catalog = Self::default();
        for choice in choices {
            catalog.insert(choice);
        }
        catalog
    }

    pub fn insert(&mut self, choice: CodecChoice) {
        self.entries.insert(choice, EncoderProfile::for_choice(choice));
    }

    pub fn contains(&self, choice: CodecChoice) -> bool {
        self.entries.contains_key(&choice)
    }

    pub fn profile(&self, choice: CodecChoice) -> Option<&EncoderProfile> {
        self.entries.get(&choice)
    }

    /// Encoder arguments for a usable video choice
    pub fn encoder_args(&self, choice: CodecChoice) -> Option<&[String]> {
        match self.entries.get(&choice) {
            Some(EncoderProfile::Video(args)) => Some(args.as_slice()),
            _ => None,
        }
    }

    /// Usable choices in menu order
    pub fn menu(&self) -> Vec<CodecChoice> {
        self.entries.keys().copied().collect()
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.entries.keys().map(|c| c.label()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// ffmpeg arguments for a one-second synthetic encode with `encoder`
pub fn probe_args(encoder: &str) -> Vec<String> {
    [
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "lavfi",
        "-i",
        "testsrc2",
        "-t",
        "1",
        "-c:v",
        encoder,
        "-f",
        "null",
        "-",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Test if an encoder actually works on this system
pub async fn encoder_is_usable(transcoder: &Path, encoder: &str) -> bool {
    match run_output_with_timeout(transcoder, probe_args(encoder), PROBE_TIMEOUT_SECS).await {
        Ok(output) => {
            if !output.status.success() {
                log::debug!(
                    "[Codecs] {} unusable: {}",
                    encoder,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            output.status.success()
        }
        Err(e) => {
            log::debug!("[Codecs] {} probe failed: {}", encoder, e);
            false
        }
    }
}

/// Detect encoders supported and usable by the transcoder
pub async fn detect_available_codecs(transcoder_path: Option<&Path>) -> CodecAvailability {
    let transcoder = match transcoder_path {
        Some(path) if path.is_file() => path,
        Some(path) => {
            log::warn!("[Codecs] Transcoder {} is not a file, using safe catalog", path.display());
            return CodecAvailability::safe_fallback();
        }
        None => {
            log::warn!("[Codecs] No transcoder configured, using safe catalog");
            return CodecAvailability::safe_fallback();
        }
    };

    let mut available = CodecAvailability::default();
    for choice in CodecChoice::ALL {
        match choice.encoder() {
            None => available.insert(choice),
            Some(encoder) => {
                if encoder_is_usable(transcoder, encoder).await {
                    available.insert(choice);
                }
            }
        }
    }

    log::info!("[Codecs] Usable: {}", available.labels().join(", "));
    available
}

/// Probes the configured transcoder every time a session asks
#[derive(Debug, Clone, Default)]
pub struct TranscoderProbe {
    path: Option<PathBuf>,
}

impl TranscoderProbe {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

#[async_trait]
impl CodecProbe for TranscoderProbe {
    async fn detect(&self) -> CodecAvailability {
        detect_available_codecs(self.path.as_deref()).await
    }
}

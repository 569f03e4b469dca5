// FormatSelector - maps a (codec, resolution) pair to engine options
//
// Handles:
// - Height ceiling from the resolution label (unknown -> 1080)
// - Stream selector for merged video or audio-only downloads
// - Encoder arguments from the codec catalog plus a fixed AAC audio tail
// - Audio extraction profile for the audio-only choices

use std::path::{Path, PathBuf};

use super::codecs::CodecAvailability;
use super::models::{
    resolution_to_height, CodecChoice, EngineOptions, ExtractAudioProfile, AUDIO_QUALITY,
};

/// Audio re-encode appended to every video postprocessor argument list
pub const AUDIO_TAIL: [&str; 4] = ["-c:a", "aac", "-b:a", "192k"];

pub const MERGE_CONTAINER: &str = "mp4";
pub const OUTPUT_NAME: &str = "%(title)s.%(ext)s";

pub struct FormatSelector;

impl FormatSelector {
    /// Best video up to `height` merged with best audio, then any single file
    pub fn video_selector(height: u32) -> String {
        format!("bestvideo[height<={}]+bestaudio/best/best", height)
    }

    pub fn audio_selector() -> String {
        "bestaudio/best".to_string()
    }

    /// Encoder args for `codec` if the catalog has it, then the audio tail
    pub fn postprocessor_args(codec: Option<CodecChoice>, available: &CodecAvailability) -> Vec<String> {
        let mut args: Vec<String> = codec
            .and_then(|c| available.encoder_args(c))
            .map(|a| a.to_vec())
            .unwrap_or_default();
        args.extend(AUDIO_TAIL.iter().map(|s| s.to_string()));
        args
    }
}

/// Build engine options for one codec/resolution selection.
///
/// Unknown resolutions fall back to 1080p. A codec the catalog does not list
/// gets no encoder arguments, leaving the choice to the engine; that is not
/// an error.
pub fn build_engine_options(
    codec_label: &str,
    resolution_label: &str,
    available: &CodecAvailability,
) -> EngineOptions {
    let codec = CodecChoice::from_label(codec_label);

    if let Some(format) = codec.and_then(|c| c.audio_format()) {
        return EngineOptions {
            stream_selector: FormatSelector::audio_selector(),
            output_template: OUTPUT_NAME.to_string(),
            merge_container: MERGE_CONTAINER.to_string(),
            postprocessors: vec![ExtractAudioProfile {
                codec: format.to_string(),
                quality: AUDIO_QUALITY.to_string(),
            }],
            postprocessor_args: Vec::new(),
            transcoder_path: None,
            height_ceiling: None,
        };
    }

    if codec.is_none() {
        log::warn!("[Format] Unknown codec {:?}, letting the engine choose", codec_label);
    } else if codec.map_or(false, |c| !available.contains(c)) {
        log::warn!("[Format] {} not available on this system, using engine default", codec_label);
    }

    let height = resolution_to_height(resolution_label);
    EngineOptions {
        stream_selector: FormatSelector::video_selector(height),
        output_template: OUTPUT_NAME.to_string(),
        merge_container: MERGE_CONTAINER.to_string(),
        postprocessors: Vec::new(),
        postprocessor_args: FormatSelector::postprocessor_args(codec, available),
        transcoder_path: None,
        height_ceiling: Some(height),
    }
}

impl EngineOptions {
    /// Place output files under `dir`
    pub fn with_output_dir(mut self, dir: &Path) -> Self {
        self.output_template = dir.join(OUTPUT_NAME).to_string_lossy().into_owned();
        self
    }

    pub fn with_transcoder(mut self, path: Option<PathBuf>) -> Self {
        self.transcoder_path = path;
        self
    }

    pub fn is_audio_only(&self) -> bool {
        !self.postprocessors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_720p_libx264() {
        let available = CodecAvailability::from_choices([CodecChoice::H264Cpu]);
        let options = build_engine_options("H.264 (CPU libx264)", "720p", &available);

        assert_eq!(options.stream_selector, "bestvideo[height<=720]+bestaudio/best/best");
        assert_eq!(options.merge_container, "mp4");
        assert_eq!(options.height_ceiling, Some(720));
        assert!(options.postprocessors.is_empty());
        assert_eq!(
            options.postprocessor_args,
            strings(&["-c:v", "libx264", "-preset", "medium", "-c:a", "aac", "-b:a", "192k"])
        );
    }

    #[test]
    fn test_mp3_audio_only() {
        let available = CodecAvailability::safe_fallback();
        let options = build_engine_options("MP3 (Audio Only)", "1080p", &available);

        assert_eq!(options.stream_selector, "bestaudio/best");
        assert_eq!(
            options.postprocessors,
            vec![ExtractAudioProfile { codec: "mp3".into(), quality: "192".into() }]
        );
        assert_eq!(options.height_ceiling, None);
        assert!(options.postprocessor_args.is_empty());
        assert!(options.is_audio_only());
    }

    #[test]
    fn test_missing_codec_keeps_audio_tail() {
        let available = CodecAvailability::safe_fallback();
        let options = build_engine_options("H.265 (NVIDIA NVENC)", "4320p (8K)", &available);
        assert_eq!(options.postprocessor_args, strings(&AUDIO_TAIL));
        assert_eq!(options.height_ceiling, Some(4320));

        let options = build_engine_options("AV1 (magic)", "weird", &available);
        assert_eq!(options.postprocessor_args, strings(&AUDIO_TAIL));
        assert_eq!(options.height_ceiling, Some(1080));
    }

    #[test]
    fn test_builders() {
        let available = CodecAvailability::safe_fallback();
        let dir = std::env::temp_dir().join("tubefetch-out");
        let options = build_engine_options("H.264 (CPU libx264)", "480p", &available)
            .with_output_dir(&dir)
            .with_transcoder(Some(PathBuf::from("/usr/bin/ffmpeg")));

        assert_eq!(options.output_template, dir.join(OUTPUT_NAME).to_string_lossy());
        assert_eq!(options.transcoder_path, Some(PathBuf::from("/usr/bin/ffmpeg")));
    }
}

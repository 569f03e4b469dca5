// Progress interpreter - turns free-form engine log lines into session events
//
// The engine's wording is not a stable contract, so this is a best-effort
// keyword/regex shim: lines that match nothing are logged and otherwise inert.
//
// Progress bar layout:
// - 0.00..0.10  preparation (snapped to 0.05 on "Downloading webpage"/"Extracting")
// - 0.10..0.90  raw download percent, linearly remapped
// - 0.95        post-processing (merge / convert / extract audio)

use regex::Regex;
use time::{OffsetDateTime, UtcOffset};

use super::errors::DownloadError;
use super::models::{CancelFlag, LogLevel, Phase, SessionEvent};
use super::traits::{LineSink, ProgressEmitter};

const PREPARING_PROGRESS: f32 = 0.05;
const POST_PROCESSING_PROGRESS: f32 = 0.95;

const PREPARE_KEYWORDS: [&str; 2] = ["Downloading webpage", "Extracting"];
const POST_KEYWORDS: [&str; 4] = ["Merging", "Post-process", "Converting", "Extracting audio"];

lazy_static::lazy_static! {
    static ref ANSI_RE: Regex = Regex::new(r"\x1B\[[0-9;]*[a-zA-Z]").unwrap();
    static ref PERCENT_RE: Regex = Regex::new(r"(\d{1,3}(?:\.\d+)?)%").unwrap();
    static ref SPEED_RE: Regex = Regex::new(r"at\s+([0-9.]+[KMG]iB/s)").unwrap();
    // The OS offset can only be read safely while the process is single-threaded
    static ref LOCAL_OFFSET: UtcOffset =
        UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
}

/// Remove terminal colour/cursor escape sequences
pub fn strip_ansi(line: &str) -> String {
    ANSI_RE.replace_all(line, "").into_owned()
}

/// Map a raw download percent (0..=100) onto the 0.10..=0.90 band of the bar
pub fn map_download_percent(percent: f32) -> f32 {
    0.10 + 0.80 * percent.clamp(0.0, 100.0) / 100.0
}

/// Extract the first percentage in a line
pub fn parse_percent(line: &str) -> Option<f32> {
    let caps = PERCENT_RE.captures(line)?;
    caps.get(1)?.as_str().parse::<f32>().ok()
}

/// Extract a transfer speed such as `1.23MiB/s`
pub fn parse_speed(line: &str) -> Option<String> {
    SPEED_RE
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Decide which phase (if any) a cleaned line moves the session into.
/// Later stages win when a line carries several markers.
fn classify_phase(line: &str) -> Option<(Phase, Option<f32>)> {
    if POST_KEYWORDS.iter().any(|k| line.contains(k)) {
        return Some((Phase::PostProcessing, None));
    }
    if let Some(percent) = parse_percent(line) {
        return Some((Phase::Downloading, Some(percent)));
    }
    if PREPARE_KEYWORDS.iter().any(|k| line.contains(k)) {
        return Some((Phase::Preparing, None));
    }
    None
}

fn classify_level(line: &str) -> LogLevel {
    let trimmed = line.trim_start();
    if trimmed.starts_with("ERROR") {
        LogLevel::Error
    } else if trimmed.starts_with("WARNING") {
        LogLevel::Warning
    } else {
        LogLevel::Info
    }
}

/// Read the local UTC offset used by log stamps. Call before any threads start;
/// later first calls fall back to UTC on platforms that refuse the lookup.
pub fn capture_local_offset() -> UtcOffset {
    *LOCAL_OFFSET
}

fn clock_stamp(at: OffsetDateTime) -> String {
    format!("[{:02}:{:02}:{:02}] ", at.hour(), at.minute(), at.second())
}

pub(crate) fn timestamp() -> String {
    clock_stamp(OffsetDateTime::now_utc().to_offset(capture_local_offset()))
}

/// Stateful consumer of engine output for one URL
pub struct ProgressInterpreter {
    cancel: CancelFlag,
    emitter: ProgressEmitter,
    phase: Phase,
    progress: f32,
    speed: Option<String>,
}

impl ProgressInterpreter {
    pub fn new(cancel: CancelFlag, emitter: ProgressEmitter) -> Self {
        Self {
            cancel,
            emitter,
            phase: Phase::Idle,
            progress: 0.0,
            speed: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn speed(&self) -> Option<&str> {
        self.speed.as_deref()
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            self.phase = phase;
            self.emitter.emit(SessionEvent::PhaseChanged { phase });
        }
    }

    fn set_progress(&mut self, fraction: f32, percent: Option<f32>) {
        self.progress = fraction;
        self.emitter
            .emit(SessionEvent::ProgressChanged { fraction, percent });
    }
}

impl LineSink for ProgressInterpreter {
    fn consume(&mut self, line: &str) -> Result<(), DownloadError> {
        if self.cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        if line.trim().is_empty() {
            return Ok(());
        }

        let clean = strip_ansi(line);
        self.emitter.emit(SessionEvent::Log {
            level: classify_level(&clean),
            text: format!("{}{}", timestamp(), clean.trim_end()),
        });

        match classify_phase(&clean) {
            Some((Phase::Downloading, Some(percent))) => {
                let percent = percent.clamp(0.0, 100.0);
                self.set_phase(Phase::Downloading);
                self.set_progress(map_download_percent(percent), Some(percent));
            }
            Some((Phase::PostProcessing, _)) => {
                self.set_phase(Phase::PostProcessing);
                self.set_progress(POST_PROCESSING_PROGRESS, None);
            }
            Some((Phase::Preparing, _)) => {
                self.set_phase(Phase::Preparing);
                self.set_progress(PREPARING_PROGRESS, None);
            }
            _ => {}
        }

        if let Some(speed) = parse_speed(&clean) {
            self.speed = Some(speed.clone());
            self.emitter.emit(SessionEvent::SpeedChanged { speed });
        }

        Ok(())
    }

    fn should_stop(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::SessionSnapshot;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    #[test]
    fn test_clock_stamp_uses_given_offset() {
        let at = OffsetDateTime::from_unix_timestamp(3661).unwrap();
        assert_eq!(clock_stamp(at), "[01:01:01] ");
        assert_eq!(
            clock_stamp(at.to_offset(UtcOffset::from_hms(2, 0, 0).unwrap())),
            "[03:01:01] "
        );
        assert_eq!(
            clock_stamp(at.to_offset(UtcOffset::from_hms(-5, -30, 0).unwrap())),
            "[19:31:01] "
        );
    }

    #[test]
    fn test_timestamp_shape() {
        let re = Regex::new(r"^\[\d{2}:\d{2}:\d{2}\] $").unwrap();
        assert!(re.is_match(&timestamp()));
    }

    fn interpreter() -> (ProgressInterpreter, CancelFlag, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let emitter = ProgressEmitter::new(tx, Arc::new(Mutex::new(SessionSnapshot::default())));
        let cancel = CancelFlag::new();
        (ProgressInterpreter::new(cancel.clone(), emitter), cancel, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_percent_mapping_is_linear_and_monotonic() {
        let mut previous = -1.0;
        for p in 0..=100 {
            let mapped = map_download_percent(p as f32);
            let expected = 0.10 + 0.80 * p as f32 / 100.0;
            assert!((mapped - expected).abs() < 1e-6, "p={}", p);
            assert!(mapped > previous);
            previous = mapped;
        }
        assert!((map_download_percent(0.0) - 0.10).abs() < 1e-6);
        assert!((map_download_percent(100.0) - 0.90).abs() < 1e-6);
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[0;94m[download]\x1b[0m  50.0%"), "[download]  50.0%");
    }

    #[test]
    fn test_download_line_sets_progress_and_speed() {
        let (mut interp, _, mut rx) = interpreter();
        interp
            .consume("[download]  42.5% of ~ 343.72MiB at  420.30KiB/s ETA 12:32")
            .unwrap();

        assert_eq!(interp.phase(), Phase::Downloading);
        assert!((interp.progress() - map_download_percent(42.5)).abs() < 1e-6);
        assert_eq!(interp.speed(), Some("420.30KiB/s"));

        let events = drain(&mut rx);
        assert!(matches!(events[0], SessionEvent::Log { level: LogLevel::Info, .. }));
        assert!(events.contains(&SessionEvent::PhaseChanged { phase: Phase::Downloading }));
        assert!(events.contains(&SessionEvent::SpeedChanged { speed: "420.30KiB/s".into() }));
    }

    #[test]
    fn test_prepare_and_post_processing_snaps() {
        let (mut interp, _, _rx) = interpreter();
        interp.consume("[youtube] abc123: Downloading webpage").unwrap();
        assert_eq!(interp.phase(), Phase::Preparing);
        assert!((interp.progress() - 0.05).abs() < 1e-6);

        interp
            .consume("[Merger] Merging formats into \"video.mp4\"")
            .unwrap();
        assert_eq!(interp.phase(), Phase::PostProcessing);
        assert!((interp.progress() - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_extracting_audio_is_post_processing() {
        let (mut interp, _, _rx) = interpreter();
        interp
            .consume("[ExtractAudio] Extracting audio; Destination: song.mp3")
            .unwrap();
        assert_eq!(interp.phase(), Phase::PostProcessing);
    }

    #[test]
    fn test_unmatched_lines_are_inert() {
        let (mut interp, _, mut rx) = interpreter();
        interp.consume("[info] Writing video metadata").unwrap();
        interp.consume("   ").unwrap();
        assert_eq!(interp.phase(), Phase::Idle);
        assert_eq!(interp.progress(), 0.0);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], SessionEvent::Log { .. }));
    }

    #[test]
    fn test_error_lines_are_tagged() {
        let (mut interp, _, mut rx) = interpreter();
        interp.consume("ERROR: [youtube] abc: Video unavailable").unwrap();
        let events = drain(&mut rx);
        assert!(matches!(events[0], SessionEvent::Log { level: LogLevel::Error, .. }));
    }

    #[test]
    fn test_cancel_fails_next_consume_without_logging() {
        let (mut interp, cancel, mut rx) = interpreter();
        cancel.cancel();
        assert!(interp.should_stop());
        assert_eq!(
            interp.consume("[download]  10.0% of 1.00MiB"),
            Err(DownloadError::Cancelled)
        );
        assert!(drain(&mut rx).is_empty());
    }
}

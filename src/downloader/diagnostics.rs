// Failure diagnostics - explains why a download failed
//
// Looks at the engine's error text and names the most likely cause so the
// Failed status tells the user more than the last stderr line.

use serde::{Deserialize, Serialize};

use super::errors::DownloadError;

/// Likely causes of an engine failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureCause {
    /// The transcoder could not use the selected encoder
    EncoderUnavailable,

    /// HTTP 403 Forbidden
    Http403Forbidden,

    /// HTTP 429 or similar
    RateLimited,

    GeoBlocked,

    PrivateVideo,

    /// Removed, deleted or otherwise gone
    VideoUnavailable,

    AgeRestricted,

    NetworkTimeout,

    /// The engine or the transcoder binary is missing
    MissingTool,

    Unknown,
}

impl FailureCause {
    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::EncoderUnavailable => "Selected encoder is not usable on this system",
            Self::Http403Forbidden => "Access denied (HTTP 403)",
            Self::RateLimited => "Rate limited by YouTube",
            Self::GeoBlocked => "Not available in your country",
            Self::PrivateVideo => "Private video",
            Self::VideoUnavailable => "Video unavailable",
            Self::AgeRestricted => "Age-restricted content",
            Self::NetworkTimeout => "Network timeout",
            Self::MissingTool => "yt-dlp or ffmpeg is not installed",
            Self::Unknown => "Unknown error",
        }
    }

    /// Whether trying again later could succeed without changing anything
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited | Self::NetworkTimeout | Self::Http403Forbidden)
    }
}

/// Analyze error message and return the most specific cause
pub fn diagnose_error(error: &str) -> Option<FailureCause> {
    let lower = error.to_lowercase();

    // Encoder problems first, they trigger the codec fallback
    if lower.contains("unknown encoder")
        || lower.contains("error initializing output stream")
        || lower.contains("conversion failed")
        || lower.contains("no nvenc capable devices")
        || lower.contains("failed to initialise amf")
        || lower.contains("error creating a mfx session")
    {
        return Some(FailureCause::EncoderUnavailable);
    }

    if lower.contains("private video") || lower.contains("video is private") {
        return Some(FailureCause::PrivateVideo);
    }

    if lower.contains("video unavailable")
        || lower.contains("video has been removed")
        || lower.contains("this video is no longer available")
    {
        return Some(FailureCause::VideoUnavailable);
    }

    if lower.contains("age-restricted") || lower.contains("sign in to confirm your age") {
        return Some(FailureCause::AgeRestricted);
    }

    if lower.contains("not available in your country") || lower.contains("blocked in your country") {
        return Some(FailureCause::GeoBlocked);
    }

    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        return Some(FailureCause::RateLimited);
    }

    if lower.contains("403") || lower.contains("forbidden") {
        return Some(FailureCause::Http403Forbidden);
    }

    if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection refused")
        || lower.contains("network unreachable")
    {
        return Some(FailureCause::NetworkTimeout);
    }

    if lower.contains("tool not found")
        || lower.contains("command not found")
        || lower.contains("ffmpeg not found")
    {
        return Some(FailureCause::MissingTool);
    }

    if !error.trim().is_empty() {
        return Some(FailureCause::Unknown);
    }

    None
}

/// Cause for a typed engine error, preferring the variant over text matching
pub fn cause_of(err: &DownloadError) -> Option<FailureCause> {
    match err {
        DownloadError::Cancelled => None,
        DownloadError::ToolNotFound(_) => Some(FailureCause::MissingTool),
        DownloadError::EncoderFailed(_) => Some(FailureCause::EncoderUnavailable),
        DownloadError::NetworkTimeout(_) | DownloadError::TimedOut(_) => {
            Some(FailureCause::NetworkTimeout)
        }
        other => diagnose_error(&other.to_string()),
    }
}

/// Failure text shown to the user: the error plus a diagnosed cause
pub fn describe_failure(err: &DownloadError) -> String {
    let message = err.to_string();
    match cause_of(err) {
        Some(FailureCause::Unknown) | None => message,
        Some(cause) => format!("{} ({})", message, cause.description()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_403_detection() {
        let error = "ERROR: unable to download video data: HTTP Error 403: Forbidden";
        assert_eq!(diagnose_error(error), Some(FailureCause::Http403Forbidden));
    }

    #[test]
    fn test_encoder_detection() {
        let error = "[h264_nvenc @ 0x5581] No NVENC capable devices found";
        assert_eq!(diagnose_error(error), Some(FailureCause::EncoderUnavailable));
    }

    #[test]
    fn test_geo_and_private_detection() {
        assert_eq!(
            diagnose_error("The uploader has not made this video available in your country"),
            Some(FailureCause::GeoBlocked)
        );
        assert_eq!(
            diagnose_error("ERROR: [youtube] abc: Private video. Sign in if you've been granted access"),
            Some(FailureCause::PrivateVideo)
        );
    }

    #[test]
    fn test_rate_limit_detection() {
        assert_eq!(
            diagnose_error("HTTP Error 429: Too Many Requests"),
            Some(FailureCause::RateLimited)
        );
    }

    #[test]
    fn test_empty_is_none() {
        assert_eq!(diagnose_error("  "), None);
        assert_eq!(diagnose_error("something odd"), Some(FailureCause::Unknown));
    }

    #[test]
    fn test_describe_failure() {
        let err = DownloadError::EncoderFailed("Conversion failed!".into());
        assert_eq!(
            describe_failure(&err),
            "Encoder failed: Conversion failed! (Selected encoder is not usable on this system)"
        );

        let err = DownloadError::Unknown("ERROR: Video unavailable".into());
        assert_eq!(describe_failure(&err), "ERROR: Video unavailable (Video unavailable)");

        let err = DownloadError::Unknown("odd".into());
        assert_eq!(describe_failure(&err), "odd");
    }
}

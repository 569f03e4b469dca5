// Accepted YouTube URL shapes

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Kinds of YouTube links a session accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UrlShape {
    /// youtube.com/watch?v=ID
    Watch,
    /// youtu.be/ID
    ShortLink,
    /// youtube.com/playlist?list=ID
    Playlist,
    /// youtube.com/channel/ID
    Channel,
    /// youtube.com/@handle
    Handle,
    /// youtube.com/user/NAME or youtube.com/c/NAME
    LegacyUser,
    /// youtube.com/shorts/ID
    Shorts,
    /// youtube.com/live/ID
    Live,
}

lazy_static::lazy_static! {
    static ref URL_SHAPES: Vec<(UrlShape, Regex)> = {
        const HOST: &str = r"(?i)^(?:https?://)?(?:(?:www|m|music)\.)?";
        const TAIL: &str = r"(?:[/?&#].*)?$";
        let shapes = [
            (UrlShape::Watch, r"youtube\.com/watch\?(?:[^#]*&)?v=[\w-]+"),
            (UrlShape::ShortLink, r"youtu\.be/[\w-]+"),
            (UrlShape::Playlist, r"youtube\.com/playlist\?(?:[^#]*&)?list=[\w-]+"),
            (UrlShape::Channel, r"youtube\.com/channel/[\w-]+"),
            (UrlShape::Handle, r"youtube\.com/@[\w.-]+"),
            (UrlShape::LegacyUser, r"youtube\.com/(?:user|c)/[\w.-]+"),
            (UrlShape::Shorts, r"youtube\.com/shorts/[\w-]+"),
            (UrlShape::Live, r"youtube\.com/live/[\w-]+"),
        ];
        shapes
            .into_iter()
            .map(|(shape, body)| {
                let pattern = format!("{}{}{}", HOST, body, TAIL);
                (shape, Regex::new(&pattern).unwrap())
            })
            .collect()
    };
}

/// Match a raw URL against the accepted shapes
pub fn classify_url(url: &str) -> Option<UrlShape> {
    let url = url.trim();
    if url.is_empty() || url.contains(char::is_whitespace) {
        return None;
    }
    URL_SHAPES
        .iter()
        .find(|(_, re)| re.is_match(url))
        .map(|(shape, _)| *shape)
}

/// Keep only URLs with an accepted shape, trimmed, in input order
pub fn filter_valid_urls(urls: &[String]) -> Vec<String> {
    urls.iter()
        .map(|u| u.trim())
        .filter(|u| classify_url(u).is_some())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_shapes() {
        let cases = [
            ("https://www.youtube.com/watch?v=dQw4w9WgXcQ", UrlShape::Watch),
            ("youtube.com/watch?feature=share&v=dQw4w9WgXcQ&t=3", UrlShape::Watch),
            ("https://m.youtube.com/watch?v=abc-_12", UrlShape::Watch),
            ("https://youtu.be/abc123", UrlShape::ShortLink),
            ("http://youtu.be/abc123?t=10", UrlShape::ShortLink),
            ("https://www.youtube.com/playlist?list=PL1234abcd", UrlShape::Playlist),
            ("https://www.youtube.com/channel/UC_x5XG1OV2P6uZZ5FSM9Ttw", UrlShape::Channel),
            ("https://www.youtube.com/@some.handle", UrlShape::Handle),
            ("https://www.youtube.com/@handle/videos", UrlShape::Handle),
            ("https://www.youtube.com/user/OldName", UrlShape::LegacyUser),
            ("https://www.youtube.com/c/CustomName", UrlShape::LegacyUser),
            ("https://youtube.com/shorts/abcDEF12345", UrlShape::Shorts),
            ("https://www.youtube.com/live/abcDEF12345", UrlShape::Live),
            ("HTTPS://WWW.YOUTUBE.COM/watch?v=abc", UrlShape::Watch),
        ];
        for (url, shape) in cases {
            assert_eq!(classify_url(url), Some(shape), "{}", url);
        }
    }

    #[test]
    fn test_rejected_urls() {
        let rejected = [
            "not a url",
            "",
            "https://vimeo.com/12345",
            "https://www.youtube.com/",
            "https://www.youtube.com/watch",
            "https://www.youtube.com/watch?list=PL1",
            "https://notyoutube.com/watch?v=abc",
            "https://youtu.be/",
            "ftp://youtu.be/abc",
        ];
        for url in rejected {
            assert_eq!(classify_url(url), None, "{}", url);
        }
    }

    #[test]
    fn test_filter_keeps_order_and_drops_invalid() {
        let urls = vec![
            "https://youtu.be/abc123".to_string(),
            "not a url".to_string(),
            "  https://www.youtube.com/@handle  ".to_string(),
        ];
        assert_eq!(
            filter_valid_urls(&urls),
            vec!["https://youtu.be/abc123", "https://www.youtube.com/@handle"]
        );
    }
}

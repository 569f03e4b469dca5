// User preferences - a flat JSON document next to the app config
//
// Loading never fails: a missing file gives defaults, an unreadable one is
// copied to `<file>.backup` first. Saving keeps the previous file as
// `<file>.bak`. Keys this build does not know about are carried through.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::downloader::models::{CodecChoice, ResolutionChoice};

pub const DEFAULT_LANGUAGE: &str = "en";

const KEY_CODEC: &str = "codec";
const KEY_RESOLUTION: &str = "resolution";
const KEY_LANGUAGE: &str = "language";
const KEY_GEOMETRY: &str = "geometry";

lazy_static::lazy_static! {
    static ref GEOMETRY_RE: Regex =
        Regex::new(r"^(\d{1,5})x(\d{1,5})(?:([+-]-?\d{1,6})([+-]-?\d{1,6}))?$").unwrap();
}

/// Window size and optional position, `WxH` or `WxH+X+Y`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub offset: Option<(i32, i32)>,
}

impl Geometry {
    pub const DEFAULT: Geometry = Geometry {
        width: 600,
        height: 750,
        offset: None,
    };

    const WIDTH_RANGE: std::ops::RangeInclusive<u32> = 200..=7680;
    const HEIGHT_RANGE: std::ops::RangeInclusive<u32> = 200..=4320;
    const MAX_OFFSET: i32 = 20_000;

    /// Parse and bounds-check; anything outside sane limits is rejected
    pub fn parse(text: &str) -> Option<Self> {
        let caps = GEOMETRY_RE.captures(text.trim())?;
        let width: u32 = caps.get(1)?.as_str().parse().ok()?;
        let height: u32 = caps.get(2)?.as_str().parse().ok()?;
        if !Self::WIDTH_RANGE.contains(&width) || !Self::HEIGHT_RANGE.contains(&height) {
            return None;
        }

        let offset = match (caps.get(3), caps.get(4)) {
            (Some(x), Some(y)) => {
                let x = parse_offset(x.as_str())?;
                let y = parse_offset(y.as_str())?;
                if x.abs() > Self::MAX_OFFSET || y.abs() > Self::MAX_OFFSET {
                    return None;
                }
                Some((x, y))
            }
            _ => None,
        };

        Some(Self { width, height, offset })
    }
}

fn parse_offset(text: &str) -> Option<i32> {
    text.strip_prefix('+').unwrap_or(text).parse().ok()
}

impl Default for Geometry {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)?;
        if let Some((x, y)) = self.offset {
            write!(f, "{:+}{:+}", x, y)?;
        }
        Ok(())
    }
}

/// The preferences document. Accessors fall back to defaults for missing
/// or mistyped values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Preferences {
    doc: Map<String, Value>,
}

impl Preferences {
    fn text(&self, key: &str) -> Option<&str> {
        self.doc.get(key).and_then(Value::as_str)
    }

    fn set_text(&mut self, key: &str, value: impl Into<String>) {
        self.doc.insert(key.to_string(), Value::String(value.into()));
    }

    /// Saved codec label, or the software default when missing/unknown
    pub fn codec(&self) -> CodecChoice {
        self.text(KEY_CODEC)
            .and_then(CodecChoice::from_label)
            .unwrap_or(CodecChoice::SOFTWARE_DEFAULT)
    }

    pub fn resolution(&self) -> ResolutionChoice {
        self.text(KEY_RESOLUTION)
            .and_then(ResolutionChoice::from_label)
            .unwrap_or_default()
    }

    pub fn language(&self) -> &str {
        self.text(KEY_LANGUAGE)
            .filter(|l| !l.trim().is_empty())
            .unwrap_or(DEFAULT_LANGUAGE)
    }

    pub fn geometry(&self) -> Geometry {
        self.text(KEY_GEOMETRY)
            .and_then(Geometry::parse)
            .unwrap_or_default()
    }

    pub fn set_language(&mut self, language: &str) {
        self.set_text(KEY_LANGUAGE, language);
    }

    pub fn set_geometry(&mut self, geometry: Geometry) {
        self.set_text(KEY_GEOMETRY, geometry.to_string());
    }

    /// Record the selections of a submitted request
    pub fn remember_submission(&mut self, codec: &str, resolution: &str) {
        self.set_text(KEY_CODEC, codec);
        self.set_text(KEY_RESOLUTION, resolution);
    }

    /// Raw value of any key, including ones this build does not use
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.doc.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.doc.is_empty()
    }
}

/// `<path><suffix>`, e.g. `prefs.json.bak`
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Reads and writes the preferences file
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        with_suffix(&self.path, ".backup")
    }

    pub fn previous_path(&self) -> PathBuf {
        with_suffix(&self.path, ".bak")
    }

    /// Load preferences; never fails
    pub fn load(&self) -> Preferences {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Preferences::default(),
            Err(e) => {
                log::warn!("[Prefs] Cannot read {}: {}", self.path.display(), e);
                self.keep_corrupt_copy();
                return Preferences::default();
            }
        };

        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(doc)) => Preferences { doc },
            Ok(_) => {
                log::warn!("[Prefs] {} is not a JSON object, ignoring", self.path.display());
                Preferences::default()
            }
            Err(e) => {
                log::warn!("[Prefs] Corrupt {}: {}", self.path.display(), e);
                self.keep_corrupt_copy();
                Preferences::default()
            }
        }
    }

    fn keep_corrupt_copy(&self) {
        let backup = self.backup_path();
        match fs::copy(&self.path, &backup) {
            Ok(_) => log::warn!("[Prefs] Corrupted preferences backed up to {}", backup.display()),
            Err(e) => log::warn!("[Prefs] Could not back up corrupted preferences: {}", e),
        }
    }

    /// Save preferences; failures are logged, never raised
    pub fn save(&self, prefs: &Preferences) {
        match self.try_save(prefs) {
            Ok(()) => log::debug!("[Prefs] Saved {}", self.path.display()),
            Err(e) => log::warn!("[Prefs] Save failed for {}: {}", self.path.display(), e),
        }
    }

    fn try_save(&self, prefs: &Preferences) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        if self.path.is_file() {
            fs::copy(&self.path, self.previous_path())?;
        }
        let json = serde_json::to_string_pretty(prefs)?;
        fs::write(&self.path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn temp_store() -> (PreferenceStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "tubefetch-prefs-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        fs::create_dir_all(&dir).unwrap();
        (PreferenceStore::new(dir.join("prefs.json")), dir)
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let (store, dir) = temp_store();
        let prefs = store.load();
        assert!(prefs.is_empty());
        assert_eq!(prefs.codec(), CodecChoice::H264Cpu);
        assert_eq!(prefs.resolution(), ResolutionChoice::P1080);
        assert_eq!(prefs.language(), "en");
        assert_eq!(prefs.geometry(), Geometry::DEFAULT);
        assert!(!store.backup_path().exists());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_corrupt_file_is_backed_up() {
        let (store, dir) = temp_store();
        fs::write(store.path(), "{ not json").unwrap();

        let prefs = store.load();
        assert!(prefs.is_empty());
        assert_eq!(fs::read_to_string(store.backup_path()).unwrap(), "{ not json");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_save_then_load_keeps_unknown_keys() {
        let (store, dir) = temp_store();
        fs::write(store.path(), r#"{"theme": "dark", "codec": "VP9 (CPU libvpx-vp9)"}"#).unwrap();

        let mut prefs = store.load();
        assert_eq!(prefs.codec(), CodecChoice::Vp9Cpu);
        prefs.remember_submission("MP3 (Audio Only)", "720p");
        prefs.set_language("id");
        store.save(&prefs);

        assert!(store.previous_path().is_file());
        let reloaded = store.load();
        assert_eq!(reloaded.codec(), CodecChoice::Mp3Audio);
        assert_eq!(reloaded.resolution(), ResolutionChoice::P720);
        assert_eq!(reloaded.language(), "id");
        assert_eq!(reloaded.get("theme"), Some(&Value::String("dark".into())));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_mistyped_values_fall_back() {
        let (store, dir) = temp_store();
        fs::write(store.path(), r#"{"codec": 5, "resolution": "999p", "geometry": "10x10"}"#).unwrap();
        let prefs = store.load();
        assert_eq!(prefs.codec(), CodecChoice::H264Cpu);
        assert_eq!(prefs.resolution(), ResolutionChoice::P1080);
        assert_eq!(prefs.geometry(), Geometry::DEFAULT);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_geometry_parsing() {
        assert_eq!(
            Geometry::parse("800x600"),
            Some(Geometry { width: 800, height: 600, offset: None })
        );
        assert_eq!(
            Geometry::parse("800x600+100+-20"),
            Some(Geometry { width: 800, height: 600, offset: Some((100, -20)) })
        );
        assert_eq!(
            Geometry::parse("800x600-5-5"),
            Some(Geometry { width: 800, height: 600, offset: Some((-5, -5)) })
        );
        assert_eq!(Geometry::parse("199x600"), None);
        assert_eq!(Geometry::parse("800x4321"), None);
        assert_eq!(Geometry::parse("800x600+20001+0"), None);
        assert_eq!(Geometry::parse("800x600+5"), None);
        assert_eq!(Geometry::parse("big"), None);
    }

    #[test]
    fn test_geometry_display() {
        assert_eq!(Geometry::DEFAULT.to_string(), "600x750");
        let g = Geometry { width: 800, height: 600, offset: Some((10, -20)) };
        assert_eq!(g.to_string(), "800x600+10-20");
        assert_eq!(Geometry::parse(&g.to_string()), Some(g));
    }
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::utils::run_output_with_timeout;

/// Upper bound for a `--version` / `-version` check
const VERSION_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
        }
    }

    /// Binary file name on this platform
    pub fn binary_name(&self) -> String {
        if cfg!(windows) {
            format!("{}.exe", self.as_str())
        } else {
            self.as_str().to_string()
        }
    }

    /// Environment variable that overrides discovery
    pub fn env_var(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "TUBEFETCH_YTDLP",
            ToolType::Ffmpeg => "TUBEFETCH_FFMPEG",
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "--version",
            ToolType::Ffmpeg => "-version", // ffmpeg uses a single dash
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
    pub is_available: bool,
}

/// Finds the external binaries a session depends on
#[derive(Debug, Clone, Default)]
pub struct ToolManager {
    ytdlp_override: Option<PathBuf>,
    ffmpeg_override: Option<PathBuf>,
    bundle_dir: Option<PathBuf>,
}

impl ToolManager {
    pub fn new() -> Self {
        Self {
            bundle_dir: std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf)),
            ..Default::default()
        }
    }

    /// Explicit path that wins over every other source
    pub fn with_override(mut self, tool_type: ToolType, path: Option<PathBuf>) -> Self {
        match tool_type {
            ToolType::YtDlp => self.ytdlp_override = path,
            ToolType::Ffmpeg => self.ffmpeg_override = path,
        }
        self
    }

    /// Directory searched for binaries shipped alongside the executable
    pub fn with_bundle_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.bundle_dir = dir;
        self
    }

    fn override_for(&self, tool_type: ToolType) -> Option<&PathBuf> {
        match tool_type {
            ToolType::YtDlp => self.ytdlp_override.as_ref(),
            ToolType::Ffmpeg => self.ffmpeg_override.as_ref(),
        }
    }

    /// Candidate locations in priority order; only existing files are returned
    pub fn candidates(&self, tool_type: ToolType) -> Vec<PathBuf> {
        let binary = tool_type.binary_name();
        let mut candidates = Vec::new();

        // 1. Explicit override
        if let Some(path) = self.override_for(tool_type) {
            candidates.push(path.clone());
        }

        // 2. Environment
        if let Some(path) = std::env::var_os(tool_type.env_var()) {
            if !path.is_empty() {
                candidates.push(PathBuf::from(path));
            }
        }

        // 3. PATH
        if let Ok(path) = which::which(&binary) {
            candidates.push(path);
        }

        // 4. Shipped next to the executable
        if let Some(dir) = &self.bundle_dir {
            candidates.push(dir.join(&binary));
            candidates.push(dir.join("bin").join(&binary));
        }

        // 5. Common install locations
        for dir in ["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin"] {
            candidates.push(Path::new(dir).join(&binary));
        }
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".local").join("bin").join(&binary));
        }

        let mut seen = Vec::new();
        candidates.retain(|p| {
            if p.is_file() && !seen.contains(p) {
                seen.push(p.clone());
                true
            } else {
                false
            }
        });
        candidates
    }

    /// First candidate that answers its version flag
    pub async fn locate(&self, tool_type: ToolType) -> Option<PathBuf> {
        for path in self.candidates(tool_type) {
            if Self::get_version(&path, tool_type).await.is_some() {
                log::debug!("[Tools] {} -> {}", tool_type.as_str(), path.display());
                return Some(path);
            }
            log::warn!(
                "[Tools] {} at {} did not answer {}",
                tool_type.as_str(),
                path.display(),
                tool_type.version_arg()
            );
        }
        None
    }

    pub async fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let mut info = ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            version: None,
            path: None,
            is_available: false,
        };

        for path in self.candidates(tool_type) {
            if let Some(version) = Self::get_version(&path, tool_type).await {
                info.version = Some(version);
                info.path = Some(path);
                info.is_available = true;
                break;
            }
        }
        info
    }

    pub async fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::YtDlp).await,
            self.get_tool_info(ToolType::Ffmpeg).await,
        ]
    }

    async fn get_version(path: &Path, tool_type: ToolType) -> Option<String> {
        let output = run_output_with_timeout(
            path,
            vec![tool_type.version_arg().to_string()],
            VERSION_TIMEOUT_SECS,
        )
        .await
        .ok()?;

        if !output.status.success() {
            return None;
        }
        parse_version_line(&String::from_utf8_lossy(&output.stdout), tool_type)
    }
}

/// First meaningful line of a version banner.
/// ffmpeg prints `ffmpeg version 6.1.1 Copyright ...`, yt-dlp just the date tag.
pub fn parse_version_line(stdout: &str, tool_type: ToolType) -> Option<String> {
    let first = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    match tool_type {
        ToolType::Ffmpeg => first
            .strip_prefix("ffmpeg version ")
            .and_then(|rest| rest.split_whitespace().next())
            .map(str::to_string)
            .or_else(|| Some(first.to_string())),
        ToolType::YtDlp => Some(first.to_string()),
    }
}

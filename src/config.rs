use std::path::{Path, PathBuf};

use crate::downloader::tools::ToolType;

const APP_DIR: &str = "tubefetch";
const PREFS_FILE: &str = "preferences.json";
const DOWNLOAD_FOLDER: &str = "TubeFetch";

/// Overrides the download directory
pub const DOWNLOAD_DIR_ENV: &str = "TUBEFETCH_DOWNLOAD_DIR";

/// Where things live on this machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub config_dir: PathBuf,
    pub download_dir: PathBuf,
    pub ffmpeg_path: Option<PathBuf>,
    pub ytdlp_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        let download_dir = dirs::download_dir()
            .map(|d| d.join(DOWNLOAD_FOLDER))
            .unwrap_or_else(|| PathBuf::from("download"));

        Self {
            config_dir,
            download_dir,
            ffmpeg_path: None,
            ytdlp_path: None,
        }
    }
}

impl AppConfig {
    /// Platform defaults, then environment overrides
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(dir) = env_path(DOWNLOAD_DIR_ENV) {
            config.download_dir = dir;
        }
        config.ffmpeg_path = env_path(ToolType::Ffmpeg.env_var());
        config.ytdlp_path = env_path(ToolType::YtDlp.env_var());

        config
    }

    /// Command-line values win over everything else
    pub fn with_overrides(
        mut self,
        download_dir: Option<&Path>,
        ffmpeg_path: Option<&Path>,
        ytdlp_path: Option<&Path>,
    ) -> Self {
        if let Some(dir) = download_dir {
            self.download_dir = dir.to_path_buf();
        }
        if let Some(path) = ffmpeg_path {
            self.ffmpeg_path = Some(path.to_path_buf());
        }
        if let Some(path) = ytdlp_path {
            self.ytdlp_path = Some(path.to_path_buf());
        }
        self
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.config_dir.join(PREFS_FILE)
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

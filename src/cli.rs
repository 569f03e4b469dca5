use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line parameters.
#[derive(Parser, Debug)]
#[command(name = "tubefetch")]
#[command(author, version, about = "Download YouTube videos, playlists and channels with yt-dlp")]
pub struct Cli {
    /// YouTube URLs (videos, playlists, channels, shorts).
    #[arg(value_name = "URL", num_args = 0.., index = 1)]
    pub urls: Vec<String>,

    /// Text file with one URL per line.
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Codec label, e.g. "H.264 (CPU libx264)" or "MP3 (Audio Only)". Defaults to the last one used.
    #[arg(short, long)]
    pub codec: Option<String>,

    /// Resolution label (144p .. 1080p, "1440p (2K)", "2160p (4K)", "4320p (8K)"). Defaults to the last one used.
    #[arg(short, long)]
    pub resolution: Option<String>,

    /// Download directory.
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Path to ffmpeg.
    #[arg(long, global = true)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Path to yt-dlp.
    #[arg(long, global = true)]
    pub ytdlp_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// List the codecs ffmpeg can actually use on this machine.
    Codecs,

    /// Open the download folder.
    Open,

    /// Show where yt-dlp and ffmpeg were found.
    Tools,
}

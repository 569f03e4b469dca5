// Terminal front-end: wires config, tools, preferences and a session together

use anyhow::{anyhow, bail, Context};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::downloader::codecs::{detect_available_codecs, TranscoderProbe};
use crate::downloader::models::{DownloadRequest, LogLevel, SessionEvent, SessionStatus};
use crate::downloader::orchestrator::{OrchestratorConfig, SessionOrchestrator};
use crate::downloader::tools::{ToolManager, ToolType};
use crate::downloader::utils::{ensure_dir, open_folder};
use crate::downloader::YtDlpEngine;
use crate::preferences::PreferenceStore;

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::load().with_overrides(
        cli.output.as_deref(),
        cli.ffmpeg_path.as_deref(),
        cli.ytdlp_path.as_deref(),
    );
    let tools = ToolManager::new()
        .with_override(ToolType::Ffmpeg, config.ffmpeg_path.clone())
        .with_override(ToolType::YtDlp, config.ytdlp_path.clone());

    match cli.command {
        Some(Commands::Codecs) => list_codecs(&tools).await,
        Some(Commands::Tools) => list_tools(&tools).await,
        Some(Commands::Open) => {
            ensure_dir(&config.download_dir)
                .with_context(|| format!("Cannot create {}", config.download_dir.display()))?;
            open_folder(&config.download_dir).await?;
            Ok(())
        }
        None => download(cli, config, tools).await,
    }
}

async fn list_codecs(tools: &ToolManager) -> anyhow::Result<()> {
    let ffmpeg = tools.locate(ToolType::Ffmpeg).await;
    if ffmpeg.is_none() {
        println!("ffmpeg not found, only the safe codec set is offered");
    }
    for label in detect_available_codecs(ffmpeg.as_deref()).await.labels() {
        println!("{}", label);
    }
    Ok(())
}

async fn list_tools(tools: &ToolManager) -> anyhow::Result<()> {
    for info in tools.get_all_tools().await {
        match (&info.path, &info.version) {
            (Some(path), Some(version)) => {
                println!("{:<7} {:<24} {}", info.name, version, path.display())
            }
            _ => println!("{:<7} not found (set {})", info.name, info.tool_type.env_var()),
        }
    }
    Ok(())
}

/// All URLs from the command line and the optional input file
fn collect_url_text(cli: &Cli) -> anyhow::Result<String> {
    let mut text = cli.urls.join("\n");
    if let Some(path) = &cli.input {
        let file = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        text.push('\n');
        text.push_str(&file);
    }
    Ok(text)
}

async fn download(cli: Cli, config: AppConfig, tools: ToolManager) -> anyhow::Result<()> {
    let store = PreferenceStore::new(config.preferences_path());
    let mut prefs = store.load();

    let codec = cli
        .codec
        .clone()
        .unwrap_or_else(|| prefs.codec().label().to_string());
    let resolution = cli
        .resolution
        .clone()
        .unwrap_or_else(|| prefs.resolution().label().to_string());
    let request = DownloadRequest::from_text(&collect_url_text(&cli)?, codec, resolution);

    prefs.remember_submission(&request.codec, &request.resolution);
    store.save(&prefs);

    let ytdlp = tools
        .locate(ToolType::YtDlp)
        .await
        .ok_or_else(|| anyhow!("yt-dlp not found; install it or pass --ytdlp-path"))?;
    let ffmpeg = tools.locate(ToolType::Ffmpeg).await;
    if ffmpeg.is_none() {
        log::warn!("[App] ffmpeg not found, merging and re-encoding will fail");
    }

    let (orchestrator, events) = SessionOrchestrator::new(
        Arc::new(YtDlpEngine::new(ytdlp)),
        Arc::new(TranscoderProbe::new(ffmpeg.clone())),
        OrchestratorConfig::new(&config.download_dir).with_transcoder(ffmpeg),
    );

    let handle = orchestrator.start(request)?;
    let printer = tokio::spawn(print_events(events));
    let interrupt = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nCanceling...");
                orchestrator.cancel();
            }
        })
    };

    let status = handle.wait().await;
    interrupt.abort();
    let _ = printer.await;
    store.save(&prefs);

    match status {
        SessionStatus::Done => {
            println!("Saved to {}", config.download_dir.display());
            Ok(())
        }
        SessionStatus::Failed(reason) => bail!(reason),
        _ => Ok(()),
    }
}

async fn print_events(mut events: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        let finished = matches!(event, SessionEvent::Finished { .. });
        if let Some(line) = render_event(&event) {
            println!("{}", line);
        }
        if finished {
            break;
        }
    }
}

/// One terminal line per event worth showing
pub fn render_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::Started { total, codec } => {
            Some(format!("{} URL(s) with {}", total, codec))
        }
        SessionEvent::ItemStarted { index, total, url } => {
            Some(format!("[{}/{}] {}", index, total, url))
        }
        SessionEvent::Log { level, text } => Some(match level {
            LogLevel::Error => format!("❌ {}", text),
            LogLevel::Warning => format!("⚠️ {}", text),
            LogLevel::Info => text.clone(),
        }),
        SessionEvent::Fallback { from, to } => Some(format!("{} -> {}", from, to)),
        SessionEvent::Finished { status } => Some(status.phase().label().to_string()),
        SessionEvent::PhaseChanged { .. }
        | SessionEvent::ProgressChanged { .. }
        | SessionEvent::SpeedChanged { .. }
        | SessionEvent::ItemFinished { .. } => None,
    }
}

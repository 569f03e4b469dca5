use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as TokioCommand;

use crate::downloader::errors::DownloadError;
use crate::downloader::models::EngineOptions;
use crate::downloader::traits::{Engine, LineSink};
use crate::downloader::utils::{hide_console_window, terminate_child};

/// Stderr lines kept for the failure message
const STDERR_TAIL: usize = 20;

/// How often the sink's stop flag is checked while the engine is silent
const CANCEL_POLL: Duration = Duration::from_millis(250);

/// Time a child gets to exit after the interrupt before it is killed
pub const DEFAULT_GRACE: Duration = Duration::from_secs(3);

/// Runs the yt-dlp binary, one process per URL
pub struct YtDlpEngine {
    binary: PathBuf,
    leading_args: Vec<String>,
    grace: Duration,
}

impl YtDlpEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            leading_args: Vec::new(),
            grace: DEFAULT_GRACE,
        }
    }

    /// Arguments placed before the download flags, e.g. `-m yt_dlp` for a python launcher
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Command line for one URL
    pub fn build_args(url: &str, options: &EngineOptions) -> Vec<String> {
        let mut args = vec![
            "--newline".to_string(),
            "--yes-playlist".to_string(),
            "-f".to_string(),
            options.stream_selector.clone(),
            "-o".to_string(),
            options.output_template.clone(),
        ];

        if let Some(path) = &options.transcoder_path {
            args.push("--ffmpeg-location".to_string());
            args.push(path.to_string_lossy().into_owned());
        }

        if options.postprocessors.is_empty() {
            args.push("--merge-output-format".to_string());
            args.push(options.merge_container.clone());
        }

        for profile in &options.postprocessors {
            args.extend([
                "-x".to_string(),
                "--audio-format".to_string(),
                profile.codec.clone(),
                "--audio-quality".to_string(),
                format!("{}K", profile.quality),
            ]);
        }

        if !options.postprocessor_args.is_empty() {
            args.push("--postprocessor-args".to_string());
            args.push(format!("ffmpeg:{}", options.postprocessor_args.join(" ")));
        }

        args.push("--".to_string());
        args.push(url.to_string());
        args
    }
}

/// Decode one buffered line, lossy for bytes outside UTF-8, and reset the buffer
fn take_line(buf: &mut Vec<u8>) -> String {
    let line = String::from_utf8_lossy(buf)
        .trim_end_matches(['\n', '\r'])
        .to_string();
    buf.clear();
    line
}

fn push_tail(tail: &mut VecDeque<String>, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    if tail.len() == STDERR_TAIL {
        tail.pop_front();
    }
    tail.push_back(line.to_string());
}

#[async_trait]
impl Engine for YtDlpEngine {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn download(
        &self,
        url: &str,
        options: &EngineOptions,
        sink: &mut dyn LineSink,
    ) -> Result<(), DownloadError> {
        let args = Self::build_args(url, options);
        log::info!("[yt-dlp] Starting {}: {}", self.binary.display(), url);
        log::debug!("[yt-dlp] Args: {:?}", args);

        let mut cmd = TokioCommand::new(&self.binary);
        cmd.args(&self.leading_args)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        hide_console_window(&mut cmd);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DownloadError::ToolNotFound(self.binary.display().to_string())
            } else {
                DownloadError::ExecutionError(format!("Failed to start yt-dlp: {}", e))
            }
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::ExecutionError("Failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::ExecutionError("Failed to capture stderr".to_string()))?;

        let mut out_reader = BufReader::new(stdout);
        let mut err_reader = BufReader::new(stderr);
        let mut out_buf = Vec::new();
        let mut err_buf = Vec::new();
        let mut out_open = true;
        let mut err_open = true;
        let mut tail = VecDeque::with_capacity(STDERR_TAIL);
        let mut poll = tokio::time::interval(CANCEL_POLL);

        // Both streams feed the sink in arrival order. read_until keeps partial
        // bytes in the buffer when another branch wins, so nothing is dropped.
        let streamed: Result<(), DownloadError> = loop {
            if !out_open && !err_open {
                break Ok(());
            }
            tokio::select! {
                read = out_reader.read_until(b'\n', &mut out_buf), if out_open => match read {
                    Ok(0) => out_open = false,
                    Ok(_) => {
                        let line = take_line(&mut out_buf);
                        if let Err(e) = sink.consume(&line) {
                            break Err(e);
                        }
                    }
                    Err(e) => {
                        log::warn!("[yt-dlp] stdout read failed: {}", e);
                        out_open = false;
                    }
                },
                read = err_reader.read_until(b'\n', &mut err_buf), if err_open => match read {
                    Ok(0) => err_open = false,
                    Ok(_) => {
                        let line = take_line(&mut err_buf);
                        push_tail(&mut tail, &line);
                        if let Err(e) = sink.consume(&line) {
                            break Err(e);
                        }
                    }
                    Err(e) => {
                        log::warn!("[yt-dlp] stderr read failed: {}", e);
                        err_open = false;
                    }
                },
                _ = poll.tick() => {
                    if sink.should_stop() {
                        break Err(DownloadError::Cancelled);
                    }
                }
            }
        };

        if let Err(e) = streamed {
            log::info!("[yt-dlp] Stopping child: {}", e);
            terminate_child(&mut child, self.grace).await;
            return Err(e);
        }

        let status = child
            .wait()
            .await
            .map_err(|e| DownloadError::ExecutionError(format!("Process error: {}", e)))?;

        if status.success() {
            log::info!("[yt-dlp] ✅ Finished {}", url);
            return Ok(());
        }
        if sink.should_stop() {
            return Err(DownloadError::Cancelled);
        }

        let message = if tail.is_empty() {
            format!("yt-dlp exited with {}", status)
        } else {
            Vec::from(tail).join("\n")
        };
        log::warn!("[yt-dlp] Failed {}: {}", url, message.lines().last().unwrap_or_default());
        Err(DownloadError::from(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::ExtractAudioProfile;

    fn video_options() -> EngineOptions {
        EngineOptions {
            stream_selector: "bestvideo[height<=720]+bestaudio/best/best".into(),
            output_template: "/tmp/out/%(title)s.%(ext)s".into(),
            merge_container: "mp4".into(),
            postprocessors: Vec::new(),
            postprocessor_args: vec!["-c:v".into(), "libx264".into(), "-c:a".into(), "aac".into()],
            transcoder_path: Some(PathBuf::from("/usr/bin/ffmpeg")),
            height_ceiling: Some(720),
        }
    }

    /// Records lines and stops after `limit` of them
    struct CountingSink {
        lines: Vec<String>,
        limit: usize,
    }

    impl LineSink for CountingSink {
        fn consume(&mut self, line: &str) -> Result<(), DownloadError> {
            self.lines.push(line.to_string());
            if self.lines.len() >= self.limit {
                return Err(DownloadError::Cancelled);
            }
            Ok(())
        }
    }

    #[test]
    fn test_video_args() {
        let args = YtDlpEngine::build_args("https://youtu.be/abc", &video_options());
        let joined = args.join(" ");

        assert!(joined.starts_with("--newline --yes-playlist -f bestvideo[height<=720]+bestaudio/best/best"));
        assert!(joined.contains("-o /tmp/out/%(title)s.%(ext)s"));
        assert!(joined.contains("--ffmpeg-location /usr/bin/ffmpeg"));
        assert!(joined.contains("--merge-output-format mp4"));
        assert!(joined.contains("--postprocessor-args ffmpeg:-c:v libx264 -c:a aac"));
        assert!(!args.contains(&"-x".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("https://youtu.be/abc"));
    }

    #[test]
    fn test_audio_args() {
        let options = EngineOptions {
            stream_selector: "bestaudio/best".into(),
            postprocessors: vec![ExtractAudioProfile { codec: "opus".into(), quality: "192".into() }],
            postprocessor_args: Vec::new(),
            transcoder_path: None,
            height_ceiling: None,
            ..video_options()
        };
        let args = YtDlpEngine::build_args("https://youtu.be/abc", &options);
        let joined = args.join(" ");

        assert!(joined.contains("-x --audio-format opus --audio-quality 192K"));
        assert!(!joined.contains("--merge-output-format"));
        assert!(!joined.contains("--postprocessor-args"));
        assert!(!joined.contains("--ffmpeg-location"));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let engine = YtDlpEngine::new("tubefetch-no-such-yt-dlp");
        let mut sink = CountingSink { lines: Vec::new(), limit: usize::MAX };
        let result = engine.download("https://youtu.be/abc", &video_options(), &mut sink).await;
        assert!(matches!(result, Err(DownloadError::ToolNotFound(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_reaches_sink() {
        // echo prints the argument list back as a single line
        let engine = YtDlpEngine::new("echo");
        let mut sink = CountingSink { lines: Vec::new(), limit: usize::MAX };
        engine
            .download("https://youtu.be/abc", &video_options(), &mut sink)
            .await
            .unwrap();
        assert_eq!(sink.lines.len(), 1);
        assert!(sink.lines[0].starts_with("--newline"));
    }

    #[test]
    fn test_take_line_replaces_invalid_bytes() {
        let mut buf = b"caf\xe9 [download]  5.0%\r\n".to_vec();
        assert_eq!(take_line(&mut buf), "caf\u{FFFD} [download]  5.0%");
        assert!(buf.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invalid_utf8_line_keeps_stream_draining() {
        // Enough output after the bad line to fill the pipe if nobody reads it
        let script = r#"printf 'caf\351\n'; i=0; while [ $i -lt 4000 ]; do echo "[download]  50.0% of 1.00MiB at 1.00MiB/s ETA 00:01"; i=$((i+1)); done"#;
        let engine = YtDlpEngine::new("sh").with_leading_args(["-c", script, "yt-dlp"]);
        let mut sink = CountingSink { lines: Vec::new(), limit: usize::MAX };

        let result = tokio::time::timeout(
            Duration::from_secs(15),
            engine.download("https://youtu.be/abc", &video_options(), &mut sink),
        )
        .await
        .expect("engine stalled after a non-UTF-8 line");

        assert_eq!(result, Ok(()));
        assert_eq!(sink.lines.len(), 4001);
        assert_eq!(sink.lines[0], "caf\u{FFFD}");
        assert!(sink.lines[4000].starts_with("[download]  50.0%"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_error() {
        let engine = YtDlpEngine::new("false");
        let mut sink = CountingSink { lines: Vec::new(), limit: usize::MAX };
        let err = engine
            .download("https://youtu.be/abc", &video_options(), &mut sink)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("yt-dlp exited with"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sink_error_stops_child() {
        // yes repeats its arguments forever
        let engine = YtDlpEngine::new("yes").with_grace(Duration::from_millis(500));
        let mut sink = CountingSink { lines: Vec::new(), limit: 3 };
        let result = engine.download("https://youtu.be/abc", &video_options(), &mut sink).await;
        assert_eq!(result, Err(DownloadError::Cancelled));
        assert_eq!(sink.lines.len(), 3);
    }
}

// Process helpers shared by the engine, the codec probe and tool discovery

use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command as TokioCommand};
use tokio::time::timeout;

use super::errors::DownloadError;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Keep child processes from flashing a console window on Windows
pub fn hide_console_window(cmd: &mut TokioCommand) {
    #[cfg(windows)]
    {
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    #[cfg(not(windows))]
    {
        let _ = cmd;
    }
}

fn spawn_error(program: &OsStr, e: io::Error) -> DownloadError {
    let name = program.to_string_lossy();
    if e.kind() == io::ErrorKind::NotFound {
        DownloadError::ToolNotFound(name.to_string())
    } else {
        DownloadError::ExecutionError(format!("Failed to start {}: {}", name, e))
    }
}

/// Run command with timeout (shared utility)
pub async fn run_output_with_timeout(
    program: impl AsRef<OsStr>,
    args: Vec<String>,
    timeout_secs: u64,
) -> Result<std::process::Output, DownloadError> {
    let program = program.as_ref();
    let mut cmd = TokioCommand::new(program);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    hide_console_window(&mut cmd);

    let mut child = cmd.spawn().map_err(|e| spawn_error(program, e))?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| DownloadError::ExecutionError("Failed to capture stdout".to_string()))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| DownloadError::ExecutionError("Failed to capture stderr".to_string()))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    match timeout(Duration::from_secs(timeout_secs), child.wait()).await {
        Ok(status_res) => {
            let status = status_res
                .map_err(|e| DownloadError::ExecutionError(format!("Failed to wait: {}", e)))?;
            let stdout = stdout_task.await.ok().and_then(Result::ok).unwrap_or_default();
            let stderr = stderr_task.await.ok().and_then(Result::ok).unwrap_or_default();
            Ok(std::process::Output { status, stdout, stderr })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(DownloadError::TimedOut(timeout_secs))
        }
    }
}

/// Ask a child to stop (SIGINT / taskkill without /F)
fn send_interrupt(child: &Child) -> bool {
    let Some(pid) = child.id() else {
        return false;
    };
    let pid = pid.to_string();

    #[cfg(unix)]
    {
        std::process::Command::new("kill")
            .args(["-INT", &pid])
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        std::process::Command::new("taskkill")
            .args(["/PID", &pid, "/T"])
            .creation_flags(CREATE_NO_WINDOW)
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = pid;
        false
    }
}

/// Graceful stop, then force-kill once `grace` has passed
pub async fn terminate_child(child: &mut Child, grace: Duration) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }

    if send_interrupt(child) {
        if let Ok(Ok(_)) = timeout(grace, child.wait()).await {
            log::info!("[Process] Child exited after interrupt");
            return;
        }
        log::warn!("[Process] Still running after {:?}; force killing", grace);
    }

    if let Err(e) = child.kill().await {
        log::warn!("[Process] Force kill failed: {}", e);
    }
}

/// Create a directory tree if it is missing
pub fn ensure_dir(path: &Path) -> io::Result<()> {
    std::fs::create_dir_all(path)
}

/// Cross-platform folder opener (no terminal popup)
pub async fn open_folder(path: &Path) -> Result<(), DownloadError> {
    let opener = if cfg!(target_os = "windows") {
        "explorer"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };

    let mut cmd = TokioCommand::new(opener);
    cmd.arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    hide_console_window(&mut cmd);

    cmd.spawn().map(|_| ()).map_err(|e| {
        log::warn!("[Process] Could not open {}: {}", path.display(), e);
        spawn_error(OsStr::new(opener), e)
    })
}

//! Engine process spawner.
//!
//! Prepares the engine executable and launches it with:
//! - all three stdio streams piped, captured before any session task starts;
//! - `kill_on_drop(true)` so an abandoned child is cleaned up;
//! - the mode flag for the session's [`Role`] and `-debug` when a diagnostic
//!   sink is attached.
//!
//! Any failure here is an `AppError::Setup` and leaves nothing running.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use bytes::Bytes;
use tempfile::TempPath;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::engine::{post_outcome, Activity, ActivityOutcome};
use crate::models::role::Role;
use crate::{AppError, Result};

/// Flag enabling engine diagnostics on stderr.
pub const DEBUG_FLAG: &str = "-debug";

// ── Binary source ────────────────────────────────────────────────────────────

/// Where the engine executable comes from.
#[derive(Debug, Clone)]
pub enum EngineBinary {
    /// An executable already present on disk.
    Path(PathBuf),
    /// Raw executable bytes, written to a private temporary file per session.
    Embedded(Bytes),
}

/// Engine executable ready to be launched.
///
/// For embedded binaries this owns the temporary file; it is removed when the
/// value is dropped.
#[derive(Debug)]
pub struct PreparedBinary {
    path: PathBuf,
    _temp: Option<TempPath>,
}

impl PreparedBinary {
    /// Path to execute.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EngineBinary {
    /// Materialize the binary as an executable file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Setup` if the temporary file cannot be created,
    /// written, or marked executable.
    pub fn prepare(&self) -> Result<PreparedBinary> {
        match self {
            Self::Path(path) => Ok(PreparedBinary {
                path: path.clone(),
                _temp: None,
            }),
            Self::Embedded(bytes) => materialize(bytes),
        }
    }
}

fn materialize(bytes: &[u8]) -> Result<PreparedBinary> {
    let mut file = tempfile::Builder::new()
        .prefix("natty-")
        .tempfile()
        .map_err(|err| AppError::Setup(format!("failed to create engine file: {err}")))?;

    file.write_all(bytes)
        .and_then(|()| file.flush())
        .map_err(|err| AppError::Setup(format!("failed to write engine file: {err}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o700))
            .map_err(|err| AppError::Setup(format!("failed to mark engine executable: {err}")))?;
    }

    // Closing the write handle before exec avoids ETXTBSY.
    let temp = file.into_temp_path();
    debug!(path = %temp.display(), bytes = bytes.len(), "engine binary materialized");

    Ok(PreparedBinary {
        path: temp.to_path_buf(),
        _temp: Some(temp),
    })
}

// ── Invocation ───────────────────────────────────────────────────────────────

/// Build the engine argument list.
///
/// Order: mode flag (offer only), configured extra arguments, then
/// [`DEBUG_FLAG`] when `debug` is set.
#[must_use]
pub fn engine_args(role: Role, extra_args: &[String], debug: bool) -> Vec<String> {
    let mut args = Vec::with_capacity(extra_args.len() + 2);
    if let Some(flag) = role.mode_flag() {
        args.push(flag.to_owned());
    }
    args.extend(extra_args.iter().cloned());
    if debug {
        args.push(DEBUG_FLAG.to_owned());
    }
    args
}

/// Running engine process with its captured stdio.
#[derive(Debug)]
pub struct EngineProcess {
    /// Child handle; killed if dropped while still running.
    pub child: Child,
    /// Engine stdin, receives inbound signaling messages.
    pub stdin: ChildStdin,
    /// Engine stdout, carries outbound signaling and the final result.
    pub stdout: ChildStdout,
    /// Engine stderr, diagnostic text.
    pub stderr: ChildStderr,
    /// Executable the child was launched from; must outlive the child.
    pub binary: PreparedBinary,
}

/// Prepare the binary and spawn the engine for `role`.
///
/// # Errors
///
/// - `AppError::Setup("failed to … engine file: …")` — embedded binary could
///   not be materialized.
/// - `AppError::Setup("failed to spawn engine: …")` — OS spawn failure.
/// - `AppError::Setup("failed to capture engine …")` — a pipe is missing.
pub fn spawn_engine(config: &EngineConfig, role: Role, debug: bool) -> Result<EngineProcess> {
    let binary = config.binary.prepare()?;
    let args = engine_args(role, &config.extra_args, debug);

    let mut cmd = Command::new(binary.path());
    cmd.args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Setup(format!("failed to spawn engine: {err}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Setup("failed to capture engine stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Setup("failed to capture engine stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Setup("failed to capture engine stderr".into()))?;

    info!(
        path = %binary.path().display(),
        pid = child.id(),
        %role,
        ?args,
        "engine spawned"
    );

    Ok(EngineProcess {
        child,
        stdin,
        stdout,
        stderr,
        binary,
    })
}

// ── Exit watcher ─────────────────────────────────────────────────────────────

/// Map a child exit to a session outcome.
///
/// A zero exit status is benign; any other status, a signal, or a failed
/// wait is `AppError::Exit`.
///
/// # Errors
///
/// Returns `AppError::Exit` describing the abnormal exit.
pub fn exit_result(status: std::io::Result<ExitStatus>) -> Result<()> {
    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(AppError::Exit(status.code().map_or_else(
            || "engine terminated by signal".to_owned(),
            |code| format!("engine exited with code {code}"),
        ))),
        Err(err) => Err(AppError::Exit(format!("failed to wait for engine: {err}"))),
    }
}

/// Await engine exit and post the result as a
/// [`Activity::ProcessWait`] outcome.
///
/// Once `shutdown` fires the engine gets `grace` to exit by itself (its stdin
/// is closed at the same time), after which it is killed. This returns only
/// after the child has been reaped.
pub async fn watch_exit(
    session_id: String,
    mut child: Child,
    notices: mpsc::Sender<ActivityOutcome>,
    shutdown: CancellationToken,
    grace: Duration,
) {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        () = shutdown.cancelled() => None,
    };

    let status = match exited {
        Some(status) => status,
        None => match tokio::time::timeout(grace, child.wait()).await {
            Ok(status) => status,
            Err(_elapsed) => {
                warn!(
                    session_id,
                    ?grace,
                    "engine still running after shutdown grace period, killing"
                );
                if let Err(err) = child.kill().await {
                    warn!(session_id, %err, "failed to kill engine");
                }
                child.wait().await
            }
        },
    };

    match &status {
        Ok(status) => info!(session_id, exit_code = ?status.code(), "engine exited"),
        Err(err) => warn!(session_id, %err, "error waiting for engine process"),
    }

    post_outcome(&notices, &session_id, Activity::ProcessWait, exit_result(status)).await;
}

//! Starts, health-checks and kills the server process.
//!
//! # Probe sequence
//!
//! ```text
//! for attempt in 1..=attempts:
//!     forget the tracked child if it has exited
//!     no child tracked?  launch one, then sleep warm_up
//!     TCP connect to 127.0.0.1:port within connect_timeout  → reachable
//!     sleep retry_delay
//! unreachable
//! ```
//!
//! At most one child is tracked.  A server that was started some other way
//! (by hand, or by another session) is used as-is when the connect succeeds.

use std::ffi::OsString;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::application::dispatch_worker::ServerSupervisor;

/// Environment variable overriding the server executable location.
pub const SERVER_EXECUTABLE_ENV: &str = "GRIDDEV_SERVER_EXECUTABLE";

const SERVER_EXECUTABLE_NAME: &str = "griddev-server";

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("grid server executable not found (looked in {searched:?}); set {SERVER_EXECUTABLE_ENV}")]
    ExecutableNotFound { searched: Vec<PathBuf> },

    #[error("failed to start grid server {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Timings for [`ProcessSupervisor::probe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub connect_timeout: Duration,
    pub retry_delay: Duration,
    pub warm_up: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            connect_timeout: Duration::from_secs(2),
            retry_delay: Duration::from_secs(1),
            warm_up: Duration::from_millis(500),
        }
    }
}

/// A running (or exited) server process.
pub trait ServerProcess: Send {
    fn has_exited(&mut self) -> bool;
    fn kill(&mut self);
}

/// Starts server processes.
#[cfg_attr(test, mockall::automock)]
pub trait ServerLauncher: Send + Sync {
    fn launch(&self) -> Result<Box<dyn ServerProcess>, SupervisorError>;
}

// ── Executable launcher ───────────────────────────────────────────────────────

/// Launches the `griddev-server` binary with `--port <port> --no-delay`.
///
/// The child inherits the client's stdout and stderr so its log lines show
/// up next to the caller's.
#[derive(Debug, Clone)]
pub struct ExecutableLauncher {
    executable: PathBuf,
    port: u16,
}

impl ExecutableLauncher {
    pub fn new(executable: PathBuf, port: u16) -> Self {
        Self { executable, port }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

impl ServerLauncher for ExecutableLauncher {
    fn launch(&self) -> Result<Box<dyn ServerProcess>, SupervisorError> {
        let child = tokio::process::Command::new(&self.executable)
            .arg("--port")
            .arg(self.port.to_string())
            .arg("--no-delay")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                path: self.executable.clone(),
                source,
            })?;
        info!(pid = child.id(), path = %self.executable.display(), "grid server launched");
        Ok(Box::new(ChildProcess(child)))
    }
}

struct ChildProcess(tokio::process::Child);

impl ServerProcess for ChildProcess {
    fn has_exited(&mut self) -> bool {
        !matches!(self.0.try_wait(), Ok(None))
    }

    fn kill(&mut self) {
        if let Err(e) = self.0.start_kill() {
            warn!(error = %e, "failed to kill grid server");
        }
    }
}

/// Finds the server executable.
///
/// Order: `$GRIDDEV_SERVER_EXECUTABLE`, next to the current executable, then
/// one directory up (test binaries live in `target/<profile>/deps`).
///
/// # Errors
///
/// [`SupervisorError::ExecutableNotFound`] listing every path tried.
pub fn locate_server_executable() -> Result<PathBuf, SupervisorError> {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    locate_in(std::env::var_os(SERVER_EXECUTABLE_ENV), exe_dir.as_deref())
}

fn locate_in(
    override_path: Option<OsString>,
    exe_dir: Option<&Path>,
) -> Result<PathBuf, SupervisorError> {
    if let Some(path) = override_path {
        return Ok(PathBuf::from(path));
    }

    let file_name = format!("{SERVER_EXECUTABLE_NAME}{}", std::env::consts::EXE_SUFFIX);
    let mut searched = Vec::new();
    if let Some(dir) = exe_dir {
        searched.push(dir.join(&file_name));
        if let Some(parent) = dir.parent() {
            searched.push(parent.join(&file_name));
        }
    }
    match searched.iter().find(|path| path.is_file()) {
        Some(path) => Ok(path.clone()),
        None => Err(SupervisorError::ExecutableNotFound { searched }),
    }
}

// ── Supervisor ────────────────────────────────────────────────────────────────

/// [`ServerSupervisor`] that launches a local process on demand.
pub struct ProcessSupervisor {
    launcher: Arc<dyn ServerLauncher>,
    addr: SocketAddr,
    policy: RetryPolicy,
    child: Mutex<Option<Box<dyn ServerProcess>>>,
}

impl ProcessSupervisor {
    pub fn new(launcher: Arc<dyn ServerLauncher>, port: u16, policy: RetryPolicy) -> Self {
        Self {
            launcher,
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
            policy,
            child: Mutex::new(None),
        }
    }

    /// `true` while a child process is tracked.
    pub async fn is_tracking(&self) -> bool {
        self.child.lock().await.is_some()
    }

    async fn connect(&self) -> bool {
        match tokio::time::timeout(self.policy.connect_timeout, TcpStream::connect(self.addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(addr = %self.addr, error = %e, "grid server not accepting connections");
                false
            }
            Err(_) => {
                debug!(addr = %self.addr, "connect to grid server timed out");
                false
            }
        }
    }
}

#[async_trait]
impl ServerSupervisor for ProcessSupervisor {
    async fn probe(&self) -> bool {
        // Held for the whole probe so concurrent probes cannot launch twice.
        let mut child = self.child.lock().await;

        for attempt in 1..=self.policy.attempts {
            if child.as_mut().is_some_and(|c| c.has_exited()) {
                info!("grid server process has exited");
                *child = None;
            }
            if child.is_none() {
                match self.launcher.launch() {
                    Ok(process) => {
                        *child = Some(process);
                        tokio::time::sleep(self.policy.warm_up).await;
                    }
                    Err(e) => warn!(attempt, error = %e, "could not launch grid server"),
                }
            }
            if self.connect().await {
                debug!(attempt, "grid server reachable");
                return true;
            }
            if attempt < self.policy.attempts {
                tokio::time::sleep(self.policy.retry_delay).await;
            }
        }

        warn!(attempts = self.policy.attempts, addr = %self.addr, "grid server unreachable");
        false
    }

    async fn destroy(&self) {
        if let Some(mut process) = self.child.lock().await.take() {
            info!("killing grid server");
            process.kill();
        }
    }
}

use super::{PidStore, ProcessRole, ProcessState};
use crate::error::{validate_pid, validate_pid_for_check, Error, Result};
use chrono::{DateTime, Utc};
use nix::errno::Errno;
use nix::sys::signal::{self, killpg, Signal};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

/// Synchronous mutex for fields that are never held across await points.
type SyncMutex<T> = parking_lot::Mutex<T>;

/// How long `shutdown` waits for the kernel to reap a killed child.
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// Which output stream the caller wants to read itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Capture {
    #[default]
    None,
    Stdout,
    Stderr,
}

/// Everything needed to launch one supervised binary.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub role: ProcessRole,
    pub binary_path: PathBuf,
    pub args: Vec<String>,
    pub owner: String,
    pub endpoint: Option<String>,
    pub capture: Capture,
}

impl SpawnRequest {
    pub fn new(role: ProcessRole, binary_path: impl Into<PathBuf>) -> Self {
        Self {
            role,
            binary_path: binary_path.into(),
            args: Vec::new(),
            owner: super::MAKER_OWNER.to_string(),
            endpoint: None,
            capture: Capture::None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn capture(mut self, capture: Capture) -> Self {
        self.capture = capture;
        self
    }

    fn command_line(&self) -> String {
        std::iter::once(self.binary_path.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .map(|part| shell_escape::escape(part.into()).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One externally spawned binary.
///
/// The child runs in its own process group so a forced kill also takes down
/// anything it forked.
pub struct ManagedProcess {
    role: ProcessRole,
    binary_path: PathBuf,
    endpoint: Option<String>,
    pid: u32,
    owner: String,
    state: SyncMutex<ProcessState>,
    child: tokio::sync::Mutex<Option<Child>>,
    stdout: SyncMutex<Option<ChildStdout>>,
    stderr: SyncMutex<Option<ChildStderr>>,
    started_at: DateTime<Utc>,
}

impl ManagedProcess {
    pub fn role(&self) -> ProcessRole {
        self.role
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn state(&self) -> ProcessState {
        *self.state.lock()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Hand the captured stdout to the caller. Returns None after the first call.
    pub fn take_stdout(&self) -> Option<ChildStdout> {
        self.stdout.lock().take()
    }

    /// Hand the captured stderr to the caller. Returns None after the first call.
    pub fn take_stderr(&self) -> Option<ChildStderr> {
        self.stderr.lock().take()
    }

    /// Whether the child has exited on its own. Reaps it if so.
    pub async fn has_exited(&self) -> bool {
        let mut child = self.child.lock().await;
        match child.as_mut() {
            Some(c) => matches!(c.try_wait(), Ok(Some(_)) | Err(_)),
            None => true,
        }
    }
}

impl std::fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("role", &self.role)
            .field("pid", &self.pid)
            .field("owner", &self.owner)
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

/// Starts and force-stops external binaries, recording each role's pid so a
/// later run can clean up after a crash.
///
/// Spawns of the same role are serialized; different roles proceed
/// independently.
pub struct Supervisor {
    pids: Arc<dyn PidStore>,
    role_locks: [SyncMutex<()>; 4],
    log_dir: Option<PathBuf>,
}

impl Supervisor {
    pub fn new(pids: Arc<dyn PidStore>) -> Self {
        Self {
            pids,
            role_locks: Default::default(),
            log_dir: None,
        }
    }

    /// Append uncaptured output of each role to `<log_dir>/<pid_key>.log`.
    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(log_dir.into());
        self
    }

    pub fn pid_store(&self) -> &Arc<dyn PidStore> {
        &self.pids
    }

    /// Launch `request`, after killing whatever pid was last recorded for its role.
    ///
    /// The new pid is persisted before this returns.
    #[tracing::instrument(skip(self, request), fields(process.role = %request.role))]
    pub fn spawn(&self, request: SpawnRequest) -> Result<ManagedProcess> {
        let role = request.role;
        let _guard = self.role_locks[role.index()].lock();

        self.kill_recorded(role);

        tracing::debug!("Spawning {}: {}", role, request.command_line());

        let mut cmd = Command::new(&request.binary_path);
        cmd.args(&request.args)
            .stdin(Stdio::null())
            .kill_on_drop(false)
            .process_group(0);

        let (stdout, stderr) = match request.capture {
            Capture::Stdout => (Stdio::piped(), self.log_stdio(role)),
            Capture::Stderr => (self.log_stdio(role), Stdio::piped()),
            Capture::None => (self.log_stdio(role), self.log_stdio(role)),
        };
        cmd.stdout(stdout).stderr(stderr);

        let mut child = cmd.spawn().map_err(|e| {
            tracing::error!(
                "Failed to spawn {} from {}: {}",
                role,
                request.binary_path.display(),
                e
            );
            Error::Spawn {
                role: role.to_string(),
                reason: e.to_string(),
            }
        })?;

        let pid = child.id().ok_or_else(|| Error::Spawn {
            role: role.to_string(),
            reason: "process exited before its pid could be read".to_string(),
        })?;

        if let Err(e) = self.pids.store(role, pid) {
            // An unrecorded process could not be cleaned up after a crash
            tracing::error!("Failed to persist pid {} for {}: {}", pid, role, e);
            let _ = child.start_kill();
            return Err(e);
        }

        tracing::info!("Started {} (pid {})", role, pid);

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        Ok(ManagedProcess {
            role,
            binary_path: request.binary_path,
            endpoint: request.endpoint,
            pid,
            owner: request.owner,
            state: SyncMutex::new(ProcessState::Running),
            child: tokio::sync::Mutex::new(Some(child)),
            stdout: SyncMutex::new(stdout),
            stderr: SyncMutex::new(stderr),
            started_at: Utc::now(),
        })
    }

    /// Force-kill `process`. Returns true if a live process was signalled.
    ///
    /// The persisted pid is left in place; call [`Supervisor::release`] once
    /// the caller is done with the role.
    pub async fn shutdown(&self, process: &ManagedProcess) -> bool {
        {
            let mut state = process.state.lock();
            if *state == ProcessState::Stopped {
                return false;
            }
            *state = ProcessState::Stopped;
        }

        let killed = Self::force_kill(process.pid, &process.role.to_string());

        let mut child = process.child.lock().await;
        if let Some(mut c) = child.take() {
            if tokio::time::timeout(REAP_TIMEOUT, c.wait()).await.is_err() {
                tracing::warn!(
                    "{} (pid {}) did not exit within {:?} of SIGKILL",
                    process.role,
                    process.pid,
                    REAP_TIMEOUT
                );
            }
        }
        tracing::info!("Stopped {} (pid {})", process.role, process.pid);
        killed
    }

    /// Force-kill a pid recorded by an earlier run. Killing a pid that no
    /// longer exists is not an error; it just returns false.
    pub fn shutdown_by_pid(&self, pid: u32) -> bool {
        Self::force_kill(pid, "recorded process")
    }

    /// Clear the role's pid entry if it still refers to `process`.
    pub fn release(&self, process: &ManagedProcess) {
        match self.pids.clear_if(process.role, process.pid) {
            Ok(true) => tracing::debug!("Cleared recorded pid for {}", process.role),
            Ok(false) => {}
            Err(e) => tracing::warn!("Failed to clear pid for {}: {}", process.role, e),
        }
    }

    /// Kill and forget every recorded pid. Returns the roles that had a live process.
    pub fn kill_all_recorded(&self) -> Vec<(ProcessRole, u32)> {
        let mut killed = Vec::new();
        for role in ProcessRole::ALL {
            let _guard = self.role_locks[role.index()].lock();
            if let Some(pid) = self.kill_recorded(role) {
                killed.push((role, pid));
            }
        }
        killed
    }

    pub fn is_alive(pid: u32) -> bool {
        let Some(nix_pid) = validate_pid_for_check(pid) else {
            return false;
        };
        match signal::kill(nix_pid, None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    /// Kill and clear the recorded pid for `role`. Returns it if it was alive.
    fn kill_recorded(&self, role: ProcessRole) -> Option<u32> {
        let previous = match self.pids.load(role) {
            Ok(p) => p?,
            Err(e) => {
                tracing::warn!("Could not read recorded pid for {}: {}", role, e);
                return None;
            }
        };

        let killed = Self::force_kill(previous, &role.to_string());
        if killed {
            tracing::info!("Killed leftover {} (pid {})", role, previous);
        } else {
            tracing::debug!("Recorded {} pid {} is already gone", role, previous);
        }
        if let Err(e) = self.pids.clear(role) {
            tracing::warn!("Failed to clear recorded pid for {}: {}", role, e);
        }
        killed.then_some(previous)
    }

    /// SIGKILL the process group led by `pid`, falling back to the single process.
    fn force_kill(pid: u32, label: &str) -> bool {
        let nix_pid = match validate_pid(pid, label) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Not signalling {}: {}", label, e);
                return false;
            }
        };
        match killpg(nix_pid, Signal::SIGKILL).or_else(|_| signal::kill(nix_pid, Signal::SIGKILL)) {
            Ok(()) => true,
            Err(Errno::ESRCH) => false,
            Err(e) => {
                tracing::warn!("Failed to kill {} (pid {}): {}", label, pid, e);
                false
            }
        }
    }

    fn log_stdio(&self, role: ProcessRole) -> Stdio {
        let Some(ref dir) = self.log_dir else {
            return Stdio::null();
        };
        let path = dir.join(format!("{}.log", role.pid_key()));
        let opened = std::fs::create_dir_all(dir).and_then(|_| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
        });
        match opened {
            Ok(file) => Stdio::from(file),
            Err(e) => {
                tracing::warn!("Cannot open {} for {} output: {}", path.display(), role, e);
                Stdio::null()
            }
        }
    }
}

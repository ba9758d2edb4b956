// src/system/process.rs

//! The spawn primitive: one OS child process, its pid, an idempotent kill switch,
//! and an exit notification that fires exactly once.
//!
//! Exit detection is event driven. A watcher task owns the `tokio::process::Child`,
//! awaits it, and publishes the result through a `oneshot` channel. Nothing polls.

use crate::constants::KILL_GRACE_PERIOD;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// The process exited on its own with this code.
    Code(i32),
    /// The process was terminated by a signal (or its exit status was lost).
    Terminated,
}

impl ProcessExit {
    pub fn success(self) -> bool {
        matches!(self, Self::Code(0))
    }

    pub fn code(self) -> Option<i32> {
        match self {
            Self::Code(code) => Some(code),
            Self::Terminated => None,
        }
    }
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        status.code().map_or(Self::Terminated, Self::Code)
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exit code {}", code),
            Self::Terminated => f.write_str("terminated by a signal"),
        }
    }
}

/// Everything needed to start a child: binary, arguments and working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Detached children survive the host (IDE windows). Attached ones die with it.
    pub detached: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            detached: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn detached(mut self, detached: bool) -> Self {
        self.detached = detached;
        self
    }

    /// The program's file name, used as a short label in logs.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map_or_else(|| self.program.display().to_string(), |name| {
                name.to_string_lossy().into_owned()
            })
    }

    /// A printable, shell-like rendering of the full command.
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

type KillSwitch = Box<dyn FnOnce() + Send>;

/// A live child process as seen by its owner: the pid and a once-only kill switch.
pub struct ProcessHandle {
    pid: u32,
    kill_switch: Option<KillSwitch>,
}

impl ProcessHandle {
    /// Wraps a pid together with the action that terminates it.
    pub fn new(pid: u32, kill: impl FnOnce() + Send + 'static) -> Self {
        Self {
            pid,
            kill_switch: Some(Box::new(kill)),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_killed(&self) -> bool {
        self.kill_switch.is_none()
    }

    /// Requests termination. Returns `false` when the handle was already killed.
    ///
    /// Never waits for the process to die.
    pub fn kill(&mut self) -> bool {
        match self.kill_switch.take() {
            Some(kill) => {
                kill();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("killed", &self.is_killed())
            .finish()
    }
}

/// Resolves once, when the child exits.
#[derive(Debug)]
pub struct ExitNotice {
    receiver: oneshot::Receiver<ProcessExit>,
}

impl ExitNotice {
    pub fn new(receiver: oneshot::Receiver<ProcessExit>) -> Self {
        Self { receiver }
    }

    pub async fn wait(self) -> ProcessExit {
        // A dropped sender means the watcher is gone along with the child.
        self.receiver.await.unwrap_or(ProcessExit::Terminated)
    }
}

/// A freshly spawned child: its handle plus the notice of its exit.
#[derive(Debug)]
pub struct SpawnedProcess {
    pub handle: ProcessHandle,
    pub exit: ExitNotice,
}

/// Starts OS processes. The seam between the supervisor and the operating system.
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, spec: &CommandSpec) -> io::Result<SpawnedProcess>;
}

/// Spawns real processes through `tokio::process`.
///
/// Must be called from within a Tokio runtime: every child gets a watcher task.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSpawner;

impl ProcessSpawner for TokioSpawner {
    fn spawn(&self, spec: &CommandSpec) -> io::Result<SpawnedProcess> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(dunce::simplified(&spec.cwd))
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(!spec.detached);

        if spec.detached {
            command.stdin(Stdio::null());
            // Keep Ctrl+C in the terminal from reaching the detached child.
            #[cfg(unix)]
            command.process_group(0);
        } else {
            command.stdin(Stdio::inherit());
        }

        let child = command.spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| io::Error::other("child exited before its pid could be read"))?;
        log::debug!("Spawned '{}' (PID: {})", spec.command_line(), pid);

        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let reaped = Arc::new(AtomicBool::new(false));

        tokio::spawn(watch_child(
            child,
            pid,
            spec.program_name(),
            kill_rx,
            exit_tx,
            Arc::clone(&reaped),
        ));

        let handle = ProcessHandle::new(pid, move || {
            if !reaped.load(Ordering::SeqCst) {
                send_terminate(pid);
            }
            let _ = kill_tx.send(());
        });

        Ok(SpawnedProcess {
            handle,
            exit: ExitNotice::new(exit_rx),
        })
    }
}

/// Owns the child until it exits, then reports the exit exactly once.
async fn watch_child(
    mut child: Child,
    pid: u32,
    label: String,
    mut kill_rx: oneshot::Receiver<()>,
    exit_tx: oneshot::Sender<ProcessExit>,
    reaped: Arc<AtomicBool>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        Ok(()) = &mut kill_rx => reap_after_kill(&mut child, pid).await,
    };
    reaped.store(true, Ordering::SeqCst);

    let exit = match status {
        Ok(status) => ProcessExit::from(status),
        Err(e) => {
            log::warn!("Lost track of '{}' (PID: {}): {}", label, pid, e);
            ProcessExit::Terminated
        }
    };
    log::debug!("'{}' (PID: {}) finished: {}", label, pid, exit);

    // The receiver may be gone (fire-and-forget launches); that is fine.
    let _ = exit_tx.send(exit);
}

/// Gives the child a grace period after SIGTERM, then kills it outright.
async fn reap_after_kill(child: &mut Child, pid: u32) -> io::Result<ExitStatus> {
    if cfg!(unix) {
        match tokio::time::timeout(KILL_GRACE_PERIOD, child.wait()).await {
            Ok(status) => return status,
            Err(_) => log::warn!(
                "PID {} ignored SIGTERM for {:?}; killing it.",
                pid,
                KILL_GRACE_PERIOD
            ),
        }
    }
    child.kill().await?;
    child.wait().await
}

#[cfg(unix)]
fn send_terminate(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(raw_pid) = i32::try_from(pid) else {
        log::warn!("PID {} does not fit a pid_t; cannot signal it.", pid);
        return;
    };
    match kill(Pid::from_raw(raw_pid), Signal::SIGTERM) {
        Ok(()) => log::debug!("Sent SIGTERM to PID {}", pid),
        Err(Errno::ESRCH) => log::debug!("PID {} already exited", pid),
        Err(e) => log::warn!("Failed to send SIGTERM to PID {}: {}", pid, e),
    }
}

// Without POSIX signals the watcher performs a hard kill on request.
#[cfg(not(unix))]
fn send_terminate(_pid: u32) {}

// src/system/shutdown.rs

//! Process-wide cleanup hooks.
//!
//! Hooks run once, in registration order, when the host receives SIGINT, SIGTERM or
//! SIGHUP, or when it exits through [`ShutdownRegistry::exit`] or an explicit
//! [`ShutdownRegistry::fire`]. Firing blocks until every hook has returned or the
//! registry's timeout elapses, whichever comes first.

use crate::constants::SHUTDOWN_HOOK_TIMEOUT;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

type HookFn = Box<dyn FnOnce() + Send>;

struct ShutdownHook {
    id: Uuid,
    callback: HookFn,
}

/// The termination request that triggered a shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
    Hangup,
}

impl ShutdownSignal {
    /// The conventional `128 + signo` exit status.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Interrupt => 130,
            Self::Terminate => 143,
            Self::Hangup => 129,
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Hangup => "SIGHUP",
        })
    }
}

/// What happened when the hooks were fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireReport {
    Completed { hooks: usize },
    /// The timeout elapsed while hooks were still running.
    TimedOut { hooks: usize },
    /// The hooks had already been fired; nothing ran.
    AlreadyFired,
    /// The hook thread could not be started; nothing ran.
    Abandoned { hooks: usize },
}

pub struct ShutdownRegistry {
    hooks: Mutex<Vec<ShutdownHook>>,
    fired: AtomicBool,
    timeout: Duration,
}

static GLOBAL_REGISTRY: OnceLock<ShutdownRegistry> = OnceLock::new();

impl Default for ShutdownRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ShutdownRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownRegistry")
            .field("hooks", &self.len())
            .field("fired", &self.has_fired())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ShutdownRegistry {
    pub fn new() -> Self {
        Self::with_timeout(SHUTDOWN_HOOK_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            hooks: Mutex::new(Vec::new()),
            fired: AtomicBool::new(false),
            timeout,
        }
    }

    /// The registry shared by the whole process. Created on first use.
    pub fn global() -> &'static Self {
        GLOBAL_REGISTRY.get_or_init(Self::new)
    }

    fn lock_hooks(&self) -> MutexGuard<'_, Vec<ShutdownHook>> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a hook. Hooks registered after the registry fired are dropped.
    pub fn register<F>(&self, callback: F) -> Uuid
    where
        F: FnOnce() + Send + 'static,
    {
        let id = Uuid::new_v4();
        if self.has_fired() {
            log::warn!("Shutdown already in progress; hook {} will not run.", id);
            return id;
        }
        self.lock_hooks().push(ShutdownHook {
            id,
            callback: Box::new(callback),
        });
        log::debug!("Registered shutdown hook {}", id);
        id
    }

    pub fn len(&self) -> usize {
        self.lock_hooks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Runs every registered hook, in order, exactly once across the process lifetime.
    pub fn fire(&self) -> FireReport {
        if self.fired.swap(true, Ordering::SeqCst) {
            return FireReport::AlreadyFired;
        }

        let hooks = std::mem::take(&mut *self.lock_hooks());
        let count = hooks.len();
        if count == 0 {
            return FireReport::Completed { hooks: 0 };
        }

        // Hooks run on their own thread so a stuck hook cannot hold the exit hostage.
        let (done_tx, done_rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name("caprun-shutdown".to_string())
            .spawn(move || {
                for hook in hooks {
                    log::debug!("Running shutdown hook {}", hook.id);
                    if panic::catch_unwind(AssertUnwindSafe(hook.callback)).is_err() {
                        log::error!("Shutdown hook {} panicked.", hook.id);
                    }
                }
                let _ = done_tx.send(());
            });

        if let Err(e) = spawned {
            log::error!("Could not start the shutdown thread: {}", e);
            return FireReport::Abandoned { hooks: count };
        }

        match done_rx.recv_timeout(self.timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => FireReport::Completed { hooks: count },
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "Shutdown hooks did not finish within {:?}; exiting anyway.",
                    self.timeout
                );
                FireReport::TimedOut { hooks: count }
            }
        }
    }

    /// Fires the hooks, then terminates the process with `code`.
    pub fn exit(&self, code: i32) -> ! {
        self.fire();
        std::process::exit(code)
    }

    /// Listens for termination signals in the background. On the first one, the hooks
    /// fire and the process exits with the signal's conventional status.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn install(&'static self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let signal = wait_for_signal().await;
            log::info!("Received {}; running {} shutdown hook(s).", signal, self.len());
            self.exit(signal.exit_code());
        })
    }
}

/// Resolves on the first Ctrl+C, SIGTERM or SIGHUP.
#[cfg(unix)]
pub async fn wait_for_signal() -> ShutdownSignal {
    use tokio::signal::unix::{SignalKind, signal};

    match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
        (Ok(mut terminate), Ok(mut hangup)) => tokio::select! {
            Ok(()) = tokio::signal::ctrl_c() => ShutdownSignal::Interrupt,
            _ = terminate.recv() => ShutdownSignal::Terminate,
            _ = hangup.recv() => ShutdownSignal::Hangup,
        },
        _ => {
            log::warn!("Could not listen for SIGTERM/SIGHUP; only Ctrl+C will trigger shutdown.");
            wait_for_ctrl_c().await
        }
    }
}

/// Resolves on the first Ctrl+C.
#[cfg(not(unix))]
pub async fn wait_for_signal() -> ShutdownSignal {
    wait_for_ctrl_c().await
}

async fn wait_for_ctrl_c() -> ShutdownSignal {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("Could not listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    ShutdownSignal::Interrupt
}

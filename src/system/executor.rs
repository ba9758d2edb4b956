// src/system/executor.rs

use crate::system::process::{
    CommandSpec, ExitNotice, ProcessExit, ProcessHandle, ProcessSpawner, SpawnedProcess,
    TokioSpawner,
};
use std::fmt;
use std::io::ErrorKind;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("No command specified to run.")]
    EmptyCommand,
    #[error("Command '{program}' could not be executed: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

type FailureHook = Box<dyn FnOnce(ProcessExit) + Send>;

/// Spawns commands and turns their exit into a future, running a caller-supplied
/// failure hook before that future resolves.
#[derive(Clone)]
pub struct CommandRunner {
    spawner: Arc<dyn ProcessSpawner>,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(Arc::new(TokioSpawner))
    }
}

impl fmt::Debug for CommandRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRunner").finish_non_exhaustive()
    }
}

/// A started command. The pid is available immediately through `handle`.
#[derive(Debug)]
pub struct Launched {
    pub handle: ProcessHandle,
    pub completion: Completion,
}

/// The pending exit of a launched command.
pub struct Completion {
    exit: ExitNotice,
    on_failure: Option<FailureHook>,
    label: String,
}

impl Completion {
    /// Waits for the exit. On any non-zero exit the failure hook runs first,
    /// so whatever it cleans up is settled by the time this returns.
    pub async fn wait(self) -> ProcessExit {
        let exit = self.exit.wait().await;
        if !exit.success() {
            log::debug!("'{}' failed ({}); running failure hook.", self.label, exit);
            if let Some(hook) = self.on_failure {
                hook(exit);
            }
        }
        exit
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("label", &self.label)
            .field("has_failure_hook", &self.on_failure.is_some())
            .finish()
    }
}

impl CommandRunner {
    pub fn new(spawner: Arc<dyn ProcessSpawner>) -> Self {
        Self { spawner }
    }

    /// Starts `spec` and returns as soon as the child exists.
    pub fn launch<F>(&self, spec: &CommandSpec, on_failure: F) -> Result<Launched, ExecutionError>
    where
        F: FnOnce(ProcessExit) + Send + 'static,
    {
        if spec.program.as_os_str().is_empty() {
            return Err(ExecutionError::EmptyCommand);
        }

        let label = spec.program_name();
        let SpawnedProcess { handle, exit } = match self.spawner.spawn(spec) {
            Ok(spawned) => spawned,
            // `.cmd` and `.bat` shims (cap.cmd, gradlew.bat) need the command interpreter.
            Err(e) if e.kind() == ErrorKind::NotFound && cfg!(target_os = "windows") => {
                log::debug!("Command '{}' not found. Retrying with cmd /C.", label);
                let shim = CommandSpec::new("cmd", spec.cwd.clone())
                    .arg("/C")
                    .arg(spec.program.display().to_string())
                    .args(spec.args.iter().cloned())
                    .detached(spec.detached);
                self.spawner
                    .spawn(&shim)
                    .map_err(|source| ExecutionError::Spawn {
                        program: spec.command_line(),
                        source,
                    })?
            }
            Err(source) => {
                return Err(ExecutionError::Spawn {
                    program: spec.command_line(),
                    source,
                });
            }
        };

        Ok(Launched {
            handle,
            completion: Completion {
                exit,
                on_failure: Some(Box::new(on_failure)),
                label,
            },
        })
    }

    /// Starts `spec` and waits for it, without exposing the handle.
    pub async fn run_to_completion<F>(
        &self,
        spec: &CommandSpec,
        on_failure: F,
    ) -> Result<ProcessExit, ExecutionError>
    where
        F: FnOnce(ProcessExit) + Send + 'static,
    {
        let launched = self.launch(spec, on_failure)?;
        Ok(launched.completion.wait().await)
    }
}

// src/cli/handlers/commons.rs

// Shared setup for the `run` and `build` handlers.

use anyhow::{Result, anyhow};
use clap::Parser;
use clap::error::ErrorKind;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    core::{
        capacitor_config::CapacitorConfig,
        collaborators::{Console, TerminalConsole},
        config_loader::{ConfigLoader, ConfigOverrides},
        ide::IdeLauncher,
        manifest::CleartextManifestFixer,
        supervisor::{BuildSupervisor, Collaborators},
    },
    models::{BuildConfig, SupervisorContext, Target},
    system::{executor::CommandRunner, shutdown::ShutdownRegistry},
};

/// Parses a command's arguments. `--help` and `--version` print and exit right away.
pub fn parse_args<T: Parser>(args: &[String]) -> Result<T> {
    T::try_parse_from(args).map_err(|e| match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
        _ => anyhow!(e),
    })
}

/// The project root: the `--project` argument or the current directory.
pub fn resolve_project_root(project: Option<PathBuf>) -> Result<PathBuf> {
    let root = match project {
        Some(path) => path,
        None => env::current_dir()?,
    };
    dunce::canonicalize(&root)
        .map_err(|e| anyhow!(t!("common.error.project_not_found"), path = root.display(), error = e))
}

/// Loads the layered configuration of the project at `root` for `target`.
pub fn load_config(
    root: PathBuf,
    target: &Target,
    overrides: &ConfigOverrides,
) -> Result<BuildConfig> {
    let loader = ConfigLoader::new(root);
    log::debug!("Loading config for '{}' in '{}'", target, loader.project_root().display());
    Ok(loader.load(target, overrides)?)
}

/// Wires the supervisor to the real collaborators, registers it with the process-wide
/// shutdown registry and binds it to `context`.
pub fn create_supervisor(config: &BuildConfig, context: SupervisorContext) -> Result<BuildSupervisor> {
    let runner = CommandRunner::default();
    let console: Arc<dyn Console> = Arc::new(TerminalConsole);

    let collaborators = Collaborators {
        preparer: Arc::new(CapacitorConfig::new()),
        ide: Arc::new(IdeLauncher::new(
            runner.clone(),
            config.paths.clone(),
            Arc::clone(&console),
        )),
        manifest: Arc::new(CleartextManifestFixer::new(config.paths.clone())),
        console,
    };

    let supervisor = BuildSupervisor::new(runner, collaborators);
    let hook = supervisor.register_shutdown(ShutdownRegistry::global());
    log::debug!("Supervisor registered as shutdown hook {}", hook);

    supervisor.init(context)?;
    Ok(supervisor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::RunArgs;
    use tempfile::tempdir;

    #[test]
    fn test_parse_args_reports_unknown_flags() {
        let args = vec!["android".to_string(), "--bogus".to_string()];
        assert!(parse_args::<RunArgs>(&args).is_err());
    }

    #[test]
    fn test_missing_project_root_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(resolve_project_root(Some(missing)).is_err());
        assert!(resolve_project_root(Some(dir.path().to_path_buf())).is_ok());
    }
}

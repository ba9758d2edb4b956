// src/core/collaborators.rs

//! The narrow interfaces the supervisor drives. Concrete implementations live in
//! `capacitor_config`, `ide` and `manifest`; tests substitute recording fakes.

use crate::models::{BuildConfig, IdeBinaries, Target};
use anyhow::Result;
use async_trait::async_trait;
use colored::Colorize;

/// Mutates the generated native project so it points at the right app URL.
pub trait ConfigPreparer: Send + Sync {
    fn prepare(&self, config: &BuildConfig) -> Result<()>;

    fn prepare_ssl(&self, use_https: bool, target: &Target) -> Result<()>;

    /// Undoes `prepare`. Infallible from the caller's side: it runs during shutdown.
    fn reset(&self);
}

/// Opens the native project in its IDE.
#[async_trait]
pub trait IdeOpener: Send + Sync {
    /// With `foreground`, waits for the launcher to return.
    async fn open(
        &self,
        tool: &str,
        binaries: &IdeBinaries,
        target: &Target,
        foreground: bool,
    ) -> Result<()>;
}

/// Patches the platform manifest once per supervisor.
pub trait ManifestFixer: Send + Sync {
    fn fix(&self, tool: &str) -> Result<()>;
}

/// User-facing output.
pub trait Console: Send + Sync {
    fn info(&self, message: &str);

    /// Multi-line messages are printed as one block.
    fn warn(&self, message: &str);
}

/// Prints to the terminal and mirrors every line into the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConsole;

impl Console for TerminalConsole {
    fn info(&self, message: &str) {
        log::debug!("{}", message);
        println!(" {} {}", "caprun".green().bold(), message);
    }

    fn warn(&self, message: &str) {
        log::debug!("warning: {}", message);
        eprintln!();
        for line in message.lines() {
            eprintln!(" {} {}", "⚠".yellow().bold(), line.yellow());
        }
        eprintln!();
    }
}

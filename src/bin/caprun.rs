// src/bin/caprun.rs

use anyhow::Result;
use caprun::{
    cli::{Cli, dispatcher},
    core::supervisor::SupervisorError,
    system::shutdown::ShutdownRegistry,
};
use clap::Parser;
use colored::*;

/// The main entry point of the `caprun` application.
/// It sets up logging, installs the shutdown hooks, dispatches to the command handler
/// and performs centralized error handling.
fn main() {
    env_logger::init();
    let cli = Cli::parse();
    log::debug!("CLI args parsed: {:?}", cli);

    if let Err(e) = run_cli(cli, ShutdownRegistry::global()) {
        // --- Centralized Error Handling ---
        let tag = e
            .downcast_ref::<SupervisorError>()
            .map_or("ERROR", SupervisorError::tag);
        eprintln!("\n{} {}", format!(" {} ", tag).on_red().white().bold(), e);
        std::process::exit(1);
    }
}

/// Builds the runtime, starts the signal listener and runs the requested command.
fn run_cli(cli: Cli, registry: &'static ShutdownRegistry) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(async {
        registry.install();
        dispatcher::dispatch(cli.args).await
    });

    // Whatever happened, the supervised process must not outlive the runtime.
    registry.fire();
    result
}

use anyhow::{Result, anyhow};
use colored::*;

use crate::{
    cli::{args::RunArgs, dispatcher::HandlerFuture, handlers::commons},
    core::config_loader::ConfigOverrides,
    models::{RunOutcome, RunRequest, SupervisorContext, Target},
};

/// Entry point for the `run` command.
pub fn handle(args: Vec<String>) -> HandlerFuture {
    Box::pin(run(args))
}

async fn run(args: Vec<String>) -> Result<()> {
    // 1. Parse arguments and resolve the configuration.
    let run_args: RunArgs = commons::parse_args(&args)?;
    let target = Target::from(run_args.target.as_str());
    let root = commons::resolve_project_root(run_args.project)?;
    let overrides = ConfigOverrides {
        app_url: run_args.url,
        https: run_args.https.then_some(true),
    };
    let config = commons::load_config(root, &target, &overrides)?;

    // 2. A dev run always needs something to point the app at.
    let url = config
        .app_url
        .clone()
        .ok_or_else(|| anyhow!(t!("run.error.no_url")))?;

    // 3. Hand over to the supervisor.
    let context = SupervisorContext {
        target,
        debug: true,
    };
    let supervisor = commons::create_supervisor(&config, context)?;
    match supervisor.run(&RunRequest::new(config, url)).await? {
        RunOutcome::Launched => {}
        RunOutcome::Unchanged => println!("{}", t!("run.info.unchanged").dimmed()),
        RunOutcome::Superseded => println!("{}", t!("run.info.superseded").yellow()),
    }
    Ok(())
}

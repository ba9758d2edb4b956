use anyhow::{Result, anyhow};
use colored::*;

use crate::{
    cli::{args::BuildArgs, dispatcher::HandlerFuture, handlers::commons},
    core::config_loader::ConfigOverrides,
    models::{BuildOptions, BuildOutcome, RunRequest, SupervisorContext, Target},
};

/// Entry point for the `build` command.
pub fn handle(args: Vec<String>) -> HandlerFuture {
    Box::pin(build(args))
}

async fn build(args: Vec<String>) -> Result<()> {
    let build_args: BuildArgs = commons::parse_args(&args)?;
    let target = Target::from(build_args.target.as_str());

    let extra_args = match &build_args.native_args {
        Some(line) => shlex::split(line)
            .ok_or_else(|| anyhow!(t!("build.error.native_args"), args = line))?,
        None => Vec::new(),
    };
    let options = BuildOptions {
        skip_package: build_args.skip_package,
        open_ide_only: build_args.ide,
        extra_args,
    };

    let root = commons::resolve_project_root(build_args.project)?;
    let overrides = ConfigOverrides {
        app_url: build_args.url,
        https: None,
    };
    let config = commons::load_config(root, &target, &overrides)?;

    let context = SupervisorContext {
        target,
        debug: build_args.debug,
    };
    let supervisor = commons::create_supervisor(&config, context)?;
    let url = config.app_url.clone().unwrap_or_default();

    match supervisor.build(&RunRequest::new(config, url), &options).await? {
        BuildOutcome::Packaged { .. } | BuildOutcome::Skipped | BuildOutcome::IdeOpened => Ok(()),
        BuildOutcome::Superseded => {
            println!("{}", t!("build.info.superseded").yellow());
            Ok(())
        }
        BuildOutcome::NativeBuildFailed { exit } => {
            Err(anyhow!(t!("build.error.native_failed"), exit = exit))
        }
    }
}

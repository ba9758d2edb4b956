use anyhow::{Result, anyhow};
use std::future::Future;
use std::pin::Pin;

use crate::cli::handlers;

/// The future every command handler returns.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<()>>>>;

/// Defines a command, its aliases, and its handler.
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    handler: fn(Vec<String>) -> HandlerFuture,
}

/// The single source of truth for all commands.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "build",
        aliases: &[],
        handler: handlers::build::handle,
    },
    CommandDefinition {
        name: "run",
        aliases: &["dev"],
        handler: handlers::run::handle,
    },
];

/// Finds a command definition in the registry by its name or alias.
fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

/// Routes `caprun <command> [args...]` to its handler.
pub async fn dispatch(all_args: Vec<String>) -> Result<()> {
    log::debug!("Dispatching args: {:?}", all_args);

    let Some((name, rest)) = all_args.split_first() else {
        return Err(anyhow!(t!("cli.error.no_command")));
    };
    let command = find_command(name)
        .ok_or_else(|| anyhow!(t!("cli.error.unknown_command"), name = name))?;

    (command.handler)(rest.to_vec()).await
}

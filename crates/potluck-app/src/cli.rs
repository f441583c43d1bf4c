use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Potluck: shared recipes and a group chat for the cooks.
#[derive(Parser, Debug)]
#[command(name = "potluck", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log filter override (e.g. `debug`, `potluck_chat=trace`).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Use an in-process backend instead of the hosted one.
    #[arg(long)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Join the group chat. Lines are sent as messages; `/delete ID`,
    /// `/reload`, and `/quit` are commands.
    Chat,

    /// Browse the recipe catalog.
    Recipes {
        #[command(subcommand)]
        command: RecipesCommand,
    },

    /// Print the effective config with secrets redacted.
    Config,
}

#[derive(Subcommand, Debug)]
pub enum RecipesCommand {
    /// List recipes, newest first.
    List,
    /// Show one recipe.
    Show { id: String },
}

pub fn parse() -> Args {
    Args::parse()
}

//! potluck: command-line client for the shared recipe catalog and group
//! chat.

mod backend;
mod chat;
mod cli;
mod recipes;

use potluck_common::PotluckError;
use potluck_config::PotluckConfig;
use tracing_subscriber::EnvFilter;

use crate::cli::{Args, Command};

fn load_config(args: &Args) -> PotluckConfig {
    let loaded = match &args.config {
        Some(path) => {
            tracing::info!("Using config override: {}", path.display());
            potluck_config::load_config_from(path)
        }
        None => potluck_config::load_config(),
    };
    loaded.unwrap_or_else(|e| {
        tracing::warn!("Config load failed, using defaults: {e}");
        PotluckConfig::default()
    })
}

async fn run(args: Args, config: PotluckConfig) -> Result<(), PotluckError> {
    if let Command::Config = args.command {
        println!("{}", potluck_config::config_to_json(&config));
        return Ok(());
    }

    let backend = backend::connect(&config, args.offline)?;
    match args.command {
        Command::Chat => chat::run(&backend, &config.chat).await,
        Command::Recipes { command } => recipes::run(&backend, &config.recipes, command).await,
        Command::Config => Ok(()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = cli::parse();

    // The config's own level applies only once it is loaded, so config
    // loading itself logs at the command-line level or the default.
    let initial = args.log_level.clone().unwrap_or_else(|| "potluck=info".into());
    let config = {
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new(&initial))
                .finish(),
        );
        load_config(&args)
    };

    let directive = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.directive());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directive)),
        )
        .init();

    tracing::info!("potluck v{} starting", env!("CARGO_PKG_VERSION"));
    if let Err(e) = run(args, config).await {
        tracing::error!("{e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

//! `authstore` - schema and pruning tool for authstore databases.

mod cli;
mod commands;
mod config;
mod observability;

use anyhow::Result;
use authstore::{KeyKind, Validate};
use clap::Parser;
use uuid::Uuid;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = config::load(cli.config.as_deref(), cli.database_url.as_deref())?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
        config.validate()?;
    }

    observability::init_tracing(&config.log_level);

    match cli.command {
        Commands::Schema(args) => {
            commands::schema::run(&config, args.key_type.map(KeyKind::from), args.apply).await
        }
        Commands::Prune(args) => match config.postgres.key_type {
            KeyKind::Text => commands::prune::run_once::<String>(config, args.older_than).await,
            KeyKind::Bigint => commands::prune::run_once::<i64>(config, args.older_than).await,
            KeyKind::Uuid => commands::prune::run_once::<Uuid>(config, args.older_than).await,
        },
        Commands::Pruner => match config.postgres.key_type {
            KeyKind::Text => commands::prune::run_periodic::<String>(config).await,
            KeyKind::Bigint => commands::prune::run_periodic::<i64>(config).await,
            KeyKind::Uuid => commands::prune::run_periodic::<Uuid>(config).await,
        },
    }
}

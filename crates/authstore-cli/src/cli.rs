use std::path::PathBuf;
use std::time::Duration;

use authstore::KeyKind;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "authstore")]
#[command(about = "Manage the schema and prune stale entries of an authstore database")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./authstore.toml when present)
    #[arg(short, long, global = true, env = "AUTHSTORE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database URL (overrides postgres.url)
    #[arg(long, global = true, env = "AUTHSTORE_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Log level when RUST_LOG is not set (overrides log_level)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print or apply the table definitions
    Schema(SchemaArgs),
    /// Run one pruning pass and print what was removed
    Prune(PruneArgs),
    /// Prune periodically until interrupted
    Pruner,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum KeyType {
    Text,
    Bigint,
    Uuid,
}

impl From<KeyType> for KeyKind {
    fn from(key: KeyType) -> Self {
        match key {
            KeyType::Text => KeyKind::Text,
            KeyType::Bigint => KeyKind::Bigint,
            KeyType::Uuid => KeyKind::Uuid,
        }
    }
}

#[derive(clap::Args)]
pub struct SchemaArgs {
    /// Execute the DDL against the database instead of printing it
    #[arg(long)]
    pub apply: bool,

    /// Key column type (overrides postgres.key_type)
    #[arg(long)]
    pub key_type: Option<KeyType>,
}

#[derive(clap::Args)]
pub struct PruneArgs {
    /// Retention for both tokens and authorizations, e.g. "14d" or "36h"
    #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
    pub older_than: Option<Duration>,
}

//! cardbridge - migrate report cards and their dependencies to another
//! database.

mod commands;
mod settings;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{Engine, MigrateArgs};
use settings::Settings;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "cardbridge")]
#[command(about = "Dependency-aware migration of report cards between SQL dialects")]
struct Args {
    /// Settings file
    #[arg(short, long, default_value = "cardbridge.json")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Migrate one card and every card it depends on
    Migrate {
        #[arg(long)]
        card: i64,
        /// Rewrite only, write nothing
        #[arg(long)]
        dry_run: bool,
        /// Overwrite an existing target card
        #[arg(long)]
        force: bool,
        /// Collection for new cards
        #[arg(long)]
        collection: Option<i64>,
        #[arg(long)]
        deadline_secs: Option<u64>,
    },
    /// Show the migration state of every source card
    Status,
    /// Migrate every card that is ready
    Batch {
        #[arg(long, default_value = "1")]
        concurrency: usize,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        deadline_secs: Option<u64>,
    },
    /// Pre-populate table and field mapping suggestions
    Suggest,
    /// Confirm a table mapping
    MapTable {
        #[arg(long)]
        source: i64,
        #[arg(long)]
        target: i64,
    },
    /// Confirm a field mapping
    MapField {
        #[arg(long)]
        source: i64,
        #[arg(long)]
        target: i64,
    },
    /// List source tables and fields without a target
    Unmatched,
}

fn init_logging(debug: bool, json: bool) {
    let level = if debug { LevelFilter::DEBUG } else { LevelFilter::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    // stdout carries command output
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug, args.log_json);

    let settings = Settings::load(&args.config)?;
    info!(
        "Database {} ({}) -> {} ({})",
        settings.source_database_id,
        settings.source_dialect.display_name(),
        settings.target_database_id,
        settings.target_dialect.display_name()
    );
    let engine = Engine::connect(&settings).await?;

    match args.command {
        Command::Migrate {
            card,
            dry_run,
            force,
            collection,
            deadline_secs,
        } => {
            commands::migrate(
                &engine,
                MigrateArgs {
                    card,
                    dry_run,
                    force,
                    collection,
                    deadline_secs,
                },
            )
            .await
        }
        Command::Status => commands::status(&engine).await,
        Command::Batch {
            concurrency,
            dry_run,
            deadline_secs,
        } => commands::batch(&engine, concurrency, dry_run, deadline_secs).await,
        Command::Suggest => commands::suggest(&engine),
        Command::MapTable { source, target } => commands::map_table(&engine, source, target),
        Command::MapField { source, target } => commands::map_field(&engine, source, target),
        Command::Unmatched => commands::unmatched(&engine),
    }
}

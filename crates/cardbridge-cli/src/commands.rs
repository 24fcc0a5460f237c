//! Command implementations. Every command prints JSON on stdout.

use crate::settings::Settings;
use anyhow::{bail, Context, Result};
use cardbridge_core::{
    BatchOptions, ChatCompletionsOracle, MetabaseClient, MetadataSource, MigrateOptions, Migrator,
    SchemaResolver, SqliteStore,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Wired-up engine for one invocation.
pub struct Engine {
    pub migrator: Migrator,
    pub resolver: Arc<SchemaResolver>,
    source_database_id: i64,
}

impl Engine {
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let source = Arc::new(MetabaseClient::new(
            &settings.metabase_url,
            settings.metabase_api_key()?,
        )?);
        let store = Arc::new(
            SqliteStore::open(&settings.store_path)
                .with_context(|| format!("opening {}", settings.store_path.display()))?,
        );
        let oracle = Arc::new(
            ChatCompletionsOracle::new(settings.oracle_endpoint.clone(), settings.oracle_api_key())?
                .with_model(settings.oracle_model()),
        );

        let source_catalog = source
            .get_schema(settings.source_database_id)
            .await
            .context("loading source schema")?;
        let target_catalog = source
            .get_schema(settings.target_database_id)
            .await
            .context("loading target schema")?;
        info!(
            "Loaded {} source and {} target tables",
            source_catalog.tables.len(),
            target_catalog.tables.len()
        );

        let resolver = Arc::new(SchemaResolver::load(
            store.clone(),
            source_catalog,
            target_catalog,
        )?);
        let migrator = Migrator::new(
            source,
            store,
            resolver.clone(),
            oracle,
            settings.migrator_settings(),
        );

        Ok(Self {
            migrator,
            resolver,
            source_database_id: settings.source_database_id,
        })
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub struct MigrateArgs {
    pub card: i64,
    pub dry_run: bool,
    pub force: bool,
    pub collection: Option<i64>,
    pub deadline_secs: Option<u64>,
}

pub async fn migrate(engine: &Engine, args: MigrateArgs) -> Result<()> {
    let options = MigrateOptions {
        dry_run: args.dry_run,
        force: args.force,
        target_container: args.collection,
    };
    let result = match args.deadline_secs {
        Some(secs) => {
            engine
                .migrator
                .migrate_with_deadline(args.card, &options, Duration::from_secs(secs))
                .await
        }
        None => engine.migrator.migrate(args.card, &options).await,
    };

    match result {
        Ok(card) => print_json(&json!({ "ok": card })),
        Err(err) => {
            print_json(&json!({ "error": err }))?;
            bail!("migration of card {} failed: {}", args.card, err.kind)
        }
    }
}

pub async fn status(engine: &Engine) -> Result<()> {
    let states = engine
        .migrator
        .card_states(engine.source_database_id)
        .await?;
    print_json(&states)
}

pub async fn batch(
    engine: &Engine,
    concurrency: usize,
    dry_run: bool,
    deadline_secs: Option<u64>,
) -> Result<()> {
    let options = BatchOptions {
        concurrency,
        dry_run,
        deadline: deadline_secs.map(Duration::from_secs),
        ..BatchOptions::default()
    };
    let report = engine
        .migrator
        .migrate_ready(engine.source_database_id, &options)
        .await?;
    print_json(&report)
}

pub fn suggest(engine: &Engine) -> Result<()> {
    let tables = engine.resolver.suggest_table_mappings()?;
    let fields = engine.resolver.suggest_field_mappings()?;
    print_json(&json!({ "tables": tables, "fields": fields }))
}

pub fn map_table(engine: &Engine, source: i64, target: i64) -> Result<()> {
    let mapping = engine.resolver.confirm_table(source, target)?;
    print_json(&mapping)
}

pub fn map_field(engine: &Engine, source: i64, target: i64) -> Result<()> {
    let mapping = engine.resolver.confirm_field(source, target)?;
    print_json(&mapping)
}

pub fn unmatched(engine: &Engine) -> Result<()> {
    let (tables, fields) = engine.resolver.unmatched_report();
    print_json(&json!({ "tables": tables, "fields": fields }))
}

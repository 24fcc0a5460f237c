//! Migration orchestrator.
//!
//! [`Migrator::migrate`] moves one card and, recursively, every provider it
//! reads from that has no target counterpart yet:
//!
//! 1. a card already on the current path is a cycle
//! 2. fetch the card
//! 3. migrate unmapped providers first (never forced)
//! 4. an existing card-id mapping short-circuits unless `force` is set
//! 5. rewrite the body: structured ids through the resolver, raw text
//!    through rules and the oracle
//! 6. a dry run stops here and returns the before/after bodies
//! 7. create the target card, or update it under `force`
//! 8. execute it once; raw cards get a bounded repair loop
//! 9. persist the card-id mapping, the only commit point
//!
//! Steps 4 to 9 run under a per-card lock. No lock is held while recursing
//! into providers, so concurrent flows over overlapping graphs cannot
//! deadlock.

mod batch;
mod locks;
mod state;

pub use batch::{BatchOptions, BatchReport};
pub use state::{CardState, CardStatus, HoldReason};

use crate::config::{MigrationConfig, MigratorSettings};
use crate::error::{BridgeError, Result};
use crate::graph::extract_references;
use crate::models::{
    Card, CardDefinition, CardId, ErrorKind, MigratedCard, MigrationError, MigrationOutcome,
    MigrationRecord, MigrationResult, QueryKind, Verification,
};
use crate::network::retry_async;
use crate::oracle::RewriteOracle;
use crate::resolver::SchemaResolver;
use crate::rewrite::{rewrite_template_tags, SchemaContext, StructuredRewriter, TextRewriter};
use crate::source::MetadataSource;
use crate::store::MappingStore;
use futures::future::{BoxFuture, FutureExt};
use locks::CardLocks;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct MigrateOptions {
    /// Rewrite only; nothing is written remotely or to the mapping store.
    pub dry_run: bool,
    /// Overwrite the existing target card instead of short-circuiting.
    pub force: bool,
    /// Collection for newly created cards. Defaults to the source card's.
    pub target_container: Option<i64>,
}

impl MigrateOptions {
    fn for_dependency(&self) -> Self {
        Self {
            dry_run: self.dry_run,
            force: false,
            target_container: self.target_container,
        }
    }
}

/// Rewritten body plus what the rewrite noticed on the way.
struct Rewritten {
    body: Value,
    /// Raw source text after card tags were renumbered. Repairs must keep
    /// its placeholders.
    renumbered_text: Option<String>,
    warnings: Vec<String>,
}

/// Drives card migrations against one source/target database pair.
pub struct Migrator {
    source: Arc<dyn MetadataSource>,
    store: Arc<dyn MappingStore>,
    resolver: Arc<SchemaResolver>,
    text: TextRewriter,
    settings: MigratorSettings,
    locks: CardLocks,
}

impl Migrator {
    pub fn new(
        source: Arc<dyn MetadataSource>,
        store: Arc<dyn MappingStore>,
        resolver: Arc<SchemaResolver>,
        oracle: Arc<dyn RewriteOracle>,
        settings: MigratorSettings,
    ) -> Self {
        let text = TextRewriter::new(oracle, store.clone())
            .with_retry(settings.oracle_retry.clone())
            .with_timeout(settings.oracle_timeout);

        Self {
            source,
            store,
            resolver,
            text,
            settings,
            locks: CardLocks::default(),
        }
    }

    pub fn resolver(&self) -> &Arc<SchemaResolver> {
        &self.resolver
    }

    pub fn settings(&self) -> &MigratorSettings {
        &self.settings
    }

    /// Migrate one card and its unmapped providers.
    pub async fn migrate(&self, card_id: CardId, options: &MigrateOptions) -> MigrationResult {
        self.migrate_with_dependencies(card_id, options, BTreeSet::new())
            .await
    }

    /// [`Migrator::migrate`] bounded by `deadline`.
    ///
    /// On timeout nothing past the last committed mapping survives: the
    /// mapping write is the final step of every card.
    pub async fn migrate_with_deadline(
        &self,
        card_id: CardId,
        options: &MigrateOptions,
        deadline: Duration,
    ) -> MigrationResult {
        match tokio::time::timeout(deadline, self.migrate(card_id, options)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Migration of card {} exceeded {:?}", card_id, deadline);
                let result = Err(MigrationError::new(
                    card_id,
                    ErrorKind::DeadlineExceeded,
                    format!("migration did not finish within {:?}", deadline),
                ));
                if !options.dry_run {
                    self.write_record(card_id, &result);
                }
                result
            }
        }
    }

    /// Recursive entry point. `visited` holds the cards on the current path.
    pub fn migrate_with_dependencies<'a>(
        &'a self,
        card_id: CardId,
        options: &'a MigrateOptions,
        visited: BTreeSet<CardId>,
    ) -> BoxFuture<'a, MigrationResult> {
        async move {
            let result = self.run(card_id, options, visited).await;
            if !options.dry_run {
                self.write_record(card_id, &result);
            }
            match &result {
                Ok(card) => debug!("Card {} finished: {:?}", card_id, card.outcome),
                Err(e) => warn!("Card {} failed: {}", card_id, e),
            }
            result
        }
        .boxed()
    }

    /// Last migration record written for `card_id`.
    pub fn last_record(&self, card_id: CardId) -> Result<Option<MigrationRecord>> {
        let key = record_key(card_id);
        match self.store.get_state(&key)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn write_record(&self, card_id: CardId, result: &MigrationResult) {
        let record = MigrationRecord::from_result(card_id, result);
        let written = serde_json::to_string(&record)
            .map_err(BridgeError::from)
            .and_then(|json| self.store.set_state(&record_key(card_id), &json));
        if let Err(e) = written {
            warn!("Failed to write migration record for card {}: {}", card_id, e);
        }
    }

    async fn run(
        &self,
        card_id: CardId,
        options: &MigrateOptions,
        mut visited: BTreeSet<CardId>,
    ) -> MigrationResult {
        // 1. cycle on the current path
        if !visited.insert(card_id) {
            return Err(MigrationError::new(
                card_id,
                ErrorKind::CircularDependency,
                format!("card {} is part of a dependency cycle", card_id),
            ));
        }

        // 2. fetch
        let card = self.source.get_card(card_id).await.map_err(|e| {
            MigrationError::new(
                card_id,
                ErrorKind::SourceUnavailable,
                format!("could not fetch card: {}", e),
            )
        })?;
        info!("Migrating card {} ({})", card.id, card.name);
        let fail = |kind: ErrorKind, detail: String| {
            MigrationError::new(card_id, kind, detail).with_original(&card.query_body)
        };

        // 3. providers first
        let mut dependencies = Vec::new();
        for provider in extract_references(&card.query_body) {
            if visited.contains(&provider) {
                return Err(fail(
                    ErrorKind::CircularDependency,
                    format!("card {} depends on card {} which is already on the path", card_id, provider),
                ));
            }
            let mapped = self
                .store
                .card_id_mapping(provider)
                .map_err(|e| fail(ErrorKind::Unknown, e.to_string()))?;
            if mapped.is_some() {
                continue;
            }

            let child_options = options.for_dependency();
            match self
                .migrate_with_dependencies(provider, &child_options, visited.clone())
                .await
            {
                Ok(child) => dependencies.push(child),
                Err(child) => {
                    let kind = if child.kind == ErrorKind::CircularDependency {
                        ErrorKind::CircularDependency
                    } else {
                        ErrorKind::DependencyNotMigrated
                    };
                    return Err(fail(
                        kind,
                        format!("dependency card {} failed: {}", provider, child.kind),
                    )
                    .with_cause(child));
                }
            }
        }

        // 4-9 under the card's lock
        let _guard = self.locks.acquire(card_id).await;

        let existing = self
            .store
            .card_id_mapping(card_id)
            .map_err(|e| fail(ErrorKind::Unknown, e.to_string()))?;
        if let (Some(target_card_id), false) = (existing, options.force) {
            info!("Card {} already migrated as {}", card_id, target_card_id);
            return Ok(MigratedCard {
                source_card_id: card_id,
                card_name: card.name.clone(),
                outcome: MigrationOutcome::AlreadyMigrated { target_card_id },
                original_body: card.query_body.clone(),
                migrated_body: None,
                warnings: Vec::new(),
                dependencies,
            });
        }

        let card_map = self
            .store
            .card_id_mappings()
            .map_err(|e| fail(ErrorKind::Unknown, e.to_string()))?;
        let ctx = self
            .resolver
            .schema_context(self.settings.source_dialect, self.settings.target_dialect);

        // 5. rewrite
        let rewritten = match card.query_kind {
            QueryKind::Structured => self.rewrite_structured(&card, &card_map, options)?,
            QueryKind::Raw => self.rewrite_raw(&card, &card_map, &ctx, options).await?,
        };

        // 6. dry run
        if options.dry_run {
            return Ok(MigratedCard {
                source_card_id: card_id,
                card_name: card.name.clone(),
                outcome: MigrationOutcome::DryRun,
                original_body: card.query_body.clone(),
                migrated_body: Some(rewritten.body),
                warnings: rewritten.warnings,
                dependencies,
            });
        }

        // 7. create or update
        let container = options.target_container.or(card.collection_id);
        let definition =
            card.to_definition(rewritten.body, self.settings.target_system_id, container);
        let (target_card_id, updated) = match existing {
            Some(target) => {
                self.source
                    .update_object(target, &definition)
                    .await
                    .map_err(|e| {
                        fail(ErrorKind::TargetApiError, format!("update of card {} failed: {}", target, e))
                            .with_migrated(Some(definition.query_body.clone()))
                    })?;
                (target, true)
            }
            None => {
                let created = self.source.create_object(&definition).await.map_err(|e| {
                    fail(ErrorKind::TargetApiError, format!("create failed: {}", e))
                        .with_migrated(Some(definition.query_body.clone()))
                })?;
                (created, false)
            }
        };
        info!(
            "Card {} {} as {}",
            card_id,
            if updated { "updated" } else { "created" },
            target_card_id
        );

        // 8. verify
        let (verification, final_body) = self
            .verify(
                &card,
                target_card_id,
                definition,
                rewritten.renumbered_text.as_deref(),
                &ctx,
            )
            .await;

        // 9. commit
        self.store
            .set_card_id_mapping(card_id, target_card_id)
            .map_err(|e| {
                fail(ErrorKind::Unknown, format!("failed to persist card mapping: {}", e))
                    .with_migrated(Some(final_body.clone()))
            })?;

        Ok(MigratedCard {
            source_card_id: card_id,
            card_name: card.name.clone(),
            outcome: MigrationOutcome::Migrated {
                target_card_id,
                verification,
                updated,
            },
            original_body: card.query_body.clone(),
            migrated_body: Some(final_body),
            warnings: rewritten.warnings,
            dependencies,
        })
    }

    fn rewrite_structured(
        &self,
        card: &Card,
        card_map: &BTreeMap<CardId, CardId>,
        options: &MigrateOptions,
    ) -> std::result::Result<Rewritten, MigrationError> {
        let fail = |kind: ErrorKind, detail: String| {
            MigrationError::new(card.id, kind, detail).with_original(&card.query_body)
        };

        let rewrite = StructuredRewriter::new(&self.resolver, card_map)
            .rewrite_body(&card.query_body)
            .map_err(|e| fail(ErrorKind::TranslationFailed, e.to_string()))?;

        let gap = |kind: ErrorKind, detail: String| {
            fail(kind, detail)
                .with_migrated(Some(rewrite.body.clone()))
                .with_unmatched(rewrite.unmatched_tables.clone(), rewrite.unmatched_fields.clone())
                .with_warnings(rewrite.warnings.clone())
        };

        if !rewrite.unmatched_tables.is_empty() {
            let labels: Vec<&str> = rewrite.unmatched_tables.iter().map(|t| t.label.as_str()).collect();
            return Err(gap(
                ErrorKind::MissingMappingTable,
                format!("no target table for {}", labels.join(", ")),
            ));
        }
        if !rewrite.unmatched_fields.is_empty() {
            let labels: Vec<String> = rewrite.unmatched_fields.iter().map(|f| f.label()).collect();
            return Err(gap(
                ErrorKind::MissingMappingField,
                format!("no target field for {}", labels.join(", ")),
            ));
        }
        if !rewrite.unresolved_cards.is_empty() && !options.dry_run {
            return Err(gap(
                ErrorKind::DependencyNotMigrated,
                format!("referenced cards have no target: {:?}", rewrite.unresolved_cards),
            ));
        }

        Ok(Rewritten {
            body: rewrite.body,
            renumbered_text: None,
            warnings: rewrite.warnings,
        })
    }

    async fn rewrite_raw(
        &self,
        card: &Card,
        card_map: &BTreeMap<CardId, CardId>,
        ctx: &SchemaContext,
        options: &MigrateOptions,
    ) -> std::result::Result<Rewritten, MigrationError> {
        let fail = |kind: ErrorKind, detail: String| {
            MigrationError::new(card.id, kind, detail).with_original(&card.query_body)
        };

        let tags = rewrite_template_tags(&card.query_body, card_map, &self.resolver);
        let warnings: Vec<String> = tags
            .unresolved_cards
            .iter()
            .map(|id| format!("card {} has not been migrated; template tag left unchanged", id))
            .collect();

        if !tags.unmatched_fields.is_empty() {
            let labels: Vec<String> = tags.unmatched_fields.iter().map(|f| f.label()).collect();
            return Err(fail(
                ErrorKind::MissingMappingField,
                format!("no target field for filter {}", labels.join(", ")),
            )
            .with_migrated(Some(tags.body.clone()))
            .with_unmatched(Vec::new(), tags.unmatched_fields.clone()));
        }
        if !tags.unresolved_cards.is_empty() && !options.dry_run {
            return Err(fail(
                ErrorKind::DependencyNotMigrated,
                format!("referenced cards have no target: {:?}", tags.unresolved_cards),
            )
            .with_warnings(warnings));
        }

        let Some(text) = tags.body.get("query").and_then(Value::as_str) else {
            return Err(fail(
                ErrorKind::TranslationFailed,
                "raw card has no query text".to_string(),
            ));
        };
        let renumbered_text = text.to_string();

        let translated = self.text.rewrite_text(&renumbered_text, ctx).await.map_err(|e| {
            let kind = match e {
                BridgeError::TranslationFailed { .. } => ErrorKind::TranslationFailed,
                _ => ErrorKind::Unknown,
            };
            fail(kind, e.to_string()).with_warnings(warnings.clone())
        })?;

        let mut body = tags.body;
        body["query"] = Value::String(translated);
        Ok(Rewritten {
            body,
            renumbered_text: Some(renumbered_text),
            warnings,
        })
    }

    /// Execute the new card; repair raw text while it keeps failing.
    ///
    /// Returns the verification and the body the target ends up with.
    async fn verify(
        &self,
        card: &Card,
        target_card_id: CardId,
        definition: CardDefinition,
        renumbered_text: Option<&str>,
        ctx: &SchemaContext,
    ) -> (Verification, Value) {
        let mut current = definition;
        let mut error = match self.execute_with_retry(target_card_id).await {
            None => {
                return (
                    Verification::Verified { repair_attempts: 0 },
                    current.query_body,
                )
            }
            Some(error) => error,
        };

        let mut repair_attempts = 0;

        if let (QueryKind::Raw, Some(original_text)) = (card.query_kind, renumbered_text) {
            while repair_attempts < self.settings.max_repair_attempts {
                let current_text = current
                    .query_body
                    .get("query")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let Some(candidate) = self
                    .text
                    .repair_with_oracle(original_text, &current_text, &error, ctx)
                    .await
                else {
                    break;
                };
                repair_attempts += 1;

                let repaired = current.with_raw_text(&candidate);
                if let Err(e) = self.source.update_object(target_card_id, &repaired).await {
                    warn!("Could not write repair {} for card {}: {}", repair_attempts, target_card_id, e);
                    break;
                }
                current = repaired;

                match self.execute_with_retry(target_card_id).await {
                    None => {
                        info!("Card {} verified after {} repairs", target_card_id, repair_attempts);
                        return (Verification::Verified { repair_attempts }, current.query_body);
                    }
                    Some(next) => error = next,
                }
            }
        }

        warn!(
            "Card {} kept unverified after {} repairs: {}",
            target_card_id, repair_attempts, error
        );
        (
            Verification::Unverified {
                error,
                repair_attempts,
            },
            current.query_body,
        )
    }

    /// Run the card, retrying transient failures. `None` means it ran cleanly.
    async fn execute_with_retry(&self, target_card_id: CardId) -> Option<String> {
        let source = &self.source;
        let (result, _) = retry_async(
            &self.settings.verify_retry,
            "card execution",
            move || async move { source.execute(target_card_id).await },
            |e: &BridgeError| e.is_retryable(),
        )
        .await;

        match result {
            Ok(report) => report.error,
            Err(e) => Some(format!("execution request failed: {}", e)),
        }
    }
}

fn record_key(card_id: CardId) -> String {
    format!("{}{}", MigrationConfig::RECORD_KEY_PREFIX, card_id)
}

//! Whole-database views: card states and batch migration of ready cards.

use super::state::{classify, CardState, CardStatus, Snapshot};
use super::{MigrateOptions, Migrator};
use crate::config::MigrationConfig;
use crate::error::Result;
use crate::graph::DependencyGraph;
use crate::models::{CardId, MigratedCard, MigrationError, MigrationRecord, SystemId};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{info, warn};

/// Options for [`Migrator::migrate_ready`].
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Cards migrated at the same time.
    pub concurrency: usize,
    /// Per-card deadline.
    pub deadline: Option<Duration>,
    pub dry_run: bool,
    pub target_container: Option<i64>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: MigrationConfig::DEFAULT_BATCH_CONCURRENCY,
            deadline: Some(MigrationConfig::DEFAULT_DEADLINE),
            dry_run: false,
            target_container: None,
        }
    }
}

/// What a batch did, card by card.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub migrated: Vec<MigratedCard>,
    pub failed: Vec<MigrationError>,
    /// Cards that were not ready and were left alone.
    pub skipped: Vec<CardStatus>,
}

impl BatchReport {
    pub fn attempted(&self) -> usize {
        self.migrated.len() + self.failed.len()
    }
}

impl Migrator {
    /// State of every card of `system_id`.
    pub async fn card_states(&self, system_id: SystemId) -> Result<Vec<CardStatus>> {
        let cards = self.source.list_cards(system_id).await?;
        let graph = DependencyGraph::build(&cards);
        let card_map = self.store.card_id_mappings()?;

        let mut records: BTreeMap<CardId, MigrationRecord> = BTreeMap::new();
        for card in &cards {
            if let Some(record) = self.last_record(card.id)? {
                records.insert(card.id, record);
            }
        }

        let in_flight = |id: CardId| self.locks.is_in_flight(id);
        let snapshot = Snapshot {
            graph: &graph,
            card_map: &card_map,
            records: &records,
            in_flight: &in_flight,
        };
        Ok(classify(&cards, &snapshot))
    }

    /// Migrate every card of `system_id` that is ready right now.
    ///
    /// Cards run in dependency order, at most `concurrency` at a time. A
    /// failing card is reported and never stops the batch.
    pub async fn migrate_ready(
        &self,
        system_id: SystemId,
        options: &BatchOptions,
    ) -> Result<BatchReport> {
        let states = self.card_states(system_id).await?;
        let cards = self.source.list_cards(system_id).await?;
        let order = DependencyGraph::build(&cards).migration_order();

        let (ready, skipped): (Vec<CardStatus>, Vec<CardStatus>) = states
            .into_iter()
            .partition(|status| status.state == CardState::Ready);
        let ready_ids: BTreeSet<CardId> = ready.iter().map(|s| s.card_id).collect();
        let queue: Vec<CardId> = order
            .into_iter()
            .filter(|id| ready_ids.contains(id))
            .collect();

        info!(
            "Batch over database {}: {} ready, {} skipped",
            system_id,
            queue.len(),
            skipped.len()
        );

        let migrate_options = MigrateOptions {
            dry_run: options.dry_run,
            force: false,
            target_container: options.target_container,
        };
        let migrate_options = &migrate_options;

        let results: Vec<_> = stream::iter(queue)
            .map(|card_id| async move {
                match options.deadline {
                    Some(deadline) => {
                        self.migrate_with_deadline(card_id, migrate_options, deadline)
                            .await
                    }
                    None => self.migrate(card_id, migrate_options).await,
                }
            })
            .buffer_unordered(options.concurrency.max(1))
            .collect()
            .await;

        let mut report = BatchReport {
            skipped,
            ..BatchReport::default()
        };
        for result in results {
            match result {
                Ok(card) => report.migrated.push(card),
                Err(e) => {
                    warn!("Batch: {}", e);
                    report.failed.push(e);
                }
            }
        }
        report.migrated.sort_by_key(|c| c.source_card_id);
        report.failed.sort_by_key(|e| e.card_id);

        info!(
            "Batch finished: {} migrated, {} failed",
            report.migrated.len(),
            report.failed.len()
        );
        Ok(report)
    }
}

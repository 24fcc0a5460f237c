//! Card states, computed on demand from the graph, the card-id mapping and
//! the last migration record.

use crate::graph::DependencyGraph;
use crate::models::{Card, CardId, ErrorKind, MigrationRecord, QueryKind, RecordStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Why a card cannot be migrated yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum HoldReason {
    /// Waiting on providers that are themselves on hold.
    BlockedBy { providers: Vec<CardId> },
    /// A raw card; moves only when requested explicitly.
    NeedsTranslation,
    /// Member of a dependency cycle.
    Cycle { members: Vec<CardId> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CardState {
    /// Has providers that still need migrating.
    Unmigrated,
    /// Every provider is mapped.
    Ready,
    Migrating,
    AlreadyMigrated { target_card_id: CardId },
    /// Migrated by this tool; `verified` is false when repairs ran out.
    Migrated { target_card_id: CardId, verified: bool },
    Failed { kind: ErrorKind, detail: String },
    OnHold(HoldReason),
}

/// A card with its computed state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardStatus {
    pub card_id: CardId,
    pub name: String,
    pub query_kind: QueryKind,
    #[serde(flatten)]
    pub state: CardState,
}

/// Inputs the classifier needs beyond the cards themselves.
pub(crate) struct Snapshot<'a> {
    pub graph: &'a DependencyGraph,
    pub card_map: &'a BTreeMap<CardId, CardId>,
    pub records: &'a BTreeMap<CardId, MigrationRecord>,
    pub in_flight: &'a dyn Fn(CardId) -> bool,
}

/// Classify every card in `cards`.
pub(crate) fn classify(cards: &[Card], snapshot: &Snapshot<'_>) -> Vec<CardStatus> {
    let kinds: BTreeMap<CardId, QueryKind> = cards.iter().map(|c| (c.id, c.query_kind)).collect();

    let mut cycle_members: BTreeMap<CardId, Vec<CardId>> = BTreeMap::new();
    for cycle in snapshot.graph.find_cycles() {
        for &id in &cycle {
            cycle_members.insert(id, cycle.clone());
        }
    }

    let is_migrated = |id: CardId| snapshot.card_map.contains_key(&id);
    let blocked: BTreeSet<CardId> = snapshot.graph.blocked_cards(is_migrated, |id| {
        kinds.get(&id).is_some_and(QueryKind::needs_translation)
    });

    cards
        .iter()
        .map(|card| {
            let state = state_of(card, snapshot, &cycle_members, &blocked);
            CardStatus {
                card_id: card.id,
                name: card.name.clone(),
                query_kind: card.query_kind,
                state,
            }
        })
        .collect()
}

fn state_of(
    card: &Card,
    snapshot: &Snapshot<'_>,
    cycle_members: &BTreeMap<CardId, Vec<CardId>>,
    blocked: &BTreeSet<CardId>,
) -> CardState {
    let id = card.id;
    let record = snapshot.records.get(&id);

    if (snapshot.in_flight)(id) {
        return CardState::Migrating;
    }

    if let Some(&target_card_id) = snapshot.card_map.get(&id) {
        return match record.map(|r| &r.status) {
            Some(RecordStatus::Migrated {
                target_card_id: recorded,
                verification,
            }) if *recorded == target_card_id => CardState::Migrated {
                target_card_id,
                verified: verification.is_verified(),
            },
            _ => CardState::AlreadyMigrated { target_card_id },
        };
    }

    if let Some(members) = cycle_members.get(&id) {
        return CardState::OnHold(HoldReason::Cycle {
            members: members.clone(),
        });
    }

    if blocked.contains(&id) {
        if card.query_kind.needs_translation() {
            return CardState::OnHold(HoldReason::NeedsTranslation);
        }
        let providers = snapshot
            .graph
            .dependencies(id)
            .filter(|p| blocked.contains(p))
            .collect();
        return CardState::OnHold(HoldReason::BlockedBy { providers });
    }

    if let Some(RecordStatus::Failed { kind, detail }) = record.map(|r| &r.status) {
        return CardState::Failed {
            kind: *kind,
            detail: detail.clone(),
        };
    }

    if snapshot
        .graph
        .dependencies(id)
        .all(|p| snapshot.card_map.contains_key(&p))
    {
        CardState::Ready
    } else {
        CardState::Unmigrated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Verification;
    use serde_json::{json, Value};

    fn card(id: CardId, kind: QueryKind, body: Value) -> Card {
        Card {
            id,
            name: format!("card {}", id),
            query_kind: kind,
            query_body: body,
            source_system_id: 1,
            description: None,
            collection_id: None,
            display: "table".into(),
            visualization_settings: json!({}),
        }
    }

    fn structured(id: CardId, source: Value) -> Card {
        card(id, QueryKind::Structured, json!({ "source-table": source }))
    }

    fn unverified(card_id: CardId, target_card_id: CardId) -> MigrationRecord {
        MigrationRecord::new(
            card_id,
            RecordStatus::Migrated {
                target_card_id,
                verification: Verification::Unverified {
                    error: "syntax error".into(),
                    repair_attempts: 3,
                },
            },
        )
    }

    fn failed(card_id: CardId) -> MigrationRecord {
        MigrationRecord::new(
            card_id,
            RecordStatus::Failed {
                kind: ErrorKind::MissingMappingField,
                detail: "detail".into(),
            },
        )
    }

    fn states(
        cards: &[Card],
        card_map: BTreeMap<CardId, CardId>,
        records: BTreeMap<CardId, MigrationRecord>,
    ) -> BTreeMap<CardId, CardState> {
        let graph = DependencyGraph::build(cards);
        let in_flight = |id: CardId| id == 7;
        let snapshot = Snapshot {
            graph: &graph,
            card_map: &card_map,
            records: &records,
            in_flight: &in_flight,
        };
        classify(cards, &snapshot)
            .into_iter()
            .map(|s| (s.card_id, s.state))
            .collect()
    }

    #[test]
    fn test_raw_provider_holds_consumers() {
        let cards = vec![
            card(99, QueryKind::Raw, json!({"query": "select 1"})),
            structured(100, json!("embedded-card:99")),
            structured(101, json!("embedded-card:100")),
            structured(102, json!(10)),
        ];

        let states = states(&cards, BTreeMap::new(), BTreeMap::new());
        assert_eq!(states[&99], CardState::OnHold(HoldReason::NeedsTranslation));
        assert_eq!(
            states[&100],
            CardState::OnHold(HoldReason::BlockedBy { providers: vec![99] })
        );
        assert_eq!(
            states[&101],
            CardState::OnHold(HoldReason::BlockedBy { providers: vec![100] })
        );
        assert_eq!(states[&102], CardState::Ready);
    }

    #[test]
    fn test_migrated_provider_releases_consumers() {
        let cards = vec![
            card(99, QueryKind::Raw, json!({"query": "select 1"})),
            structured(100, json!("embedded-card:99")),
            structured(101, json!("embedded-card:100")),
        ];
        let card_map = BTreeMap::from([(99, 1099)]);
        let records = BTreeMap::from([(99, unverified(99, 1099))]);

        let states = states(&cards, card_map, records);
        assert_eq!(
            states[&99],
            CardState::Migrated {
                target_card_id: 1099,
                verified: false
            }
        );
        assert_eq!(states[&100], CardState::Ready);
        assert_eq!(states[&101], CardState::Unmigrated);
    }

    #[test]
    fn test_cycles_failures_and_in_flight() {
        let cards = vec![
            structured(1, json!("embedded-card:2")),
            structured(2, json!("embedded-card:1")),
            structured(5, json!(10)),
            structured(6, json!(10)),
            structured(7, json!(10)),
        ];
        let card_map = BTreeMap::from([(6, 60)]);
        let records = BTreeMap::from([(5, failed(5))]);

        let states = states(&cards, card_map, records);
        assert_eq!(
            states[&1],
            CardState::OnHold(HoldReason::Cycle { members: vec![1, 2] })
        );
        assert!(matches!(
            states[&5],
            CardState::Failed {
                kind: ErrorKind::MissingMappingField,
                ..
            }
        ));
        assert_eq!(states[&6], CardState::AlreadyMigrated { target_card_id: 60 });
        assert_eq!(states[&7], CardState::Migrating);
    }
}

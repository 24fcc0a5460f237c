//! Typed outcomes of a migration call.

use super::{CardId, UnmatchedField, UnmatchedTable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Closed taxonomy of migration failures surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CircularDependency,
    SourceUnavailable,
    DependencyNotMigrated,
    MissingMappingTable,
    MissingMappingField,
    TranslationFailed,
    TargetApiError,
    DeadlineExceeded,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::CircularDependency => "circular_dependency",
            ErrorKind::SourceUnavailable => "source_unavailable",
            ErrorKind::DependencyNotMigrated => "dependency_not_migrated",
            ErrorKind::MissingMappingTable => "missing_mapping_table",
            ErrorKind::MissingMappingField => "missing_mapping_field",
            ErrorKind::TranslationFailed => "translation_failed",
            ErrorKind::TargetApiError => "target_api_error",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the created card was shown to run in the target system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verification {
    Verified {
        /// Repairs applied before the card ran cleanly.
        repair_attempts: u32,
    },
    /// The card was kept although its last execution failed.
    Unverified {
        error: String,
        repair_attempts: u32,
    },
}

impl Verification {
    pub fn is_verified(&self) -> bool {
        matches!(self, Verification::Verified { .. })
    }
}

/// Successful outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MigrationOutcome {
    Migrated {
        target_card_id: CardId,
        verification: Verification,
        /// An existing target was overwritten (`force`).
        updated: bool,
    },
    AlreadyMigrated {
        target_card_id: CardId,
    },
    /// Rewritten for review only; nothing was written remotely.
    DryRun,
}

/// A card that migrated, was already migrated, or passed a dry run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigratedCard {
    pub source_card_id: CardId,
    pub card_name: String,
    pub outcome: MigrationOutcome,
    pub original_body: Value,
    pub migrated_body: Option<Value>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Results of dependencies migrated on the way.
    #[serde(default)]
    pub dependencies: Vec<MigratedCard>,
}

impl MigratedCard {
    pub fn target_card_id(&self) -> Option<CardId> {
        match &self.outcome {
            MigrationOutcome::Migrated { target_card_id, .. }
            | MigrationOutcome::AlreadyMigrated { target_card_id } => Some(*target_card_id),
            MigrationOutcome::DryRun => None,
        }
    }
}

/// A failed migration with everything a reviewer needs to act on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind} for card {card_id}: {detail}")]
pub struct MigrationError {
    pub card_id: CardId,
    pub kind: ErrorKind,
    pub detail: String,
    /// Absent when the card was never fetched.
    pub original_body: Option<Value>,
    pub migrated_body: Option<Value>,
    #[serde(default)]
    pub unmatched_tables: Vec<UnmatchedTable>,
    #[serde(default)]
    pub unmatched_fields: Vec<UnmatchedField>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// The dependency failure that caused this one.
    pub cause: Option<Box<MigrationError>>,
}

impl MigrationError {
    pub fn new(card_id: CardId, kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            card_id,
            kind,
            detail: detail.into(),
            original_body: None,
            migrated_body: None,
            unmatched_tables: Vec::new(),
            unmatched_fields: Vec::new(),
            warnings: Vec::new(),
            cause: None,
        }
    }

    pub fn with_original(mut self, body: &Value) -> Self {
        self.original_body = Some(body.clone());
        self
    }

    pub fn with_migrated(mut self, body: Option<Value>) -> Self {
        self.migrated_body = body;
        self
    }

    pub fn with_unmatched(
        mut self,
        tables: Vec<UnmatchedTable>,
        fields: Vec<UnmatchedField>,
    ) -> Self {
        self.unmatched_tables = tables;
        self.unmatched_fields = fields;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_cause(mut self, cause: MigrationError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Deepest failure in the dependency chain.
    pub fn root_cause(&self) -> &MigrationError {
        let mut current = self;
        while let Some(cause) = &current.cause {
            current = cause;
        }
        current
    }
}

/// Outcome of one orchestration call.
pub type MigrationResult = std::result::Result<MigratedCard, MigrationError>;

/// What the last migration call did to a card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordStatus {
    Migrated {
        target_card_id: CardId,
        verification: Verification,
    },
    AlreadyMigrated {
        target_card_id: CardId,
    },
    DryRun,
    Failed {
        kind: ErrorKind,
        detail: String,
    },
}

/// Per-card summary persisted in the mapping store's keyed state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub card_id: CardId,
    pub status: RecordStatus,
    pub recorded_at: DateTime<Utc>,
}

impl MigrationRecord {
    pub fn new(card_id: CardId, status: RecordStatus) -> Self {
        Self {
            card_id,
            status,
            recorded_at: Utc::now(),
        }
    }

    pub fn from_result(card_id: CardId, result: &MigrationResult) -> Self {
        let status = match result {
            Ok(card) => match &card.outcome {
                MigrationOutcome::Migrated {
                    target_card_id,
                    verification,
                    ..
                } => RecordStatus::Migrated {
                    target_card_id: *target_card_id,
                    verification: verification.clone(),
                },
                MigrationOutcome::AlreadyMigrated { target_card_id } => {
                    RecordStatus::AlreadyMigrated {
                        target_card_id: *target_card_id,
                    }
                }
                MigrationOutcome::DryRun => RecordStatus::DryRun,
            },
            Err(err) => RecordStatus::Failed {
                kind: err.kind,
                detail: err.detail.clone(),
            },
        };
        Self::new(card_id, status)
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.status {
            RecordStatus::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

//! Centralized configuration for cardbridge.
//!
//! Constant holders for the oracle, the migration pipeline, the schema
//! resolver and HTTP access, plus the runtime [`MigratorSettings`] a caller
//! builds once and hands to the [`crate::Migrator`].

use crate::models::SystemId;
use crate::network::RetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rewrite oracle limits and protocol tokens.
pub struct OracleConfig;

impl OracleConfig {
    /// Token the oracle must answer with instead of guessing a translation.
    pub const FAILURE_SENTINEL: &'static str = "UNTRANSLATABLE";
    pub const MAX_ATTEMPTS: u32 = 4;
    pub const BASE_DELAY: Duration = Duration::from_secs(2);
    pub const MAX_DELAY: Duration = Duration::from_secs(30);
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini";
}

/// Migration pipeline limits.
pub struct MigrationConfig;

impl MigrationConfig {
    pub const MAX_REPAIR_ATTEMPTS: u32 = 3;
    pub const VERIFY_ATTEMPTS: u32 = 3;
    pub const VERIFY_BASE_DELAY: Duration = Duration::from_secs(1);
    pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(300);
    pub const DEFAULT_BATCH_CONCURRENCY: usize = 1;
    /// Keyed-state prefix for per-card migration records.
    pub const RECORD_KEY_PREFIX: &'static str = "migration:";
}

/// Scores used by the bulk suggestion pass.
pub struct ResolverConfig;

impl ResolverConfig {
    pub const EXACT_NAME_SCORE: f64 = 1.0;
    pub const DISPLAY_NAME_SCORE: f64 = 0.95;
    pub const NORMALIZED_NAME_SCORE: f64 = 0.92;
    pub const SUBSTRING_SCORE: f64 = 0.75;
    /// Ranking bonus for byte-identical table names.
    pub const IDENTICAL_TABLE_NAME_BONUS: f64 = 0.1;
    pub const MAX_ALTERNATIVES: usize = 3;
    /// Shortest normalized name considered for substring overlap.
    pub const MIN_SUBSTRING_LEN: usize = 3;
    pub const MAX_FIELD_CANDIDATES: usize = 10;
}

/// HTTP access to the metadata API and the oracle endpoint.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const USER_AGENT: &'static str = "cardbridge/0.3";
    pub const API_KEY_HEADER: &'static str = "x-api-key";
}

/// SQL dialect of a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    ClickHouse,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::ClickHouse => "clickhouse",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Dialect::Postgres => "PostgreSQL",
            Dialect::ClickHouse => "ClickHouse",
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime settings for a [`crate::Migrator`].
#[derive(Debug, Clone)]
pub struct MigratorSettings {
    /// Metadata-source database the cards are read from.
    pub source_system_id: SystemId,
    /// Database new cards are created against.
    pub target_system_id: SystemId,
    pub source_dialect: Dialect,
    pub target_dialect: Dialect,
    pub max_repair_attempts: u32,
    /// Backoff for transient errors while executing a new card.
    pub verify_retry: RetryConfig,
    /// Backoff for oracle rate-limit responses.
    pub oracle_retry: RetryConfig,
    /// Upper bound for a single oracle call.
    pub oracle_timeout: Duration,
}

impl MigratorSettings {
    pub fn new(source_system_id: SystemId, target_system_id: SystemId) -> Self {
        Self {
            source_system_id,
            target_system_id,
            source_dialect: Dialect::Postgres,
            target_dialect: Dialect::ClickHouse,
            max_repair_attempts: MigrationConfig::MAX_REPAIR_ATTEMPTS,
            verify_retry: RetryConfig::new()
                .with_max_attempts(MigrationConfig::VERIFY_ATTEMPTS)
                .with_base_delay(MigrationConfig::VERIFY_BASE_DELAY),
            oracle_retry: RetryConfig::new()
                .with_max_attempts(OracleConfig::MAX_ATTEMPTS)
                .with_base_delay(OracleConfig::BASE_DELAY)
                .with_max_delay(OracleConfig::MAX_DELAY),
            oracle_timeout: OracleConfig::REQUEST_TIMEOUT,
        }
    }

    pub fn with_dialects(mut self, source: Dialect, target: Dialect) -> Self {
        self.source_dialect = source;
        self.target_dialect = target;
        self
    }

    pub fn with_max_repair_attempts(mut self, attempts: u32) -> Self {
        self.max_repair_attempts = attempts;
        self
    }

    pub fn with_verify_retry(mut self, retry: RetryConfig) -> Self {
        self.verify_retry = retry;
        self
    }

    pub fn with_oracle_retry(mut self, retry: RetryConfig) -> Self {
        self.oracle_retry = retry;
        self
    }

    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = timeout;
        self
    }
}

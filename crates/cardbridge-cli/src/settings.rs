//! JSON settings file for the command-line front end.
//!
//! Secrets never live in the file: it names the environment variables that
//! hold them.

use cardbridge_core::config::{Dialect, MigratorSettings, OracleConfig};
use cardbridge_core::{BridgeError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

fn default_metabase_key_env() -> String {
    "METABASE_API_KEY".to_string()
}

fn default_oracle_key_env() -> String {
    "ORACLE_API_KEY".to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("cardbridge.db")
}

fn default_source_dialect() -> Dialect {
    Dialect::Postgres
}

fn default_target_dialect() -> Dialect {
    Dialect::ClickHouse
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Base URL of the BI instance.
    pub metabase_url: String,
    #[serde(default = "default_metabase_key_env")]
    pub metabase_api_key_env: String,
    /// OpenAI-compatible chat-completions endpoint.
    pub oracle_endpoint: String,
    #[serde(default = "default_oracle_key_env")]
    pub oracle_api_key_env: String,
    #[serde(default)]
    pub oracle_model: Option<String>,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    pub source_database_id: i64,
    pub target_database_id: i64,
    #[serde(default = "default_source_dialect")]
    pub source_dialect: Dialect,
    #[serde(default = "default_target_dialect")]
    pub target_dialect: Dialect,
    #[serde(default)]
    pub max_repair_attempts: Option<u32>,
    #[serde(default)]
    pub oracle_timeout_secs: Option<u64>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| BridgeError::Io {
            message: format!("cannot read settings: {}", e),
            path: Some(path.to_path_buf()),
            source: Some(e),
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(text).map_err(|e| BridgeError::Config {
            message: format!("invalid settings file: {}", e),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("metabase_url", &self.metabase_url),
            ("oracle_endpoint", &self.oracle_endpoint),
        ] {
            if url::Url::parse(url).is_err() {
                return Err(config_error(format!("{} is not a valid URL: {}", name, url)));
            }
        }
        if self.source_database_id == self.target_database_id {
            return Err(config_error(
                "source_database_id and target_database_id must differ",
            ));
        }
        if self.source_dialect == self.target_dialect {
            return Err(config_error("source and target dialects are identical"));
        }
        if self.oracle_timeout_secs == Some(0) {
            return Err(config_error("oracle_timeout_secs must be positive"));
        }
        Ok(())
    }

    /// BI API key from the environment.
    pub fn metabase_api_key(&self) -> Result<String> {
        std::env::var(&self.metabase_api_key_env).map_err(|_| {
            config_error(format!(
                "environment variable {} is not set",
                self.metabase_api_key_env
            ))
        })
    }

    /// Oracle API key from the environment; optional for local endpoints.
    pub fn oracle_api_key(&self) -> Option<String> {
        std::env::var(&self.oracle_api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
    }

    pub fn oracle_model(&self) -> &str {
        self.oracle_model
            .as_deref()
            .unwrap_or(OracleConfig::DEFAULT_MODEL)
    }

    pub fn migrator_settings(&self) -> MigratorSettings {
        let mut settings = MigratorSettings::new(self.source_database_id, self.target_database_id)
            .with_dialects(self.source_dialect, self.target_dialect);
        if let Some(attempts) = self.max_repair_attempts {
            settings = settings.with_max_repair_attempts(attempts);
        }
        if let Some(secs) = self.oracle_timeout_secs {
            settings = settings.with_oracle_timeout(std::time::Duration::from_secs(secs));
        }
        settings
    }
}

fn config_error(message: impl Into<String>) -> BridgeError {
    BridgeError::Config {
        message: message.into(),
    }
}

//! Engine configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of rows per emitted record batch.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rows per output batch when the caller does not ask for a size.
    pub batch_size: usize,

    /// Optional seed for deterministic sampling/shuffling.
    pub seed: Option<u64>,

    /// Table name under which `select_sql` sees its parent dataset.
    pub sql_table: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            seed: None,
            sql_table: "self".to_string(),
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `SPECGRAPH_BATCH_SIZE`: rows per output batch
    /// - `SPECGRAPH_SEED`: random seed for sample/shuffle
    /// - `SPECGRAPH_SQL_TABLE`: table name bound to the parent in SQL queries
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("SPECGRAPH_BATCH_SIZE") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.batch_size = v;
            }
        }

        if let Ok(s) = std::env::var("SPECGRAPH_SEED") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.seed = Some(v);
            }
        }

        if let Ok(s) = std::env::var("SPECGRAPH_SQL_TABLE") {
            if !s.trim().is_empty() {
                cfg.sql_table = s.trim().to_string();
            }
        }

        cfg
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".into()));
        }
        if self.sql_table.is_empty() {
            return Err(Error::Config("sql_table must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = EngineConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(cfg.sql_table, "self");
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let cfg = EngineConfig::default().with_batch_size(0);
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }
}

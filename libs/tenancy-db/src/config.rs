//! Layered configuration: built-in defaults, then a YAML file, then
//! `TENANCY__`-prefixed environment variables (`__` separates sections, e.g.
//! `TENANCY__DATABASE__ACTIVE_ENGINE=sqlx`).

use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use tenancy_query::QueryLimits;

use crate::ConnectOpts;
use crate::engine::Engine;
use crate::error::{DataError, Result};

pub const ENV_PREFIX: &str = "TENANCY__";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    pub database: DatabaseConfig,
    pub pagination: QueryLimits,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub dsn: String,
    /// Engine serving writes; the other one stays available as standby.
    pub active_engine: Engine,
    pub pool: PoolCfg,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: "sqlite::memory:".to_owned(),
            active_engine: Engine::default(),
            pool: PoolCfg::default(),
        }
    }
}

/// Pool knobs; unset values fall back to [`ConnectOpts::default`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolCfg {
    pub max_conns: Option<u32>,
    pub min_conns: Option<u32>,
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub max_lifetime: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub busy_timeout: Option<Duration>,
}

impl DataConfig {
    /// Load defaults, then `path` (when given), then the environment.
    ///
    /// # Errors
    /// `DataError::Configuration` when the file is missing or a value does not parse.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(DataConfig::default()));
        if let Some(path) = path {
            if !path.is_file() {
                return Err(DataError::config(format!(
                    "config file '{}' does not exist",
                    path.display()
                )));
            }
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(&figment)
    }

    /// # Errors
    /// `DataError::Configuration` when extraction fails.
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        figment
            .extract()
            .map_err(|e| DataError::config(format!("invalid configuration: {e}")))
    }

    #[must_use]
    pub fn connect_opts(&self) -> ConnectOpts {
        let pool = &self.database.pool;
        let defaults = ConnectOpts::default();
        ConnectOpts {
            max_conns: pool.max_conns.or(defaults.max_conns),
            min_conns: pool.min_conns.or(defaults.min_conns),
            acquire_timeout: pool.acquire_timeout.or(defaults.acquire_timeout),
            idle_timeout: pool.idle_timeout.or(defaults.idle_timeout),
            max_lifetime: pool.max_lifetime.or(defaults.max_lifetime),
            busy_timeout: pool.busy_timeout.unwrap_or(defaults.busy_timeout),
            ..defaults
        }
    }
}

// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    connector::RetryPolicy,
    error::ConfigError,
    types::{AccountId, ConcurrencyMode, IsolationLevel},
};
use serde::{Deserialize, Serialize};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_DETAIL_PATH: &str = "resultados_concurrencia_detalle.csv";
pub const DEFAULT_SUMMARY_PATH: &str = "resultados_concurrencia_resumen.csv";

/// Largest `statement_timeout` the server accepts, in whole seconds (`i32::MAX` milliseconds).
pub const MAX_TX_TIMEOUT_SECS: u64 = i32::MAX as u64 / 1000;

/// Where and how to reach the database under test.
#[derive(Clone, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DbParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    /// Schema holding the accounts table, the transfer log and the transfer procedures.
    pub schema: String,
    pub connect_timeout_secs: u64,
}

impl Default for DbParams {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            dbname: "banco_concurrencia".to_string(),
            schema: "banco".to_string(),
            connect_timeout_secs: 5,
        }
    }
}

// Keep the password out of logs.
impl fmt::Debug for DbParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("dbname", &self.dbname)
            .field("schema", &self.schema)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Distinct account ids that transfers are drawn from. Always holds at least two.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AccountPool(Vec<AccountId>);

impl AccountPool {
    /// Drops duplicates (keeping first occurrences) and rejects pools with fewer than two ids.
    pub fn new(ids: impl IntoIterator<Item = AccountId>) -> Result<Self, ConfigError> {
        let mut distinct: Vec<AccountId> = vec![];
        for id in ids {
            if !distinct.contains(&id) {
                distinct.push(id);
            }
        }
        if distinct.len() < 2 {
            return Err(ConfigError::InvalidAccountPool(format!(
                "need at least 2 distinct accounts, got {:?}",
                distinct
            )));
        }
        Ok(Self(distinct))
    }

    /// Parses a comma separated list such as `1,2,3,4`.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let ids = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<i32>().map(AccountId).map_err(|e| {
                    ConfigError::InvalidAccountPool(format!("'{}' is not an account id: {}", part, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(ids)
    }

    pub fn ids(&self) -> &[AccountId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: AccountId) -> bool {
        self.0.contains(&id)
    }
}

impl<'de> Deserialize<'de> for AccountPool {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let ids = Vec::<AccountId>::deserialize(deserializer)?;
        AccountPool::new(ids).map_err(serde::de::Error::custom)
    }
}

/// Inclusive bounds for transfer amounts.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AmountRange {
    min: f64,
    max: f64,
}

impl AmountRange {
    pub fn new(min: f64, max: f64) -> Result<Self, ConfigError> {
        if !min.is_finite() || !max.is_finite() {
            return Err(ConfigError::InvalidAmountRange(format!(
                "bounds must be finite, got [{}, {}]",
                min, max
            )));
        }
        if min < 0.0 || min >= max {
            return Err(ConfigError::InvalidAmountRange(format!(
                "expected 0 <= min < max, got [{}, {}]",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

impl<'de> Deserialize<'de> for AmountRange {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct Raw {
            min: f64,
            max: f64,
        }
        let raw = Raw::deserialize(deserializer)?;
        AmountRange::new(raw.min, raw.max).map_err(serde::de::Error::custom)
    }
}

/// The randomized workload of a single run.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkloadConfig {
    pub mode: ConcurrencyMode,
    pub isolation: IsolationLevel,
    pub accounts: AccountPool,
    pub amounts: AmountRange,
}

/// Everything needed to drive an experiment: a fixed workload repeated `runs` times.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentConfig {
    #[serde(default)]
    pub db: DbParams,
    pub workload: WorkloadConfig,
    pub concurrency: usize,
    pub total_requests: usize,
    pub runs: u64,
    #[serde(default = "default_tx_timeout_secs")]
    pub tx_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Base seed for request generation; fresh entropy per run when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_detail_path")]
    pub out_detail: PathBuf,
    #[serde(default = "default_summary_path")]
    pub out_summary: PathBuf,
}

fn default_tx_timeout_secs() -> u64 {
    30
}

fn default_detail_path() -> PathBuf {
    PathBuf::from(DEFAULT_DETAIL_PATH)
}

fn default_summary_path() -> PathBuf {
    PathBuf::from(DEFAULT_SUMMARY_PATH)
}

impl ExperimentConfig {
    /// Load the config from a YAML file and validate it
    pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_string = path.as_ref().display().to_string();
        let contents =
            fs::read_to_string(&path).map_err(|e| ConfigError::IO(path_string.clone(), e))?;
        Self::parse_serialized_config(&contents, &path_string)
    }

    pub fn parse_serialized_config(serialized: &str, source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(serialized)
            .map_err(|e| ConfigError::Yaml(source.to_string(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks what the type system does not. Pool and amount range are validated on construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency(
                "at least one worker is required".to_string(),
            ));
        }
        // A zero statement_timeout disables the server-side bound altogether.
        if self.tx_timeout_secs == 0 || self.tx_timeout_secs > MAX_TX_TIMEOUT_SECS {
            return Err(ConfigError::InvalidTxTimeout(format!(
                "expected 1..={} seconds, got {}",
                MAX_TX_TIMEOUT_SECS, self.tx_timeout_secs
            )));
        }
        Ok(())
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.tx_timeout_secs)
    }

    /// Seed for the generator of `run_id`, so a seeded experiment replays run by run.
    pub fn run_seed(&self, run_id: u64) -> Option<u64> {
        self.seed.map(|seed| seed.wrapping_add(run_id))
    }
}

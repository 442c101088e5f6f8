// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::{
        AccountPool, AmountRange, DEFAULT_DETAIL_PATH, DEFAULT_SUMMARY_PATH, DbParams,
        ExperimentConfig, WorkloadConfig,
    },
    connector::RetryPolicy,
    error::ConfigError,
    types::{ConcurrencyMode, IsolationLevel},
};
use clap::Parser;
use std::{path::PathBuf, time::Duration};

#[derive(Clone, Debug, Parser)]
pub struct DbArgs {
    #[clap(long, default_value = "localhost")]
    pub host: String,

    #[clap(long, default_value_t = 5432)]
    pub port: u16,

    #[clap(long, default_value = "postgres")]
    pub user: String,

    #[clap(long, env = "PGPASSWORD", hide_env_values = true, default_value = "")]
    pub password: String,

    #[clap(long, default_value = "banco_concurrencia")]
    pub dbname: String,

    /// Schema holding `cuenta`, `transferencia` and the transfer procedures.
    #[clap(long, default_value = "banco")]
    pub schema: String,

    #[clap(long, default_value_t = 5)]
    pub connect_timeout_secs: u64,
}

impl DbArgs {
    pub fn into_params(self) -> DbParams {
        DbParams {
            host: self.host,
            port: self.port,
            user: self.user,
            password: self.password,
            dbname: self.dbname,
            schema: self.schema,
            connect_timeout_secs: self.connect_timeout_secs,
        }
    }
}

#[derive(Clone, Debug, Parser)]
pub struct RunArgs {
    /// Maximum number of transfers in flight at once.
    #[clap(long, default_value_t = 50)]
    pub concurrency: usize,

    /// Transfers per run.
    #[clap(long, default_value_t = 50)]
    pub total: usize,

    #[clap(long, default_value_t = 10)]
    pub runs: u64,

    #[clap(long, value_enum, default_value = "2pl")]
    pub mode: ConcurrencyMode,

    /// Comma separated account ids to draw transfers from.
    #[clap(long, default_value = "1,2,3,4")]
    pub accounts: String,

    #[clap(long, default_value_t = 1.0)]
    pub amount_min: f64,

    #[clap(long, default_value_t = 100.0)]
    pub amount_max: f64,

    #[clap(long, value_enum, ignore_case = true, default_value = "READ COMMITTED")]
    pub isolation: IsolationLevel,

    /// Server-side statement timeout applied to every transaction.
    #[clap(long, default_value_t = 30)]
    pub tx_timeout_secs: u64,

    /// Connection retries after the first failed attempt.
    #[clap(long, default_value_t = 3)]
    pub max_retries: usize,

    /// Base of the linear backoff between connection attempts.
    #[clap(long, default_value_t = 1000)]
    pub backoff_ms: u64,

    /// Makes the generated requests reproducible. Run `i` uses `seed + i`.
    #[clap(long)]
    pub seed: Option<u64>,

    #[clap(long, default_value = DEFAULT_DETAIL_PATH)]
    pub out_detail: PathBuf,

    #[clap(long, default_value = DEFAULT_SUMMARY_PATH)]
    pub out_summary: PathBuf,
}

impl RunArgs {
    pub fn into_config(self, db: DbParams) -> Result<ExperimentConfig, ConfigError> {
        let config = ExperimentConfig {
            db,
            workload: WorkloadConfig {
                mode: self.mode,
                isolation: self.isolation,
                accounts: AccountPool::parse(&self.accounts)?,
                amounts: AmountRange::new(self.amount_min, self.amount_max)?,
            },
            concurrency: self.concurrency,
            total_requests: self.total,
            runs: self.runs,
            tx_timeout_secs: self.tx_timeout_secs,
            retry: RetryPolicy::new(self.max_retries, Duration::from_millis(self.backoff_ms)),
            seed: self.seed,
            out_detail: self.out_detail,
            out_summary: self.out_summary,
        };
        config.validate()?;
        Ok(config)
    }
}

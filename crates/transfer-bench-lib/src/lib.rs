// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

pub mod aggregator;
mod args;
pub mod config;
pub mod connector;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod postgres;
pub mod session;
pub mod types;

#[cfg(test)]
mod mock;

// These are the top level things you should need to run the benchmark.
pub use args::{DbArgs, RunArgs};
pub use config::ExperimentConfig;
pub use driver::ExperimentDriver;
pub use postgres::PgSessionFactory;

// We export these if you want finer grained control.
pub use aggregator::{CsvSink, RunParameters, RunRecorder, RunSummary, summarize};
pub use connector::{LinearBackoff, RetryPolicy, connect};
pub use dispatcher::{BatchReport, LoadDispatcher, RequestGenerator};
pub use executor::TransactionExecutor;
pub use types::{
    AccountId, ConcurrencyMode, IsolationLevel, Outcome, TransactionResult, TransferRequest,
};

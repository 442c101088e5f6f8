// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// A session could not be established.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection failed after {attempts} attempt(s): {cause}")]
    Exhausted { attempts: usize, cause: String },
    #[error("connection rejected: {cause}")]
    Rejected { cause: String },
}

/// A single failed attempt to open a session, as reported by a `SessionFactory`.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct OpenError {
    pub message: String,
    /// Transient failures are worth retrying; the rest are rejected immediately.
    pub transient: bool,
}

impl OpenError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }
}

/// Any failure between opening the transaction and committing it.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("{0}")]
    Database(String),
    #[error("statement timed out: {0}")]
    Timeout(String),
}

/// Failure writing to one of the output stores.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Error accessing {0}: {1}")]
    IO(String, #[source] std::io::Error),
    #[error("Error writing csv to {0}: {1}")]
    Csv(String, #[source] csv::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid account pool: {0}")]
    InvalidAccountPool(String),
    #[error("Invalid amount range: {0}")]
    InvalidAmountRange(String),
    #[error("Invalid concurrency limit: {0}")]
    InvalidConcurrency(String),
    #[error("Invalid transaction timeout: {0}")]
    InvalidTxTimeout(String),
    #[error("Error accessing {0}: {1}")]
    IO(String, #[source] std::io::Error),
    #[error("Error (de)serializing {0}: {1}")]
    Yaml(String, #[source] serde_yaml::Error),
}

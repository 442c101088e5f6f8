// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Core value types shared by the executor, the dispatcher and the aggregator.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// Status reported when a stored procedure returns no row or a NULL status.
pub const UNKNOWN_STATUS: &str = "UNKNOWN";

/// Identifier of a row in the externally owned accounts table.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(transparent)]
pub struct AccountId(pub i32);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The concurrency-control strategy exercised by a run.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize, ValueEnum)]
pub enum ConcurrencyMode {
    /// `transfer_2pl`: locks acquired up front and held until commit.
    #[serde(rename = "2pl")]
    #[value(name = "2pl")]
    TwoPhaseLocking,
    /// `transfer_ts`: conflicts ordered by the transaction timestamp.
    #[serde(rename = "ts")]
    #[value(name = "ts")]
    TimestampOrdering,
    /// `transfer_optimistic`: validation at commit time.
    #[serde(rename = "opt")]
    #[value(name = "opt")]
    Optimistic,
    /// Baseline without any coordination: two bare updates and a log insert.
    #[serde(rename = "simple")]
    #[value(name = "simple")]
    Unguarded,
}

impl ConcurrencyMode {
    /// Name of the stored procedure implementing this mode, if any.
    pub fn procedure(&self) -> Option<&'static str> {
        match self {
            ConcurrencyMode::TwoPhaseLocking => Some("transfer_2pl"),
            ConcurrencyMode::TimestampOrdering => Some("transfer_ts"),
            ConcurrencyMode::Optimistic => Some("transfer_optimistic"),
            ConcurrencyMode::Unguarded => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConcurrencyMode::TwoPhaseLocking => "2pl",
            ConcurrencyMode::TimestampOrdering => "ts",
            ConcurrencyMode::Optimistic => "opt",
            ConcurrencyMode::Unguarded => "simple",
        }
    }
}

impl fmt::Display for ConcurrencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize, ValueEnum)]
pub enum IsolationLevel {
    #[serde(rename = "READ COMMITTED")]
    #[value(name = "READ COMMITTED", alias = "read-committed")]
    ReadCommitted,
    #[serde(rename = "REPEATABLE READ")]
    #[value(name = "REPEATABLE READ", alias = "repeatable-read")]
    RepeatableRead,
    #[serde(rename = "SERIALIZABLE")]
    #[value(name = "SERIALIZABLE", alias = "serializable")]
    Serializable,
}

impl IsolationLevel {
    /// The SQL spelling, usable verbatim after `ISOLATION LEVEL`.
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A single randomized unit of work. Generated at dispatch time and never persisted on its own.
#[derive(Clone, Debug, PartialEq)]
pub struct TransferRequest {
    pub from_account: AccountId,
    pub to_account: AccountId,
    /// Rounded to cents.
    pub amount: f64,
    pub mode: ConcurrencyMode,
    pub isolation: IsolationLevel,
}

/// What happened to a single transfer attempt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    Completed,
    Aborted { cause: String },
    ConnectionError { cause: String },
    /// The procedure committed but reported something that is neither a completion nor an abort.
    Unclassified { status: String },
}

impl Outcome {
    /// Classifies a status string returned by a stored procedure.
    pub fn from_reported(status: Option<String>) -> Self {
        let status = status.unwrap_or_else(|| UNKNOWN_STATUS.to_string());
        let upper = status.to_uppercase();
        if upper.contains("COMPLET") {
            Outcome::Completed
        } else if upper.contains("ABORT") {
            Outcome::Aborted { cause: status }
        } else {
            Outcome::Unclassified { status }
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed)
    }

    /// Aborts and connection errors both count against the abort rate.
    pub fn is_aborted(&self) -> bool {
        matches!(
            self,
            Outcome::Aborted { .. } | Outcome::ConnectionError { .. }
        )
    }

    /// Short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Aborted { .. } => "aborted",
            Outcome::ConnectionError { .. } => "connection_error",
            Outcome::Unclassified { .. } => "unclassified",
        }
    }

    /// Diagnostic text, present for every outcome except `Completed`.
    pub fn error(&self) -> Option<&str> {
        match self {
            Outcome::Completed => None,
            Outcome::Aborted { cause } | Outcome::ConnectionError { cause } => Some(cause.as_str()),
            Outcome::Unclassified { status } => Some(status.as_str()),
        }
    }
}

/// Formats the outcome the way it is persisted in the detail store.
impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed => f.write_str("COMPLETED"),
            Outcome::Aborted { cause } => write!(f, "ABORTED:{}", cause),
            Outcome::ConnectionError { cause } => write!(f, "CONNECTION_ERROR:{}", cause),
            Outcome::Unclassified { status } => f.write_str(status),
        }
    }
}

/// The measured result of one transfer attempt. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct TransactionResult {
    pub request: TransferRequest,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Measured on a monotonic clock, connection setup included.
    pub latency: Duration,
    pub outcome: Outcome,
}

impl TransactionResult {
    pub fn error(&self) -> Option<&str> {
        self.outcome.error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_reported_status() {
        assert_eq!(
            Outcome::from_reported(Some("COMPLETED".into())),
            Outcome::Completed
        );
        assert_eq!(
            Outcome::from_reported(Some("completada".into())),
            Outcome::Completed
        );
        assert_eq!(
            Outcome::from_reported(Some("ABORTADA: saldo insuficiente".into())),
            Outcome::Aborted {
                cause: "ABORTADA: saldo insuficiente".into()
            }
        );
        assert_eq!(Outcome::from_reported(None), Outcome::Unclassified {
            status: UNKNOWN_STATUS.into()
        });
    }

    #[test]
    fn test_outcome_text() {
        assert_eq!(Outcome::Completed.to_string(), "COMPLETED");
        assert_eq!(
            Outcome::Aborted {
                cause: "deadlock detected".into()
            }
            .to_string(),
            "ABORTED:deadlock detected"
        );
        let conn = Outcome::ConnectionError {
            cause: "refused".into(),
        };
        assert_eq!(conn.to_string(), "CONNECTION_ERROR:refused");
        assert!(conn.is_aborted());
        assert_eq!(conn.error(), Some("refused"));
        assert_eq!(Outcome::Completed.error(), None);
    }

    #[test]
    fn test_unclassified_counts_in_no_bucket() {
        let outcome = Outcome::from_reported(Some("PENDING".into()));
        assert!(!outcome.is_completed());
        assert!(!outcome.is_aborted());
        assert_eq!(outcome.to_string(), "PENDING");
    }

    #[test]
    fn test_mode_procedures() {
        assert_eq!(
            ConcurrencyMode::TwoPhaseLocking.procedure(),
            Some("transfer_2pl")
        );
        assert_eq!(ConcurrencyMode::Unguarded.procedure(), None);
        assert_eq!(IsolationLevel::RepeatableRead.as_sql(), "REPEATABLE READ");
    }
}

// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    connector::{RetryPolicy, connect},
    error::TransactionError,
    metrics,
    session::{Session, SessionFactory},
    types::{ConcurrencyMode, Outcome, TransactionResult, TransferRequest},
};
use chrono::Utc;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, warn};

/// Runs one transfer per call as an isolated transaction on a fresh session.
///
/// Every failure is folded into the returned [`TransactionResult`]; nothing
/// escapes to the caller, so one bad request cannot take down its siblings.
#[derive(Clone)]
pub struct TransactionExecutor {
    factory: Arc<dyn SessionFactory>,
    retry_policy: RetryPolicy,
    statement_timeout: Duration,
}

impl TransactionExecutor {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        retry_policy: RetryPolicy,
        statement_timeout: Duration,
    ) -> Self {
        Self {
            factory,
            retry_policy,
            statement_timeout,
        }
    }

    pub async fn execute(&self, request: TransferRequest) -> TransactionResult {
        let started_at = Utc::now();
        let start = Instant::now();

        let outcome = match connect(self.factory.as_ref(), &self.retry_policy).await {
            Ok(mut session) => {
                let outcome = match self.transfer(session.as_mut(), &request).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        if let Err(rollback_error) = session.rollback().await {
                            warn!("Rollback failed after '{}': {}", e, rollback_error);
                        }
                        Outcome::Aborted {
                            cause: e.to_string(),
                        }
                    },
                };
                session.close().await;
                outcome
            },
            Err(e) => Outcome::ConnectionError {
                cause: e.to_string(),
            },
        };

        let latency = start.elapsed();
        debug!(
            "Transfer {} -> {} ({:.2}) finished in {:?}: {}",
            request.from_account, request.to_account, request.amount, latency, outcome
        );
        metrics::record_outcome(request.mode, &outcome, latency);

        TransactionResult {
            request,
            started_at,
            finished_at: Utc::now(),
            latency,
            outcome,
        }
    }

    async fn transfer(
        &self,
        session: &mut dyn Session,
        request: &TransferRequest,
    ) -> Result<Outcome, TransactionError> {
        session.set_statement_timeout(self.statement_timeout).await?;
        session.begin(request.isolation).await?;
        let outcome = match request.mode {
            ConcurrencyMode::Unguarded => {
                session.unguarded_transfer(request).await?;
                Outcome::Completed
            },
            mode => Outcome::from_reported(session.call_procedure(mode, request).await?),
        };
        session.commit().await?;
        Ok(outcome)
    }
}

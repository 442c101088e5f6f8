// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! An instrumented in-memory [`SessionFactory`] for exercising the harness without a database.

use crate::{
    error::{OpenError, TransactionError},
    session::{Session, SessionFactory},
    types::{ConcurrencyMode, IsolationLevel, TransferRequest},
};
use async_trait::async_trait;
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

/// Scripted behavior of every session handed out by a [`MockSessionFactory`].
#[derive(Clone, Debug, Default)]
pub struct MockPlan {
    /// The first `failing_connects` attempts fail transiently.
    pub failing_connects: usize,
    /// Every attempt fails permanently.
    pub reject_connects: bool,
    /// Status reported by the stored procedures; `None` models a NULL result.
    pub reported_status: Option<String>,
    pub fail_commit: bool,
    pub fail_procedure: bool,
    /// How long a session stays busy inside its transaction.
    pub hold: Duration,
}

impl MockPlan {
    pub fn unreachable() -> Self {
        Self {
            failing_connects: usize::MAX,
            ..Default::default()
        }
    }

    pub fn reporting(status: &str) -> Self {
        Self {
            reported_status: Some(status.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct MockStats {
    connect_attempts: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockStats {
    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct MockSessionFactory {
    plan: MockPlan,
    stats: Arc<MockStats>,
}

impl MockSessionFactory {
    pub fn new(plan: MockPlan) -> Self {
        Self {
            plan,
            stats: Arc::new(MockStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<MockStats> {
        self.stats.clone()
    }
}

#[async_trait]
impl SessionFactory for MockSessionFactory {
    async fn open(&self) -> Result<Box<dyn Session>, OpenError> {
        let attempt = self.stats.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if self.plan.reject_connects {
            return Err(OpenError::permanent("password authentication failed"));
        }
        if attempt < self.plan.failing_connects {
            return Err(OpenError::transient("connection refused"));
        }

        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats
            .peak_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            plan: self.plan.clone(),
            stats: self.stats.clone(),
        }))
    }
}

struct MockSession {
    plan: MockPlan,
    stats: Arc<MockStats>,
}

impl MockSession {
    async fn hold(&self) {
        if !self.plan.hold.is_zero() {
            tokio::time::sleep(self.plan.hold).await;
        } else {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl Session for MockSession {
    async fn set_statement_timeout(&mut self, _timeout: Duration) -> Result<(), TransactionError> {
        Ok(())
    }

    async fn begin(&mut self, _isolation: IsolationLevel) -> Result<(), TransactionError> {
        Ok(())
    }

    async fn call_procedure(
        &mut self,
        _mode: ConcurrencyMode,
        _request: &TransferRequest,
    ) -> Result<Option<String>, TransactionError> {
        self.hold().await;
        if self.plan.fail_procedure {
            return Err(TransactionError::Database(
                "SQLSTATE 40P01: deadlock detected".into(),
            ));
        }
        Ok(self.plan.reported_status.clone())
    }

    async fn unguarded_transfer(
        &mut self,
        _request: &TransferRequest,
    ) -> Result<(), TransactionError> {
        self.hold().await;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), TransactionError> {
        if self.plan.fail_commit {
            return Err(TransactionError::Database(
                "SQLSTATE 40001: could not serialize access due to concurrent update".into(),
            ));
        }
        self.stats.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), TransactionError> {
        self.stats.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(self: Box<Self>) {
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
    }
}

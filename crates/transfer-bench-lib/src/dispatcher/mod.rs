// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

mod generator;
pub mod pool;

pub use generator::RequestGenerator;

use crate::{
    executor::TransactionExecutor,
    types::{Outcome, TransactionResult},
};
use chrono::{DateTime, Utc};
use futures::{
    future::FutureExt,
    stream::{FuturesUnordered, StreamExt},
};
use pool::BoundedPool;
use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::runtime::Handle;
use tracing::{error, info};

/// Every result of one batch plus the wall-clock window it took.
#[derive(Clone, Debug)]
pub struct BatchReport {
    /// In completion order; exactly one entry per submitted request.
    pub results: Vec<TransactionResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// From the first submission to the last completion.
    pub wall_clock: Duration,
}

/// Feeds generated transfers through a bounded pool of executors.
pub struct LoadDispatcher {
    executor: Arc<TransactionExecutor>,
    generator: RequestGenerator,
    pool: BoundedPool,
}

impl LoadDispatcher {
    pub fn new(
        executor: Arc<TransactionExecutor>,
        generator: RequestGenerator,
        concurrency_limit: usize,
    ) -> Self {
        Self {
            executor,
            generator,
            pool: BoundedPool::new(concurrency_limit, Handle::current()),
        }
    }

    pub fn concurrency_limit(&self) -> usize {
        self.pool.capacity()
    }

    /// Runs `total_requests` transfers with at most `concurrency_limit` in flight.
    ///
    /// Each request is generated right before its submission, and every
    /// spawned execution is joined exactly once, so the report always holds
    /// `total_requests` results. A worker that panics or is cancelled yields an
    /// `Aborted` result for its request.
    pub async fn run_batch(&mut self, total_requests: usize) -> BatchReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut in_flight = FuturesUnordered::new();

        for _ in 0..total_requests {
            let request = self.generator.next_request();
            let executor = self.executor.clone();
            let submitted = request.clone();
            let queued = request.clone();
            let handle = self
                .pool
                .spawn(async move {
                    let worker_started_at = Utc::now();
                    let worker_start = Instant::now();
                    let attempt = AssertUnwindSafe(executor.execute(request)).catch_unwind();
                    match attempt.await {
                        Ok(result) => result,
                        Err(panic) => {
                            let cause = format!("worker panicked: {}", panic_message(&*panic));
                            error!("Transfer worker failed: {}", cause);
                            TransactionResult {
                                request: submitted,
                                started_at: worker_started_at,
                                finished_at: Utc::now(),
                                latency: worker_start.elapsed(),
                                outcome: Outcome::Aborted { cause },
                            }
                        },
                    }
                })
                .await;
            let submitted_at = Utc::now();
            in_flight.push(async move {
                match handle.await {
                    Ok(result) => result,
                    // Panics are caught inside the task, so only cancellation lands here.
                    Err(e) => {
                        error!("Transfer worker was cancelled: {}", e);
                        let finished_at = Utc::now();
                        TransactionResult {
                            request: queued,
                            started_at: submitted_at,
                            finished_at,
                            latency: (finished_at - submitted_at).to_std().unwrap_or_default(),
                            outcome: Outcome::Aborted {
                                cause: format!("worker failed: {}", e),
                            },
                        }
                    },
                }
            });
        }
        info!(
            "Submitted {} transfers in {:?}, waiting for completion",
            total_requests,
            start.elapsed()
        );

        let mut results = Vec::with_capacity(total_requests);
        while let Some(result) = in_flight.next().await {
            results.push(result);
        }

        BatchReport {
            results,
            started_at,
            finished_at: Utc::now(),
            wall_clock: start.elapsed(),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{AccountPool, AmountRange, WorkloadConfig},
        connector::RetryPolicy,
        error::OpenError,
        mock::{MockPlan, MockSessionFactory},
        session::{Session, SessionFactory},
        types::{ConcurrencyMode, IsolationLevel},
    };
    use async_trait::async_trait;
    use claims::assert_matches;
    use std::collections::HashSet;

    /// Panics inside `open`, after an optional delay.
    struct PanickingFactory {
        delay: Duration,
    }

    #[async_trait]
    impl SessionFactory for PanickingFactory {
        async fn open(&self) -> Result<Box<dyn Session>, OpenError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            panic!("driver crashed while connecting");
        }
    }

    fn dispatcher(
        factory: &Arc<impl SessionFactory + 'static>,
        mode: ConcurrencyMode,
        concurrency_limit: usize,
    ) -> LoadDispatcher {
        let workload = WorkloadConfig {
            mode,
            isolation: IsolationLevel::ReadCommitted,
            accounts: AccountPool::parse("1,2,3,4").unwrap(),
            amounts: AmountRange::new(1.0, 100.0).unwrap(),
        };
        let executor = TransactionExecutor::new(
            factory.clone(),
            RetryPolicy::new(2, Duration::from_millis(1)),
            Duration::from_secs(30),
        );
        LoadDispatcher::new(
            Arc::new(executor),
            RequestGenerator::from_seed(workload, 99),
            concurrency_limit,
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_unguarded_batch_completes_everything() {
        let factory = Arc::new(MockSessionFactory::new(MockPlan {
            hold: Duration::from_millis(2),
            ..Default::default()
        }));
        let report = dispatcher(&factory, ConcurrencyMode::Unguarded, 5)
            .run_batch(20)
            .await;

        assert_eq!(report.results.len(), 20);
        assert!(report.results.iter().all(|r| r.outcome.is_completed()));
        assert!(report.finished_at >= report.started_at);

        let stats = factory.stats();
        assert_eq!(stats.opened(), 20);
        assert_eq!(stats.closed(), 20);
        assert!(stats.peak_in_flight() <= 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_slot_serializes_sessions() {
        let factory = Arc::new(MockSessionFactory::new(MockPlan {
            reported_status: Some("COMPLETED".into()),
            hold: Duration::from_millis(1),
            ..Default::default()
        }));
        let report = dispatcher(&factory, ConcurrencyMode::TwoPhaseLocking, 1)
            .run_batch(15)
            .await;

        assert_eq!(report.results.len(), 15);
        assert_eq!(factory.stats().peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_database_yields_connection_errors() {
        let factory = Arc::new(MockSessionFactory::new(MockPlan::unreachable()));
        let report = dispatcher(&factory, ConcurrencyMode::Optimistic, 4)
            .run_batch(12)
            .await;

        assert_eq!(report.results.len(), 12);
        assert!(
            report
                .results
                .iter()
                .all(|r| matches!(r.outcome, Outcome::ConnectionError { .. }))
        );
        assert_eq!(factory.stats().closed(), 0);
    }

    #[tokio::test]
    async fn test_mixed_failures_lose_nothing() {
        let factory = Arc::new(MockSessionFactory::new(MockPlan {
            reported_status: Some("COMPLETED".into()),
            fail_commit: true,
            ..Default::default()
        }));
        let report = dispatcher(&factory, ConcurrencyMode::TimestampOrdering, 3)
            .run_batch(30)
            .await;

        assert_eq!(report.results.len(), 30);
        assert!(report.results.iter().all(|r| r.outcome.is_aborted()));
        let stats = factory.stats();
        assert_eq!(stats.rollbacks(), 30);
        assert_eq!(stats.opened(), stats.closed());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let factory = Arc::new(MockSessionFactory::new(MockPlan::default()));
        let report = dispatcher(&factory, ConcurrencyMode::Unguarded, 2)
            .run_batch(0)
            .await;

        assert!(report.results.is_empty());
        assert_eq!(factory.stats().connect_attempts(), 0);
    }

    #[tokio::test]
    async fn test_requests_stay_within_pool() {
        let factory = Arc::new(MockSessionFactory::new(MockPlan::default()));
        let report = dispatcher(&factory, ConcurrencyMode::Unguarded, 8)
            .run_batch(40)
            .await;

        let pool: HashSet<i32> = [1, 2, 3, 4].into_iter().collect();
        for result in &report.results {
            let request = &result.request;
            assert_ne!(request.from_account, request.to_account);
            assert!(pool.contains(&request.from_account.0));
            assert!(pool.contains(&request.to_account.0));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicked_worker_becomes_aborted_result() {
        let factory = Arc::new(PanickingFactory {
            delay: Duration::ZERO,
        });
        let mut dispatcher = dispatcher(&factory, ConcurrencyMode::TwoPhaseLocking, 2);
        let report = dispatcher.run_batch(5).await;

        assert_eq!(report.results.len(), 5);
        for result in &report.results {
            assert_matches!(
                &result.outcome,
                &Outcome::Aborted { ref cause } if cause.contains("driver crashed while connecting")
            );
            assert!(result.finished_at >= result.started_at);
        }
        // Every slot came back despite the panics.
        assert_eq!(dispatcher.pool.available_slots(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicked_worker_latency_excludes_slot_wait() {
        let delay = Duration::from_millis(100);
        let factory = Arc::new(PanickingFactory { delay });
        let report = dispatcher(&factory, ConcurrencyMode::Optimistic, 1)
            .run_batch(3)
            .await;

        assert_eq!(report.results.len(), 3);
        // Queued requests wait a full delay for the single slot; that wait is not latency.
        for result in &report.results {
            assert!(
                result.latency < delay + delay * 7 / 10,
                "latency {:?} includes time spent waiting for a slot",
                result.latency
            );
        }
    }
}

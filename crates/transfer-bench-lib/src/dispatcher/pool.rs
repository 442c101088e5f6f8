// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! A bounded worker pool on top of a tokio [`Handle`]. Only `capacity`
//! transfers can be in flight at once; submitting more waits for a slot.

use crate::metrics::TRANSFER_BENCH_IN_FLIGHT;
use futures::future::{Future, FutureExt};
use std::sync::Arc;
use tokio::{
    runtime::Handle,
    sync::{OwnedSemaphorePermit, Semaphore},
    task::JoinHandle,
};

#[derive(Clone, Debug)]
pub struct BoundedPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    executor: Handle,
}

impl BoundedPool {
    /// Create a new `BoundedPool` from an existing tokio [`Handle`]
    /// with `capacity` worker slots.
    pub fn new(capacity: usize, executor: Handle) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            executor,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots not currently held by a running transfer.
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Spawn a [`Future`] into the pool. Waits until a slot is free, which is
    /// what gives the dispatcher its backpressure. The slot is held until the
    /// future completes.
    pub async fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        // The semaphore is owned by the pool and never closed.
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("worker pool semaphore closed");
        self.executor.spawn(future_with_permit(future, permit))
    }
}

/// A held worker slot. Dropping it frees the slot and lowers the in-flight
/// gauge, on completion and on unwind alike.
struct SlotGuard {
    _permit: OwnedSemaphorePermit,
}

impl SlotGuard {
    fn new(permit: OwnedSemaphorePermit) -> Self {
        TRANSFER_BENCH_IN_FLIGHT.inc();
        Self { _permit: permit }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        TRANSFER_BENCH_IN_FLIGHT.dec();
    }
}

/// Wrap a `Future` so it gives its slot back to the pool when it completes.
fn future_with_permit<F>(future: F, permit: OwnedSemaphorePermit) -> impl Future<Output = F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let guard = SlotGuard::new(permit);
    future.map(move |ret| {
        drop(guard);
        ret
    })
}

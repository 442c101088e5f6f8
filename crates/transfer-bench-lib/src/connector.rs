// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Session establishment with bounded, linearly growing retries.

use crate::{
    error::{ConnectionError, OpenError},
    metrics,
    session::{Session, SessionFactory},
};
use backoff::backoff::Backoff;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// How many times a failed connection is retried, and how long to wait in between.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    pub max_retries: usize,
    /// The delay before retry `k` is `backoff_base * k`.
    #[serde(with = "millis")]
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, backoff_base: Duration) -> Self {
        Self {
            max_retries,
            backoff_base,
        }
    }

    pub fn backoff(&self) -> LinearBackoff {
        LinearBackoff::new(self.backoff_base, self.max_retries)
    }
}

/// A [`Backoff`] whose k-th delay is `base * k`, giving up after `max_retries` delays.
#[derive(Clone, Debug)]
pub struct LinearBackoff {
    base: Duration,
    max_retries: usize,
    retries: usize,
}

impl LinearBackoff {
    pub fn new(base: Duration, max_retries: usize) -> Self {
        Self {
            base,
            max_retries,
            retries: 0,
        }
    }
}

impl Backoff for LinearBackoff {
    fn reset(&mut self) {
        self.retries = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.retries >= self.max_retries {
            return None;
        }
        self.retries += 1;
        Some(self.base.saturating_mul(self.retries as u32))
    }
}

/// Opens a session through `factory`, retrying transient failures according to `policy`.
///
/// Permanent failures (e.g. bad credentials) are not retried. When the retry
/// budget runs out the last underlying failure is returned.
pub async fn connect(
    factory: &dyn SessionFactory,
    policy: &RetryPolicy,
) -> Result<Box<dyn Session>, ConnectionError> {
    let mut attempts = 0;
    let result = backoff::future::retry_notify(
        policy.backoff(),
        || {
            attempts += 1;
            async move {
                factory.open().await.map_err(|e| {
                    if e.transient {
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        },
        |e: OpenError, delay: Duration| {
            metrics::record_connect_retry();
            warn!(
                "Connection attempt failed, retrying in {}ms: {}",
                delay.as_millis(),
                e
            );
        },
    )
    .await;

    match result {
        Ok(session) => {
            debug!("Session opened after {} attempt(s)", attempts);
            Ok(session)
        },
        Err(OpenError {
            message,
            transient: false,
        }) => Err(ConnectionError::Rejected { cause: message }),
        Err(OpenError { message, .. }) => Err(ConnectionError::Exhausted {
            attempts,
            cause: message,
        }),
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

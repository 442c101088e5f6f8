// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! The narrow surface the harness needs from a database connection.
//!
//! A [`Session`] is owned by exactly one in-flight transfer and is released
//! through [`Session::close`] before that transfer reports its result. The
//! executor never shares a session, so implementations need not be `Sync`.

use crate::{
    error::{OpenError, TransactionError},
    types::{ConcurrencyMode, IsolationLevel, TransferRequest},
};
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Session: Send {
    /// Bounds how long the server lets any statement of this session run.
    async fn set_statement_timeout(&mut self, timeout: Duration) -> Result<(), TransactionError>;

    async fn begin(&mut self, isolation: IsolationLevel) -> Result<(), TransactionError>;

    /// Invokes the stored procedure implementing `mode` and returns the status it reported.
    async fn call_procedure(
        &mut self,
        mode: ConcurrencyMode,
        request: &TransferRequest,
    ) -> Result<Option<String>, TransactionError>;

    /// Debit, credit and transfer-log insert as three separate statements.
    async fn unguarded_transfer(&mut self, request: &TransferRequest)
    -> Result<(), TransactionError>;

    async fn commit(&mut self) -> Result<(), TransactionError>;

    async fn rollback(&mut self) -> Result<(), TransactionError>;

    /// Releases the underlying connection.
    async fn close(self: Box<Self>);
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Makes exactly one attempt at opening a session. Retries are the connector's job.
    async fn open(&self) -> Result<Box<dyn Session>, OpenError>;
}

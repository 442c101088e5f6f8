// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! [`SessionFactory`] backed by tokio-postgres. One connection per session.

use crate::{
    config::DbParams,
    error::{OpenError, TransactionError},
    session::{Session, SessionFactory},
    types::{ConcurrencyMode, IsolationLevel, TransferRequest},
};
use async_trait::async_trait;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls, error::SqlState};
use tracing::debug;

/// SQLSTATE classes that no amount of retrying will fix: bad credentials and unknown database.
const PERMANENT_SQLSTATE_CLASSES: [&str; 2] = ["28", "3D"];

pub struct PgSessionFactory {
    config: tokio_postgres::Config,
    schema: String,
}

impl PgSessionFactory {
    pub fn new(params: &DbParams) -> Self {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&params.host)
            .port(params.port)
            .user(&params.user)
            .dbname(&params.dbname)
            .connect_timeout(Duration::from_secs(params.connect_timeout_secs));
        if !params.password.is_empty() {
            config.password(&params.password);
        }
        Self {
            config,
            schema: quote_identifier(&params.schema),
        }
    }
}

#[async_trait]
impl SessionFactory for PgSessionFactory {
    async fn open(&self) -> Result<Box<dyn Session>, OpenError> {
        let (client, connection) = self
            .config
            .connect(NoTls)
            .await
            .map_err(|e| classify_open_error(&e))?;
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("Postgres connection closed with error: {}", e);
            }
        });
        Ok(Box::new(PgSession {
            client,
            driver,
            schema: self.schema.clone(),
        }))
    }
}

fn classify_open_error(error: &tokio_postgres::Error) -> OpenError {
    let message = describe(error);
    match error.code() {
        Some(code) if is_permanent(code) => OpenError::permanent(message),
        _ => OpenError::transient(message),
    }
}

fn is_permanent(code: &SqlState) -> bool {
    *code == SqlState::INSUFFICIENT_PRIVILEGE
        || PERMANENT_SQLSTATE_CLASSES
            .iter()
            .any(|class| code.code().starts_with(class))
}

/// `SQLSTATE <code>: <message>` for server errors, the client error text otherwise.
fn describe(error: &tokio_postgres::Error) -> String {
    let text = match error.as_db_error() {
        Some(db_error) => format!("SQLSTATE {}: {}", db_error.code().code(), db_error.message()),
        None => error.to_string(),
    };
    text.replace('\n', " | ")
}

fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

impl From<tokio_postgres::Error> for TransactionError {
    fn from(error: tokio_postgres::Error) -> Self {
        let message = describe(&error);
        if error.code() == Some(&SqlState::QUERY_CANCELED) {
            TransactionError::Timeout(message)
        } else {
            TransactionError::Database(message)
        }
    }
}

struct PgSession {
    client: Client,
    driver: JoinHandle<()>,
    schema: String,
}

/// The call statement for `mode`, or `None` when the mode runs no procedure.
fn procedure_statement(schema: &str, mode: ConcurrencyMode) -> Option<String> {
    let procedure = mode.procedure()?;
    let extra = match mode {
        ConcurrencyMode::TimestampOrdering => ", now()",
        _ => "",
    };
    // The status is cast to text whatever the procedure's declared return type.
    Some(format!(
        "SELECT {}.{}($1::int4, $2::int4, $3::float8::numeric{})::text",
        schema, procedure, extra
    ))
}

#[async_trait]
impl Session for PgSession {
    async fn set_statement_timeout(&mut self, timeout: Duration) -> Result<(), TransactionError> {
        self.client
            .batch_execute(&format!("SET statement_timeout = {}", timeout.as_millis()))
            .await?;
        Ok(())
    }

    async fn begin(&mut self, isolation: IsolationLevel) -> Result<(), TransactionError> {
        self.client
            .batch_execute(&format!("BEGIN ISOLATION LEVEL {}", isolation.as_sql()))
            .await?;
        Ok(())
    }

    async fn call_procedure(
        &mut self,
        mode: ConcurrencyMode,
        request: &TransferRequest,
    ) -> Result<Option<String>, TransactionError> {
        let statement = procedure_statement(&self.schema, mode).ok_or_else(|| {
            TransactionError::Database(format!("mode '{}' has no stored procedure", mode))
        })?;
        let row = self
            .client
            .query_opt(statement.as_str(), &[
                &request.from_account.0,
                &request.to_account.0,
                &request.amount,
            ])
            .await?;
        match row {
            Some(row) => Ok(row.try_get::<_, Option<String>>(0)?),
            None => Ok(None),
        }
    }

    async fn unguarded_transfer(
        &mut self,
        request: &TransferRequest,
    ) -> Result<(), TransactionError> {
        let debit = format!(
            "UPDATE {}.cuenta SET saldo = saldo - $1::float8::numeric WHERE cuenta_id = $2::int4",
            self.schema
        );
        let credit = format!(
            "UPDATE {}.cuenta SET saldo = saldo + $1::float8::numeric WHERE cuenta_id = $2::int4",
            self.schema
        );
        let log = format!(
            "INSERT INTO {}.transferencia (from_cuenta_id, to_cuenta_id, cantidad, tecnica, estado, nota) \
             VALUES ($1::int4, $2::int4, $3::float8::numeric, 'SIMPLE', 'COMPLETADA', 'manual')",
            self.schema
        );
        self.client
            .execute(debit.as_str(), &[&request.amount, &request.from_account.0])
            .await?;
        self.client
            .execute(credit.as_str(), &[&request.amount, &request.to_account.0])
            .await?;
        self.client
            .execute(log.as_str(), &[
                &request.from_account.0,
                &request.to_account.0,
                &request.amount,
            ])
            .await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), TransactionError> {
        self.client.batch_execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), TransactionError> {
        self.client.batch_execute("ROLLBACK").await?;
        Ok(())
    }

    async fn close(self: Box<Self>) {
        let PgSession { client, driver, .. } = *self;
        // Dropping the client terminates the connection, which lets the driver task finish.
        drop(client);
        if let Err(e) = driver.await {
            debug!("Postgres connection task failed: {}", e);
        }
    }
}

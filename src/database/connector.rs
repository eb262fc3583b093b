//! Guarded, self-healing query execution.
//!
//! [`DatabaseConnector`] owns the connection state exclusively. Callers
//! never see a raw connection: every statement goes through the read-only
//! denylist and, on a connection-level fault, through exactly one
//! reconnect-and-retry cycle.

use crate::constants::{ABSOLUTE_MAX_ROWS, LOG_QUERY_TRUNCATE_LENGTH};
use crate::database::query::{truncate_for_log, QueryResult};
use crate::error::DbError;
use crate::security::{check_read_only, inject_row_limit};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// An open connection (or pool of connections) that can run statements.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    /// Run one statement, keeping at most `max_rows` rows of the first result set.
    async fn run(&self, sql: &str, max_rows: usize) -> Result<QueryResult, DbError>;

    /// Release the underlying connections.
    async fn close(&self) -> Result<(), DbError>;
}

/// Opens [`QueryRunner`]s.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn open(&self) -> Result<Arc<dyn QueryRunner>, DbError>;

    /// Human-readable target, used in logs.
    fn target(&self) -> String;
}

#[derive(Default)]
struct ConnectionState {
    runner: Option<Arc<dyn QueryRunner>>,
}

/// The database connector.
pub struct DatabaseConnector {
    factory: Box<dyn ConnectionFactory>,
    state: Mutex<ConnectionState>,
    query_timeout: Duration,
}

impl DatabaseConnector {
    pub fn new(factory: Box<dyn ConnectionFactory>, query_timeout: Duration) -> Self {
        Self {
            factory,
            state: Mutex::new(ConnectionState::default()),
            query_timeout,
        }
    }

    /// Whether a connection is currently held.
    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.runner.is_some()
    }

    /// Connect if not already connected.
    ///
    /// A second call while connected returns the existing runner without
    /// touching the network.
    pub async fn connect(&self) -> Result<Arc<dyn QueryRunner>, DbError> {
        let mut state = self.state.lock().await;
        if let Some(runner) = &state.runner {
            return Ok(Arc::clone(runner));
        }

        let runner = self.factory.open().await?;
        info!("Connected to {}", self.factory.target());
        state.runner = Some(Arc::clone(&runner));
        Ok(runner)
    }

    /// Drop the current connection, ignoring close errors, and connect again.
    pub async fn reconnect(&self) -> Result<Arc<dyn QueryRunner>, DbError> {
        let mut state = self.state.lock().await;
        if let Some(old) = state.runner.take() {
            if let Err(e) = old.close().await {
                debug!("Ignoring error while closing stale connection: {}", e);
            }
        }

        info!("Reconnecting to {}", self.factory.target());
        let runner = self.factory.open().await?;
        state.runner = Some(Arc::clone(&runner));
        Ok(runner)
    }

    /// Close the connection, if any.
    pub async fn close(&self) {
        let old = self.state.lock().await.runner.take();
        if let Some(old) = old {
            if let Err(e) = old.close().await {
                debug!("Error while closing connection: {}", e);
            }
        }
    }

    /// Run a caller-supplied read-only statement.
    ///
    /// The statement is checked against the denylist, gets a `TOP n` when it
    /// does not already bound its rows, and is capped client-side at
    /// `max_rows` (clamped to 1..=10000).
    pub async fn execute_query(&self, sql: &str, max_rows: usize) -> Result<QueryResult, DbError> {
        check_read_only(sql)?;
        let max_rows = max_rows.clamp(1, ABSOLUTE_MAX_ROWS);
        let limited = inject_row_limit(sql, max_rows);
        self.run_with_retry(&limited, max_rows).await
    }

    /// Run a fixed-shape statement without row-limit injection.
    ///
    /// The denylist still applies.
    pub async fn run_guarded(&self, sql: &str, max_rows: usize) -> Result<QueryResult, DbError> {
        check_read_only(sql)?;
        self.run_with_retry(sql, max_rows.max(1)).await
    }

    async fn run_with_retry(&self, sql: &str, max_rows: usize) -> Result<QueryResult, DbError> {
        let runner = self.connect().await?;

        match self.run_once(runner.as_ref(), sql, max_rows).await {
            Err(e) if e.is_connection_fault() => {
                warn!(error = %e, "Connection fault, reconnecting and retrying once");
                let runner = self.reconnect().await?;
                self.run_once(runner.as_ref(), sql, max_rows)
                    .await
                    .map_err(|e| DbError::query(format!("Query failed after reconnect: {}", e)))
            }
            other => other,
        }
    }

    async fn run_once(
        &self,
        runner: &dyn QueryRunner,
        sql: &str,
        max_rows: usize,
    ) -> Result<QueryResult, DbError> {
        debug!(
            "Executing query: {}",
            truncate_for_log(sql, LOG_QUERY_TRUNCATE_LENGTH)
        );

        let mut result = tokio::time::timeout(self.query_timeout, runner.run(sql, max_rows))
            .await
            .map_err(|_| DbError::Timeout {
                timeout_seconds: self.query_timeout.as_secs(),
            })??;

        result.cap_rows(max_rows);
        debug!(
            "Query completed: {} rows in {} ms",
            result.rows.len(),
            result.execution_time_ms
        );
        Ok(result)
    }
}

//! Connection pool management for SQL Server.

use super::connector::{ConnectionFactory, QueryRunner};
use super::query::{process_stream, QueryResult};
use crate::config::{DatabaseConfig, PoolConfig};
use crate::error::DbError;
use async_trait::async_trait;
use bb8::Pool;
use bb8_tiberius::ConnectionManager;
use std::sync::Arc;
use std::time::Instant;
use tiberius::{AuthMethod, Config, EncryptionLevel};
use tracing::{debug, info};

/// Type alias for the connection pool.
pub type ConnectionPool = Pool<ConnectionManager>;

/// Build the Tiberius client configuration.
pub fn build_config(config: &DatabaseConfig) -> Config {
    let mut tib_config = Config::new();
    tib_config.host(&config.host);
    tib_config.port(config.port);
    tib_config.authentication(AuthMethod::sql_server(&config.username, &config.password));
    if let Some(db) = config.database.as_deref().filter(|db| !db.is_empty()) {
        tib_config.database(db);
    }
    tib_config.application_name(&config.application_name);
    tib_config.encryption(if config.encrypt {
        EncryptionLevel::Required
    } else {
        EncryptionLevel::NotSupported
    });
    if config.trust_server_certificate {
        tib_config.trust_cert();
    }
    tib_config
}

/// `(min_idle, max_size)` that bb8 accepts: at least one connection, and
/// never more idle connections than the pool holds.
fn pool_bounds(pool: &PoolConfig) -> (u32, u32) {
    let max_size = pool.max_connections.max(1);
    (pool.min_connections.min(max_size), max_size)
}

/// Opens pooled SQL Server connections.
pub struct SqlServerFactory {
    config: DatabaseConfig,
}

impl SqlServerFactory {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConnectionFactory for SqlServerFactory {
    async fn open(&self) -> Result<Arc<dyn QueryRunner>, DbError> {
        let pool_config = &self.config.pool;
        info!(
            "Creating connection pool for {}:{} (min: {}, max: {})",
            self.config.host,
            self.config.port,
            pool_config.min_connections,
            pool_config.max_connections
        );

        let (min_idle, max_size) = pool_bounds(pool_config);
        let manager = ConnectionManager::new(build_config(&self.config));
        let pool = Pool::builder()
            .max_size(max_size)
            .min_idle(Some(min_idle))
            .idle_timeout(Some(pool_config.idle_timeout))
            .connection_timeout(pool_config.connection_timeout)
            .build(manager)
            .await
            .map_err(|e| DbError::connection(format!("Failed to create connection pool: {}", e)))?;

        // Fail fast on bad credentials or an unreachable host.
        {
            let mut conn = pool.get().await?;
            conn.simple_query("SELECT 1").await?.into_results().await?;
            debug!("Initial connection test successful");
        }

        Ok(Arc::new(SqlServerRunner { pool }))
    }

    fn target(&self) -> String {
        format!(
            "{}:{}/{}",
            self.config.host,
            self.config.port,
            self.config.database.as_deref().unwrap_or("(default)")
        )
    }
}

/// Runs statements on a pooled connection.
pub struct SqlServerRunner {
    pool: ConnectionPool,
}

#[async_trait]
impl QueryRunner for SqlServerRunner {
    async fn run(&self, sql: &str, max_rows: usize) -> Result<QueryResult, DbError> {
        let start = Instant::now();
        let mut conn = self.pool.get().await?;
        let stream = conn.simple_query(sql).await?;
        process_stream(stream, max_rows, start).await
    }

    /// Logs the pool state only. bb8 has no explicit close: the pool and its
    /// connections are released when the connector drops its last `Arc` to
    /// this runner, which `DatabaseConnector::close` does right after.
    async fn close(&self) -> Result<(), DbError> {
        let state = self.pool.state();
        debug!(
            "Releasing pool ({} connections, {} idle)",
            state.connections, state.idle_connections
        );
        Ok(())
    }
}

//! Database connectivity and query execution.

mod connection;
mod connector;
pub mod metadata;
mod query;
pub mod types;

pub use connection::{build_config, ConnectionPool, SqlServerFactory, SqlServerRunner};
pub use connector::{ConnectionFactory, DatabaseConnector, QueryRunner};
pub use metadata::{
    ColumnKind, ColumnProfile, ColumnProfileOutcome, ColumnSummary, MetadataQueries,
    RelatedTables, TableProfile, TestQueryOutcome,
};
pub use query::{format_cell, process_stream, truncate_for_log, ColumnInfo, QueryResult};
pub use types::{SqlValue, TypeMapper};

use crate::config::DatabaseConfig;

/// Build a connector for a SQL Server described by `config`.
///
/// No connection is opened until the first query or an explicit
/// [`DatabaseConnector::connect`].
pub fn sql_server_connector(config: &DatabaseConfig) -> DatabaseConnector {
    DatabaseConnector::new(
        Box::new(SqlServerFactory::new(config.clone())),
        config.query_timeout,
    )
}

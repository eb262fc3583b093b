//! Centralized constants for the Epicor MCP Server.
//!
//! This module contains all magic numbers and default values used throughout
//! the codebase, making them easy to find, understand, and modify.

use std::time::Duration;

// =============================================================================
// Timeout Constants
// =============================================================================

/// Default pool acquisition timeout in seconds.
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Default per-request query timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Default idle connection timeout in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30;

/// Default pool acquisition timeout as Duration.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration =
    Duration::from_secs(DEFAULT_CONNECTION_TIMEOUT_SECS);

/// Default query timeout as Duration.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS);

/// Default idle timeout as Duration.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS);

// =============================================================================
// Connection Pool Constants
// =============================================================================

/// Default minimum idle connections in pool.
pub const DEFAULT_MIN_CONNECTIONS: u32 = 0;

/// Default maximum connections in pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Default SQL Server port.
pub const DEFAULT_MSSQL_PORT: u16 = 1433;

// =============================================================================
// Query Result Constants
// =============================================================================

/// Default row limit for `execute_query`.
pub const DEFAULT_MAX_ROWS: usize = 1000;

/// Hard ceiling for any row limit a caller can request.
pub const ABSOLUTE_MAX_ROWS: usize = 10_000;

/// Default row count for `get_sample_data`.
pub const DEFAULT_SAMPLE_ROWS: usize = 10;

/// Maximum row count for `get_sample_data`.
pub const MAX_SAMPLE_ROWS: usize = 100;

/// Row cap for catalog queries (schemas, tables, columns).
pub const METADATA_MAX_ROWS: usize = 5000;

/// Row cap for `search_columns` and the child list of `find_related_tables`.
pub const COLUMN_SEARCH_MAX_ROWS: usize = 200;

/// Tables above this row count are profiled from a sample.
pub const PROFILE_SAMPLE_THRESHOLD: i64 = 100_000;

/// Rows read when profiling a sample.
pub const PROFILE_SAMPLE_ROWS: i64 = 50_000;

/// Most frequent values listed by `profile_column`.
pub const PROFILE_TOP_VALUES: usize = 15;

/// Characters kept from a profiled sample value.
pub const PROFILE_VALUE_LENGTH: usize = 80;

/// Maximum characters rendered per result cell.
pub const MAX_CELL_LENGTH: usize = 200;

// =============================================================================
// Relationship Index Constants
// =============================================================================

/// Default schema assumed by table lookups.
pub const DEFAULT_SCHEMA: &str = "Erp";

/// Default result limit for `search_tables` and `get_tables_by_flag`.
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

/// Maximum result limit for `search_tables` and `get_tables_by_flag`.
pub const MAX_SEARCH_LIMIT: usize = 200;

/// Default result limit for `get_table_relationships`.
pub const DEFAULT_RELATIONSHIP_LIMIT: usize = 50;

/// Maximum result limit for `get_table_relationships`.
pub const MAX_RELATIONSHIP_LIMIT: usize = 500;

/// Default hop bound for `find_join_path`.
pub const DEFAULT_JOIN_DEPTH: usize = 3;

/// Maximum hop bound for `find_join_path`.
pub const MAX_JOIN_DEPTH: usize = 6;

/// Maximum number of paths returned by `find_join_path`.
pub const MAX_JOIN_PATHS: usize = 5;

/// Number of "did you mean" suggestions offered on a miss.
pub const SUGGESTION_LIMIT: usize = 5;

/// Related tables listed per side by `get_table_details`.
pub const RELATED_TABLE_PREVIEW: usize = 10;

/// Reference file names inside the reference directory.
pub const TABLES_FILE_NAME: &str = "TableAttribute.csv";
pub const RELATIONS_FILE_NAME: &str = "QueryRelation.csv";
pub const RELATION_FIELDS_FILE_NAME: &str = "QueryRelationField.csv";

/// Default reference directory.
pub const DEFAULT_REFERENCE_DIR: &str = "reference";

// =============================================================================
// Transport Constants
// =============================================================================

/// MCP protocol version reported when the client does not send one.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Default HTTP bind host.
pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";

/// Default HTTP port.
pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// Buffered outbound messages per SSE session.
pub const SSE_SESSION_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the bridge's outbound request queue.
pub const BRIDGE_QUEUE_CAPACITY: usize = 1024;

/// Largest SSE event the bridge buffers before giving up on the stream.
pub const MAX_SSE_EVENT_BYTES: usize = 16 * 1024 * 1024;

/// Query parameter carrying the access token.
pub const TOKEN_QUERY_PARAM: &str = "token";

// =============================================================================
// Logging Constants
// =============================================================================

/// Default truncation length for query logging.
pub const LOG_QUERY_TRUNCATE_LENGTH: usize = 100;

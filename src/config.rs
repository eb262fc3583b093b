//! Configuration management for the Epicor MCP Server.
//!
//! Configuration is loaded from environment variables following the 12-factor app pattern.
//! Both entry points read through a lookup function so the parsing rules can be
//! exercised without touching the process environment.

use crate::constants::{
    DEFAULT_CONNECTION_TIMEOUT_SECS, DEFAULT_HTTP_HOST, DEFAULT_HTTP_PORT,
    DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_CONNECTIONS, DEFAULT_MIN_CONNECTIONS,
    DEFAULT_MSSQL_PORT, DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_REFERENCE_DIR,
    RELATIONS_FILE_NAME, RELATION_FIELDS_FILE_NAME, TABLES_FILE_NAME,
};
use crate::error::ServerError;
use crate::transport::TransportType;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection configuration; `None` hides the database tools.
    pub database: Option<DatabaseConfig>,

    /// Locations of the reference CSV files
    pub reference: ReferenceConfig,

    /// Transport selection and HTTP settings
    pub transport: TransportConfig,
}

/// Database connection configuration.
#[derive(Clone)]
pub struct DatabaseConfig {
    /// SQL Server hostname or IP address
    pub host: String,

    /// SQL Server port (default: 1433)
    pub port: u16,

    /// Database name
    pub database: Option<String>,

    /// SQL login
    pub username: String,

    /// SQL password
    pub password: String,

    /// Enable TLS encryption
    pub encrypt: bool,

    /// Trust server certificate (for self-signed certs)
    pub trust_server_certificate: bool,

    /// Connection pool configuration
    pub pool: PoolConfig,

    /// Per-request query timeout
    pub query_timeout: Duration,

    /// Application name sent to SQL Server
    pub application_name: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("encrypt", &self.encrypt)
            .field("trust_server_certificate", &self.trust_server_certificate)
            .field("pool", &self.pool)
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Minimum number of idle connections kept in the pool
    pub min_connections: u32,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Pool acquisition timeout
    pub connection_timeout: Duration,

    /// Idle connection timeout
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: DEFAULT_MIN_CONNECTIONS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connection_timeout: Duration::from_secs(DEFAULT_CONNECTION_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }
}

/// Paths of the three reference files.
#[derive(Debug, Clone)]
pub struct ReferenceConfig {
    pub tables_file: PathBuf,
    pub relations_file: PathBuf,
    pub relation_fields_file: PathBuf,
}

impl ReferenceConfig {
    /// Standard file names inside a single directory.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            tables_file: dir.join(TABLES_FILE_NAME),
            relations_file: dir.join(RELATIONS_FILE_NAME),
            relation_fields_file: dir.join(RELATION_FIELDS_FILE_NAME),
        }
    }
}

/// Transport configuration.
#[derive(Clone)]
pub struct TransportConfig {
    /// Transport mode
    pub mode: TransportType,

    /// HTTP bind host
    pub http_host: String,

    /// HTTP bind port
    pub http_port: u16,

    /// Static access token; required for the HTTP transport.
    pub access_token: Option<String>,
}

impl fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConfig")
            .field("mode", &self.mode)
            .field("http_host", &self.http_host)
            .field("http_port", &self.http_port)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Remote SSE URL, including the `token` query parameter when required.
    pub sse_url: Url,

    /// Upper bound on the wait for the `endpoint` event; `None` waits forever.
    pub endpoint_timeout: Option<Duration>,
}

/// Load `.env` (or the file named by `DOTENV_PATH`) into the process environment.
///
/// A missing file is not an error; variables already set win.
pub fn load_dotenv() -> Option<PathBuf> {
    match std::env::var("DOTENV_PATH") {
        Ok(path) => dotenvy::from_path(&path).ok().map(|_| PathBuf::from(path)),
        Err(_) => dotenvy::dotenv().ok(),
    }
}

/// Read a variable, treating empty and whitespace-only values as unset.
fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse an optional variable, naming it in the error when it is malformed.
fn parsed<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ServerError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match non_empty(lookup, key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ServerError::config(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}

fn flag<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// ## Database (optional as a group)
    /// - `MSSQL_HOST`: SQL Server hostname; unset disables the database tools
    /// - `MSSQL_USER` / `MSSQL_PASSWORD`: needed with `MSSQL_HOST`; without them the database tools stay off
    /// - `MSSQL_PORT`: Port number (default: 1433)
    /// - `MSSQL_DATABASE`: Database name
    /// - `MSSQL_ENCRYPT`: Enable TLS (default: true)
    /// - `MSSQL_TRUST_CERT`: Trust server certificate (default: false)
    /// - `MSSQL_POOL_MIN` / `MSSQL_POOL_MAX`: Pool bounds (default: 0 / 10)
    /// - `MSSQL_IDLE_TIMEOUT`: Idle timeout in seconds (default: 30)
    /// - `MSSQL_CONNECT_TIMEOUT`: Pool acquisition timeout in seconds (default: 30)
    /// - `MSSQL_QUERY_TIMEOUT`: Query timeout in seconds (default: 30)
    ///
    /// ## Reference data
    /// - `EPICOR_REFERENCE_DIR`: Directory with the CSV files (default: `reference`)
    /// - `EPICOR_TABLES_FILE`, `EPICOR_RELATIONS_FILE`, `EPICOR_RELATION_FIELDS_FILE`
    ///
    /// ## Transport
    /// - `MCP_TRANSPORT`: `stdio` (default), `http` or `sse`
    /// - `MCP_HTTP_HOST` / `MCP_HTTP_PORT`: Bind address (default: 127.0.0.1:3000)
    /// - `MCP_ACCESS_TOKEN`: Required for the HTTP transport
    pub fn from_env() -> Result<Self, ServerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database = DatabaseConfig::from_lookup(&lookup)?;

        let reference_dir = non_empty(&lookup, "EPICOR_REFERENCE_DIR")
            .unwrap_or_else(|| DEFAULT_REFERENCE_DIR.to_string());
        let mut reference = ReferenceConfig::in_dir(reference_dir);
        if let Some(path) = non_empty(&lookup, "EPICOR_TABLES_FILE") {
            reference.tables_file = PathBuf::from(path);
        }
        if let Some(path) = non_empty(&lookup, "EPICOR_RELATIONS_FILE") {
            reference.relations_file = PathBuf::from(path);
        }
        if let Some(path) = non_empty(&lookup, "EPICOR_RELATION_FIELDS_FILE") {
            reference.relation_fields_file = PathBuf::from(path);
        }

        let mode = match non_empty(&lookup, "MCP_TRANSPORT") {
            Some(raw) => raw
                .parse::<TransportType>()
                .map_err(|e| ServerError::config(e.to_string()))?,
            None => TransportType::Stdio,
        };

        let access_token = non_empty(&lookup, "MCP_ACCESS_TOKEN");
        if mode == TransportType::Http && access_token.is_none() {
            return Err(ServerError::config(
                "MCP_ACCESS_TOKEN is required when MCP_TRANSPORT is http",
            ));
        }

        let transport = TransportConfig {
            mode,
            http_host: non_empty(&lookup, "MCP_HTTP_HOST")
                .unwrap_or_else(|| DEFAULT_HTTP_HOST.to_string()),
            http_port: parsed(&lookup, "MCP_HTTP_PORT", DEFAULT_HTTP_PORT)?,
            access_token,
        };

        Ok(Config {
            database,
            reference,
            transport,
        })
    }

    /// Whether the database tool set is enabled.
    pub fn database_configured(&self) -> bool {
        self.database.is_some()
    }
}

impl DatabaseConfig {
    /// Build the database section.
    ///
    /// Returns `None` when no host is configured, or when the host is set
    /// without credentials; the server then runs with the reference tools
    /// only. Malformed values are still errors.
    pub fn from_lookup<F>(lookup: &F) -> Result<Option<Self>, ServerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(host) = non_empty(lookup, "MSSQL_HOST") else {
            return Ok(None);
        };

        let username = non_empty(lookup, "MSSQL_USER");
        let password = lookup("MSSQL_PASSWORD").filter(|p| !p.is_empty());
        let (username, password) = match (username, password) {
            (Some(u), Some(p)) => (u, p),
            (user, _) => {
                let missing = if user.is_none() {
                    "MSSQL_USER"
                } else {
                    "MSSQL_PASSWORD"
                };
                warn!(
                    "MSSQL_HOST is set but {} is missing; database tools are disabled",
                    missing
                );
                return Ok(None);
            }
        };

        let pool = PoolConfig {
            min_connections: parsed(lookup, "MSSQL_POOL_MIN", DEFAULT_MIN_CONNECTIONS)?,
            max_connections: parsed(lookup, "MSSQL_POOL_MAX", DEFAULT_MAX_CONNECTIONS)?,
            connection_timeout: Duration::from_secs(parsed(
                lookup,
                "MSSQL_CONNECT_TIMEOUT",
                DEFAULT_CONNECTION_TIMEOUT_SECS,
            )?),
            idle_timeout: Duration::from_secs(parsed(
                lookup,
                "MSSQL_IDLE_TIMEOUT",
                DEFAULT_IDLE_TIMEOUT_SECS,
            )?),
        };

        if pool.max_connections == 0 {
            return Err(ServerError::config("MSSQL_POOL_MAX must be at least 1"));
        }
        if pool.min_connections > pool.max_connections {
            return Err(ServerError::config(format!(
                "MSSQL_POOL_MIN ({}) must not exceed MSSQL_POOL_MAX ({})",
                pool.min_connections, pool.max_connections
            )));
        }

        Ok(Some(DatabaseConfig {
            host,
            port: parsed(lookup, "MSSQL_PORT", DEFAULT_MSSQL_PORT)?,
            database: non_empty(lookup, "MSSQL_DATABASE"),
            username,
            password,
            encrypt: flag(lookup, "MSSQL_ENCRYPT", true),
            trust_server_certificate: flag(lookup, "MSSQL_TRUST_CERT", false),
            pool,
            query_timeout: Duration::from_secs(parsed(
                lookup,
                "MSSQL_QUERY_TIMEOUT",
                DEFAULT_QUERY_TIMEOUT_SECS,
            )?),
            application_name: "epicor-mcp-server".to_string(),
        }))
    }
}

impl BridgeConfig {
    /// Load bridge configuration from environment variables.
    ///
    /// - `MCP_SSE_URL`: required, absolute http(s) URL of the remote SSE stream
    /// - `MCP_BRIDGE_ENDPOINT_TIMEOUT`: optional seconds to wait for the endpoint event
    pub fn from_env() -> Result<Self, ServerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = non_empty(&lookup, "MCP_SSE_URL")
            .ok_or_else(|| ServerError::config("MCP_SSE_URL environment variable is required"))?;

        let sse_url = Url::parse(&raw)
            .map_err(|e| ServerError::config(format!("MCP_SSE_URL is not a valid URL: {}", e)))?;
        if !matches!(sse_url.scheme(), "http" | "https") {
            return Err(ServerError::config(format!(
                "MCP_SSE_URL must use http or https, got '{}'",
                sse_url.scheme()
            )));
        }

        let endpoint_timeout = match non_empty(&lookup, "MCP_BRIDGE_ENDPOINT_TIMEOUT") {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|_| {
                    ServerError::config(format!(
                        "MCP_BRIDGE_ENDPOINT_TIMEOUT has an invalid value: {}",
                        raw
                    ))
                })?;
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        Ok(BridgeConfig {
            sse_url,
            endpoint_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_pool_config_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.min_connections, 0);
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_no_host_disables_database() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert!(config.database.is_none());
        assert!(!config.database_configured());
        assert_eq!(config.transport.mode, TransportType::Stdio);
        assert_eq!(
            config.reference.tables_file,
            PathBuf::from("reference").join("TableAttribute.csv")
        );

        let config = Config::from_lookup(lookup(&[("MSSQL_HOST", "  ")])).unwrap();
        assert!(config.database.is_none());
    }

    #[test]
    fn test_host_without_credentials_degrades() {
        let config = Config::from_lookup(lookup(&[("MSSQL_HOST", "db")])).unwrap();
        assert!(config.database.is_none());

        let config =
            Config::from_lookup(lookup(&[("MSSQL_HOST", "db"), ("MSSQL_USER", "sa")])).unwrap();
        assert!(!config.database_configured());

        let config = Config::from_lookup(lookup(&[
            ("MSSQL_HOST", "db"),
            ("MSSQL_USER", "sa"),
            ("MSSQL_PASSWORD", ""),
        ]))
        .unwrap();
        assert!(config.database.is_none());
    }

    #[test]
    fn test_pool_min_above_max_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("MSSQL_HOST", "db"),
            ("MSSQL_USER", "sa"),
            ("MSSQL_PASSWORD", "pw"),
            ("MSSQL_POOL_MIN", "20"),
            ("MSSQL_POOL_MAX", "10"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("MSSQL_POOL_MIN"), "{err}");

        let config = Config::from_lookup(lookup(&[
            ("MSSQL_HOST", "db"),
            ("MSSQL_USER", "sa"),
            ("MSSQL_PASSWORD", "pw"),
            ("MSSQL_POOL_MIN", "4"),
            ("MSSQL_POOL_MAX", "4"),
        ]))
        .unwrap();
        assert_eq!(config.database.unwrap().pool.min_connections, 4);
    }

    #[test]
    fn test_full_database_config() {
        let config = Config::from_lookup(lookup(&[
            ("MSSQL_HOST", "erp-sql"),
            ("MSSQL_PORT", "14330"),
            ("MSSQL_DATABASE", "EpicorLive"),
            ("MSSQL_USER", "reader"),
            ("MSSQL_PASSWORD", "secret"),
            ("MSSQL_ENCRYPT", "false"),
            ("MSSQL_TRUST_CERT", "1"),
            ("MSSQL_POOL_MAX", "4"),
            ("MSSQL_QUERY_TIMEOUT", "12"),
        ]))
        .unwrap();

        let db = config.database.expect("database configured");
        assert_eq!(db.host, "erp-sql");
        assert_eq!(db.port, 14330);
        assert_eq!(db.database.as_deref(), Some("EpicorLive"));
        assert!(!db.encrypt);
        assert!(db.trust_server_certificate);
        assert_eq!(db.pool.max_connections, 4);
        assert_eq!(db.query_timeout, Duration::from_secs(12));

        let debug = format!("{:?}", db);
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_invalid_port_is_named() {
        let err = Config::from_lookup(lookup(&[
            ("MSSQL_HOST", "db"),
            ("MSSQL_USER", "u"),
            ("MSSQL_PASSWORD", "p"),
            ("MSSQL_PORT", "abc"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("MSSQL_PORT"));
    }

    #[test]
    fn test_reference_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("EPICOR_REFERENCE_DIR", "/data/ref"),
            ("EPICOR_RELATIONS_FILE", "/other/rel.csv"),
        ]))
        .unwrap();
        assert_eq!(
            config.reference.tables_file,
            PathBuf::from("/data/ref/TableAttribute.csv")
        );
        assert_eq!(
            config.reference.relations_file,
            PathBuf::from("/other/rel.csv")
        );
    }

    #[test]
    fn test_http_requires_token() {
        let err = Config::from_lookup(lookup(&[("MCP_TRANSPORT", "http")])).unwrap_err();
        assert!(err.to_string().contains("MCP_ACCESS_TOKEN"));

        let config = Config::from_lookup(lookup(&[
            ("MCP_TRANSPORT", "sse"),
            ("MCP_ACCESS_TOKEN", "tok"),
            ("MCP_HTTP_PORT", "8080"),
        ]))
        .unwrap();
        assert_eq!(config.transport.mode, TransportType::Http);
        assert_eq!(config.transport.http_port, 8080);
        assert!(!format!("{:?}", config.transport).contains("tok\""));
    }

    #[test]
    fn test_bridge_config() {
        let err = BridgeConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("MCP_SSE_URL"));

        let err =
            BridgeConfig::from_lookup(lookup(&[("MCP_SSE_URL", "ftp://host/sse")])).unwrap_err();
        assert!(err.to_string().contains("http"));

        let config = BridgeConfig::from_lookup(lookup(&[
            ("MCP_SSE_URL", "https://mcp.example.com/sse?token=abc"),
            ("MCP_BRIDGE_ENDPOINT_TIMEOUT", "15"),
        ]))
        .unwrap();
        assert_eq!(config.sse_url.path(), "/sse");
        assert_eq!(config.endpoint_timeout, Some(Duration::from_secs(15)));

        let config =
            BridgeConfig::from_lookup(lookup(&[("MCP_SSE_URL", "http://localhost:3000/sse")]))
                .unwrap();
        assert!(config.endpoint_timeout.is_none());
    }
}

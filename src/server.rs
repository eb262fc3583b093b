//! MCP server struct definition: tool registry and dispatcher.

use crate::config::Config;
use crate::database::{sql_server_connector, DatabaseConnector};
use crate::error::DispatchError;
use crate::index::RelationshipIndex;
use crate::tools::{self, ToolDescriptor, ToolKind, ToolOutput};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The Epicor MCP server instance.
///
/// Cheap to clone: the relationship index and the connector are shared.
/// Whether database tools are offered is decided once at construction,
/// from the presence of a connector, and never changes.
#[derive(Clone)]
pub struct EpicorMcpServer {
    index: Arc<RelationshipIndex>,
    connector: Option<Arc<DatabaseConnector>>,
    database_enabled: bool,
}

impl EpicorMcpServer {
    pub fn new(index: Arc<RelationshipIndex>, connector: Option<Arc<DatabaseConnector>>) -> Self {
        let database_enabled = connector.is_some();
        Self {
            index,
            connector,
            database_enabled,
        }
    }

    /// Load the reference data and, when configured, prepare the connector.
    ///
    /// No database connection is opened here.
    pub fn from_config(config: &Config) -> Self {
        let index = Arc::new(RelationshipIndex::load(&config.reference));
        let connector = config
            .database
            .as_ref()
            .map(|db| Arc::new(sql_server_connector(db)));
        if connector.is_none() {
            info!("MSSQL_HOST not set; database tools disabled");
        }
        Self::new(index, connector)
    }

    pub fn database_enabled(&self) -> bool {
        self.database_enabled
    }

    pub fn index(&self) -> &RelationshipIndex {
        &self.index
    }

    /// Open the database connection ahead of the first call.
    ///
    /// Failure is logged only: the tools stay advertised and report the
    /// error when called.
    pub async fn warm_up(&self) {
        if let Some(connector) = &self.connector {
            if let Err(e) = connector.connect().await {
                warn!("Initial database connection failed: {}", e);
            }
        }
    }

    /// Release the database connection, if any.
    pub async fn shutdown(&self) {
        if let Some(connector) = &self.connector {
            connector.close().await;
        }
    }

    /// Usage notes returned from `initialize`.
    pub fn instructions(&self) -> String {
        let mut text = String::from(
            "Epicor Kinetic metadata server. Use search_tables and get_table_details to find tables, \
             get_table_relationships, find_join_path and get_join_conditions to build joins.",
        );
        if self.database_enabled {
            text.push_str(
                " Database tools are available: execute_query runs read-only SELECT statements \
                 (a TOP limit is added when missing), test_query checks a query before running it, \
                 profile_table and profile_column summarize the data, and search_columns and \
                 find_related_tables explore the live schema.",
            );
        }
        text
    }

    /// The tool catalog: reference tools, plus database tools when enabled.
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        ToolKind::ALL
            .into_iter()
            .filter(|kind| self.database_enabled || !kind.requires_database())
            .map(ToolKind::descriptor)
            .collect()
    }

    /// Route a tool call to its handler.
    ///
    /// Unknown names, missing database configuration and malformed
    /// arguments are protocol errors; anything that goes wrong inside a
    /// handler comes back as an error [`ToolOutput`].
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput, DispatchError> {
        let kind =
            ToolKind::from_name(name).ok_or_else(|| DispatchError::UnknownTool(name.to_string()))?;
        debug!(tool = name, "Dispatching tool call");

        let connector = match (kind.requires_database(), &self.connector) {
            (false, _) => None,
            (true, Some(connector)) => Some(connector.as_ref()),
            (true, None) => return Err(DispatchError::DatabaseNotConfigured(name.to_string())),
        };

        let index = self.index.as_ref();
        let output = match (kind, connector) {
            (ToolKind::SearchTables, _) => tools::reference::search_tables(index, parse(kind, arguments)?),
            (ToolKind::GetTableDetails, _) => {
                tools::reference::table_details(index, parse(kind, arguments)?)
            }
            (ToolKind::ListSchemas, _) => tools::reference::list_schemas(index),
            (ToolKind::GetTablesByFlag, _) => {
                tools::reference::tables_by_flag(index, parse(kind, arguments)?)
            }
            (ToolKind::GetTableRelationships, _) => {
                tools::reference::table_relationships(index, parse(kind, arguments)?)
            }
            (ToolKind::GetQueryDetails, _) => {
                tools::reference::query_details(index, parse(kind, arguments)?)
            }
            (ToolKind::FindJoinPath, _) => {
                tools::reference::find_join_path(index, parse(kind, arguments)?)
            }
            (ToolKind::GetJoinConditions, _) => {
                tools::reference::join_conditions(index, parse(kind, arguments)?)
            }
            (ToolKind::ExecuteQuery, Some(db)) => {
                tools::database::execute_query(db, parse(kind, arguments)?).await
            }
            (ToolKind::GetTableColumns, Some(db)) => {
                tools::database::table_columns(db, parse(kind, arguments)?).await
            }
            (ToolKind::GetTableStats, Some(db)) => {
                tools::database::table_stats(db, parse(kind, arguments)?).await
            }
            (ToolKind::ListDatabaseSchemas, Some(db)) => {
                tools::database::list_database_schemas(db).await
            }
            (ToolKind::ListDatabaseTables, Some(db)) => {
                tools::database::list_database_tables(db, parse(kind, arguments)?).await
            }
            (ToolKind::GetSampleData, Some(db)) => {
                tools::database::sample_data(db, parse(kind, arguments)?).await
            }
            (ToolKind::TestQuery, Some(db)) => {
                tools::database::test_query(db, parse(kind, arguments)?).await
            }
            (ToolKind::SearchColumns, Some(db)) => {
                tools::database::search_columns(db, parse(kind, arguments)?).await
            }
            (ToolKind::FindRelatedTables, Some(db)) => {
                tools::database::find_related_tables(db, parse(kind, arguments)?).await
            }
            (ToolKind::ProfileTable, Some(db)) => {
                tools::database::profile_table(db, parse(kind, arguments)?).await
            }
            (ToolKind::ProfileColumn, Some(db)) => {
                tools::database::profile_column(db, parse(kind, arguments)?).await
            }
            (_, None) => return Err(DispatchError::DatabaseNotConfigured(name.to_string())),
        };

        Ok(output)
    }
}

/// Deserialize tool arguments; a missing or null argument object counts as `{}`.
fn parse<T: DeserializeOwned>(kind: ToolKind, arguments: Value) -> Result<T, DispatchError> {
    let arguments = if arguments.is_null() {
        Value::Object(Default::default())
    } else {
        arguments
    };
    serde_json::from_value(arguments).map_err(|e| DispatchError::InvalidArguments {
        tool: kind.name().to_string(),
        message: e.to_string(),
    })
}

//! MCP tools over the Epicor reference data and database.
//!
//! Reference tools answer from the in-memory [`RelationshipIndex`]:
//!
//! - `search_tables`, `get_table_details`, `list_schemas`, `get_tables_by_flag`
//! - `get_table_relationships`, `get_query_details`
//! - `find_join_path`, `get_join_conditions`
//!
//! Database tools exist only when a SQL Server is configured:
//!
//! - `execute_query`, `test_query`
//! - `get_table_columns`, `get_table_stats`, `get_sample_data`
//! - `list_database_schemas`, `list_database_tables`
//! - `search_columns`, `find_related_tables`
//! - `profile_table`, `profile_column`
//!
//! [`RelationshipIndex`]: crate::index::RelationshipIndex

pub mod database;
mod inputs;
pub mod reference;

pub use inputs::*;

use schemars::JsonSchema;
use serde::Serialize;
use serde_json::{json, Value};

/// Every tool the server knows, database-backed or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    SearchTables,
    GetTableDetails,
    ListSchemas,
    GetTablesByFlag,
    GetTableRelationships,
    GetQueryDetails,
    FindJoinPath,
    GetJoinConditions,
    ExecuteQuery,
    GetTableColumns,
    GetTableStats,
    ListDatabaseSchemas,
    ListDatabaseTables,
    GetSampleData,
    TestQuery,
    SearchColumns,
    FindRelatedTables,
    ProfileTable,
    ProfileColumn,
}

impl ToolKind {
    /// Catalog order: reference tools first, then database tools.
    pub const ALL: [ToolKind; 19] = [
        ToolKind::SearchTables,
        ToolKind::GetTableDetails,
        ToolKind::ListSchemas,
        ToolKind::GetTablesByFlag,
        ToolKind::GetTableRelationships,
        ToolKind::GetQueryDetails,
        ToolKind::FindJoinPath,
        ToolKind::GetJoinConditions,
        ToolKind::ExecuteQuery,
        ToolKind::GetTableColumns,
        ToolKind::GetTableStats,
        ToolKind::ListDatabaseSchemas,
        ToolKind::ListDatabaseTables,
        ToolKind::GetSampleData,
        ToolKind::TestQuery,
        ToolKind::SearchColumns,
        ToolKind::FindRelatedTables,
        ToolKind::ProfileTable,
        ToolKind::ProfileColumn,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::SearchTables => "search_tables",
            ToolKind::GetTableDetails => "get_table_details",
            ToolKind::ListSchemas => "list_schemas",
            ToolKind::GetTablesByFlag => "get_tables_by_flag",
            ToolKind::GetTableRelationships => "get_table_relationships",
            ToolKind::GetQueryDetails => "get_query_details",
            ToolKind::FindJoinPath => "find_join_path",
            ToolKind::GetJoinConditions => "get_join_conditions",
            ToolKind::ExecuteQuery => "execute_query",
            ToolKind::GetTableColumns => "get_table_columns",
            ToolKind::GetTableStats => "get_table_stats",
            ToolKind::ListDatabaseSchemas => "list_database_schemas",
            ToolKind::ListDatabaseTables => "list_database_tables",
            ToolKind::GetSampleData => "get_sample_data",
            ToolKind::TestQuery => "test_query",
            ToolKind::SearchColumns => "search_columns",
            ToolKind::FindRelatedTables => "find_related_tables",
            ToolKind::ProfileTable => "profile_table",
            ToolKind::ProfileColumn => "profile_column",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Whether the tool needs a configured database.
    pub fn requires_database(self) -> bool {
        matches!(
            self,
            ToolKind::ExecuteQuery
                | ToolKind::GetTableColumns
                | ToolKind::GetTableStats
                | ToolKind::ListDatabaseSchemas
                | ToolKind::ListDatabaseTables
                | ToolKind::GetSampleData
                | ToolKind::TestQuery
                | ToolKind::SearchColumns
                | ToolKind::FindRelatedTables
                | ToolKind::ProfileTable
                | ToolKind::ProfileColumn
        )
    }

    pub fn description(self) -> &'static str {
        match self {
            ToolKind::SearchTables => {
                "Search Epicor tables by name or description. Exact and prefix name matches rank first."
            }
            ToolKind::GetTableDetails => {
                "Describe one Epicor table: attributes, flags and a summary of its relationships."
            }
            ToolKind::ListSchemas => "List the schemas in the reference data with their table counts.",
            ToolKind::GetTablesByFlag => {
                "List tables by SystemFlag, AutoIMWriteTrigger and AutoIMDeleteTrigger attributes."
            }
            ToolKind::GetTableRelationships => {
                "List relations where a table is the parent or the child, with reconstructed join predicates."
            }
            ToolKind::GetQueryDetails => {
                "Show every relation of a saved BAQ query (QueryID), grouped by subquery."
            }
            ToolKind::FindJoinPath => {
                "Find the shortest join paths between two tables through declared relations."
            }
            ToolKind::GetJoinConditions => {
                "Get ready-to-use JOIN clauses for relations from a parent table to a child table."
            }
            ToolKind::ExecuteQuery => {
                "Execute a read-only SELECT against the Epicor database. Write statements are blocked and a TOP limit is added when missing."
            }
            ToolKind::GetTableColumns => {
                "List the columns of a database table with types, nullability, defaults and primary key markers."
            }
            ToolKind::GetTableStats => {
                "Get row count, space used, column and index counts, and create/modify dates for a table."
            }
            ToolKind::ListDatabaseSchemas => {
                "List database schemas with table counts and approximate row totals."
            }
            ToolKind::ListDatabaseTables => {
                "List the tables of a database schema with row and column counts."
            }
            ToolKind::GetSampleData => "Return the first rows of a table (default 10, max 100).",
            ToolKind::TestQuery => {
                "Check that a read-only query is valid and estimate its row count without returning rows."
            }
            ToolKind::SearchColumns => {
                "Find columns by name across every table of a schema, e.g. which tables carry PartNum."
            }
            ToolKind::FindRelatedTables => {
                "Infer parent and child tables from the live schema using Epicor key-column names (PartNum, CustNum, OrderNum, ...)."
            }
            ToolKind::ProfileTable => {
                "Profile a table: row count and, per column, NULL share, distinct count and a sample value."
            }
            ToolKind::ProfileColumn => {
                "Profile one column: NULL and distinct counts, min/max, average and the most frequent values."
            }
        }
    }

    /// JSON Schema for the tool's arguments.
    pub fn input_schema(self) -> Value {
        match self {
            ToolKind::SearchTables => schema_of::<SearchTablesInput>(),
            ToolKind::GetTableDetails => schema_of::<TableDetailsInput>(),
            ToolKind::ListSchemas | ToolKind::ListDatabaseSchemas => schema_of::<NoArgs>(),
            ToolKind::GetTablesByFlag => schema_of::<TablesByFlagInput>(),
            ToolKind::GetTableRelationships => schema_of::<TableRelationshipsInput>(),
            ToolKind::GetQueryDetails => schema_of::<QueryDetailsInput>(),
            ToolKind::FindJoinPath => schema_of::<FindJoinPathInput>(),
            ToolKind::GetJoinConditions => schema_of::<JoinConditionsInput>(),
            ToolKind::ExecuteQuery => schema_of::<ExecuteQueryInput>(),
            ToolKind::GetTableColumns
            | ToolKind::GetTableStats
            | ToolKind::FindRelatedTables
            | ToolKind::ProfileTable => schema_of::<TableRefInput>(),
            ToolKind::ListDatabaseTables => schema_of::<SchemaInput>(),
            ToolKind::GetSampleData => schema_of::<SampleDataInput>(),
            ToolKind::TestQuery => schema_of::<TestQueryInput>(),
            ToolKind::SearchColumns => schema_of::<SearchColumnsInput>(),
            ToolKind::ProfileColumn => schema_of::<ProfileColumnInput>(),
        }
    }

    pub fn descriptor(self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name(),
            description: self.description(),
            input_schema: self.input_schema(),
        }
    }
}

fn schema_of<T: JsonSchema>() -> Value {
    let root = schemars::schema_for!(T);
    let mut schema = serde_json::to_value(root).unwrap_or_else(|_| json!({ "type": "object" }));
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
        obj.entry("properties").or_insert_with(|| json!({}));
    }
    schema
}

/// A `tools/list` catalog entry.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// One content block of a tool result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Content {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

/// Result of a tool invocation.
///
/// Handler-level failures are reported here with `is_error` set rather than
/// as protocol errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutput {
    pub content: Vec<Content>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content {
                kind: "text",
                text: text.into(),
            }],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::text(text)
        }
    }

    /// Concatenated text of all content blocks.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Append a "did you mean" line when there are candidates.
pub(crate) fn with_suggestions(mut text: String, suggestions: &[String]) -> String {
    if !suggestions.is_empty() {
        text.push_str(&format!("\n\nDid you mean: {}?", suggestions.join(", ")));
    }
    text
}

//! Tool input types with JSON Schema generation.
//!
//! Field names follow the camelCase argument names advertised to clients.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Input for tools that take no arguments.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct NoArgs {}

/// Input for the `search_tables` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchTablesInput {
    #[schemars(description = "Text to match against table names and descriptions (case-insensitive)")]
    pub query: String,

    #[serde(default)]
    #[schemars(description = "Only return tables in this schema (e.g. Erp, Ice)")]
    pub schema: Option<String>,

    #[serde(default)]
    #[schemars(description = "Maximum number of tables to return (default: 20, max: 200)")]
    pub limit: Option<usize>,
}

/// Input for the `get_table_details` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TableDetailsInput {
    /// Table name, optionally schema-qualified (`Erp.Customer`).
    #[schemars(description = "Table name, optionally schema-qualified (e.g. Customer or Erp.Customer)")]
    pub table_name: String,

    #[serde(default)]
    #[schemars(description = "Schema name (default: Erp)")]
    pub schema: Option<String>,
}

/// Input for the `get_tables_by_flag` tool.
///
/// Every provided flag must match; omitted flags are not filtered on.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct TablesByFlagInput {
    #[serde(default, rename = "systemFlag")]
    #[schemars(description = "Filter on the SystemFlag attribute")]
    pub system_flag: Option<bool>,

    #[serde(default, rename = "autoIMWriteTrigger")]
    #[schemars(description = "Filter on the AutoIMWriteTrigger attribute")]
    pub write_trigger: Option<bool>,

    #[serde(default, rename = "autoIMDeleteTrigger")]
    #[schemars(description = "Filter on the AutoIMDeleteTrigger attribute")]
    pub delete_trigger: Option<bool>,

    #[serde(default)]
    #[schemars(description = "Maximum number of tables to list (default: 20)")]
    pub limit: Option<usize>,
}

/// Input for the `get_table_relationships` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TableRelationshipsInput {
    #[schemars(description = "Table name (schema prefix optional)")]
    pub table_name: String,

    #[serde(default)]
    #[schemars(description = "Maximum number of relationships to return (default: 50, max: 500)")]
    pub limit: Option<usize>,
}

/// Input for the `get_query_details` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryDetailsInput {
    #[schemars(description = "Saved query identifier (QueryID)")]
    pub query_id: String,
}

/// Input for the `find_join_path` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FindJoinPathInput {
    #[schemars(description = "Starting table")]
    pub from_table: String,

    #[schemars(description = "Target table")]
    pub to_table: String,

    #[serde(default)]
    #[schemars(description = "Maximum number of joins in a path (default: 3, max: 6)")]
    pub max_depth: Option<usize>,
}

/// Input for the `get_join_conditions` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinConditionsInput {
    #[schemars(description = "Parent table of the relation")]
    pub parent_table: String,

    #[schemars(description = "Child table of the relation")]
    pub child_table: String,

    #[serde(default)]
    #[schemars(description = "Only return relations from this saved query (QueryID)")]
    pub query_id: Option<String>,
}

/// Input for the `execute_query` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteQueryInput {
    #[schemars(description = "Read-only SELECT statement to execute")]
    pub query: String,

    #[serde(default)]
    #[schemars(description = "Maximum number of rows to return (default: 1000, max: 10000)")]
    pub max_rows: Option<usize>,
}

/// Input for tools addressing one database table.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TableRefInput {
    #[schemars(description = "Schema name (e.g. Erp)")]
    pub schema: String,

    #[schemars(description = "Table name")]
    pub table: String,
}

/// Input for the `list_database_tables` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SchemaInput {
    #[schemars(description = "Schema name (e.g. Erp)")]
    pub schema: String,
}

/// Input for the `get_sample_data` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SampleDataInput {
    #[schemars(description = "Schema name (e.g. Erp)")]
    pub schema: String,

    #[schemars(description = "Table name")]
    pub table: String,

    #[serde(default)]
    #[schemars(description = "Number of rows to return (default: 10, max: 100)")]
    pub limit: Option<usize>,
}

/// Input for the `test_query` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TestQueryInput {
    #[schemars(description = "Read-only SELECT statement to validate")]
    pub query: String,
}

/// Input for the `search_columns` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchColumnsInput {
    #[schemars(
        description = "Column name or SQL LIKE pattern (e.g. PartNum or %Num). Text without % or _ matches anywhere in the name"
    )]
    pub column_name: String,

    #[serde(default)]
    #[schemars(description = "Schema to search (default: Erp)")]
    pub schema: Option<String>,
}

/// Input for the `profile_column` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProfileColumnInput {
    #[schemars(description = "Schema name (e.g. Erp)")]
    pub schema: String,

    #[schemars(description = "Table name")]
    pub table: String,

    #[schemars(description = "Column name (case-insensitive)")]
    pub column: String,
}

//! End-to-end dispatcher tests over JSON-RPC.
//!
//! The reference tools run against the CSV fixtures in `tests/fixtures`.
//! The database tools run against a scripted in-process backend plugged in
//! through the public `ConnectionFactory` / `QueryRunner` traits, so no SQL
//! Server is needed.

use async_trait::async_trait;
use epicor_mcp_server::config::ReferenceConfig;
use epicor_mcp_server::database::{
    ConnectionFactory, DatabaseConnector, QueryResult, QueryRunner, SqlValue,
};
use epicor_mcp_server::error::codes;
use epicor_mcp_server::handlers::handle_raw;
use epicor_mcp_server::index::RelationshipIndex;
use epicor_mcp_server::{DbError, EpicorMcpServer};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn fixtures() -> ReferenceConfig {
    ReferenceConfig::in_dir(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures"))
}

fn index() -> Arc<RelationshipIndex> {
    Arc::new(RelationshipIndex::load(&fixtures()))
}

/// Shared record of what the scripted backend saw.
#[derive(Default)]
struct Backend {
    statements: Mutex<Vec<String>>,
    opens: AtomicUsize,
    pending_faults: AtomicUsize,
}

impl Backend {
    fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }
}

struct ScriptedRunner {
    backend: Arc<Backend>,
}

#[async_trait]
impl QueryRunner for ScriptedRunner {
    async fn run(&self, sql: &str, _max_rows: usize) -> Result<QueryResult, DbError> {
        if self
            .backend
            .pending_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(DbError::query("read ECONNRESET"));
        }
        self.backend.statements.lock().push(sql.to_string());

        if let Some(result) = catalog_response(sql) {
            return Ok(result);
        }
        if sql.contains("COUNT_BIG") {
            return Ok(QueryResult::from_rows(
                &["row_count"],
                vec![vec![SqlValue::I64(42)]],
            ));
        }
        Ok(QueryResult::from_rows(
            &["CustNum", "Name"],
            (1..=3)
                .map(|n| vec![SqlValue::I64(n), SqlValue::String(format!("Customer {}", n))])
                .collect(),
        ))
    }

    async fn close(&self) -> Result<(), DbError> {
        Ok(())
    }
}

fn text(value: &str) -> SqlValue {
    SqlValue::String(value.to_string())
}

/// Canned catalog and profiling answers for an `Erp.Customer`-like table.
fn catalog_response(sql: &str) -> Option<QueryResult> {
    let result = if sql.contains("AS top_value") {
        QueryResult::from_rows(
            &["top_value", "frequency"],
            vec![
                vec![SqlValue::I64(7), SqlValue::I64(21)],
                vec![SqlValue::I64(8), SqlValue::I64(7)],
            ],
        )
    } else if sql.contains("AS null_count") {
        QueryResult::from_rows(
            &[
                "total_rows",
                "null_count",
                "distinct_count",
                "min_value",
                "max_value",
                "avg_value",
                "stddev_value",
            ],
            vec![vec![
                SqlValue::I64(42),
                SqlValue::I64(0),
                SqlValue::I64(40),
                SqlValue::I64(1),
                SqlValue::I64(42),
                SqlValue::F64(21.5),
                SqlValue::F64(12.25),
            ]],
        )
    } else if sql.contains("COUNT(DISTINCT") {
        QueryResult::from_rows(
            &[
                "nulls_0", "distinct_0", "nulls_1", "distinct_1", "nulls_2", "distinct_2",
                "nulls_3", "distinct_3",
            ],
            vec![[0, 1, 0, 42, 0, 40, 21, 3].map(SqlValue::I64).to_vec()],
        )
    } else if sql.starts_with("SELECT TOP 1 [") {
        QueryResult::from_rows(
            &["Company", "CustNum", "Name", "TermsCode"],
            vec![vec![text("EPIC06"), SqlValue::I64(1), text("Dalton Mfg"), text("NET30")]],
        )
    } else if sql.contains("sys.index_columns") {
        QueryResult::from_rows(
            &["pk_column"],
            vec![vec![text("Company")], vec![text("CustNum")]],
        )
    } else if sql.contains("HAVING COUNT(*)") {
        QueryResult::from_rows(
            &["table_name"],
            vec![vec![text("OrderHed")], vec![text("ShipTo")]],
        )
    } else if sql.contains("COLUMN_NAME LIKE") {
        QueryResult::from_rows(
            &["table_name", "column_name", "data_type"],
            vec![
                vec![text("Customer"), text("CustNum"), text("int")],
                vec![text("OrderHed"), text("CustNum"), text("int")],
            ],
        )
    } else if sql.contains("INFORMATION_SCHEMA.TABLE_CONSTRAINTS") {
        let column = |name: &str, data_type: &str, length: Option<i64>, nullable: &str| {
            vec![
                text(name),
                text(data_type),
                length.map_or(SqlValue::Null, SqlValue::I64),
                SqlValue::Null,
                SqlValue::Null,
                text(nullable),
            ]
        };
        QueryResult::from_rows(
            &[
                "column_name",
                "data_type",
                "max_length",
                "numeric_precision",
                "numeric_scale",
                "is_nullable",
            ],
            vec![
                column("Company", "nvarchar", Some(8), "NO"),
                column("CustNum", "int", None, "NO"),
                column("Name", "nvarchar", Some(50), "NO"),
                column("TermsCode", "nvarchar", Some(4), "YES"),
                column("Photo", "varbinary", Some(-1), "YES"),
            ],
        )
    } else {
        return None;
    };
    Some(result)
}

struct ScriptedFactory {
    backend: Arc<Backend>,
}

#[async_trait]
impl ConnectionFactory for ScriptedFactory {
    async fn open(&self) -> Result<Arc<dyn QueryRunner>, DbError> {
        self.backend.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedRunner {
            backend: Arc::clone(&self.backend),
        }))
    }

    fn target(&self) -> String {
        "scripted".to_string()
    }
}

fn reference_server() -> EpicorMcpServer {
    EpicorMcpServer::new(index(), None)
}

fn database_server() -> (EpicorMcpServer, Arc<Backend>) {
    let backend = Arc::new(Backend::default());
    let connector = DatabaseConnector::new(
        Box::new(ScriptedFactory {
            backend: Arc::clone(&backend),
        }),
        Duration::from_secs(5),
    );
    (
        EpicorMcpServer::new(index(), Some(Arc::new(connector))),
        backend,
    )
}

async fn rpc(server: &EpicorMcpServer, method: &str, params: Value) -> Value {
    let request = json!({ "jsonrpc": "2.0", "id": 7, "method": method, "params": params });
    let raw = handle_raw(server, &request.to_string())
        .await
        .expect("request must produce a response");
    serde_json::from_str(&raw).unwrap()
}

/// Call a tool and return `(text, isError)`.
async fn call(server: &EpicorMcpServer, name: &str, arguments: Value) -> (String, bool) {
    let response = rpc(
        server,
        "tools/call",
        json!({ "name": name, "arguments": arguments }),
    )
    .await;
    let result = &response["result"];
    assert!(result.is_object(), "expected a tool result, got {response}");
    let text = result["content"][0]["text"].as_str().unwrap().to_string();
    (text, result["isError"].as_bool().unwrap())
}

// =============================================================================
// Catalog
// =============================================================================

#[tokio::test]
async fn test_tool_catalog_depends_on_database() {
    let response = rpc(&reference_server(), "tools/list", json!({})).await;
    let tools = response["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 8);
    for tool in tools {
        assert_eq!(tool["inputSchema"]["type"], "object");
    }

    let (server, _) = database_server();
    let response = rpc(&server, "tools/list", json!({})).await;
    let names: Vec<&str> = response["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 19);
    assert!(names.contains(&"execute_query"));
    assert!(names.contains(&"profile_table"));
    assert!(names.contains(&"test_query"));
}

#[tokio::test]
async fn test_database_tool_without_database_is_distinct_error() {
    let response = rpc(
        &reference_server(),
        "tools/call",
        json!({ "name": "execute_query", "arguments": { "query": "SELECT 1" } }),
    )
    .await;
    assert_eq!(response["error"]["code"], codes::DATABASE_NOT_CONFIGURED);

    let response = rpc(
        &reference_server(),
        "tools/call",
        json!({ "name": "describe_everything" }),
    )
    .await;
    assert_eq!(response["error"]["code"], codes::METHOD_NOT_FOUND);
}

// =============================================================================
// Reference tools
// =============================================================================

#[tokio::test]
async fn test_search_ranking_and_limit() {
    let server = reference_server();

    let (text, is_error) = call(&server, "search_tables", json!({ "query": "cust", "limit": 5 })).await;
    assert!(!is_error);
    assert!(text.contains("Showing 5 of 9 matches."), "{text}");

    let (text, _) = call(&server, "search_tables", json!({ "query": "Customer" })).await;
    let exact = text.find("| Customer |").unwrap();
    let prefix = text.find("| CustomerDocs |").unwrap();
    let description_only = text.find("| ShipTo |").unwrap();
    assert!(exact < prefix && prefix < description_only, "{text}");
}

#[tokio::test]
async fn test_search_with_no_matches_suggests() {
    let (text, is_error) = call(
        &reference_server(),
        "search_tables",
        json!({ "query": "Custmr" }),
    )
    .await;
    assert!(!is_error);
    assert!(text.starts_with("No tables found matching 'Custmr'."));
    assert!(text.contains("Did you mean:"));
}

#[tokio::test]
async fn test_table_details() {
    let server = reference_server();

    let (text, is_error) = call(
        &server,
        "get_table_details",
        json!({ "tableName": "erp.customer" }),
    )
    .await;
    assert!(!is_error);
    assert!(text.contains("## Erp.Customer"));
    assert!(text.contains("Customer master"));
    assert!(text.contains("Parent in 2 relation(s)"));
    assert!(text.contains("**Child tables:** OrderHed, ShipTo"));

    let (text, is_error) = call(&server, "get_table_details", json!({ "tableName": "Custmer" })).await;
    assert!(!is_error, "a missing table is not a tool failure");
    assert!(text.contains("not found"));
    assert!(text.contains("Customer"));
}

#[tokio::test]
async fn test_schemas_and_flags() {
    let server = reference_server();

    let (text, _) = call(&server, "list_schemas", json!({})).await;
    assert!(text.contains("| Erp | 12 |"));
    assert!(text.contains("| Ice | 2 |"));

    let (text, _) = call(&server, "get_tables_by_flag", json!({ "systemFlag": true })).await;
    assert!(text.contains("2 table(s) match"), "{text}");
    assert!(text.contains("| Ice | UD01 |"));

    let (text, _) = call(
        &server,
        "get_tables_by_flag",
        json!({ "autoIMWriteTrigger": true, "autoIMDeleteTrigger": true }),
    )
    .await;
    assert!(text.contains("5 table(s) match"), "{text}");
}

#[tokio::test]
async fn test_relationships_and_query_details() {
    let server = reference_server();

    let (text, _) = call(
        &server,
        "get_table_relationships",
        json!({ "tableName": "OrderHed" }),
    )
    .await;
    assert!(text.contains("3 relationship(s)."));
    assert!(text.contains("### As parent (1)"));
    assert!(text.contains("### As child (2)"));

    let (text, _) = call(
        &server,
        "get_table_relationships",
        json!({ "tableName": "OrderHed", "limit": 2 }),
    )
    .await;
    assert!(text.contains("3 relationship(s) total; showing 2."));

    let (text, _) = call(&server, "get_query_details", json!({ "queryId": "ZCUSTORDERS" })).await;
    assert!(text.contains("3 relation(s) across 2 subquery(ies)."));
    assert!(text.contains("### SubQuery SQ2"));
    assert!(text.contains("(LEFT JOIN, relation R-ORD-DTL)"));
}

#[tokio::test]
async fn test_join_conditions() {
    let server = reference_server();

    let (text, _) = call(
        &server,
        "get_join_conditions",
        json!({ "parentTable": "Customer", "childTable": "Erp.OrderHed" }),
    )
    .await;
    assert!(
        text.contains(
            "INNER JOIN Erp.OrderHed ON Customer.Company = OrderHed.Company AND Customer.CustNum = OrderHed.CustNum"
        ),
        "{text}"
    );

    let (text, _) = call(
        &server,
        "get_join_conditions",
        json!({ "parentTable": "OrderHed", "childTable": "Customer" }),
    )
    .await;
    assert!(text.starts_with("No relations found from OrderHed to Customer."));
    assert!(text.contains("1 relation(s) exist in the reverse direction"));
}

#[tokio::test]
async fn test_find_join_path_depth() {
    let server = reference_server();

    let (text, _) = call(
        &server,
        "find_join_path",
        json!({ "fromTable": "Customer", "toTable": "OrderRel" }),
    )
    .await;
    assert!(text.contains("Found 1 path(s) (max depth 3)."), "{text}");
    assert!(text.contains("Customer -> OrderHed -> OrderDtl -> OrderRel"));
    assert!(text.contains("`OrderDtl.Company = OrderRel.Company AND OrderDtl.OrderNum = OrderRel.OrderNum AND OrderDtl.OrderLine = OrderRel.OrderLine`"));

    let (text, _) = call(
        &server,
        "find_join_path",
        json!({ "fromTable": "Customer", "toTable": "OrderRel", "maxDepth": 2 }),
    )
    .await;
    assert!(text.starts_with("No join path found between Customer and OrderRel within 2 join(s)."));

    let (text, _) = call(
        &server,
        "find_join_path",
        json!({ "fromTable": "Customer", "toTable": "OrderRel", "maxDepth": 4 }),
    )
    .await;
    assert!(text.contains("Found 2 path(s)"));
    let short = text.find("### Path 1 (3 join(s))").unwrap();
    let long = text.find("### Path 2 (4 join(s))").unwrap();
    assert!(short < long);
}

// =============================================================================
// Database tools
// =============================================================================

#[tokio::test]
async fn test_execute_query_injects_limit_and_caps_rows() {
    let (server, backend) = database_server();

    let (text, is_error) = call(
        &server,
        "execute_query",
        json!({ "query": "SELECT * FROM Erp.Customer", "maxRows": 2 }),
    )
    .await;
    assert!(!is_error);
    assert_eq!(backend.statements(), vec!["SELECT TOP 2 * FROM Erp.Customer"]);
    assert!(text.contains("| CustNum | Name |"));
    assert!(text.contains("_2 row(s)_ _(truncated)_"), "{text}");
}

#[tokio::test]
async fn test_blocked_statement_never_reaches_database() {
    let (server, backend) = database_server();

    let (text, is_error) = call(
        &server,
        "execute_query",
        json!({ "query": "delete from Erp.Customer where 1 = 1" }),
    )
    .await;
    assert!(is_error);
    assert!(text.contains("DELETE"), "{text}");
    assert!(backend.statements().is_empty());
}

#[tokio::test]
async fn test_connection_fault_reconnects_once() {
    let (server, backend) = database_server();
    backend.pending_faults.store(1, Ordering::SeqCst);

    let (_, is_error) = call(
        &server,
        "execute_query",
        json!({ "query": "SELECT CustNum FROM Erp.Customer" }),
    )
    .await;
    assert!(!is_error);
    assert_eq!(backend.opens.load(Ordering::SeqCst), 2);

    backend.pending_faults.store(2, Ordering::SeqCst);
    let (text, is_error) = call(
        &server,
        "execute_query",
        json!({ "query": "SELECT CustNum FROM Erp.Customer" }),
    )
    .await;
    assert!(is_error);
    assert!(text.contains("after reconnect"), "{text}");
}

#[tokio::test]
async fn test_test_query_reports_count() {
    let (server, backend) = database_server();

    let (text, is_error) = call(
        &server,
        "test_query",
        json!({ "query": "SELECT * FROM Erp.OrderHed;" }),
    )
    .await;
    assert!(!is_error);
    assert!(text.contains("Estimated row count: 42"), "{text}");
    assert_eq!(
        backend.statements(),
        vec!["SELECT COUNT_BIG(*) AS row_count FROM (\nSELECT * FROM Erp.OrderHed\n) AS q"]
    );
}

#[tokio::test]
async fn test_invalid_identifier_is_rejected_before_sql() {
    let (server, backend) = database_server();

    let (text, is_error) = call(
        &server,
        "get_sample_data",
        json!({ "schema": "Erp", "table": "Customer; DROP TABLE x" }),
    )
    .await;
    assert!(is_error);
    assert!(text.to_lowercase().contains("identifier"), "{text}");
    assert!(backend.statements().is_empty());

    let (_, is_error) = call(
        &server,
        "get_sample_data",
        json!({ "schema": "Erp", "table": "Customer", "limit": 500 }),
    )
    .await;
    assert!(!is_error);
    assert_eq!(
        backend.statements(),
        vec!["SELECT TOP 100 * FROM [Erp].[Customer]"]
    );
}

#[tokio::test]
async fn test_search_columns_defaults_to_erp_substring() {
    let (server, backend) = database_server();

    let (text, is_error) = call(&server, "search_columns", json!({ "columnName": "CustNum" })).await;
    assert!(!is_error, "{text}");
    assert!(text.contains("## Columns matching `CustNum` in Erp (2)"), "{text}");
    assert!(text.contains("| OrderHed | CustNum | int |"));

    let sql = &backend.statements()[0];
    assert!(sql.contains("c.TABLE_SCHEMA = N'Erp'"));
    assert!(sql.contains("LIKE N'%CustNum%'"));

    let (text, is_error) = call(
        &server,
        "search_columns",
        json!({ "columnName": "CustNum", "schema": "Erp; DROP" }),
    )
    .await;
    assert!(is_error);
    assert!(text.contains("Invalid identifier"), "{text}");
}

#[tokio::test]
async fn test_find_related_tables_by_key_columns() {
    let (server, backend) = database_server();

    let (text, is_error) = call(
        &server,
        "find_related_tables",
        json!({ "schema": "Erp", "table": "Customer" }),
    )
    .await;
    assert!(!is_error, "{text}");
    assert!(text.contains("**Primary key:** Company, CustNum"));
    // CustNum points back at Customer itself, so only TermsCode is a parent
    assert!(text.contains("### Likely parents (1)"), "{text}");
    assert!(text.contains("`TermsCode` likely references **Erp.Terms**"));
    assert!(text.contains("### Likely children (2 tables carry CustNum)"), "{text}");
    assert!(text.contains("- Erp.ShipTo"));

    let children = backend
        .statements()
        .into_iter()
        .find(|sql| sql.contains("HAVING COUNT(*)"))
        .unwrap();
    assert!(children.contains("c.COLUMN_NAME IN (N'CustNum')"));
    assert!(children.contains("HAVING COUNT(*) = 1"));
}

#[tokio::test]
async fn test_profile_table_skips_binary_columns() {
    let (server, backend) = database_server();

    let (text, is_error) = call(
        &server,
        "profile_table",
        json!({ "schema": "Erp", "table": "Customer" }),
    )
    .await;
    assert!(!is_error, "{text}");
    assert!(text.contains("**Rows:** 42\n"), "{text}");
    assert!(text.contains("**Columns:** 5 (not profiled: Photo)"));
    assert!(text.contains("| CustNum | int | 0% | 42 | 1 |"), "{text}");
    assert!(text.contains("| TermsCode | nvarchar | 50% | 3 | NET30 |"), "{text}");

    let statements = backend.statements();
    assert!(statements.contains(&"SELECT COUNT_BIG(*) AS row_count FROM [Erp].[Customer]".to_string()));
    assert!(statements.contains(
        &"SELECT TOP 1 [Company], [CustNum], [Name], [TermsCode] FROM [Erp].[Customer]".to_string()
    ));
    assert!(statements.iter().all(|sql| !sql.contains("[Photo]")));
}

#[tokio::test]
async fn test_profile_column_statistics_and_frequencies() {
    let (server, backend) = database_server();

    let (text, is_error) = call(
        &server,
        "profile_column",
        json!({ "schema": "Erp", "table": "Customer", "column": "custnum" }),
    )
    .await;
    assert!(!is_error, "{text}");
    assert!(text.contains("## Column profile: Erp.Customer.CustNum"), "{text}");
    assert!(text.contains("**Nulls:** 0 (0.0%)"));
    assert!(text.contains("**Average:** 21.5000"));
    assert!(text.contains("| 7 | 21 | 50.0% |"), "{text}");
    assert!(backend
        .statements()
        .iter()
        .any(|sql| sql.contains("GROUP BY [CustNum]")));

    let (text, is_error) = call(
        &server,
        "profile_column",
        json!({ "schema": "Erp", "table": "Customer", "column": "Nope" }),
    )
    .await;
    assert!(!is_error);
    assert!(text.contains("Column 'Nope' not found"), "{text}");
    assert!(text.contains("Available columns: Company, CustNum, Name, TermsCode, Photo"));
}

#[tokio::test]
async fn test_profile_binary_column_has_no_frequency_query() {
    let (server, backend) = database_server();

    let (text, is_error) = call(
        &server,
        "profile_column",
        json!({ "schema": "Erp", "table": "Customer", "column": "Photo" }),
    )
    .await;
    assert!(!is_error, "{text}");
    assert!(text.contains("**Type:** varbinary(max)"), "{text}");
    assert!(text.contains("frequency analysis skipped"));

    let statements = backend.statements();
    assert!(statements.iter().all(|sql| !sql.contains("GROUP BY")));
    let stats = statements
        .iter()
        .find(|sql| sql.contains("AS null_count"))
        .unwrap();
    assert!(!stats.contains("MIN("));
}

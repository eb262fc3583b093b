//! SQL Server catalog queries for schema introspection.
//!
//! Every statement here has a fixed shape. Schema and table names are
//! validated against the identifier allow-list before being spliced in,
//! either bracket-escaped (as identifiers) or as `N'...'` literals.

use crate::constants::{
    COLUMN_SEARCH_MAX_ROWS, MAX_SAMPLE_ROWS, METADATA_MAX_ROWS, PROFILE_SAMPLE_ROWS,
    PROFILE_SAMPLE_THRESHOLD, PROFILE_TOP_VALUES, PROFILE_VALUE_LENGTH,
};
use crate::database::connector::DatabaseConnector;
use crate::database::query::QueryResult;
use crate::database::types::SqlValue;
use crate::error::DbError;
use crate::security::{
    check_read_only, escape_identifier, has_row_limit, is_cte, qualified_table,
    strip_trailing_semicolons, string_literal, top_level_order_by, validate_identifier,
};
use tracing::{debug, warn};

/// Outcome of a dry-run of a candidate query.
#[derive(Debug, Clone, PartialEq)]
pub struct TestQueryOutcome {
    /// Row count the query would return, when it could be counted.
    pub row_count: Option<i64>,

    /// The query could not be wrapped and was executed with a one-row cap.
    pub cte_fallback: bool,

    /// Execution time in milliseconds.
    pub execution_time_ms: u64,
}

/// Column listing with type detail and a primary-key marker.
pub fn columns_sql(schema: &str, table: &str) -> String {
    format!(
        r#"
        SELECT
            c.COLUMN_NAME AS column_name,
            c.DATA_TYPE AS data_type,
            c.CHARACTER_MAXIMUM_LENGTH AS max_length,
            c.NUMERIC_PRECISION AS numeric_precision,
            c.NUMERIC_SCALE AS numeric_scale,
            c.IS_NULLABLE AS is_nullable,
            c.COLUMN_DEFAULT AS column_default,
            CASE WHEN pk.COLUMN_NAME IS NULL THEN 'NO' ELSE 'YES' END AS is_primary_key
        FROM INFORMATION_SCHEMA.COLUMNS c
        LEFT JOIN (
            SELECT ku.TABLE_SCHEMA, ku.TABLE_NAME, ku.COLUMN_NAME
            FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
            JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE ku
                ON tc.CONSTRAINT_NAME = ku.CONSTRAINT_NAME
                AND tc.TABLE_SCHEMA = ku.TABLE_SCHEMA
            WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
        ) pk
            ON pk.TABLE_SCHEMA = c.TABLE_SCHEMA
            AND pk.TABLE_NAME = c.TABLE_NAME
            AND pk.COLUMN_NAME = c.COLUMN_NAME
        WHERE c.TABLE_SCHEMA = {} AND c.TABLE_NAME = {}
        ORDER BY c.ORDINAL_POSITION
        "#,
        string_literal(schema),
        string_literal(table)
    )
}

/// Size and shape statistics for one table.
pub fn stats_sql(schema: &str, table: &str) -> String {
    format!(
        r#"
        SELECT
            s.name AS schema_name,
            t.name AS table_name,
            (SELECT SUM(p.rows) FROM sys.partitions p
                WHERE p.object_id = t.object_id AND p.index_id IN (0, 1)) AS row_count,
            (SELECT SUM(a.total_pages) * 8 FROM sys.partitions p
                JOIN sys.allocation_units a ON a.container_id = p.partition_id
                WHERE p.object_id = t.object_id) AS total_space_kb,
            (SELECT COUNT(*) FROM sys.columns c WHERE c.object_id = t.object_id) AS column_count,
            (SELECT COUNT(*) FROM sys.indexes i
                WHERE i.object_id = t.object_id AND i.index_id > 0) AS index_count,
            t.create_date AS created,
            t.modify_date AS modified
        FROM sys.tables t
        JOIN sys.schemas s ON s.schema_id = t.schema_id
        WHERE s.name = {} AND t.name = {}
        "#,
        string_literal(schema),
        string_literal(table)
    )
}

/// Schemas with table counts and approximate row totals.
pub const SCHEMAS_SQL: &str = r#"
    SELECT
        s.name AS schema_name,
        COUNT(DISTINCT t.object_id) AS table_count,
        SUM(CASE WHEN p.index_id IN (0, 1) THEN p.rows ELSE 0 END) AS approx_rows
    FROM sys.schemas s
    JOIN sys.tables t ON t.schema_id = s.schema_id
    LEFT JOIN sys.partitions p ON p.object_id = t.object_id
    GROUP BY s.name
    ORDER BY s.name
"#;

/// Tables of one schema with row and column counts.
pub fn tables_sql(schema: &str) -> String {
    format!(
        r#"
        SELECT
            t.name AS table_name,
            (SELECT SUM(p.rows) FROM sys.partitions p
                WHERE p.object_id = t.object_id AND p.index_id IN (0, 1)) AS row_count,
            (SELECT COUNT(*) FROM sys.columns c WHERE c.object_id = t.object_id) AS column_count
        FROM sys.tables t
        JOIN sys.schemas s ON s.schema_id = t.schema_id
        WHERE s.name = {}
        ORDER BY t.name
        "#,
        string_literal(schema)
    )
}

/// First `limit` rows of a table.
pub fn sample_sql(schema: &str, table: &str, limit: usize) -> Result<String, DbError> {
    Ok(format!(
        "SELECT TOP {} * FROM {}",
        limit,
        qualified_table(schema, table)?
    ))
}

/// Count wrapper for a candidate query.
///
/// The query sits on its own lines so a trailing `--` comment cannot swallow
/// the closing parenthesis. A trailing top-level `ORDER BY` is dropped unless
/// the query bounds its rows, since SQL Server rejects it in a derived table.
pub fn count_wrapper_sql(query: &str) -> String {
    let mut body = strip_trailing_semicolons(query);
    if !has_row_limit(body) {
        if let Some(pos) = top_level_order_by(body) {
            body = body[..pos].trim_end();
        }
    }
    format!("SELECT COUNT_BIG(*) AS row_count FROM (\n{}\n) AS q", body)
}

/// Epicor key columns and the table they usually reference.
///
/// Core Epicor tables carry no foreign key constraints, so parents are
/// inferred from these names.
pub const KNOWN_KEY_PARENTS: &[(&str, &str)] = &[
    ("PartNum", "Part"),
    ("CustNum", "Customer"),
    ("VendorNum", "Vendor"),
    ("OrderNum", "OrderHed"),
    ("JobNum", "JobHead"),
    ("InvoiceNum", "InvcHead"),
    ("PONum", "POHeader"),
    ("QuoteNum", "QuoteHed"),
    ("PackNum", "ShipHead"),
    ("EmpID", "EmpBasic"),
    ("BuyerID", "PurAgent"),
    ("CurrencyCode", "Currency"),
    ("TaxCode", "SalesTax"),
    ("ShipViaCode", "ShipVia"),
    ("TermsCode", "Terms"),
    ("PlantID", "Plant"),
];

/// Which aggregates a column's type supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    /// `bit`: countable and groupable, but MIN/MAX reject it.
    Flag,
    /// Raw bytes and row versions; only counted.
    Binary,
    /// `text`, `image`, `xml` and spatial types cannot be compared.
    LargeObject,
    Other,
}

impl ColumnKind {
    pub fn of(data_type: &str) -> Self {
        match data_type.to_ascii_lowercase().as_str() {
            "int" | "bigint" | "smallint" | "tinyint" | "decimal" | "numeric" | "float"
            | "real" | "money" | "smallmoney" => ColumnKind::Numeric,
            "bit" => ColumnKind::Flag,
            "binary" | "varbinary" | "timestamp" | "rowversion" => ColumnKind::Binary,
            "image" | "text" | "ntext" | "xml" | "geography" | "geometry" => {
                ColumnKind::LargeObject
            }
            _ => ColumnKind::Other,
        }
    }

    /// Distinct counts and frequency lists make sense for this column.
    pub fn is_groupable(self) -> bool {
        matches!(self, ColumnKind::Numeric | ColumnKind::Flag | ColumnKind::Other)
    }

    fn is_ordered(self) -> bool {
        matches!(self, ColumnKind::Numeric | ColumnKind::Other)
    }
}

/// Display form of a catalog type, e.g. `nvarchar(50)` or `decimal(18,3)`.
pub fn type_label(
    data_type: &str,
    max_length: Option<i64>,
    precision: Option<i64>,
    scale: Option<i64>,
) -> String {
    if ColumnKind::of(data_type) == ColumnKind::LargeObject {
        return data_type.to_string();
    }
    match (max_length, precision) {
        (Some(-1), _) => format!("{}(max)", data_type),
        (Some(len), _) if len > 0 => format!("{}({})", data_type, len),
        (None, Some(p)) if matches!(data_type.to_ascii_lowercase().as_str(), "decimal" | "numeric") => {
            format!("{}({},{})", data_type, p, scale.unwrap_or(0))
        }
        _ => data_type.to_string(),
    }
}

/// Columns of one schema whose names match a `LIKE` pattern.
///
/// A pattern without `%` or `_` matches anywhere in the name.
pub fn search_columns_sql(schema: &str, pattern: &str) -> String {
    let pattern = if pattern.contains(['%', '_']) {
        pattern.to_string()
    } else {
        format!("%{}%", pattern)
    };
    format!(
        r#"
        SELECT
            c.TABLE_NAME AS table_name,
            c.COLUMN_NAME AS column_name,
            c.DATA_TYPE AS data_type
        FROM INFORMATION_SCHEMA.COLUMNS c
        WHERE c.TABLE_SCHEMA = {} AND c.COLUMN_NAME LIKE {}
        ORDER BY c.TABLE_NAME, c.COLUMN_NAME
        "#,
        string_literal(schema),
        string_literal(&pattern)
    )
}

/// Primary key columns of a table in key order.
pub fn primary_key_sql(schema: &str, table: &str) -> Result<String, DbError> {
    Ok(format!(
        r#"
        SELECT COL_NAME(ic.object_id, ic.column_id) AS pk_column
        FROM sys.indexes i
        JOIN sys.index_columns ic
            ON ic.object_id = i.object_id AND ic.index_id = i.index_id
        WHERE i.is_primary_key = 1 AND i.object_id = OBJECT_ID({})
        ORDER BY ic.key_ordinal
        "#,
        string_literal(&qualified_table(schema, table)?)
    ))
}

/// Other tables of the schema that carry every one of `key_columns`.
pub fn child_tables_sql(schema: &str, table: &str, key_columns: &[String]) -> String {
    let names = key_columns
        .iter()
        .map(|c| string_literal(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"
        SELECT c.TABLE_NAME AS table_name
        FROM INFORMATION_SCHEMA.COLUMNS c
        WHERE c.TABLE_SCHEMA = {} AND c.TABLE_NAME <> {} AND c.COLUMN_NAME IN ({})
        GROUP BY c.TABLE_NAME
        HAVING COUNT(*) = {}
        ORDER BY c.TABLE_NAME
        "#,
        string_literal(schema),
        string_literal(table),
        names,
        key_columns.len()
    )
}

/// Exact row count of a table.
pub fn row_count_sql(schema: &str, table: &str) -> Result<String, DbError> {
    Ok(format!(
        "SELECT COUNT_BIG(*) AS row_count FROM {}",
        qualified_table(schema, table)?
    ))
}

/// NULL and distinct counts for several columns in one scan.
///
/// Results are aliased by position: `nulls_0`, `distinct_0`, `nulls_1`, ...
pub fn profile_columns_sql(
    schema: &str,
    table: &str,
    columns: &[String],
    sampled: bool,
) -> Result<String, DbError> {
    let table = qualified_table(schema, table)?;
    let source = if sampled {
        format!("(SELECT TOP {} * FROM {}) AS sampled", PROFILE_SAMPLE_ROWS, table)
    } else {
        table
    };
    let aggregates = columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let column = escape_identifier(name);
            format!(
                "SUM(CASE WHEN {0} IS NULL THEN 1 ELSE 0 END) AS nulls_{1}, COUNT(DISTINCT {0}) AS distinct_{1}",
                column, i
            )
        })
        .collect::<Vec<_>>()
        .join(",\n    ");
    Ok(format!("SELECT\n    {}\nFROM {}", aggregates, source))
}

/// One row of the given columns.
pub fn sample_row_sql(schema: &str, table: &str, columns: &[String]) -> Result<String, DbError> {
    let list = columns
        .iter()
        .map(|c| escape_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!(
        "SELECT TOP 1 {} FROM {}",
        list,
        qualified_table(schema, table)?
    ))
}

/// Counts, extremes and (for numbers) mean and deviation of one column.
pub fn column_stats_sql(
    schema: &str,
    table: &str,
    column: &str,
    kind: ColumnKind,
) -> Result<String, DbError> {
    let col = escape_identifier(column);
    let mut parts = vec![
        "COUNT_BIG(*) AS total_rows".to_string(),
        format!("SUM(CASE WHEN {} IS NULL THEN 1 ELSE 0 END) AS null_count", col),
    ];
    if kind != ColumnKind::LargeObject {
        parts.push(format!("COUNT(DISTINCT {}) AS distinct_count", col));
    }
    if kind.is_ordered() {
        parts.push(format!("MIN({}) AS min_value", col));
        parts.push(format!("MAX({}) AS max_value", col));
    }
    if kind == ColumnKind::Numeric {
        parts.push(format!("AVG(CAST({} AS FLOAT)) AS avg_value", col));
        parts.push(format!("STDEV(CAST({} AS FLOAT)) AS stddev_value", col));
    }
    Ok(format!(
        "SELECT {} FROM {}",
        parts.join(", "),
        qualified_table(schema, table)?
    ))
}

/// Most frequent values of one column.
pub fn top_values_sql(schema: &str, table: &str, column: &str) -> Result<String, DbError> {
    let col = escape_identifier(column);
    Ok(format!(
        "SELECT TOP {n} {col} AS top_value, COUNT_BIG(*) AS frequency FROM {table} GROUP BY {col} ORDER BY COUNT_BIG(*) DESC",
        n = PROFILE_TOP_VALUES,
        col = col,
        table = qualified_table(schema, table)?
    ))
}

/// One line of a table profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSummary {
    pub name: String,
    pub data_type: String,
    /// Share of NULLs among the profiled rows, 0 to 100.
    pub null_percent: Option<f64>,
    pub distinct_count: Option<i64>,
    pub sample: Option<String>,
}

/// Overview of every column in a table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableProfile {
    pub row_count: i64,
    /// NULL and distinct figures come from the first rows only.
    pub sampled: bool,
    pub columns: Vec<ColumnSummary>,
    /// Binary and large-object columns left out.
    pub skipped: Vec<String>,
}

impl TableProfile {
    /// Number of rows the NULL and distinct figures cover.
    pub fn profiled_rows(&self) -> i64 {
        if self.sampled {
            self.row_count.min(PROFILE_SAMPLE_ROWS)
        } else {
            self.row_count
        }
    }
}

/// Detailed statistics for one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnProfile {
    pub column: String,
    pub type_label: String,
    pub nullable: bool,
    pub kind: ColumnKind,
    pub total_rows: i64,
    pub null_count: i64,
    pub distinct_count: Option<i64>,
    pub min_value: Option<String>,
    pub max_value: Option<String>,
    pub average: Option<f64>,
    pub std_dev: Option<f64>,
    /// `(value, frequency)`, most frequent first.
    pub top_values: Vec<(String, i64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnProfileOutcome {
    Profiled(ColumnProfile),
    TableNotFound,
    ColumnNotFound { available: Vec<String> },
}

/// Relationships inferred from key-column names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelatedTables {
    pub primary_key: Vec<String>,
    /// Primary key without `Company`, which nearly every table carries.
    pub business_key: Vec<String>,
    /// `(column, referenced table)` from [`KNOWN_KEY_PARENTS`].
    pub parents: Vec<(String, &'static str)>,
    /// Tables carrying the whole business key.
    pub children: Vec<String>,
    pub children_truncated: bool,
}

/// One row of [`columns_sql`].
struct CatalogColumn {
    name: String,
    data_type: String,
    max_length: Option<i64>,
    precision: Option<i64>,
    scale: Option<i64>,
    nullable: bool,
}

impl CatalogColumn {
    fn kind(&self) -> ColumnKind {
        ColumnKind::of(&self.data_type)
    }
}

fn cell_text(result: &QueryResult, row: &[SqlValue], column: &str) -> Option<String> {
    match result.value(row, column)? {
        SqlValue::Null => None,
        value => Some(value.to_display_string()),
    }
}

fn cell_i64(result: &QueryResult, row: &[SqlValue], column: &str) -> Option<i64> {
    result.value(row, column).and_then(SqlValue::as_i64)
}

fn catalog_columns(result: &QueryResult) -> Vec<CatalogColumn> {
    result
        .rows
        .iter()
        .filter_map(|row| {
            Some(CatalogColumn {
                name: cell_text(result, row, "column_name")?,
                data_type: cell_text(result, row, "data_type").unwrap_or_default(),
                max_length: cell_i64(result, row, "max_length"),
                precision: cell_i64(result, row, "numeric_precision"),
                scale: cell_i64(result, row, "numeric_scale"),
                nullable: cell_text(result, row, "is_nullable")
                    .is_some_and(|v| v.eq_ignore_ascii_case("YES")),
            })
        })
        .collect()
}

/// Shorten a value for display.
fn clip(text: String) -> String {
    if text.chars().count() <= PROFILE_VALUE_LENGTH {
        return text;
    }
    let mut cut: String = text.chars().take(PROFILE_VALUE_LENGTH - 3).collect();
    cut.push_str("...");
    cut
}

/// Catalog queries issued through the connector.
pub struct MetadataQueries<'a> {
    connector: &'a DatabaseConnector,
}

impl<'a> MetadataQueries<'a> {
    pub fn new(connector: &'a DatabaseConnector) -> Self {
        Self { connector }
    }

    /// Columns of a table in ordinal order.
    pub async fn table_columns(&self, schema: &str, table: &str) -> Result<QueryResult, DbError> {
        validate_identifier(schema)?;
        validate_identifier(table)?;
        self.connector
            .run_guarded(&columns_sql(schema, table), METADATA_MAX_ROWS)
            .await
    }

    /// Statistics row for a table; empty when the table does not exist.
    pub async fn table_stats(&self, schema: &str, table: &str) -> Result<QueryResult, DbError> {
        validate_identifier(schema)?;
        validate_identifier(table)?;
        self.connector.run_guarded(&stats_sql(schema, table), 1).await
    }

    pub async fn list_schemas(&self) -> Result<QueryResult, DbError> {
        self.connector.run_guarded(SCHEMAS_SQL, METADATA_MAX_ROWS).await
    }

    pub async fn list_tables(&self, schema: &str) -> Result<QueryResult, DbError> {
        validate_identifier(schema)?;
        self.connector
            .run_guarded(&tables_sql(schema), METADATA_MAX_ROWS)
            .await
    }

    /// Sample rows; `limit` is clamped to 1..=100.
    pub async fn sample_data(
        &self,
        schema: &str,
        table: &str,
        limit: usize,
    ) -> Result<QueryResult, DbError> {
        let limit = limit.clamp(1, MAX_SAMPLE_ROWS);
        let sql = sample_sql(schema, table, limit)?;
        self.connector.run_guarded(&sql, limit).await
    }

    /// Columns whose names match `pattern` across one schema.
    pub async fn search_columns(&self, schema: &str, pattern: &str) -> Result<QueryResult, DbError> {
        validate_identifier(schema)?;
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(DbError::invalid_input("Column name pattern cannot be empty"));
        }
        self.connector
            .run_guarded(&search_columns_sql(schema, pattern), COLUMN_SEARCH_MAX_ROWS)
            .await
    }

    /// Parents and children of a table, inferred from Epicor key-column names.
    pub async fn find_related_tables(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<RelatedTables, DbError> {
        let pk = self
            .connector
            .run_guarded(&primary_key_sql(schema, table)?, METADATA_MAX_ROWS)
            .await?;
        let primary_key: Vec<String> = pk
            .rows
            .iter()
            .filter_map(|row| cell_text(&pk, row, "pk_column"))
            .collect();
        let business_key: Vec<String> = primary_key
            .iter()
            .filter(|c| !c.eq_ignore_ascii_case("Company"))
            .cloned()
            .collect();

        let columns = catalog_columns(&self.table_columns(schema, table).await?);
        let parents = KNOWN_KEY_PARENTS
            .iter()
            .filter(|(key, parent)| {
                !parent.eq_ignore_ascii_case(table)
                    && columns.iter().any(|c| c.name.eq_ignore_ascii_case(key))
            })
            .map(|(key, parent)| (key.to_string(), *parent))
            .collect();

        let mut related = RelatedTables {
            primary_key,
            business_key,
            parents,
            ..RelatedTables::default()
        };
        if !related.business_key.is_empty() {
            let sql = child_tables_sql(schema, table, &related.business_key);
            let result = self.connector.run_guarded(&sql, COLUMN_SEARCH_MAX_ROWS).await?;
            related.children = result
                .rows
                .iter()
                .filter_map(|row| cell_text(&result, row, "table_name"))
                .collect();
            related.children_truncated = result.truncated;
        }
        Ok(related)
    }

    /// Row count plus NULL share, distinct count and a sample value per column.
    ///
    /// Returns `None` when the table has no columns, i.e. does not exist.
    pub async fn profile_table(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Option<TableProfile>, DbError> {
        let columns = catalog_columns(&self.table_columns(schema, table).await?);
        if columns.is_empty() {
            return Ok(None);
        }

        let count = self
            .connector
            .run_guarded(&row_count_sql(schema, table)?, 1)
            .await?;
        let row_count = count
            .rows
            .first()
            .and_then(|row| cell_i64(&count, row, "row_count"))
            .unwrap_or(0);

        let (profiled, skipped): (Vec<&CatalogColumn>, Vec<&CatalogColumn>) =
            columns.iter().partition(|c| c.kind().is_groupable());
        let mut profile = TableProfile {
            row_count,
            sampled: row_count > PROFILE_SAMPLE_THRESHOLD,
            columns: Vec::new(),
            skipped: skipped.iter().map(|c| c.name.clone()).collect(),
        };
        if profiled.is_empty() {
            return Ok(Some(profile));
        }

        let names: Vec<String> = profiled.iter().map(|c| c.name.clone()).collect();
        let stats = self
            .connector
            .run_guarded(&profile_columns_sql(schema, table, &names, profile.sampled)?, 1)
            .await?;
        let stats_row = stats.rows.first();

        let sample = match self
            .connector
            .run_guarded(&sample_row_sql(schema, table, &names)?, 1)
            .await
        {
            Ok(result) => result.rows.into_iter().next(),
            Err(e) => {
                warn!("Sample row for {}.{} unavailable: {}", schema, table, e);
                None
            }
        };

        let profiled_rows = profile.profiled_rows();
        profile.columns = profiled
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let nulls = stats_row.and_then(|row| cell_i64(&stats, row, &format!("nulls_{}", i)));
                ColumnSummary {
                    name: column.name.clone(),
                    data_type: column.data_type.clone(),
                    null_percent: nulls
                        .filter(|_| profiled_rows > 0)
                        .map(|n| n as f64 * 100.0 / profiled_rows as f64),
                    distinct_count: stats_row
                        .and_then(|row| cell_i64(&stats, row, &format!("distinct_{}", i))),
                    sample: sample
                        .as_ref()
                        .and_then(|row| row.get(i))
                        .map(|v| clip(v.to_display_string())),
                }
            })
            .collect();
        Ok(Some(profile))
    }

    /// Counts, extremes, mean and most frequent values of one column.
    pub async fn profile_column(
        &self,
        schema: &str,
        table: &str,
        column: &str,
    ) -> Result<ColumnProfileOutcome, DbError> {
        validate_identifier(column)?;
        let columns = catalog_columns(&self.table_columns(schema, table).await?);
        if columns.is_empty() {
            return Ok(ColumnProfileOutcome::TableNotFound);
        }
        let Some(found) = columns.iter().find(|c| c.name.eq_ignore_ascii_case(column)) else {
            return Ok(ColumnProfileOutcome::ColumnNotFound {
                available: columns.iter().map(|c| c.name.clone()).collect(),
            });
        };

        let kind = found.kind();
        let stats = self
            .connector
            .run_guarded(&column_stats_sql(schema, table, &found.name, kind)?, 1)
            .await?;
        let row = stats.rows.first().map(Vec::as_slice).unwrap_or_default();

        let top_values = if kind.is_groupable() {
            let top = self
                .connector
                .run_guarded(&top_values_sql(schema, table, &found.name)?, PROFILE_TOP_VALUES)
                .await?;
            top.rows
                .iter()
                .map(|r| {
                    let value = top
                        .value(r, "top_value")
                        .map(|v| clip(v.to_display_string()))
                        .unwrap_or_default();
                    (value, cell_i64(&top, r, "frequency").unwrap_or(0))
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok(ColumnProfileOutcome::Profiled(ColumnProfile {
            column: found.name.clone(),
            type_label: type_label(&found.data_type, found.max_length, found.precision, found.scale),
            nullable: found.nullable,
            kind,
            total_rows: cell_i64(&stats, row, "total_rows").unwrap_or(0),
            null_count: cell_i64(&stats, row, "null_count").unwrap_or(0),
            distinct_count: cell_i64(&stats, row, "distinct_count"),
            min_value: cell_text(&stats, row, "min_value").map(clip),
            max_value: cell_text(&stats, row, "max_value").map(clip),
            average: stats.value(row, "avg_value").and_then(SqlValue::as_f64),
            std_dev: stats.value(row, "stddev_value").and_then(SqlValue::as_f64),
            top_values,
        }))
    }

    /// Validate a query and estimate its row count without materializing it.
    pub async fn test_query(&self, query: &str) -> Result<TestQueryOutcome, DbError> {
        check_read_only(query)?;

        if is_cte(query) {
            debug!("CTE cannot be wrapped in a count query, running with a one-row cap");
            let result = self
                .connector
                .run_guarded(strip_trailing_semicolons(query), 1)
                .await?;
            return Ok(TestQueryOutcome {
                row_count: None,
                cte_fallback: true,
                execution_time_ms: result.execution_time_ms,
            });
        }

        let result = self
            .connector
            .run_guarded(&count_wrapper_sql(query), 1)
            .await?;
        let row_count = result
            .rows
            .first()
            .and_then(|row| result.value(row, "row_count"))
            .and_then(|v| v.as_i64());

        Ok(TestQueryOutcome {
            row_count,
            cte_fallback: false,
            execution_time_ms: result.execution_time_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_sql_passes_denylist() {
        for sql in [
            columns_sql("Erp", "Customer"),
            stats_sql("Erp", "Customer"),
            SCHEMAS_SQL.to_string(),
            tables_sql("Erp"),
            sample_sql("Erp", "Customer", 10).unwrap(),
            search_columns_sql("Erp", "PartNum"),
            primary_key_sql("Erp", "Part").unwrap(),
            child_tables_sql("Erp", "Part", &["PartNum".to_string()]),
            row_count_sql("Erp", "Part").unwrap(),
            profile_columns_sql("Erp", "Part", &["PartNum".to_string()], true).unwrap(),
            sample_row_sql("Erp", "Part", &["PartNum".to_string()]).unwrap(),
            column_stats_sql("Erp", "Part", "UnitPrice", ColumnKind::Numeric).unwrap(),
            top_values_sql("Erp", "Part", "ClassID").unwrap(),
        ] {
            assert!(check_read_only(&sql).is_ok(), "blocked: {}", sql);
        }
    }

    #[test]
    fn test_names_are_literals() {
        let sql = columns_sql("Erp", "O'Brien");
        assert!(sql.contains("c.TABLE_NAME = N'O''Brien'"));
        assert!(stats_sql("Erp", "Customer").contains("s.name = N'Erp'"));
    }

    #[test]
    fn test_sample_sql() {
        assert_eq!(
            sample_sql("Erp", "Customer", 10).unwrap(),
            "SELECT TOP 10 * FROM [Erp].[Customer]"
        );
        assert!(sample_sql("Erp", "Customer; DROP", 10).is_err());
    }

    #[test]
    fn test_count_wrapper() {
        assert_eq!(
            count_wrapper_sql("SELECT * FROM Erp.Customer;"),
            "SELECT COUNT_BIG(*) AS row_count FROM (\nSELECT * FROM Erp.Customer\n) AS q"
        );
    }

    #[test]
    fn test_count_wrapper_survives_trailing_line_comment() {
        let sql = count_wrapper_sql("SELECT CustNum FROM Erp.Customer -- active only");
        let last = sql.lines().last().unwrap();
        assert_eq!(last, ") AS q");
        assert!(check_read_only(&sql).is_ok());
    }

    #[test]
    fn test_count_wrapper_drops_top_level_order_by() {
        assert_eq!(
            count_wrapper_sql("SELECT CustNum, Name FROM Erp.Customer ORDER BY Name DESC;"),
            "SELECT COUNT_BIG(*) AS row_count FROM (\nSELECT CustNum, Name FROM Erp.Customer\n) AS q"
        );

        // ORDER BY is legal alongside TOP and inside window functions
        let bounded = "SELECT TOP 5 CustNum FROM Erp.Customer ORDER BY CustNum";
        assert!(count_wrapper_sql(bounded).contains(bounded));
        let windowed = "SELECT RANK() OVER (ORDER BY Name) AS r FROM Erp.Customer";
        assert!(count_wrapper_sql(windowed).contains(windowed));
    }

    #[test]
    fn test_search_columns_pattern() {
        let sql = search_columns_sql("Erp", "PartNum");
        assert!(sql.contains("c.COLUMN_NAME LIKE N'%PartNum%'"));
        assert!(search_columns_sql("Erp", "Part%").contains("LIKE N'Part%'"));
        assert!(search_columns_sql("Erp", "x' OR 1=1 --").contains("LIKE N'%x'' OR 1=1 --%'"));
    }

    #[test]
    fn test_child_tables_require_every_key_column() {
        let sql = child_tables_sql(
            "Erp",
            "OrderDtl",
            &["OrderNum".to_string(), "OrderLine".to_string()],
        );
        assert!(sql.contains("c.COLUMN_NAME IN (N'OrderNum', N'OrderLine')"));
        assert!(sql.contains("HAVING COUNT(*) = 2"));
        assert!(sql.contains("c.TABLE_NAME <> N'OrderDtl'"));
    }

    #[test]
    fn test_primary_key_sql_validates_names() {
        assert!(primary_key_sql("Erp", "Part")
            .unwrap()
            .contains("OBJECT_ID(N'[Erp].[Part]')"));
        assert!(primary_key_sql("Erp", "Part')--").is_err());
    }

    #[test]
    fn test_profile_columns_sql() {
        let columns = vec!["PartNum".to_string(), "Odd]Name".to_string()];
        let sql = profile_columns_sql("Erp", "Part", &columns, false).unwrap();
        assert!(sql.contains("COUNT(DISTINCT [PartNum]) AS distinct_0"));
        assert!(sql.contains("SUM(CASE WHEN [Odd]]Name] IS NULL THEN 1 ELSE 0 END) AS nulls_1"));
        assert!(sql.ends_with("FROM [Erp].[Part]"));

        let sampled = profile_columns_sql("Erp", "Part", &columns, true).unwrap();
        assert!(sampled.ends_with("FROM (SELECT TOP 50000 * FROM [Erp].[Part]) AS sampled"));
    }

    #[test]
    fn test_column_stats_follow_kind() {
        let numeric = column_stats_sql("Erp", "Part", "UnitPrice", ColumnKind::Numeric).unwrap();
        assert!(numeric.contains("STDEV(CAST([UnitPrice] AS FLOAT)) AS stddev_value"));
        assert!(numeric.contains("MIN([UnitPrice]) AS min_value"));

        let flag = column_stats_sql("Erp", "Part", "InActive", ColumnKind::Flag).unwrap();
        assert!(!flag.contains("MIN("));
        assert!(flag.contains("COUNT(DISTINCT [InActive])"));

        let text = column_stats_sql("Erp", "Part", "Notes", ColumnKind::LargeObject).unwrap();
        assert!(!text.contains("DISTINCT"));
        assert!(text.contains("AS null_count"));
    }

    #[test]
    fn test_column_kind_and_type_label() {
        assert_eq!(ColumnKind::of("DECIMAL"), ColumnKind::Numeric);
        assert_eq!(ColumnKind::of("bit"), ColumnKind::Flag);
        assert_eq!(ColumnKind::of("varbinary"), ColumnKind::Binary);
        assert_eq!(ColumnKind::of("ntext"), ColumnKind::LargeObject);
        assert_eq!(ColumnKind::of("nvarchar"), ColumnKind::Other);
        assert!(!ColumnKind::Binary.is_groupable());

        assert_eq!(type_label("nvarchar", Some(50), None, None), "nvarchar(50)");
        assert_eq!(type_label("nvarchar", Some(-1), None, None), "nvarchar(max)");
        assert_eq!(type_label("decimal", None, Some(18), Some(3)), "decimal(18,3)");
        assert_eq!(type_label("int", None, Some(10), Some(0)), "int");
        assert_eq!(type_label("ntext", Some(1_073_741_823), None, None), "ntext");
    }

    #[test]
    fn test_clip_long_values() {
        assert_eq!(clip("short".to_string()), "short");
        let long = "é".repeat(100);
        let clipped = clip(long);
        assert_eq!(clipped.chars().count(), PROFILE_VALUE_LENGTH);
        assert!(clipped.ends_with("..."));
    }

    #[test]
    fn test_sampled_profile_covers_sample_rows() {
        let profile = TableProfile {
            row_count: 250_000,
            sampled: true,
            columns: Vec::new(),
            skipped: Vec::new(),
        };
        assert_eq!(profile.profiled_rows(), PROFILE_SAMPLE_ROWS);
    }
}

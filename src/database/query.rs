//! Query results and their Markdown rendering.

use crate::constants::MAX_CELL_LENGTH;
use crate::database::types::{SqlValue, TypeMapper};
use crate::error::DbError;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tiberius::QueryStream;

/// Information about a result column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,

    /// SQL type name.
    pub sql_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
        }
    }
}

/// Result of a query execution.
///
/// Rows hold values in column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Columns of the first result set.
    pub columns: Vec<ColumnInfo>,

    /// Result rows.
    pub rows: Vec<Vec<SqlValue>>,

    /// Execution time in milliseconds.
    pub execution_time_ms: u64,

    /// Whether results were truncated due to row limit.
    pub truncated: bool,
}

impl QueryResult {
    /// Create an empty query result.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a result from column names and rows, mostly for tests and scripted backends.
    pub fn from_rows(columns: &[&str], rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns: columns.iter().map(|c| ColumnInfo::new(*c, "")).collect(),
            rows,
            execution_time_ms: 0,
            truncated: false,
        }
    }

    /// Position of a column, case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Value of a named column in one row.
    pub fn value<'a>(&self, row: &'a [SqlValue], column: &str) -> Option<&'a SqlValue> {
        self.column_index(column).and_then(|i| row.get(i))
    }

    /// Keep at most `max_rows` rows, flagging truncation.
    pub fn cap_rows(&mut self, max_rows: usize) {
        if self.rows.len() > max_rows {
            self.rows.truncate(max_rows);
            self.truncated = true;
        }
    }

    /// Format the result as a markdown table.
    pub fn to_markdown_table(&self) -> String {
        if self.columns.is_empty() {
            return "Query executed successfully. No results returned.".to_string();
        }
        if self.rows.is_empty() {
            return "_No rows returned._".to_string();
        }

        let mut output = String::new();

        let headers: Vec<String> = self.columns.iter().map(|c| format_cell(&c.name)).collect();
        output.push_str("| ");
        output.push_str(&headers.join(" | "));
        output.push_str(" |\n");

        output.push_str("| ");
        output.push_str(
            &headers
                .iter()
                .map(|h| "-".repeat(h.len().clamp(3, 40)))
                .collect::<Vec<_>>()
                .join(" | "),
        );
        output.push_str(" |\n");

        for row in &self.rows {
            let values: Vec<String> = (0..self.columns.len())
                .map(|i| {
                    row.get(i)
                        .map(|v| format_cell(&v.to_display_string()))
                        .unwrap_or_else(|| "NULL".to_string())
                })
                .collect();
            output.push_str("| ");
            output.push_str(&values.join(" | "));
            output.push_str(" |\n");
        }

        output.push_str(&format!("\n_{} row(s)_", self.rows.len()));
        if self.truncated {
            output.push_str(" _(truncated)_");
        }
        output.push_str(&format!(" _({} ms)_", self.execution_time_ms));

        output
    }
}

/// Render one cell: escape pipes, flatten newlines and cap the length.
pub fn format_cell(raw: &str) -> String {
    let flat = raw
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
        .replace('|', "\\|");

    if flat.chars().count() > MAX_CELL_LENGTH {
        let cut: String = flat.chars().take(MAX_CELL_LENGTH).collect();
        format!("{}...", cut)
    } else {
        flat
    }
}

/// Drain a Tiberius stream into a result, keeping the first result set.
pub async fn process_stream(
    mut stream: QueryStream<'_>,
    max_rows: usize,
    start: Instant,
) -> Result<QueryResult, DbError> {
    use futures_util::stream::TryStreamExt;

    let mut columns: Vec<ColumnInfo> = Vec::new();
    let mut rows: Vec<Vec<SqlValue>> = Vec::new();
    let mut truncated = false;
    let mut result_sets = 0usize;

    while let Some(item) = stream.try_next().await? {
        match item {
            tiberius::QueryItem::Metadata(meta) => {
                result_sets += 1;
                if result_sets == 1 {
                    columns = meta
                        .columns()
                        .iter()
                        .map(|col| ColumnInfo::new(col.name(), TypeMapper::sql_type_name(col)))
                        .collect();
                }
            }
            tiberius::QueryItem::Row(row) => {
                if result_sets > 1 {
                    continue;
                }
                if rows.len() >= max_rows {
                    truncated = true;
                    continue;
                }
                rows.push(TypeMapper::extract_row(&row));
            }
        }
    }

    Ok(QueryResult {
        columns,
        rows,
        execution_time_ms: start.elapsed().as_millis() as u64,
        truncated,
    })
}

/// Truncate a string for logging purposes.
pub fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len).collect();
        format!("{}...", cut)
    }
}

//! Database tools, executed through the [`DatabaseConnector`].
//!
//! Failures (blocked statements, bad identifiers, driver errors) come back
//! as error results so the caller can read the reason and adjust.

use super::inputs::{
    ExecuteQueryInput, ProfileColumnInput, SampleDataInput, SchemaInput, SearchColumnsInput,
    TableRefInput, TestQueryInput,
};
use super::ToolOutput;
use crate::constants::{
    DEFAULT_MAX_ROWS, DEFAULT_SAMPLE_ROWS, DEFAULT_SCHEMA, LOG_QUERY_TRUNCATE_LENGTH,
    PROFILE_SAMPLE_ROWS,
};
use crate::database::{
    format_cell, truncate_for_log, ColumnProfile, ColumnProfileOutcome, DatabaseConnector,
    MetadataQueries, QueryResult, RelatedTables, TableProfile,
};
use crate::error::DbError;
use std::fmt::Write;
use tracing::{debug, warn};

fn failure(action: &str, e: DbError) -> ToolOutput {
    warn!("{} failed: {}", action, e);
    match e {
        // already phrased for the caller
        DbError::Blocked { .. } | DbError::InvalidInput(_) => ToolOutput::error(e.to_string()),
        _ => ToolOutput::error(format!("{} failed: {}", action, e)),
    }
}

fn rendered(heading: String, result: &QueryResult) -> ToolOutput {
    ToolOutput::text(format!("{}\n\n{}", heading, result.to_markdown_table()))
}

/// `execute_query`
pub async fn execute_query(connector: &DatabaseConnector, input: ExecuteQueryInput) -> ToolOutput {
    let max_rows = input.max_rows.unwrap_or(DEFAULT_MAX_ROWS);
    debug!(
        "execute_query: {}",
        truncate_for_log(&input.query, LOG_QUERY_TRUNCATE_LENGTH)
    );

    match connector.execute_query(&input.query, max_rows).await {
        Ok(result) => ToolOutput::text(result.to_markdown_table()),
        Err(e) => failure("Query", e),
    }
}

/// `get_table_columns`
pub async fn table_columns(connector: &DatabaseConnector, input: TableRefInput) -> ToolOutput {
    let metadata = MetadataQueries::new(connector);
    match metadata.table_columns(&input.schema, &input.table).await {
        Ok(result) if result.rows.is_empty() => ToolOutput::text(format!(
            "No columns found for {}.{}. Check that the table exists.",
            input.schema, input.table
        )),
        Ok(result) => rendered(
            format!(
                "## Columns of {}.{} ({})",
                input.schema,
                input.table,
                result.rows.len()
            ),
            &result,
        ),
        Err(e) => failure("Column lookup", e),
    }
}

/// `get_table_stats`
pub async fn table_stats(connector: &DatabaseConnector, input: TableRefInput) -> ToolOutput {
    let metadata = MetadataQueries::new(connector);
    match metadata.table_stats(&input.schema, &input.table).await {
        Ok(result) if result.rows.is_empty() => ToolOutput::text(format!(
            "Table {}.{} not found in the database.",
            input.schema, input.table
        )),
        Ok(result) => rendered(
            format!("## Statistics for {}.{}", input.schema, input.table),
            &result,
        ),
        Err(e) => failure("Statistics lookup", e),
    }
}

/// `list_database_schemas`
pub async fn list_database_schemas(connector: &DatabaseConnector) -> ToolOutput {
    match MetadataQueries::new(connector).list_schemas().await {
        Ok(result) if result.rows.is_empty() => {
            ToolOutput::text("No user tables found in the database.")
        }
        Ok(result) => rendered("## Database schemas".to_string(), &result),
        Err(e) => failure("Schema listing", e),
    }
}

/// `list_database_tables`
pub async fn list_database_tables(connector: &DatabaseConnector, input: SchemaInput) -> ToolOutput {
    match MetadataQueries::new(connector).list_tables(&input.schema).await {
        Ok(result) if result.rows.is_empty() => {
            ToolOutput::text(format!("No tables found in schema '{}'.", input.schema))
        }
        Ok(result) => rendered(
            format!(
                "## Tables in schema {} ({})",
                input.schema,
                result.rows.len()
            ),
            &result,
        ),
        Err(e) => failure("Table listing", e),
    }
}

/// `get_sample_data`
pub async fn sample_data(connector: &DatabaseConnector, input: SampleDataInput) -> ToolOutput {
    let limit = input.limit.unwrap_or(DEFAULT_SAMPLE_ROWS);
    match MetadataQueries::new(connector)
        .sample_data(&input.schema, &input.table, limit)
        .await
    {
        Ok(result) => rendered(
            format!("## Sample data from {}.{}", input.schema, input.table),
            &result,
        ),
        Err(e) => failure("Sample query", e),
    }
}

/// `test_query`
pub async fn test_query(connector: &DatabaseConnector, input: TestQueryInput) -> ToolOutput {
    match MetadataQueries::new(connector).test_query(&input.query).await {
        Ok(outcome) if outcome.cte_fallback => ToolOutput::text(format!(
            "Query is valid. It starts with a CTE, so it was run with a one-row limit and the row count was not estimated ({} ms).",
            outcome.execution_time_ms
        )),
        Ok(outcome) => match outcome.row_count {
            Some(count) => ToolOutput::text(format!(
                "Query is valid. Estimated row count: {} ({} ms).",
                count, outcome.execution_time_ms
            )),
            None => ToolOutput::text(format!(
                "Query is valid. The row count could not be determined ({} ms).",
                outcome.execution_time_ms
            )),
        },
        Err(e) => failure("Query validation", e),
    }
}

/// `search_columns`
pub async fn search_columns(connector: &DatabaseConnector, input: SearchColumnsInput) -> ToolOutput {
    let schema = input.schema.as_deref().unwrap_or(DEFAULT_SCHEMA);
    match MetadataQueries::new(connector)
        .search_columns(schema, &input.column_name)
        .await
    {
        Ok(result) if result.rows.is_empty() => ToolOutput::text(format!(
            "No columns matching `{}` in schema {}.",
            input.column_name, schema
        )),
        Ok(result) => rendered(
            format!(
                "## Columns matching `{}` in {} ({})",
                input.column_name,
                schema,
                result.rows.len()
            ),
            &result,
        ),
        Err(e) => failure("Column search", e),
    }
}

/// `find_related_tables`
pub async fn find_related_tables(connector: &DatabaseConnector, input: TableRefInput) -> ToolOutput {
    match MetadataQueries::new(connector)
        .find_related_tables(&input.schema, &input.table)
        .await
    {
        Ok(related) => ToolOutput::text(related_text(&input.schema, &input.table, &related)),
        Err(e) => failure("Relationship discovery", e),
    }
}

fn related_text(schema: &str, table: &str, related: &RelatedTables) -> String {
    let mut out = format!("## Relationships for {}.{}\n\n", schema, table);

    if related.primary_key.is_empty() {
        let _ = writeln!(
            out,
            "No primary key found for {}.{}, so children cannot be inferred from key columns.",
            schema, table
        );
    } else {
        let _ = writeln!(out, "**Primary key:** {}", related.primary_key.join(", "));
    }

    if !related.parents.is_empty() {
        let _ = writeln!(out, "\n### Likely parents ({})", related.parents.len());
        for (column, parent) in &related.parents {
            let _ = writeln!(out, "- `{}` likely references **{}.{}**", column, schema, parent);
        }
    }

    if related.primary_key.is_empty() {
        return out;
    }
    if related.business_key.is_empty() {
        let _ = writeln!(
            out,
            "\nThe primary key is only Company, so children cannot be inferred."
        );
        return out;
    }

    if related.children.is_empty() {
        let _ = writeln!(
            out,
            "\n### Likely children\n_No other table carries {}._",
            related.business_key.join(", ")
        );
    } else {
        let _ = writeln!(
            out,
            "\n### Likely children ({} tables carry {})",
            related.children.len(),
            related.business_key.join(", ")
        );
        for child in &related.children {
            let _ = writeln!(out, "- {}.{}", schema, child);
        }
        if related.children_truncated {
            out.push_str("_(truncated)_\n");
        }
    }
    out
}

/// `profile_table`
pub async fn profile_table(connector: &DatabaseConnector, input: TableRefInput) -> ToolOutput {
    match MetadataQueries::new(connector)
        .profile_table(&input.schema, &input.table)
        .await
    {
        Ok(None) => ToolOutput::text(format!(
            "Table {}.{} not found in the database.",
            input.schema, input.table
        )),
        Ok(Some(profile)) => {
            ToolOutput::text(table_profile_text(&input.schema, &input.table, &profile))
        }
        Err(e) => failure("Table profile", e),
    }
}

fn table_profile_text(schema: &str, table: &str, profile: &TableProfile) -> String {
    let mut out = format!("## Profile of {}.{}\n\n", schema, table);
    let _ = write!(out, "**Rows:** {}", profile.row_count);
    if profile.sampled {
        let _ = write!(
            out,
            " (NULL and distinct figures from the first {} rows)",
            PROFILE_SAMPLE_ROWS
        );
    }
    let _ = write!(
        out,
        "\n**Columns:** {}",
        profile.columns.len() + profile.skipped.len()
    );
    if !profile.skipped.is_empty() {
        let _ = write!(out, " (not profiled: {})", profile.skipped.join(", "));
    }
    out.push_str("\n\n");

    if profile.columns.is_empty() {
        out.push_str("_No profilable columns._");
        return out;
    }

    out.push_str("| Column | Type | Null % | Distinct | Sample |\n");
    out.push_str("|--------|------|--------|----------|--------|\n");
    for column in &profile.columns {
        let null_percent = column
            .null_percent
            .map(|p| format!("{:.0}%", p))
            .unwrap_or_default();
        let distinct = match column.distinct_count {
            Some(n) if profile.sampled => format!("~{}", n),
            Some(n) => n.to_string(),
            None => "?".to_string(),
        };
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            format_cell(&column.name),
            format_cell(&column.data_type),
            null_percent,
            distinct,
            format_cell(column.sample.as_deref().unwrap_or(""))
        );
    }
    out
}

/// `profile_column`
pub async fn profile_column(connector: &DatabaseConnector, input: ProfileColumnInput) -> ToolOutput {
    let outcome = MetadataQueries::new(connector)
        .profile_column(&input.schema, &input.table, &input.column)
        .await;
    match outcome {
        Ok(ColumnProfileOutcome::TableNotFound) => ToolOutput::text(format!(
            "Table {}.{} not found in the database.",
            input.schema, input.table
        )),
        Ok(ColumnProfileOutcome::ColumnNotFound { available }) => ToolOutput::text(format!(
            "Column '{}' not found in {}.{}.\n\nAvailable columns: {}",
            input.column,
            input.schema,
            input.table,
            available.join(", ")
        )),
        Ok(ColumnProfileOutcome::Profiled(profile)) => {
            ToolOutput::text(column_profile_text(&input.schema, &input.table, &profile))
        }
        Err(e) => failure("Column profile", e),
    }
}

fn percent(part: i64, whole: i64) -> String {
    if whole > 0 {
        format!("{:.1}%", part as f64 * 100.0 / whole as f64)
    } else {
        "n/a".to_string()
    }
}

fn column_profile_text(schema: &str, table: &str, profile: &ColumnProfile) -> String {
    let mut out = format!(
        "## Column profile: {}.{}.{}\n\n",
        schema, table, profile.column
    );
    let _ = writeln!(out, "**Type:** {}", profile.type_label);
    let _ = writeln!(out, "**Nullable:** {}", if profile.nullable { "YES" } else { "NO" });
    let _ = writeln!(out, "**Total rows:** {}", profile.total_rows);
    let _ = writeln!(
        out,
        "**Nulls:** {} ({})",
        profile.null_count,
        percent(profile.null_count, profile.total_rows)
    );
    if let Some(distinct) = profile.distinct_count {
        let _ = writeln!(out, "**Distinct values:** {}", distinct);
    }
    if let (Some(min), Some(max)) = (&profile.min_value, &profile.max_value) {
        let _ = writeln!(out, "**Min:** {}", min);
        let _ = writeln!(out, "**Max:** {}", max);
    }
    if let Some(average) = profile.average {
        let _ = writeln!(out, "**Average:** {:.4}", average);
    }
    if let Some(std_dev) = profile.std_dev {
        let _ = writeln!(out, "**Std dev:** {:.4}", std_dev);
    }

    if !profile.kind.is_groupable() {
        out.push_str("\n_Binary or large-object column: frequency analysis skipped._\n");
        return out;
    }
    if profile.top_values.is_empty() {
        return out;
    }

    let _ = writeln!(
        out,
        "\n### Top {} values by frequency\n",
        profile.top_values.len()
    );
    out.push_str("| Value | Count | Share |\n");
    out.push_str("|-------|-------|-------|\n");
    for (value, count) in &profile.top_values {
        let _ = writeln!(
            out,
            "| {} | {} | {} |",
            format_cell(value),
            count,
            percent(*count, profile.total_rows)
        );
    }
    out
}

//! SQL Server identifier validation and escaping.
//!
//! Schema and table names are interpolated into catalog queries, so they are
//! allow-listed first and then wrapped in bracket notation `[identifier]`.

use crate::error::DbError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum length for SQL Server identifiers.
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

static IDENTIFIER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_#@][A-Za-z0-9_@$#]{0,127}$")
        .unwrap_or_else(|e| panic!("Internal error: invalid identifier pattern: {}", e))
});

/// Validate that an identifier contains only allowed characters.
///
/// Accepts a letter, `_`, `#` or `@` followed by up to 127 letters, digits,
/// `_`, `@`, `$` or `#`.
pub fn validate_identifier(identifier: &str) -> Result<(), DbError> {
    if identifier.is_empty() {
        return Err(DbError::invalid_input("Identifier cannot be empty"));
    }

    if identifier.len() > MAX_IDENTIFIER_LENGTH {
        return Err(DbError::invalid_input(format!(
            "Identifier exceeds maximum length of {} characters",
            MAX_IDENTIFIER_LENGTH
        )));
    }

    if !IDENTIFIER_PATTERN.is_match(identifier) {
        return Err(DbError::invalid_input(format!(
            "Invalid identifier '{}': only letters, digits, _, @, $ and # are allowed",
            identifier
        )));
    }

    Ok(())
}

/// Escape a single identifier using bracket notation.
///
/// ```
/// use epicor_mcp_server::security::escape_identifier;
///
/// assert_eq!(escape_identifier("Customer"), "[Customer]");
/// assert_eq!(escape_identifier("Odd]Name"), "[Odd]]Name]");
/// ```
pub fn escape_identifier(identifier: &str) -> String {
    format!("[{}]", identifier.replace(']', "]]"))
}

/// Validate and escape an identifier for safe use in SQL.
pub fn safe_identifier(identifier: &str) -> Result<String, DbError> {
    validate_identifier(identifier)?;
    Ok(escape_identifier(identifier))
}

/// Validate and escape a `schema.table` pair as `[schema].[table]`.
pub fn qualified_table(schema: &str, table: &str) -> Result<String, DbError> {
    Ok(format!(
        "{}.{}",
        safe_identifier(schema)?,
        safe_identifier(table)?
    ))
}

/// Quote a value as a T-SQL string literal.
///
/// Only used with values that already passed [`validate_identifier`].
pub fn string_literal(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}

/// Split a potentially schema-qualified name.
///
/// Returns (schema, name). Schema is None if not specified.
pub fn parse_qualified_name(identifier: &str) -> (Option<&str>, &str) {
    match identifier.split_once('.') {
        Some((schema, name)) if !schema.is_empty() && !name.is_empty() => (Some(schema), name),
        _ => (None, identifier),
    }
}

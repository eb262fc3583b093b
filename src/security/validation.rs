//! Read-only enforcement and row-limit injection for submitted SQL.

use crate::error::DbError;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

// Helper to compile regex with better error message on failure.
// These should never fail since patterns are hardcoded and tested.
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern)
        .unwrap_or_else(|e| panic!("Internal error: invalid regex pattern '{}': {}", pattern, e))
}

/// Keywords that can mutate data, schema, permissions or run procedures.
pub const BLOCKED_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "GRANT", "REVOKE",
    "MERGE", "EXECUTE", "EXEC",
];

/// Word-bounded denylist, plus any `xp_` extended procedure.
static BLOCKED_PATTERN: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"(?i)\b({})\b|\b(xp_\w+)",
        BLOCKED_KEYWORDS.join("|")
    ))
});

/// `SELECT ... INTO target`; the capture is the target name.
static SELECT_INTO_PATTERN: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\bINTO\s+([^\s(,;]+)"));

static TOP_PATTERN: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\bTOP\s*\(?\s*\d+"));

static OFFSET_FETCH_PATTERN: Lazy<Regex> =
    Lazy::new(|| compile(r"(?is)\bOFFSET\b.*\bFETCH\b"));

static CTE_PATTERN: Lazy<Regex> = Lazy::new(|| compile(r"(?i)^\s*WITH\b"));

static SELECT_HEAD_PATTERN: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)^\s*SELECT\b(?:\s+(?:DISTINCT|ALL)\b)?"));

/// Blank out comments and string literals so keyword scans only see code.
///
/// Each removed span is replaced by a single space to keep neighbouring
/// tokens apart. Bracketed identifiers are left untouched.
pub fn strip_comments_and_literals(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '-' if chars.peek() == Some(&'-') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
                out.push(' ');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
                out.push(' ');
            }
            '\'' => {
                // '' inside a literal is an escaped quote
                while let Some(next) = chars.next() {
                    if next == '\'' {
                        if chars.peek() == Some(&'\'') {
                            chars.next();
                        } else {
                            break;
                        }
                    }
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }

    out
}

/// Remove leading SQL comments from a query.
pub fn remove_leading_comments(query: &str) -> &str {
    let mut rest = query;

    loop {
        let trimmed = rest.trim_start();

        if let Some(after) = trimmed.strip_prefix("--") {
            match after.find('\n') {
                Some(pos) => {
                    rest = &after[pos + 1..];
                    continue;
                }
                None => return "",
            }
        }

        if let Some(after) = trimmed.strip_prefix("/*") {
            match after.find("*/") {
                Some(pos) => {
                    rest = &after[pos + 2..];
                    continue;
                }
                None => return "",
            }
        }

        return trimmed;
    }
}

/// Reject any statement that contains a denylisted keyword.
///
/// The scan ignores comments and string literals and is case-insensitive.
/// The error names the first keyword found.
pub fn check_read_only(sql: &str) -> Result<(), DbError> {
    let code = strip_comments_and_literals(sql);
    if code.trim().is_empty() {
        return Err(DbError::invalid_input("Query cannot be empty"));
    }

    if let Some(caps) = BLOCKED_PATTERN.captures(&code) {
        let keyword = match (caps.get(1), caps.get(2)) {
            (Some(kw), _) => kw.as_str().to_uppercase(),
            (None, Some(xp)) => xp.as_str().to_lowercase(),
            (None, None) => String::new(),
        };
        return Err(DbError::blocked(keyword));
    }

    // SELECT ... INTO creates a table; local and global temp tables are allowed
    for caps in SELECT_INTO_PATTERN.captures_iter(&code) {
        let target = caps.get(1).map_or("", |m| m.as_str());
        if !target.trim_start_matches('[').starts_with('#') {
            return Err(DbError::blocked("INTO"));
        }
    }

    Ok(())
}

/// Whether the statement opens with a common table expression.
pub fn is_cte(sql: &str) -> bool {
    CTE_PATTERN.is_match(remove_leading_comments(sql))
}

/// Whether the statement already bounds its row count.
pub fn has_row_limit(sql: &str) -> bool {
    let code = strip_comments_and_literals(sql);
    TOP_PATTERN.is_match(&code) || OFFSET_FETCH_PATTERN.is_match(&code)
}

/// Insert `TOP n` after the leading `SELECT [DISTINCT|ALL]`.
///
/// Statements that already carry `TOP` or `OFFSET ... FETCH` are returned
/// unchanged. `WITH` statements are also returned unchanged and stay
/// unbounded on the server; the client-side cap still applies.
pub fn inject_row_limit(sql: &str, max_rows: usize) -> String {
    if has_row_limit(sql) {
        return sql.to_string();
    }

    if is_cte(sql) {
        debug!("Row limit not injected into CTE statement");
        return sql.to_string();
    }

    let body = remove_leading_comments(sql);
    match SELECT_HEAD_PATTERN.find(body) {
        Some(head) => format!(
            "{} TOP {}{}",
            head.as_str().trim_start(),
            max_rows,
            &body[head.end()..]
        ),
        None => sql.to_string(),
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

fn word_end(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| !is_word_byte(b))
        .map_or(bytes.len(), |len| start + len)
}

/// Byte offset of the last `ORDER BY` outside any parentheses.
///
/// Comments, string literals, quoted and bracketed identifiers are skipped.
/// An `ORDER BY` inside a subquery, `OVER (...)` or a function call is not
/// reported.
pub fn top_level_order_by(sql: &str) -> Option<usize> {
    let bytes = sql.as_bytes();
    let mut depth = 0usize;
    let mut found = None;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = bytes[i..]
                    .iter()
                    .position(|&b| b == b'\n')
                    .map_or(bytes.len(), |p| i + p);
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = sql[i + 2..].find("*/").map_or(bytes.len(), |p| i + p + 4);
                continue;
            }
            open @ (b'\'' | b'"' | b'[') => {
                let close = if open == b'[' { b']' } else { open };
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == close {
                        // a doubled closer is an escape
                        if bytes.get(i + 1) == Some(&close) {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
            }
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b if depth == 0 && b.is_ascii_alphabetic() && (i == 0 || !is_word_byte(bytes[i - 1])) => {
                let end = word_end(bytes, i);
                if sql[i..end].eq_ignore_ascii_case("ORDER") {
                    let mut next = end;
                    while next < bytes.len() && bytes[next].is_ascii_whitespace() {
                        next += 1;
                    }
                    let next_end = word_end(bytes, next);
                    if sql[next..next_end].eq_ignore_ascii_case("BY") {
                        found = Some(i);
                    }
                }
                i = end;
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    found
}

/// Drop trailing semicolons and whitespace so the statement can be nested.
pub fn strip_trailing_semicolons(sql: &str) -> &str {
    sql.trim_end().trim_end_matches(';').trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocked_keyword(sql: &str) -> Option<String> {
        match check_read_only(sql) {
            Err(DbError::Blocked { keyword }) => Some(keyword),
            _ => None,
        }
    }

    #[test]
    fn test_select_allowed() {
        assert!(check_read_only("SELECT * FROM Erp.Customer").is_ok());
        assert!(check_read_only("WITH c AS (SELECT 1 AS x) SELECT x FROM c").is_ok());
    }

    #[test]
    fn test_each_keyword_blocked() {
        for kw in BLOCKED_KEYWORDS {
            let sql = format!("{} something", kw.to_lowercase());
            assert_eq!(blocked_keyword(&sql).as_deref(), Some(*kw), "{}", sql);
        }
    }

    #[test]
    fn test_keyword_inside_statement() {
        assert_eq!(
            blocked_keyword("SELECT 1; DROP TABLE Erp.Customer").as_deref(),
            Some("DROP")
        );
        assert_eq!(
            blocked_keyword("select * from t; exec master..xp_cmdshell 'dir'").as_deref(),
            Some("EXEC")
        );
        assert_eq!(
            blocked_keyword("SELECT * FROM xp_dirtree").as_deref(),
            Some("xp_dirtree")
        );
    }

    #[test]
    fn test_word_boundaries() {
        assert!(check_read_only("SELECT UpdatedBy, CreatedOn FROM Erp.Part").is_ok());
        assert!(check_read_only("SELECT * FROM Erp.DeleteLog_x").is_ok());
        assert!(check_read_only("SELECT LastUpdated FROM Erp.Customer").is_ok());
    }

    #[test]
    fn test_comments_and_literals_ignored() {
        assert!(check_read_only("-- delete me later\nSELECT 1").is_ok());
        assert!(check_read_only("/* DROP */ SELECT 1").is_ok());
        assert!(check_read_only("SELECT * FROM Erp.Part WHERE Comment = 'do not delete'").is_ok());
        assert!(check_read_only("SELECT 'it''s an update' AS note").is_ok());
        assert_eq!(
            blocked_keyword("SELECT 'x' /* c */ ; DELETE FROM t").as_deref(),
            Some("DELETE")
        );
    }

    #[test]
    fn test_empty_query_rejected() {
        assert!(matches!(
            check_read_only("   "),
            Err(DbError::InvalidInput(_))
        ));
        assert!(matches!(
            check_read_only("-- only a comment"),
            Err(DbError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_inject_simple_select() {
        assert_eq!(
            inject_row_limit("SELECT * FROM Customer", 10),
            "SELECT TOP 10 * FROM Customer"
        );
        assert_eq!(
            inject_row_limit("  select CustID from Erp.Customer", 5),
            "select TOP 5 CustID from Erp.Customer"
        );
    }

    #[test]
    fn test_inject_after_distinct() {
        assert_eq!(
            inject_row_limit("SELECT DISTINCT Company FROM Erp.Customer", 50),
            "SELECT DISTINCT TOP 50 Company FROM Erp.Customer"
        );
    }

    #[test]
    fn test_inject_skips_leading_comment() {
        assert_eq!(
            inject_row_limit("-- list\nSELECT * FROM Erp.Part", 3),
            "SELECT TOP 3 * FROM Erp.Part"
        );
    }

    #[test]
    fn test_existing_limits_untouched() {
        let top = "SELECT TOP 5 * FROM Erp.Customer";
        assert_eq!(inject_row_limit(top, 10), top);

        let top_paren = "SELECT TOP (5) * FROM Erp.Customer";
        assert_eq!(inject_row_limit(top_paren, 10), top_paren);

        let paged = "SELECT * FROM Erp.Customer ORDER BY CustNum OFFSET 0 ROWS FETCH NEXT 5 ROWS ONLY";
        assert_eq!(inject_row_limit(paged, 10), paged);
    }

    #[test]
    fn test_cte_left_unbounded() {
        let cte = "WITH c AS (SELECT * FROM Erp.Customer) SELECT * FROM c";
        assert_eq!(inject_row_limit(cte, 10), cte);
        assert!(is_cte(cte));
        assert!(is_cte("/* x */ with c as (select 1 as a) select a from c"));
        assert!(!is_cte("SELECT * FROM WithHolding"));
    }

    #[test]
    fn test_top_inside_literal_is_not_a_limit() {
        assert_eq!(
            inject_row_limit("SELECT * FROM Erp.Part WHERE PartDescription = 'TOP 5 seller'", 10),
            "SELECT TOP 10 * FROM Erp.Part WHERE PartDescription = 'TOP 5 seller'"
        );
    }

    #[test]
    fn test_strip_trailing_semicolons() {
        assert_eq!(strip_trailing_semicolons("SELECT 1;  "), "SELECT 1");
        assert_eq!(strip_trailing_semicolons("SELECT 1;;"), "SELECT 1");
        assert_eq!(strip_trailing_semicolons("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn test_select_into_blocked_except_temp_tables() {
        assert_eq!(
            blocked_keyword("SELECT * INTO dbo.CustomerCopy FROM Erp.Customer").as_deref(),
            Some("INTO")
        );
        assert_eq!(
            blocked_keyword("select CustNum into [Erp].[Snapshot] from Erp.Customer").as_deref(),
            Some("INTO")
        );
        assert!(check_read_only("SELECT CustNum INTO #recent FROM Erp.Customer").is_ok());
        assert!(check_read_only("SELECT CustNum INTO [#recent] FROM Erp.Customer").is_ok());
        assert!(check_read_only("SELECT 'copy into archive' AS note").is_ok());
        assert!(check_read_only("SELECT IntoDate FROM Erp.ShipHead").is_ok());
    }

    #[test]
    fn test_top_level_order_by() {
        let sql = "SELECT CustNum FROM Erp.Customer ORDER BY Name";
        assert_eq!(top_level_order_by(sql), sql.find("ORDER"));

        let sql = "SELECT * FROM (SELECT TOP 5 * FROM Erp.Part ORDER BY PartNum) p order  by p.PartNum";
        assert_eq!(top_level_order_by(sql), sql.find("order"));

        assert_eq!(
            top_level_order_by("SELECT ROW_NUMBER() OVER (ORDER BY CustNum) AS n FROM Erp.Customer"),
            None
        );
        assert_eq!(
            top_level_order_by("SELECT [Order By] FROM t WHERE x = 'ORDER BY' -- ORDER BY y"),
            None
        );
        assert_eq!(top_level_order_by("SELECT OrderNum FROM Erp.OrderHed"), None);
    }

    #[test]
    fn test_remove_leading_comments() {
        assert_eq!(remove_leading_comments("-- a\n/* b */ SELECT 1"), "SELECT 1");
        assert_eq!(remove_leading_comments("/* unclosed"), "");
    }
}

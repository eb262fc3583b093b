//! Join predicate reconstruction from relation field rows.

use super::records::{unqualified, RelationFieldRecord};

/// Comparison operators accepted verbatim; anything else renders as `=`.
const ALLOWED_OPERATORS: &[&str] = &["=", "<>", "!=", "<", ">", "<=", ">=", "LIKE"];

fn operator(raw: &str) -> String {
    let op = raw.trim().to_uppercase();
    if ALLOWED_OPERATORS.contains(&op.as_str()) {
        op
    } else {
        "=".to_string()
    }
}

fn connective(raw: &str) -> &'static str {
    if raw.trim().eq_ignore_ascii_case("or") {
        "OR"
    } else {
        "AND"
    }
}

/// Build the ON predicate for one relation.
///
/// `fields` must already be ordered by sequence. The first field's
/// connective is ignored. Returns `None` when there are no fields.
pub fn build_predicate(
    parent_table: &str,
    child_table: &str,
    fields: &[RelationFieldRecord],
) -> Option<String> {
    let parent = unqualified(parent_table);
    let child = unqualified(child_table);

    let mut predicate = String::new();
    for (i, field) in fields.iter().enumerate() {
        let mut term = format!(
            "{}.{} {} {}.{}",
            parent,
            field.parent_field,
            operator(&field.comparison_operator),
            child,
            field.child_field
        );
        if field.negate {
            term = format!("NOT ({})", term);
        }

        if i > 0 {
            predicate.push(' ');
            predicate.push_str(connective(&field.connective));
            predicate.push(' ');
        }
        predicate.push_str(&term);
    }

    if predicate.is_empty() {
        None
    } else {
        Some(predicate)
    }
}

/// SQL join keyword for a stored join type.
pub fn join_kind(join_type: &str) -> &'static str {
    let lower = join_type.to_lowercase();
    if lower.contains("left") {
        "LEFT"
    } else if lower.contains("right") {
        "RIGHT"
    } else if lower.contains("full") {
        "FULL OUTER"
    } else {
        "INNER"
    }
}

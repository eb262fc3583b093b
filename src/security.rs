//! Query guarding: read-only denylist, row-limit injection and identifier handling.

mod identifiers;
mod validation;

pub use identifiers::{
    escape_identifier, parse_qualified_name, qualified_table, safe_identifier, string_literal,
    validate_identifier, MAX_IDENTIFIER_LENGTH,
};
pub use validation::{
    check_read_only, has_row_limit, inject_row_limit, is_cte, remove_leading_comments,
    strip_comments_and_literals, strip_trailing_semicolons, top_level_order_by, BLOCKED_KEYWORDS,
};

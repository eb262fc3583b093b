//! Reference tools answered from the in-memory relationship index.
//!
//! Lookups never fail on a missing table or query: the caller gets a
//! descriptive not-found message, with suggestions where there are any.

use super::inputs::{
    FindJoinPathInput, JoinConditionsInput, QueryDetailsInput, SearchTablesInput,
    TableDetailsInput, TableRelationshipsInput, TablesByFlagInput,
};
use super::{with_suggestions, ToolOutput};
use crate::constants::{
    DEFAULT_JOIN_DEPTH, DEFAULT_RELATIONSHIP_LIMIT, DEFAULT_SCHEMA, DEFAULT_SEARCH_LIMIT,
    MAX_JOIN_DEPTH, MAX_JOIN_PATHS, MAX_RELATIONSHIP_LIMIT, MAX_SEARCH_LIMIT,
    RELATED_TABLE_PREVIEW, SUGGESTION_LIMIT,
};
use crate::database::format_cell;
use crate::index::{
    join_kind, table_key, unqualified, AnnotatedRelation, RelationshipIndex, TableDescriptor,
};
use std::fmt::Write;

const NO_FIELDS: &str = "_no join fields recorded_";

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn predicate_cell(predicate: Option<&str>) -> String {
    match predicate {
        Some(p) => format!("`{}`", p),
        None => NO_FIELDS.to_string(),
    }
}

fn preview(names: &[String]) -> String {
    let mut line = names
        .iter()
        .take(RELATED_TABLE_PREVIEW)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if names.len() > RELATED_TABLE_PREVIEW {
        let _ = write!(line, " (and {} more)", names.len() - RELATED_TABLE_PREVIEW);
    }
    line
}

fn table_rows(out: &mut String, tables: &[&TableDescriptor]) {
    out.push_str("| Schema | Table | Description | System |\n");
    out.push_str("|--------|-------|-------------|--------|\n");
    for t in tables {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} |",
            format_cell(&t.schema_name),
            format_cell(&t.table_name),
            format_cell(&t.description),
            yes_no(t.system_flag)
        );
    }
}

/// `search_tables`
pub fn search_tables(index: &RelationshipIndex, input: SearchTablesInput) -> ToolOutput {
    let query = input.query.trim();
    if query.is_empty() {
        return ToolOutput::error("Search query cannot be empty");
    }

    let limit = input
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);
    let schema = input.schema.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let outcome = index.search_tables(query, schema, limit);

    if outcome.tables.is_empty() {
        let scope = schema
            .map(|s| format!(" in schema '{}'", s))
            .unwrap_or_default();
        let text = format!("No tables found matching '{}'{}.", query, scope);
        return ToolOutput::text(with_suggestions(
            text,
            &index.suggest_similar(query, SUGGESTION_LIMIT),
        ));
    }

    let mut out = format!("## Tables matching '{}'\n\n", query);
    if outcome.total > outcome.tables.len() {
        let _ = writeln!(
            out,
            "Showing {} of {} matches.\n",
            outcome.tables.len(),
            outcome.total
        );
    } else {
        let _ = writeln!(out, "{} match(es).\n", outcome.total);
    }
    table_rows(&mut out, &outcome.tables);
    ToolOutput::text(out)
}

/// `get_table_details`
pub fn table_details(index: &RelationshipIndex, input: TableDetailsInput) -> ToolOutput {
    let schema = input
        .schema
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SCHEMA);

    let Some(details) = index.describe_table(&input.table_name, schema) else {
        let name = input.table_name.trim();
        let shown = if name.contains('.') {
            name.to_string()
        } else {
            format!("{}.{}", schema, name)
        };
        let text = format!("Table '{}' not found in the reference data.", shown);
        return ToolOutput::text(with_suggestions(
            text,
            &index.suggest_similar(name, SUGGESTION_LIMIT),
        ));
    };

    let t = details.table;
    let mut out = format!("## {}\n\n", t.qualified_name());
    if !t.description.is_empty() {
        let _ = writeln!(out, "{}\n", t.description);
    }
    out.push_str("| Attribute | Value |\n|-----------|-------|\n");
    let _ = writeln!(out, "| Schema | {} |", format_cell(&t.schema_name));
    let _ = writeln!(out, "| System table | {} |", yes_no(t.system_flag));
    let _ = writeln!(out, "| AutoIM write trigger | {} |", yes_no(t.write_trigger_flag));
    let _ = writeln!(out, "| AutoIM delete trigger | {} |", yes_no(t.delete_trigger_flag));
    for (label, value) in [
        ("SysRevID", &t.revision_id),
        ("SysRowID", &t.row_id),
        ("Last updated", &t.last_updated),
    ] {
        if !value.is_empty() {
            let _ = writeln!(out, "| {} | {} |", label, format_cell(value));
        }
    }

    out.push_str("\n### Relationships\n\n");
    let _ = writeln!(out, "- Parent in {} relation(s)", details.parent_count);
    let _ = writeln!(out, "- Child in {} relation(s)", details.child_count);
    if !details.children.is_empty() {
        let _ = write!(out, "\n**Child tables:** {}\n", preview(&details.children));
    }
    if !details.parents.is_empty() {
        let _ = write!(out, "\n**Parent tables:** {}\n", preview(&details.parents));
    }

    ToolOutput::text(out)
}

/// `list_schemas`
pub fn list_schemas(index: &RelationshipIndex) -> ToolOutput {
    let schemas = index.schemas();
    if schemas.is_empty() {
        return ToolOutput::text("No tables loaded from the reference data.");
    }

    let mut out = String::from("## Schemas\n\n| Schema | Tables |\n|--------|--------|\n");
    for (schema, count) in &schemas {
        let _ = writeln!(out, "| {} | {} |", format_cell(schema), count);
    }
    let _ = write!(
        out,
        "\n{} schema(s), {} table(s)",
        schemas.len(),
        index.tables().len()
    );
    ToolOutput::text(out)
}

/// `get_tables_by_flag`
pub fn tables_by_flag(index: &RelationshipIndex, input: TablesByFlagInput) -> ToolOutput {
    let limit = input
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);
    let matches = index.tables_by_flag(input.system_flag, input.write_trigger, input.delete_trigger);

    let filters: Vec<String> = [
        ("systemFlag", input.system_flag),
        ("autoIMWriteTrigger", input.write_trigger),
        ("autoIMDeleteTrigger", input.delete_trigger),
    ]
    .into_iter()
    .filter_map(|(name, value)| value.map(|v| format!("{}={}", name, v)))
    .collect();
    let filters = if filters.is_empty() {
        "none".to_string()
    } else {
        filters.join(", ")
    };

    if matches.is_empty() {
        return ToolOutput::text(format!("No tables match the filters ({}).", filters));
    }

    let shown = matches.len().min(limit);
    let mut out = format!(
        "## Tables by flag\n\nFilters: {}\n\n{} table(s) match; showing {}.\n\n",
        filters,
        matches.len(),
        shown
    );
    out.push_str("| Schema | Table | System | Write trigger | Delete trigger |\n");
    out.push_str("|--------|-------|--------|---------------|----------------|\n");
    for t in matches.iter().take(limit) {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            format_cell(&t.schema_name),
            format_cell(&t.table_name),
            yes_no(t.system_flag),
            yes_no(t.write_trigger_flag),
            yes_no(t.delete_trigger_flag)
        );
    }
    ToolOutput::text(out)
}

fn relation_rows(out: &mut String, other_label: &str, rows: &[AnnotatedRelation<'_>], parent_side: bool) {
    let _ = writeln!(out, "| RelationID | QueryID | {} | Join | Predicate |", other_label);
    out.push_str("|------------|---------|------|------|-----------|\n");
    for r in rows {
        let other = if parent_side {
            &r.relation.child_table
        } else {
            &r.relation.parent_table
        };
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            format_cell(&r.relation.relation_id),
            format_cell(&r.relation.query_id),
            format_cell(other),
            join_kind(&r.relation.join_type),
            predicate_cell(r.predicate.as_deref())
        );
    }
}

/// `get_table_relationships`
pub fn table_relationships(
    index: &RelationshipIndex,
    input: TableRelationshipsInput,
) -> ToolOutput {
    let name = input.table_name.trim();
    let limit = input
        .limit
        .unwrap_or(DEFAULT_RELATIONSHIP_LIMIT)
        .clamp(1, MAX_RELATIONSHIP_LIMIT);
    let rels = index.relationships(name);

    if rels.total() == 0 {
        let text = format!("No relationships found for table '{}'.", name);
        if index.knows_table(name) {
            return ToolOutput::text(text);
        }
        return ToolOutput::text(with_suggestions(
            text,
            &index.suggest_similar(name, SUGGESTION_LIMIT),
        ));
    }

    let total = rels.total();
    let as_parent: Vec<_> = rels.as_parent.into_iter().take(limit).collect();
    let as_child: Vec<_> = rels
        .as_child
        .into_iter()
        .take(limit - as_parent.len())
        .collect();

    let mut out = format!("## Relationships for {}\n\n", unqualified(name));
    let shown = as_parent.len() + as_child.len();
    if shown < total {
        let _ = writeln!(out, "{} relationship(s) total; showing {}.\n", total, shown);
    } else {
        let _ = writeln!(out, "{} relationship(s).\n", total);
    }

    if !as_parent.is_empty() {
        let _ = writeln!(out, "### As parent ({})\n", as_parent.len());
        relation_rows(&mut out, "Child", &as_parent, true);
        out.push('\n');
    }
    if !as_child.is_empty() {
        let _ = writeln!(out, "### As child ({})\n", as_child.len());
        relation_rows(&mut out, "Parent", &as_child, false);
    }

    ToolOutput::text(out)
}

/// `get_query_details`
pub fn query_details(index: &RelationshipIndex, input: QueryDetailsInput) -> ToolOutput {
    let query_id = input.query_id.trim();
    let relations = index.query_relations(query_id);
    if relations.is_empty() {
        return ToolOutput::text(format!("No relations found for query '{}'.", query_id));
    }

    // group by subquery, keeping first-seen order
    let mut groups: Vec<(&str, Vec<&AnnotatedRelation<'_>>)> = Vec::new();
    for r in &relations {
        let sub = r.relation.sub_query_id.as_str();
        match groups.iter_mut().find(|(id, _)| *id == sub) {
            Some((_, members)) => members.push(r),
            None => groups.push((sub, vec![r])),
        }
    }

    let mut out = format!(
        "## Query {}\n\n{} relation(s) across {} subquery(ies).\n",
        query_id,
        relations.len(),
        groups.len()
    );
    for (sub, members) in groups {
        let label = if sub.is_empty() { "(none)" } else { sub };
        let _ = writeln!(out, "\n### SubQuery {}\n", label);
        for r in members {
            let _ = writeln!(
                out,
                "- **{}** -> **{}** ({} JOIN, relation {}): {}",
                unqualified(&r.relation.parent_table),
                unqualified(&r.relation.child_table),
                join_kind(&r.relation.join_type),
                r.relation.relation_id,
                predicate_cell(r.predicate.as_deref())
            );
        }
    }

    ToolOutput::text(out)
}

/// `find_join_path`
pub fn find_join_path(index: &RelationshipIndex, input: FindJoinPathInput) -> ToolOutput {
    let from = input.from_table.trim();
    let to = input.to_table.trim();
    let max_depth = input
        .max_depth
        .unwrap_or(DEFAULT_JOIN_DEPTH)
        .clamp(1, MAX_JOIN_DEPTH);

    if table_key(from) == table_key(to) {
        return ToolOutput::text(format!(
            "'{}' and '{}' are the same table; no join is needed.",
            unqualified(from),
            unqualified(to)
        ));
    }

    let paths = index.find_join_paths(from, to, max_depth, MAX_JOIN_PATHS);
    if paths.is_empty() {
        let mut text = format!(
            "No join path found between {} and {} within {} join(s).",
            unqualified(from),
            unqualified(to),
            max_depth
        );
        for name in [from, to] {
            if !index.knows_table(name) {
                let _ = write!(text, "\n'{}' does not appear in the reference data.", name);
            }
        }
        return ToolOutput::text(text);
    }

    let mut out = format!(
        "## Join paths from {} to {}\n\nFound {} path(s) (max depth {}).\n",
        unqualified(from),
        unqualified(to),
        paths.len(),
        max_depth
    );
    for (i, path) in paths.iter().enumerate() {
        let _ = writeln!(
            out,
            "\n### Path {} ({} join(s)): {}\n",
            i + 1,
            path.hops.len(),
            path.tables.join(" -> ")
        );
        for (n, hop) in path.hops.iter().enumerate() {
            let relation = hop
                .relation
                .map(|r| format!(" (relation {})", r.relation_id))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "{}. {} -> {}{}: {}",
                n + 1,
                hop.from,
                hop.to,
                relation,
                predicate_cell(hop.predicate.as_deref())
            );
        }
    }

    ToolOutput::text(out)
}

/// `get_join_conditions`
pub fn join_conditions(index: &RelationshipIndex, input: JoinConditionsInput) -> ToolOutput {
    let parent = input.parent_table.trim();
    let child = input.child_table.trim();
    let query_id = input.query_id.as_deref().map(str::trim).filter(|q| !q.is_empty());
    let matches = index.join_conditions(parent, child, query_id);

    if matches.is_empty() {
        let scope = query_id
            .map(|q| format!(" in query '{}'", q))
            .unwrap_or_default();
        let mut text = format!(
            "No relations found from {} to {}{}.",
            unqualified(parent),
            unqualified(child),
            scope
        );
        let reverse = index.reverse_relation_count(parent, child);
        if reverse > 0 {
            let _ = write!(
                text,
                "\n\nNote: {} relation(s) exist in the reverse direction ({} -> {}); try swapping parentTable and childTable.",
                reverse,
                unqualified(child),
                unqualified(parent)
            );
        }
        return ToolOutput::text(text);
    }

    let mut out = format!(
        "## Join conditions: {} -> {}\n\n{} relation(s).\n",
        unqualified(parent),
        unqualified(child),
        matches.len()
    );
    for r in &matches {
        let rel = r.relation;
        let _ = writeln!(
            out,
            "\n### Relation {} (query {}, subquery {})\n",
            rel.relation_id, rel.query_id, rel.sub_query_id
        );
        match &r.predicate {
            Some(predicate) => {
                let _ = writeln!(
                    out,
                    "```sql\n{} JOIN {} ON {}\n```",
                    join_kind(&rel.join_type),
                    rel.child_table,
                    predicate
                );
            }
            None => out.push_str(&format!("{}\n", NO_FIELDS)),
        }
    }

    ToolOutput::text(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{ReferenceData, RelationFieldRecord, RelationRecord};

    fn table(name: &str, description: &str) -> TableDescriptor {
        TableDescriptor {
            schema_name: "Erp".into(),
            table_name: name.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    fn relation(id: &str, query: &str, parent: &str, child: &str) -> RelationRecord {
        RelationRecord {
            query_id: query.into(),
            sub_query_id: "1".into(),
            relation_id: id.into(),
            parent_table: parent.into(),
            child_table: child.into(),
            join_type: "inner".into(),
            ..Default::default()
        }
    }

    fn field(relation_id: &str, seq: i64, parent: &str, child: &str) -> RelationFieldRecord {
        RelationFieldRecord {
            relation_id: relation_id.into(),
            sequence: seq,
            parent_field: parent.into(),
            child_field: child.into(),
            ..Default::default()
        }
    }

    fn index() -> RelationshipIndex {
        RelationshipIndex::from_data(ReferenceData {
            tables: vec![
                table("Customer", "Customer master"),
                table("OrderHed", "Sales order header"),
                table("OrderDtl", "Sales order line | detail"),
            ],
            relations: vec![
                relation("R1", "SalesQ", "Erp.Customer", "Erp.OrderHed"),
                relation("R2", "SalesQ", "Erp.OrderHed", "Erp.OrderDtl"),
            ],
            relation_fields: vec![
                field("R1", 1, "Company", "Company"),
                field("R1", 2, "CustNum", "CustNum"),
            ],
        })
    }

    #[test]
    fn test_search_escapes_cells() {
        let out = search_tables(
            &index(),
            SearchTablesInput {
                query: "order".into(),
                schema: None,
                limit: None,
            },
        );
        assert!(!out.is_error);
        let text = out.joined_text();
        assert!(text.contains("2 match(es)"));
        assert!(text.contains("Sales order line \\| detail"));
    }

    #[test]
    fn test_search_miss_suggests() {
        let out = search_tables(
            &index(),
            SearchTablesInput {
                query: "Custmr".into(),
                schema: None,
                limit: None,
            },
        );
        let text = out.joined_text();
        assert!(text.contains("No tables found matching 'Custmr'"));
        assert!(text.contains("Did you mean: Erp.Customer"));
    }

    #[test]
    fn test_details_not_found_is_not_error() {
        let out = table_details(
            &index(),
            TableDetailsInput {
                table_name: "NoSuchTable".into(),
                schema: None,
            },
        );
        assert!(!out.is_error);
        assert!(out
            .joined_text()
            .contains("Table 'Erp.NoSuchTable' not found"));
    }

    #[test]
    fn test_details_relationship_summary() {
        let text = table_details(
            &index(),
            TableDetailsInput {
                table_name: "Erp.OrderHed".into(),
                schema: None,
            },
        )
        .joined_text();
        assert!(text.starts_with("## Erp.OrderHed"));
        assert!(text.contains("- Parent in 1 relation(s)"));
        assert!(text.contains("- Child in 1 relation(s)"));
        assert!(text.contains("**Child tables:** OrderDtl"));
        assert!(text.contains("**Parent tables:** Customer"));
    }

    #[test]
    fn test_relationships_with_predicates() {
        let text = table_relationships(
            &index(),
            TableRelationshipsInput {
                table_name: "OrderHed".into(),
                limit: None,
            },
        )
        .joined_text();
        assert!(text.contains("### As parent (1)"));
        assert!(text.contains("### As child (1)"));
        assert!(text.contains(
            "`Customer.Company = OrderHed.Company AND Customer.CustNum = OrderHed.CustNum`"
        ));
        assert!(text.contains(NO_FIELDS));
    }

    #[test]
    fn test_relationship_limit_parent_first() {
        let text = table_relationships(
            &index(),
            TableRelationshipsInput {
                table_name: "OrderHed".into(),
                limit: Some(1),
            },
        )
        .joined_text();
        assert!(text.contains("2 relationship(s) total; showing 1."));
        assert!(text.contains("### As parent"));
        assert!(!text.contains("### As child"));
    }

    #[test]
    fn test_join_path_same_table() {
        let text = find_join_path(
            &index(),
            FindJoinPathInput {
                from_table: "Customer".into(),
                to_table: "customer".into(),
                max_depth: None,
            },
        )
        .joined_text();
        assert!(text.contains("same table"));
    }

    #[test]
    fn test_join_path_depth_bound() {
        let input = |depth| FindJoinPathInput {
            from_table: "Customer".into(),
            to_table: "OrderDtl".into(),
            max_depth: Some(depth),
        };
        let text = find_join_path(&index(), input(1)).joined_text();
        assert!(text.contains("No join path found between Customer and OrderDtl within 1 join(s)."));

        let text = find_join_path(&index(), input(2)).joined_text();
        assert!(text.contains("Customer -> OrderHed -> OrderDtl"));
        assert!(text.contains("1. Customer -> OrderHed (relation R1)"));
    }

    #[test]
    fn test_join_conditions_clause() {
        let text = join_conditions(
            &index(),
            JoinConditionsInput {
                parent_table: "Customer".into(),
                child_table: "OrderHed".into(),
                query_id: None,
            },
        )
        .joined_text();
        assert!(text.contains(
            "INNER JOIN Erp.OrderHed ON Customer.Company = OrderHed.Company AND Customer.CustNum = OrderHed.CustNum"
        ));
    }

    #[test]
    fn test_join_conditions_reverse_hint() {
        let text = join_conditions(
            &index(),
            JoinConditionsInput {
                parent_table: "OrderHed".into(),
                child_table: "Customer".into(),
                query_id: None,
            },
        )
        .joined_text();
        assert!(text.contains("No relations found from OrderHed to Customer."));
        assert!(text.contains("1 relation(s) exist in the reverse direction"));
    }

    #[test]
    fn test_query_details_groups() {
        let text = query_details(
            &index(),
            QueryDetailsInput {
                query_id: "salesq".into(),
            },
        )
        .joined_text();
        assert!(text.contains("2 relation(s) across 1 subquery(ies)."));
        assert!(text.contains("### SubQuery 1"));

        let missing = query_details(
            &index(),
            QueryDetailsInput {
                query_id: "Nope".into(),
            },
        );
        assert!(missing.joined_text().contains("No relations found for query 'Nope'."));
    }

    #[test]
    fn test_tables_by_flag_filters_line() {
        let text = tables_by_flag(
            &index(),
            TablesByFlagInput {
                system_flag: Some(false),
                ..Default::default()
            },
        )
        .joined_text();
        assert!(text.contains("Filters: systemFlag=false"));
        assert!(text.contains("3 table(s) match; showing 3."));
    }
}

//! In-memory relationship index over the Epicor reference files.
//!
//! The index is built once at startup and is read-only afterwards, so it is
//! shared between requests behind a plain `Arc` with no locking.

mod graph;
mod loader;
mod predicate;
mod records;

pub use graph::JoinGraph;
pub use loader::{
    load_reference_data, load_relation_fields, load_relations, load_tables, LoadError,
    ReferenceData,
};
pub use predicate::{build_predicate, join_kind};
pub use records::{
    parse_flag, table_key, unqualified, RelationFieldRecord, RelationRecord, TableDescriptor,
};

use crate::config::ReferenceConfig;
use crate::security::parse_qualified_name;
use std::collections::{BTreeMap, HashMap};
use tracing::info;

/// A relation together with its reconstructed ON predicate.
#[derive(Debug, Clone)]
pub struct AnnotatedRelation<'a> {
    pub relation: &'a RelationRecord,
    pub predicate: Option<String>,
}

/// Relations that mention one table, split by the table's role.
#[derive(Debug, Clone, Default)]
pub struct TableRelationships<'a> {
    pub as_parent: Vec<AnnotatedRelation<'a>>,
    pub as_child: Vec<AnnotatedRelation<'a>>,
}

impl TableRelationships<'_> {
    pub fn total(&self) -> usize {
        self.as_parent.len() + self.as_child.len()
    }
}

/// Result of a table search before truncation is reported.
#[derive(Debug, Clone)]
pub struct SearchOutcome<'a> {
    pub total: usize,
    pub tables: Vec<&'a TableDescriptor>,
}

/// Descriptor plus relationship summary for one table.
#[derive(Debug, Clone)]
pub struct TableDetails<'a> {
    pub table: &'a TableDescriptor,
    pub parent_count: usize,
    pub child_count: usize,
    /// Distinct child tables of relations where this table is the parent.
    pub children: Vec<String>,
    /// Distinct parent tables of relations where this table is the child.
    pub parents: Vec<String>,
}

/// One edge of a join path.
#[derive(Debug, Clone)]
pub struct JoinHop<'a> {
    pub from: String,
    pub to: String,
    pub relation: Option<&'a RelationRecord>,
    pub predicate: Option<String>,
}

/// A join path with its per-hop annotations.
#[derive(Debug, Clone)]
pub struct JoinPath<'a> {
    pub tables: Vec<String>,
    pub hops: Vec<JoinHop<'a>>,
}

/// The relationship index.
#[derive(Debug, Default)]
pub struct RelationshipIndex {
    tables: Vec<TableDescriptor>,
    relations: Vec<RelationRecord>,
    fields: HashMap<String, Vec<RelationFieldRecord>>,
    field_count: usize,
    by_parent: HashMap<String, Vec<usize>>,
    by_child: HashMap<String, Vec<usize>>,
    graph: JoinGraph,
}

/// Length of the common prefix of two lowercased names.
fn shared_prefix(a: &str, b: &str) -> usize {
    a.chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .count()
}

impl RelationshipIndex {
    /// Load the three reference files, isolating failures per file.
    pub fn load(config: &ReferenceConfig) -> Self {
        let data = load_reference_data(config);
        let index = Self::from_data(data);
        info!(
            tables = index.tables.len(),
            relations = index.relations.len(),
            relation_fields = index.field_count,
            edges = index.graph.edge_count(),
            "Relationship index ready"
        );
        index
    }

    /// Build the index from already-parsed records.
    pub fn from_data(data: ReferenceData) -> Self {
        let ReferenceData {
            tables,
            relations,
            relation_fields,
        } = data;

        let field_count = relation_fields.len();
        let mut fields: HashMap<String, Vec<RelationFieldRecord>> = HashMap::new();
        for field in relation_fields {
            fields
                .entry(field.relation_id.clone())
                .or_default()
                .push(field);
        }
        for group in fields.values_mut() {
            group.sort_by_key(|f| f.sequence);
        }

        let mut by_parent: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_child: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, relation) in relations.iter().enumerate() {
            by_parent
                .entry(table_key(&relation.parent_table))
                .or_default()
                .push(i);
            by_child
                .entry(table_key(&relation.child_table))
                .or_default()
                .push(i);
        }

        let graph = JoinGraph::build(&relations);

        Self {
            tables,
            relations,
            fields,
            field_count,
            by_parent,
            by_child,
            graph,
        }
    }

    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn relations(&self) -> &[RelationRecord] {
        &self.relations
    }

    /// Fields of a relation, ordered by sequence.
    pub fn fields_for(&self, relation_id: &str) -> &[RelationFieldRecord] {
        self.fields
            .get(relation_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Reconstructed ON predicate for a relation.
    pub fn predicate_for(&self, relation: &RelationRecord) -> Option<String> {
        build_predicate(
            &relation.parent_table,
            &relation.child_table,
            self.fields_for(&relation.relation_id),
        )
    }

    fn annotate<'a>(&'a self, relation: &'a RelationRecord) -> AnnotatedRelation<'a> {
        AnnotatedRelation {
            relation,
            predicate: self.predicate_for(relation),
        }
    }

    /// Whether the name appears as a table descriptor or in any relation.
    pub fn knows_table(&self, name: &str) -> bool {
        let key = table_key(name);
        self.graph.contains(&key)
            || self.by_parent.contains_key(&key)
            || self.tables.iter().any(|t| table_key(&t.table_name) == key)
    }

    /// Case-insensitive search over names and descriptions.
    ///
    /// Ranking buckets: exact name, name prefix, name substring, then
    /// description-only matches. File order is kept within a bucket.
    pub fn search_tables(
        &self,
        query: &str,
        schema: Option<&str>,
        limit: usize,
    ) -> SearchOutcome<'_> {
        let q = query.trim().to_lowercase();
        let mut buckets: [Vec<&TableDescriptor>; 4] = Default::default();

        for table in &self.tables {
            if let Some(schema) = schema {
                if !table.schema_name.eq_ignore_ascii_case(schema) {
                    continue;
                }
            }

            let name = table.table_name.to_lowercase();
            let bucket = if name == q {
                0
            } else if name.starts_with(&q) {
                1
            } else if name.contains(&q) {
                2
            } else if table.description.to_lowercase().contains(&q) {
                3
            } else {
                continue;
            };
            buckets[bucket].push(table);
        }

        let ranked: Vec<&TableDescriptor> = buckets.into_iter().flatten().collect();
        let total = ranked.len();
        SearchOutcome {
            total,
            tables: ranked.into_iter().take(limit).collect(),
        }
    }

    /// "Did you mean" candidates, best first.
    ///
    /// Scores by shared prefix length, plus a bonus when one name contains
    /// the other. Zero-score names are never suggested.
    pub fn suggest_similar(&self, name: &str, limit: usize) -> Vec<String> {
        let q = table_key(name);
        if q.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, String)> = self
            .tables
            .iter()
            .map(|t| {
                let candidate = t.table_name.to_lowercase();
                let bonus = if candidate.contains(&q) || q.contains(&candidate) {
                    2
                } else {
                    0
                };
                (shared_prefix(&q, &candidate) + bonus, t.qualified_name())
            })
            .filter(|(score, _)| *score > 0)
            .collect();

        // stable: ties keep file order
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.dedup_by(|a, b| a.1 == b.1);
        scored.into_iter().take(limit).map(|(_, n)| n).collect()
    }

    /// Find a descriptor by schema and name, case-insensitively.
    pub fn find_table(&self, schema: &str, name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| {
            t.schema_name.eq_ignore_ascii_case(schema) && t.table_name.eq_ignore_ascii_case(name)
        })
    }

    /// Descriptor and relationship summary for one table.
    ///
    /// `name` may be `Schema.Table`, in which case its schema wins over
    /// `schema`.
    pub fn describe_table(&self, name: &str, schema: &str) -> Option<TableDetails<'_>> {
        let (schema, name) = match parse_qualified_name(name.trim()) {
            (Some(qualified), name) => (qualified, name),
            (None, name) => (schema, name),
        };
        let table = self.find_table(schema, name)?;
        let key = table_key(&table.table_name);

        let as_parent = self.by_parent.get(&key).map(Vec::as_slice).unwrap_or(&[]);
        let as_child = self.by_child.get(&key).map(Vec::as_slice).unwrap_or(&[]);

        let distinct = |ids: &[usize], pick: fn(&RelationRecord) -> &str| {
            let mut seen: Vec<String> = Vec::new();
            for &i in ids {
                let other = unqualified(pick(&self.relations[i])).to_string();
                if !seen.iter().any(|s| s.eq_ignore_ascii_case(&other)) {
                    seen.push(other);
                }
            }
            seen
        };

        Some(TableDetails {
            table,
            parent_count: as_parent.len(),
            child_count: as_child.len(),
            children: distinct(as_parent, |r| r.child_table.as_str()),
            parents: distinct(as_child, |r| r.parent_table.as_str()),
        })
    }

    /// All relations where the table is parent or child.
    pub fn relationships(&self, name: &str) -> TableRelationships<'_> {
        let key = table_key(name);
        TableRelationships {
            as_parent: self.annotated(&self.by_parent, &key),
            as_child: self.annotated(&self.by_child, &key),
        }
    }

    fn annotated(
        &self,
        map: &HashMap<String, Vec<usize>>,
        key: &str,
    ) -> Vec<AnnotatedRelation<'_>> {
        map.get(key)
            .map(|ids| {
                ids.iter()
                    .map(|&i| self.annotate(&self.relations[i]))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Relations of one saved query, in file order.
    pub fn query_relations(&self, query_id: &str) -> Vec<AnnotatedRelation<'_>> {
        let wanted = query_id.trim();
        self.relations
            .iter()
            .filter(|r| r.query_id.eq_ignore_ascii_case(wanted))
            .map(|r| self.annotate(r))
            .collect()
    }

    fn directional(&self, parent: &str, child: &str) -> impl Iterator<Item = &RelationRecord> {
        let child_key = table_key(child);
        self.by_parent
            .get(&table_key(parent))
            .into_iter()
            .flatten()
            .map(|&i| &self.relations[i])
            .filter(move |r| table_key(&r.child_table) == child_key)
    }

    /// Relations from `parent` to `child`, optionally limited to one query.
    pub fn join_conditions(
        &self,
        parent: &str,
        child: &str,
        query_id: Option<&str>,
    ) -> Vec<AnnotatedRelation<'_>> {
        self.directional(parent, child)
            .filter(|r| query_id.is_none_or(|q| r.query_id.eq_ignore_ascii_case(q.trim())))
            .map(|r| self.annotate(r))
            .collect()
    }

    /// Number of relations in the opposite direction, `child` to `parent`.
    pub fn reverse_relation_count(&self, parent: &str, child: &str) -> usize {
        self.directional(child, parent).count()
    }

    /// The best relation linking two tables in either direction.
    ///
    /// Prefers a relation with recorded fields.
    fn link(&self, a: &str, b: &str) -> Option<AnnotatedRelation<'_>> {
        let mut fallback = None;
        for relation in self.directional(a, b).chain(self.directional(b, a)) {
            let annotated = self.annotate(relation);
            if annotated.predicate.is_some() {
                return Some(annotated);
            }
            fallback.get_or_insert(annotated);
        }
        fallback
    }

    /// Join paths between two tables, shortest first.
    pub fn find_join_paths(
        &self,
        from: &str,
        to: &str,
        max_depth: usize,
        max_paths: usize,
    ) -> Vec<JoinPath<'_>> {
        let paths = self
            .graph
            .find_paths(&table_key(from), &table_key(to), max_depth, max_paths);

        paths
            .into_iter()
            .map(|keys| {
                let hops = keys
                    .windows(2)
                    .map(|pair| {
                        let link = self.link(&pair[0], &pair[1]);
                        JoinHop {
                            from: self.display_name(&pair[0]),
                            to: self.display_name(&pair[1]),
                            relation: link.as_ref().map(|l| l.relation),
                            predicate: link.and_then(|l| l.predicate),
                        }
                    })
                    .collect();
                JoinPath {
                    tables: keys.iter().map(|k| self.display_name(k)).collect(),
                    hops,
                }
            })
            .collect()
    }

    fn display_name(&self, key: &str) -> String {
        if let Some(t) = self
            .tables
            .iter()
            .find(|t| t.table_name.eq_ignore_ascii_case(key))
        {
            return t.table_name.clone();
        }
        self.graph.display_name(key).to_string()
    }

    /// Schema name to table count, sorted by schema.
    pub fn schemas(&self) -> Vec<(String, usize)> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for table in &self.tables {
            *counts.entry(table.schema_name.clone()).or_default() += 1;
        }
        counts.into_iter().collect()
    }

    /// Tables matching every provided flag.
    pub fn tables_by_flag(
        &self,
        system: Option<bool>,
        write_trigger: Option<bool>,
        delete_trigger: Option<bool>,
    ) -> Vec<&TableDescriptor> {
        self.tables
            .iter()
            .filter(|t| system.is_none_or(|f| t.system_flag == f))
            .filter(|t| write_trigger.is_none_or(|f| t.write_trigger_flag == f))
            .filter(|t| delete_trigger.is_none_or(|f| t.delete_trigger_flag == f))
            .collect()
    }
}

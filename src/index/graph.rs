//! Undirected table graph for join-path discovery.

use super::records::{table_key, unqualified, RelationRecord};
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Adjacency between tables, keyed by [`table_key`].
///
/// Neighbour sets are ordered so path enumeration is deterministic.
#[derive(Debug, Default, Clone)]
pub struct JoinGraph {
    adjacency: HashMap<String, BTreeSet<String>>,
    display: HashMap<String, String>,
}

impl JoinGraph {
    /// One edge per distinct parent/child pair. Self-relations are skipped.
    pub fn build(relations: &[RelationRecord]) -> Self {
        let mut graph = JoinGraph::default();

        for relation in relations {
            let parent = table_key(&relation.parent_table);
            let child = table_key(&relation.child_table);
            if parent.is_empty() || child.is_empty() || parent == child {
                continue;
            }

            graph
                .display
                .entry(parent.clone())
                .or_insert_with(|| unqualified(&relation.parent_table).to_string());
            graph
                .display
                .entry(child.clone())
                .or_insert_with(|| unqualified(&relation.child_table).to_string());

            graph
                .adjacency
                .entry(parent.clone())
                .or_default()
                .insert(child.clone());
            graph.adjacency.entry(child).or_default().insert(parent);
        }

        graph
    }

    /// Whether the table takes part in any relation.
    pub fn contains(&self, key: &str) -> bool {
        self.adjacency.contains_key(key)
    }

    /// Number of distinct undirected edges.
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).sum::<usize>() / 2
    }

    /// Display name for a key, as first seen in the relation file.
    pub fn display_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.display.get(key).map(String::as_str).unwrap_or(key)
    }

    fn neighbours(&self, key: &str) -> impl Iterator<Item = &String> {
        self.adjacency.get(key).into_iter().flatten()
    }

    /// Hop distance from every reachable table to `target`.
    fn distances_to(&self, target: &str) -> HashMap<&str, usize> {
        let mut dist: HashMap<&str, usize> = HashMap::new();
        let Some((target_key, _)) = self.adjacency.get_key_value(target) else {
            return dist;
        };

        dist.insert(target_key.as_str(), 0);
        let mut queue = VecDeque::from([target_key.as_str()]);

        while let Some(current) = queue.pop_front() {
            let next_distance = dist[current] + 1;
            for next in self.neighbours(current) {
                if !dist.contains_key(next.as_str()) {
                    dist.insert(next.as_str(), next_distance);
                    queue.push_back(next.as_str());
                }
            }
        }

        dist
    }

    /// Simple paths from `from` to `to`, shortest first.
    ///
    /// Paths never exceed `max_depth` edges and at most `max_paths` are
    /// returned. Identical endpoints yield the single trivial path.
    pub fn find_paths(
        &self,
        from: &str,
        to: &str,
        max_depth: usize,
        max_paths: usize,
    ) -> Vec<Vec<String>> {
        if from == to {
            return vec![vec![from.to_string()]];
        }

        let dist = self.distances_to(to);
        let Some(&shortest) = dist.get(from) else {
            return Vec::new();
        };

        let mut paths = Vec::new();
        for depth in shortest..=max_depth {
            let mut path = vec![from.to_string()];
            self.extend(&mut path, to, depth, &dist, &mut paths, max_paths);
            if paths.len() >= max_paths {
                break;
            }
        }

        paths
    }

    /// Depth-first extension to paths of exactly `depth` edges.
    fn extend(
        &self,
        path: &mut Vec<String>,
        to: &str,
        depth: usize,
        dist: &HashMap<&str, usize>,
        out: &mut Vec<Vec<String>>,
        max_paths: usize,
    ) {
        if out.len() >= max_paths {
            return;
        }

        let used = path.len() - 1;
        let Some(current) = path.last().cloned() else {
            return;
        };

        if current == to {
            if used == depth {
                out.push(path.clone());
            }
            return;
        }

        let remaining = depth - used;
        if remaining == 0 {
            return;
        }

        for next in self.neighbours(&current) {
            if path.iter().any(|p| p == next) {
                continue;
            }
            // prune branches that cannot reach the target in time
            match dist.get(next.as_str()) {
                Some(&d) if d < remaining => {}
                _ => continue,
            }

            path.push(next.clone());
            self.extend(path, to, depth, dist, out, max_paths);
            path.pop();

            if out.len() >= max_paths {
                return;
            }
        }
    }
}

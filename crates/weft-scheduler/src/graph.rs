//! Dependency graph bookkeeping
//!
//! Tracks the parent-to-child adjacency and each node's indegree (count of
//! not-yet-satisfied dependencies). Insertion order is preserved for the
//! scheduler's stable priority tie-break.

use std::collections::HashMap;

/// Adjacency plus indegree for a task DAG
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// parent id -> child ids
    dependents: HashMap<String, Vec<String>>,
    /// child id -> unsatisfied parent count
    indegree: HashMap<String, u32>,
    /// node ids in insertion order
    order: Vec<String>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_node(&mut self, id: &str) {
        if !self.indegree.contains_key(id) {
            self.indegree.insert(id.to_string(), 0);
            self.order.push(id.to_string());
        }
    }

    /// Record parent -> child; both nodes must already be inserted
    pub fn add_edge(&mut self, parent: &str, child: &str) {
        self.dependents
            .entry(parent.to_string())
            .or_default()
            .push(child.to_string());
        if let Some(count) = self.indegree.get_mut(child) {
            *count += 1;
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.indegree.contains_key(id)
    }

    pub fn indegree(&self, id: &str) -> u32 {
        self.indegree.get(id).copied().unwrap_or(0)
    }

    /// Decrement a child's indegree, clamped at zero; returns the new value
    pub fn decrement(&mut self, child: &str) -> u32 {
        match self.indegree.get_mut(child) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        }
    }

    pub fn children(&self, parent: &str) -> &[String] {
        self.dependents
            .get(parent)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Node ids in insertion order
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Three-color DFS over the dependents adjacency
    ///
    /// Returns the first cycle found as a path of node ids, or None for an
    /// acyclic graph.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        fn visit(
            node: &str,
            graph: &DependencyGraph,
            colors: &mut HashMap<String, Color>,
            path: &mut Vec<String>,
        ) -> bool {
            colors.insert(node.to_string(), Color::Gray);
            path.push(node.to_string());

            for child in graph.children(node) {
                match colors.get(child).copied().unwrap_or(Color::White) {
                    // Gray back-edge closes a cycle
                    Color::Gray => {
                        path.push(child.to_string());
                        return true;
                    }
                    Color::White => {
                        if visit(child, graph, colors, path) {
                            return true;
                        }
                    }
                    Color::Black => {}
                }
            }

            colors.insert(node.to_string(), Color::Black);
            path.pop();
            false
        }

        let mut colors: HashMap<String, Color> = HashMap::new();
        for node in &self.order {
            if colors.get(node).copied().unwrap_or(Color::White) == Color::White {
                let mut path = Vec::new();
                if visit(node, self, &mut colors, &mut path) {
                    // Trim the path to the cycle itself
                    let tail = path.last().cloned().unwrap_or_default();
                    let start = path.iter().position(|n| *n == tail).unwrap_or(0);
                    return Some(path[start..].to_vec());
                }
            }
        }
        None
    }
}

//! Workflow statistics
//!
//! Read-only analysis of a document: counts, a cyclomatic-style
//! complexity score, the longest root-started path, isolated nodes and
//! cycles. All traversals use explicit stacks so deep graphs cannot
//! overflow the call stack.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::types::{NodeId, NodeType, WorkflowDocument};

/// Summary statistics for one workflow
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMetrics {
    pub total_nodes: usize,
    pub nodes_by_type: BTreeMap<NodeType, usize>,
    pub total_connections: usize,
    pub average_connections: f64,
    pub complexity: usize,
    /// Node count along the longest path from a node without incoming edges
    pub longest_path: usize,
    /// Nodes without any incident connection
    pub disconnected_nodes: Vec<NodeId>,
    /// Back edges found by a depth-first traversal
    pub cycles: usize,
}

impl WorkflowMetrics {
    pub fn compute(document: &WorkflowDocument) -> Self {
        let graph = Adjacency::build(document);
        let total_nodes = document.nodes.len();
        let total_connections = document.connections.len();

        let mut nodes_by_type = BTreeMap::new();
        for node in &document.nodes {
            *nodes_by_type.entry(node.node_type).or_insert(0) += 1;
        }

        let average_connections = if total_nodes == 0 {
            0.0
        } else {
            total_connections as f64 / total_nodes as f64
        };

        let disconnected_nodes = document
            .nodes
            .iter()
            .filter(|node| document.incident(&node.id).next().is_none())
            .map(|node| node.id.clone())
            .collect();

        let cycles = graph.count_back_edges();
        let longest_path = if cycles == 0 {
            graph.longest_path_acyclic()
        } else {
            graph.longest_simple_path()
        };

        Self {
            total_nodes,
            complexity: complexity(total_nodes, total_connections, &nodes_by_type),
            nodes_by_type,
            total_connections,
            average_connections,
            longest_path,
            disconnected_nodes,
            cycles,
        }
    }

    /// Number of nodes of one type
    pub fn count(&self, node_type: NodeType) -> usize {
        self.nodes_by_type.get(&node_type).copied().unwrap_or(0)
    }

    /// Share of one type among all nodes, in percent
    pub fn share(&self, node_type: NodeType) -> f64 {
        if self.total_nodes == 0 {
            0.0
        } else {
            self.count(node_type) as f64 * 100.0 / self.total_nodes as f64
        }
    }
}

/// `max(1, E - N + 2 + decisions)`, or 0 for an empty graph
fn complexity(nodes: usize, edges: usize, by_type: &BTreeMap<NodeType, usize>) -> usize {
    if nodes == 0 {
        return 0;
    }
    let decisions = by_type.get(&NodeType::Decision).copied().unwrap_or(0);
    let score = edges as i64 - nodes as i64 + 2 + decisions as i64;
    score.max(1) as usize
}

/// Index-based successor lists in document order
struct Adjacency {
    successors: Vec<Vec<usize>>,
    in_degree: Vec<usize>,
}

impl Adjacency {
    fn build(document: &WorkflowDocument) -> Self {
        let index: HashMap<&str, usize> = document
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id.as_str(), i))
            .collect();

        let mut successors = vec![Vec::new(); document.nodes.len()];
        let mut in_degree = vec![0; document.nodes.len()];
        for connection in &document.connections {
            if let (Some(&from), Some(&to)) =
                (index.get(connection.from.as_str()), index.get(connection.to.as_str()))
            {
                successors[from].push(to);
                in_degree[to] += 1;
            }
        }
        Self {
            successors,
            in_degree,
        }
    }

    fn len(&self) -> usize {
        self.successors.len()
    }

    fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(|&i| self.in_degree[i] == 0)
    }

    /// One count per edge that points back into the current DFS path
    fn count_back_edges(&self) -> usize {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            OnPath,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; self.len()];
        let mut back_edges = 0;
        for start in 0..self.len() {
            if marks[start] != Mark::Unvisited {
                continue;
            }
            marks[start] = Mark::OnPath;
            let mut stack = vec![(start, 0usize)];
            while let Some(frame) = stack.last_mut() {
                let (node, next) = *frame;
                match self.successors[node].get(next) {
                    Some(&child) => {
                        frame.1 += 1;
                        match marks[child] {
                            Mark::Unvisited => {
                                marks[child] = Mark::OnPath;
                                stack.push((child, 0));
                            }
                            Mark::OnPath => back_edges += 1,
                            Mark::Done => {}
                        }
                    }
                    None => {
                        marks[node] = Mark::Done;
                        stack.pop();
                    }
                }
            }
        }
        back_edges
    }

    /// Longest path in a DAG, memoised per node
    fn longest_path_acyclic(&self) -> usize {
        let mut depth: Vec<Option<usize>> = vec![None; self.len()];
        let mut best = 0;
        for root in self.roots() {
            let mut stack = vec![(root, 0usize)];
            while let Some(frame) = stack.last_mut() {
                let (node, next) = *frame;
                match self.successors[node].get(next) {
                    Some(&child) => {
                        frame.1 += 1;
                        if depth[child].is_none() {
                            stack.push((child, 0));
                        }
                    }
                    None => {
                        let below = self.successors[node]
                            .iter()
                            .filter_map(|&child| depth[child])
                            .max()
                            .unwrap_or(0);
                        depth[node] = Some(below + 1);
                        stack.pop();
                    }
                }
            }
            best = best.max(depth[root].unwrap_or(0));
        }
        best
    }

    /// Longest simple path when cycles exist: every root-started path is
    /// walked, never revisiting a node already on the current path
    fn longest_simple_path(&self) -> usize {
        let mut on_path = vec![false; self.len()];
        let mut best = 0;
        for root in self.roots() {
            on_path[root] = true;
            let mut stack = vec![(root, 0usize)];
            best = best.max(1);
            while let Some(frame) = stack.last_mut() {
                let (node, next) = *frame;
                match self.successors[node].get(next) {
                    Some(&child) => {
                        frame.1 += 1;
                        if !on_path[child] {
                            on_path[child] = true;
                            stack.push((child, 0));
                            best = best.max(stack.len());
                        }
                    }
                    None => {
                        on_path[node] = false;
                        stack.pop();
                    }
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(nodes: &[(&str, &str)], edges: &[(&str, &str)]) -> WorkflowDocument {
        let nodes: Vec<_> = nodes
            .iter()
            .map(|(id, ty)| json!({"id": id, "type": ty, "x": 0, "y": 0}))
            .collect();
        let connections: Vec<_> = edges
            .iter()
            .enumerate()
            .map(|(i, (from, to))| json!({"id": format!("c{}", i), "from": from, "to": to}))
            .collect();
        serde_json::from_value(json!({"nodes": nodes, "connections": connections})).unwrap()
    }

    #[test]
    fn test_empty_document() {
        let metrics = WorkflowMetrics::compute(&document(&[], &[]));
        assert_eq!(metrics.total_nodes, 0);
        assert_eq!(metrics.complexity, 0);
        assert_eq!(metrics.longest_path, 0);
        assert_eq!(metrics.average_connections, 0.0);
        assert_eq!(metrics.cycles, 0);
    }

    #[test]
    fn test_branching_workflow() {
        let doc = document(
            &[
                ("s", "start"),
                ("d", "decision"),
                ("a", "task"),
                ("b", "task"),
                ("e", "end"),
                ("n", "comment"),
            ],
            &[("s", "d"), ("d", "a"), ("d", "b"), ("a", "e"), ("b", "e")],
        );
        let metrics = WorkflowMetrics::compute(&doc);

        assert_eq!(metrics.count(NodeType::Task), 2);
        assert_eq!(metrics.count(NodeType::Merge), 0);
        assert!((metrics.share(NodeType::Task) - 33.33).abs() < 0.01);
        // 5 - 6 + 2 + 1
        assert_eq!(metrics.complexity, 2);
        // s -> d -> a -> e
        assert_eq!(metrics.longest_path, 4);
        assert_eq!(metrics.disconnected_nodes, vec!["n".to_string()]);
        assert_eq!(metrics.cycles, 0);
        assert!((metrics.average_connections - 5.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_cycles_counted_per_back_edge() {
        let doc = document(
            &[("s", "start"), ("a", "task"), ("b", "task"), ("c", "task")],
            &[("s", "a"), ("a", "b"), ("b", "a"), ("b", "c"), ("c", "s")],
        );
        let metrics = WorkflowMetrics::compute(&doc);
        assert_eq!(metrics.cycles, 2);
        // Every node has an incoming edge, so no path has a root
        assert_eq!(metrics.longest_path, 0);
    }

    #[test]
    fn test_longest_path_with_cycle_off_the_root() {
        let doc = document(
            &[("s", "start"), ("a", "task"), ("b", "task"), ("e", "end")],
            &[("s", "a"), ("a", "b"), ("b", "a"), ("b", "e")],
        );
        let metrics = WorkflowMetrics::compute(&doc);
        assert_eq!(metrics.cycles, 1);
        assert_eq!(metrics.longest_path, 4);
    }

    #[test]
    fn test_complexity_floor() {
        let doc = document(&[("a", "task"), ("b", "task"), ("c", "task"), ("d", "task")], &[]);
        assert_eq!(WorkflowMetrics::compute(&doc).complexity, 1);
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        let ids: Vec<String> = (0..20_000).map(|i| format!("n{}", i)).collect();
        let nodes: Vec<(&str, &str)> = ids.iter().map(|id| (id.as_str(), "task")).collect();
        let edges: Vec<(&str, &str)> = ids
            .windows(2)
            .map(|pair| (pair[0].as_str(), pair[1].as_str()))
            .collect();
        let metrics = WorkflowMetrics::compute(&document(&nodes, &edges));
        assert_eq!(metrics.longest_path, 20_000);
    }
}

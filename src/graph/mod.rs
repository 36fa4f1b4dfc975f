//! Directed-acyclic-graph structure over opaque node identifiers.
//!
//! Built fresh from a workflow's edge list on every execution pass, never
//! persisted. Provides plain and layered topological sorts; the layered sort
//! is what lets the dispatcher batch independent nodes into one concurrent
//! fan-out instead of serial one-at-a-time chaining.

use std::collections::{HashMap, VecDeque};

use petgraph::{
    Direction,
    graph::{DiGraph, NodeIndex},
};

use crate::{LayerflowError, Result, model::NodeId};

/// One element of a layered topological order.
///
/// A frontier containing exactly one node is represented as `Single` rather
/// than a one-element batch, to simplify downstream consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layer {
    Single(NodeId),
    Batch(Vec<NodeId>),
}

/// Directed acyclic graph keyed by node id.
#[derive(Debug, Default)]
pub struct Dag {
    graph: DiGraph<NodeId, ()>,
    indices: HashMap<NodeId, NodeIndex>,
}

impl Dag {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            indices: HashMap::new(),
        }
    }

    /// Add a node; adding an existing id is a no-op.
    pub fn add_node(
        &mut self,
        id: &str,
    ) -> NodeIndex {
        match self.indices.get(id) {
            Some(idx) => *idx,
            None => {
                let idx = self.graph.add_node(id.to_string());
                self.indices.insert(id.to_string(), idx);
                idx
            }
        }
    }

    /// Add an edge, auto-adding missing endpoints. Duplicate edges collapse.
    pub fn add_edge(
        &mut self,
        source: &str,
        target: &str,
    ) {
        let source = self.add_node(source);
        let target = self.add_node(target);
        self.graph.update_edge(source, target, ());
    }

    pub fn contains(
        &self,
        id: &str,
    ) -> bool {
        self.indices.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// All node ids in insertion order.
    pub fn nodes(&self) -> Vec<NodeId> {
        self.graph.node_indices().map(|idx| self.graph[idx].clone()).collect()
    }

    pub fn parents(
        &self,
        id: &str,
    ) -> Vec<NodeId> {
        self.neighbors(id, Direction::Incoming)
    }

    pub fn children(
        &self,
        id: &str,
    ) -> Vec<NodeId> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(
        &self,
        id: &str,
        dir: Direction,
    ) -> Vec<NodeId> {
        match self.indices.get(id) {
            Some(idx) => self.graph.neighbors_directed(*idx, dir).map(|n| self.graph[n].clone()).collect(),
            None => Vec::new(),
        }
    }

    fn in_degrees(&self) -> Vec<usize> {
        self.graph.node_indices().map(|idx| self.graph.neighbors_directed(idx, Direction::Incoming).count()).collect()
    }

    /// Plain topological order via Kahn's algorithm.
    ///
    /// Fails with a cycle error when the visited count falls short of the
    /// node count.
    pub fn topological_sort(&self) -> Result<Vec<NodeId>> {
        let mut in_degree = self.in_degrees();

        let mut queue: VecDeque<NodeIndex> = self.graph.node_indices().filter(|idx| in_degree[idx.index()] == 0).collect();

        let mut result = Vec::with_capacity(self.graph.node_count());
        while let Some(idx) = queue.pop_front() {
            result.push(self.graph[idx].clone());
            for child in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                in_degree[child.index()] -= 1;
                if in_degree[child.index()] == 0 {
                    queue.push_back(child);
                }
            }
        }

        if result.len() != self.graph.node_count() {
            return Err(LayerflowError::Cycle("the graph contains cycles".to_string()));
        }

        Ok(result)
    }

    /// Layered topological order: one full in-degree-zero frontier per
    /// iteration, each frontier emitted as its own layer. No node in a layer
    /// depends on another node within the same layer.
    pub fn topological_sort_layered(&self) -> Result<Vec<Layer>> {
        let mut in_degree = self.in_degrees();

        let mut frontier: Vec<NodeIndex> = self.graph.node_indices().filter(|idx| in_degree[idx.index()] == 0).collect();

        let mut visited = 0;
        let mut layers = Vec::new();
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for idx in &frontier {
                for child in self.graph.neighbors_directed(*idx, Direction::Outgoing) {
                    in_degree[child.index()] -= 1;
                    if in_degree[child.index()] == 0 {
                        next.push(child);
                    }
                }
            }

            visited += frontier.len();
            let ids: Vec<NodeId> = frontier.iter().map(|idx| self.graph[*idx].clone()).collect();
            layers.push(match ids.len() {
                1 => Layer::Single(ids.into_iter().next().unwrap()),
                _ => Layer::Batch(ids),
            });

            frontier = next;
        }

        if visited != self.graph.node_count() {
            return Err(LayerflowError::Cycle("the graph contains cycles".to_string()));
        }

        Ok(layers)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn diamond() -> Dag {
        // A -> B, A -> C, B -> D, C -> D
        let mut dag = Dag::new();
        dag.add_edge("A", "B");
        dag.add_edge("A", "C");
        dag.add_edge("B", "D");
        dag.add_edge("C", "D");
        dag
    }

    #[test]
    fn test_sort_visits_every_node_once() {
        let dag = diamond();
        let order = dag.topological_sort().unwrap();
        assert_eq!(order.len(), 4);
        let mut sorted = order.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 4);

        let pos = |id: &str| order.iter().position(|n| n == id).unwrap();
        assert!(pos("A") < pos("B"));
        assert!(pos("A") < pos("C"));
        assert!(pos("B") < pos("D"));
        assert!(pos("C") < pos("D"));
    }

    #[test]
    fn test_cycle_fails_both_sorts() {
        let mut dag = Dag::new();
        dag.add_edge("A", "B");
        dag.add_edge("B", "A");
        assert!(matches!(dag.topological_sort(), Err(LayerflowError::Cycle(_))));
        assert!(matches!(dag.topological_sort_layered(), Err(LayerflowError::Cycle(_))));

        // Cycle hanging off an acyclic prefix fails too.
        let mut dag = diamond();
        dag.add_edge("D", "A");
        assert!(matches!(dag.topological_sort(), Err(LayerflowError::Cycle(_))));
        assert!(matches!(dag.topological_sort_layered(), Err(LayerflowError::Cycle(_))));
    }

    #[test]
    fn test_diamond_layers() {
        let dag = diamond();
        let layers = dag.topological_sort_layered().unwrap();
        assert_eq!(layers, vec![
            Layer::Single("A".to_string()),
            Layer::Batch(vec!["B".to_string(), "C".to_string()]),
            Layer::Single("D".to_string()),
        ]);
    }

    #[test]
    fn test_layering_respects_every_edge() {
        let mut dag = diamond();
        dag.add_edge("B", "E");
        dag.add_edge("E", "F");
        dag.add_edge("D", "F");
        let layers = dag.topological_sort_layered().unwrap();

        let layer_of = |id: &str| {
            layers
                .iter()
                .position(|layer| match layer {
                    Layer::Single(n) => n == id,
                    Layer::Batch(ns) => ns.iter().any(|n| n == id),
                })
                .unwrap()
        };
        for (u, v) in [("A", "B"), ("A", "C"), ("B", "D"), ("C", "D"), ("B", "E"), ("E", "F"), ("D", "F")] {
            assert!(layer_of(u) < layer_of(v), "edge {u}->{v} violates layering");
        }
    }

    #[test]
    fn test_isolated_nodes_form_first_layer() {
        let mut dag = Dag::new();
        dag.add_node("X");
        dag.add_node("Y");
        let layers = dag.topological_sort_layered().unwrap();
        assert_eq!(layers, vec![Layer::Batch(vec!["X".to_string(), "Y".to_string()])]);
    }
}

// src/clustering/similarity_graph.rs

use log::debug;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One mined pair of comments. Indices point into the document's comment list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityEdge {
    pub index_a: usize,
    pub index_b: usize,
    pub similarity: f64,
}

impl SimilarityEdge {
    pub fn new(index_a: usize, index_b: usize, similarity: f64) -> Self {
        Self {
            index_a,
            index_b,
            similarity,
        }
    }
}

/// Mined pairs split into the paraphrase band and the near-exact duplicate band.
#[derive(Debug, Clone, Default)]
pub struct PartitionedEdges {
    /// similarity <= threshold
    pub paraphrase: Vec<SimilarityEdge>,
    /// similarity > threshold
    pub exact: Vec<SimilarityEdge>,
}

/// Splits mined pairs at `near_duplicate_threshold`, preserving input order in each band.
pub fn partition(pairs: &[SimilarityEdge], near_duplicate_threshold: f64) -> PartitionedEdges {
    let (exact, paraphrase): (Vec<SimilarityEdge>, Vec<SimilarityEdge>) = pairs
        .iter()
        .copied()
        .partition(|edge| edge.similarity > near_duplicate_threshold);
    debug!(
        "Partitioned {} pairs at {}: {} paraphrase, {} exact",
        pairs.len(),
        near_duplicate_threshold,
        paraphrase.len(),
        exact.len()
    );
    PartitionedEdges { paraphrase, exact }
}

/// Undirected weighted graph over comment indices.
#[derive(Debug, Clone, Default)]
pub struct SimilarityGraph {
    graph: UnGraph<usize, f64>,
    index_to_node: HashMap<usize, NodeIndex>,
}

impl SimilarityGraph {
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Comment indices present in the graph, ascending.
    pub fn vertices(&self) -> Vec<usize> {
        let mut vertices: Vec<usize> = self.index_to_node.keys().copied().collect();
        vertices.sort_unstable();
        vertices
    }

    /// Neighbours of `vertex` with edge weights, ordered by neighbour index.
    pub fn neighbors(&self, vertex: usize) -> Vec<(usize, f64)> {
        let Some(&node) = self.index_to_node.get(&vertex) else {
            return Vec::new();
        };
        let mut neighbors: Vec<(usize, f64)> = self
            .graph
            .edges(node)
            .map(|edge| {
                let other = if edge.source() == node {
                    edge.target()
                } else {
                    edge.source()
                };
                (self.graph[other], *edge.weight())
            })
            .collect();
        neighbors.sort_by_key(|(index, _)| *index);
        neighbors
    }

    fn get_or_add_node(&mut self, vertex: usize) -> NodeIndex {
        let graph = &mut self.graph;
        *self
            .index_to_node
            .entry(vertex)
            .or_insert_with(|| graph.add_node(vertex))
    }
}

/// Builds the similarity graph. Repeated pairs keep the last weight seen and
/// self-pairs are dropped. No edges yields an empty graph.
pub fn build_graph(edges: &[SimilarityEdge]) -> SimilarityGraph {
    let mut similarity_graph = SimilarityGraph::default();

    for edge in edges {
        if edge.index_a == edge.index_b {
            debug!("Dropping self-pair on comment index {}", edge.index_a);
            continue;
        }
        let node_a = similarity_graph.get_or_add_node(edge.index_a);
        let node_b = similarity_graph.get_or_add_node(edge.index_b);
        similarity_graph
            .graph
            .update_edge(node_a, node_b, edge.similarity);
    }

    debug!(
        "Similarity graph built with {} nodes and {} edges",
        similarity_graph.node_count(),
        similarity_graph.edge_count()
    );
    similarity_graph
}

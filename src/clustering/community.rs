// src/clustering/community.rs

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Instant;

// xgraph imports
use xgraph::graph::graph::NodeId;
use xgraph::leiden_clustering::{CommunityConfig as LeidenConfig, CommunityDetection};
use xgraph::Graph;

use crate::clustering::similarity_graph::SimilarityGraph;
use crate::utils::config::DEFAULT_COMMUNITY_RESOLUTION;

/// Fixed seed so a given graph always yields the same partition.
pub const COMMUNITY_SEED: u64 = 42;

/// Leiden settings for one band's graph.
#[derive(Debug, Clone)]
pub struct CommunityConfig {
    pub resolution: f64,
    pub seed: u64,
    pub iterations: usize,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_COMMUNITY_RESOLUTION,
            seed: COMMUNITY_SEED,
            iterations: 10,
        }
    }
}

impl CommunityConfig {
    pub fn with_resolution(resolution: f64) -> Self {
        Self {
            resolution,
            ..Self::default()
        }
    }

    fn leiden(&self) -> LeidenConfig {
        LeidenConfig {
            resolution: self.resolution,
            deterministic: true,
            seed: Some(self.seed),
            iterations: self.iterations,
            gamma: 1.0,
        }
    }
}

/// Maps xgraph node ids back to comment indices.
#[derive(Debug, Default)]
struct NodeMapper {
    vertex_to_node: HashMap<usize, NodeId>,
    node_to_vertex: HashMap<NodeId, usize>,
}

impl NodeMapper {
    fn get_or_add_node(&mut self, graph: &mut Graph<f64, usize, ()>, vertex: usize) -> NodeId {
        *self.vertex_to_node.entry(vertex).or_insert_with(|| {
            let node = graph.add_node(vertex);
            self.node_to_vertex.insert(node, vertex);
            node
        })
    }

    fn get_vertex(&self, node: NodeId) -> Option<usize> {
        self.node_to_vertex.get(&node).copied()
    }
}

/// Copies the similarity graph into an undirected xgraph. Nodes are added in
/// ascending comment-index order.
fn build_xgraph(graph: &SimilarityGraph) -> (Graph<f64, usize, ()>, NodeMapper) {
    let mut xgraph_instance: Graph<f64, usize, ()> = Graph::new(false);
    let mut node_mapper = NodeMapper::default();

    let vertices = graph.vertices();
    for &vertex in &vertices {
        node_mapper.get_or_add_node(&mut xgraph_instance, vertex);
    }
    for &vertex in &vertices {
        for (other, weight) in graph.neighbors(vertex) {
            if other <= vertex {
                continue;
            }
            let node_a = node_mapper.get_or_add_node(&mut xgraph_instance, vertex);
            let node_b = node_mapper.get_or_add_node(&mut xgraph_instance, other);
            if let Err(e) = xgraph_instance.add_edge(node_a, node_b, weight, ()) {
                warn!(
                    "Failed to add edge to xgraph between comments {} and {}: {}",
                    vertex, other, e
                );
            }
        }
    }
    (xgraph_instance, node_mapper)
}

/// Partitions the graph into disjoint communities of comment indices with
/// seeded, deterministic Leiden. Every vertex lands in exactly one community
/// and communities are ordered by their lowest member. Callers should skip
/// graphs without edges; for those an empty partition is returned.
pub fn detect(graph: &SimilarityGraph) -> Result<Vec<BTreeSet<usize>>> {
    detect_with_config(graph, &CommunityConfig::default())
}

pub fn detect_with_config(
    graph: &SimilarityGraph,
    config: &CommunityConfig,
) -> Result<Vec<BTreeSet<usize>>> {
    if graph.edge_count() == 0 {
        warn!("Community detection called on a graph without edges; returning no communities");
        return Ok(Vec::new());
    }

    let (xgraph_instance, node_mapper) = build_xgraph(graph);
    debug!(
        "Graph built with {} nodes and {} edges. Starting Leiden clustering...",
        xgraph_instance.nodes.len(),
        xgraph_instance.edges.len()
    );

    let leiden_start = Instant::now();
    let communities_result = xgraph_instance
        .detect_communities_with_config(config.leiden())
        .context("Leiden community detection failed")?;

    let mut seen: HashSet<usize> = HashSet::new();
    let mut communities: Vec<BTreeSet<usize>> = Vec::with_capacity(communities_result.len());
    for (_community_key, node_indices_in_community) in communities_result.iter() {
        let members: BTreeSet<usize> = node_indices_in_community
            .iter()
            .filter_map(|&node| node_mapper.get_vertex(node))
            .filter(|vertex| seen.insert(*vertex))
            .collect();
        if !members.is_empty() {
            communities.push(members);
        }
    }
    // Anything the detector left out stands alone.
    for vertex in graph.vertices() {
        if seen.insert(vertex) {
            communities.push(BTreeSet::from([vertex]));
        }
    }
    communities.sort_by_key(|members| members.iter().next().copied());

    info!(
        "Leiden finished in {:.2?}: {} nodes -> {} communities (modularity {:.4})",
        leiden_start.elapsed(),
        graph.node_count(),
        communities.len(),
        modularity(graph, &communities, config.resolution)
    );
    Ok(communities)
}

/// Newman modularity of a partition, for logging partition quality.
pub fn modularity(graph: &SimilarityGraph, communities: &[BTreeSet<usize>], resolution: f64) -> f64 {
    let vertices = graph.vertices();
    let degree: HashMap<usize, f64> = vertices
        .iter()
        .map(|&v| (v, graph.neighbors(v).iter().map(|(_, w)| w).sum()))
        .collect();
    let two_m: f64 = degree.values().sum();
    if two_m <= 0.0 {
        return 0.0;
    }

    communities
        .iter()
        .map(|members| {
            let internal: f64 = members
                .iter()
                .flat_map(|&v| graph.neighbors(v))
                .filter(|(other, _)| members.contains(other))
                .map(|(_, w)| w)
                .sum();
            let total: f64 = members.iter().filter_map(|v| degree.get(v)).sum();
            internal / two_m - resolution * (total / two_m).powi(2)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::similarity_graph::{build_graph, SimilarityEdge};
    use crate::clustering::test_fixtures::{two_community_fixture, COMMUNITY_A, COMMUNITY_B};

    fn assert_is_partition(edges: &[SimilarityEdge], communities: &[BTreeSet<usize>]) {
        let touched: BTreeSet<usize> = edges
            .iter()
            .filter(|e| e.index_a != e.index_b)
            .flat_map(|e| [e.index_a, e.index_b])
            .collect();
        let mut union = BTreeSet::new();
        for community in communities {
            assert!(!community.is_empty());
            for member in community {
                assert!(union.insert(*member), "vertex {} in two communities", member);
            }
        }
        assert_eq!(union, touched);
    }

    #[test]
    fn test_fixture_two_communities_pinned() {
        let graph = build_graph(&two_community_fixture());
        let communities = detect(&graph).unwrap();
        let expected: Vec<BTreeSet<usize>> = vec![
            COMMUNITY_A.iter().copied().collect(),
            COMMUNITY_B.iter().copied().collect(),
        ];
        assert_eq!(communities, expected);
        assert!(modularity(&graph, &communities, 1.0) > 0.45);
    }

    #[test]
    fn test_detection_is_repeatable() {
        let graph = build_graph(&two_community_fixture());
        assert_eq!(detect(&graph).unwrap(), detect(&graph).unwrap());
    }

    #[test]
    fn test_partition_covers_touched_vertices() {
        let edge_sets = vec![
            vec![SimilarityEdge::new(0, 1, 0.9)],
            vec![
                SimilarityEdge::new(0, 1, 0.9),
                SimilarityEdge::new(1, 2, 0.8),
                SimilarityEdge::new(5, 6, 0.7),
                SimilarityEdge::new(6, 7, 0.7),
                SimilarityEdge::new(7, 5, 0.6),
            ],
            vec![
                SimilarityEdge::new(10, 11, 0.5),
                SimilarityEdge::new(12, 12, 0.9),
                SimilarityEdge::new(11, 13, 0.5),
                SimilarityEdge::new(13, 10, 0.5),
                SimilarityEdge::new(13, 14, 0.2),
                SimilarityEdge::new(20, 21, 0.95),
            ],
            two_community_fixture(),
        ];
        for edges in edge_sets {
            let communities = detect(&build_graph(&edges)).unwrap();
            assert_is_partition(&edges, &communities);
        }
    }

    #[test]
    fn test_disconnected_components_stay_apart() {
        let edges = vec![
            SimilarityEdge::new(0, 1, 0.9),
            SimilarityEdge::new(2, 3, 0.9),
        ];
        let communities = detect(&build_graph(&edges)).unwrap();
        assert_eq!(
            communities,
            vec![BTreeSet::from([0usize, 1]), BTreeSet::from([2usize, 3])]
        );
    }

    #[test]
    fn test_edgeless_graph_yields_no_communities() {
        assert!(detect(&build_graph(&[])).unwrap().is_empty());
    }

    #[test]
    fn test_modularity_prefers_the_true_split() {
        let graph = build_graph(&two_community_fixture());
        let split = detect(&graph).unwrap();
        let lumped = vec![graph.vertices().into_iter().collect::<BTreeSet<usize>>()];
        assert!(modularity(&graph, &split, 1.0) > modularity(&graph, &lumped, 1.0));
        assert!(modularity(&graph, &lumped, 1.0).abs() < 1e-9);
    }
}

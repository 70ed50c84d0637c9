// src/clustering/representatives.rs

use log::{debug, warn};
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::clustering::similarity_graph::SimilarityGraph;
use crate::models::{Cluster, ClusterKind, Comment};

/// Numbers detected communities into clusters of one kind, in the order
/// given, and selects each cluster's representative on `graph`.
pub fn clusters_from_partition(
    graph: &SimilarityGraph,
    communities: Vec<BTreeSet<usize>>,
    kind: ClusterKind,
) -> Vec<Cluster> {
    communities
        .into_iter()
        .enumerate()
        .map(|(id, members)| {
            let mut cluster = Cluster::new(id, kind, members);
            cluster.representative = select_representative(graph, &cluster);
            cluster
        })
        .collect()
}

/// Degree centrality of every member within the subgraph induced by the
/// cluster: neighbours inside the cluster divided by `size - 1`.
/// Returned in ascending member order. Callers must not pass singletons.
pub fn degree_centrality(graph: &SimilarityGraph, cluster: &Cluster) -> Vec<(usize, f64)> {
    let members: HashSet<usize> = cluster.members.iter().copied().collect();
    let possible = cluster.size().saturating_sub(1).max(1) as f64;
    cluster
        .members
        .iter()
        .map(|&member| {
            let inside = graph
                .neighbors(member)
                .into_iter()
                .filter(|(other, _)| members.contains(other))
                .count();
            (member, inside as f64 / possible)
        })
        .collect()
}

/// The member with the highest degree centrality; the lowest index wins ties.
/// A singleton is its own representative. `None` only for an empty cluster.
pub fn select_representative(graph: &SimilarityGraph, cluster: &Cluster) -> Option<usize> {
    if cluster.is_singleton() {
        return cluster.members.first().copied();
    }
    match cluster.size() {
        0 => None,
        _ => {
            let mut best: Option<(usize, f64)> = None;
            for (member, centrality) in degree_centrality(graph, cluster) {
                match best {
                    Some((_, top)) if centrality <= top => {}
                    _ => best = Some((member, centrality)),
                }
            }
            best.map(|(member, _)| member)
        }
    }
}

/// Output record for one cluster, standing in for all of its members.
pub fn aggregate(cluster: &Cluster, representative: &Comment, is_form_letter: bool) -> Comment {
    representative.as_representative(cluster.label(), cluster.size() as u64, is_form_letter)
}

/// One representative record per cluster, most-represented first (stable on
/// ties). Form-letter band records are deduplicated by text: the first record
/// with a text keeps it and absorbs the counts of later ones.
pub fn representative_comments(
    graph: &SimilarityGraph,
    clusters: &[Cluster],
    comments: &[Comment],
    kind: ClusterKind,
) -> Vec<Comment> {
    let is_form_letter = kind == ClusterKind::FormLetter;
    let mut records: Vec<Comment> = Vec::with_capacity(clusters.len());

    for cluster in clusters {
        let Some(index) = cluster
            .representative
            .or_else(|| select_representative(graph, cluster))
        else {
            continue;
        };
        let Some(comment) = comments.get(index) else {
            warn!(
                "Representative index {} outside a corpus of {} comments; skipping {}",
                index,
                comments.len(),
                cluster.label()
            );
            continue;
        };
        records.push(aggregate(cluster, comment, is_form_letter));
    }

    if is_form_letter {
        let before = records.len();
        let mut by_text: HashMap<String, usize> = HashMap::new();
        let mut folded: Vec<Comment> = Vec::with_capacity(records.len());
        for record in records {
            match by_text.get(&record.text) {
                Some(&kept) => folded[kept].num_represented += record.num_represented,
                None => {
                    by_text.insert(record.text.clone(), folded.len());
                    folded.push(record);
                }
            }
        }
        if before != folded.len() {
            debug!(
                "Folded {} duplicate-text {} representatives",
                before - folded.len(),
                kind
            );
        }
        records = folded;
    }

    records.sort_by(|a, b| b.num_represented.cmp(&a.num_represented));
    records
}

/// Moves the members of each cluster onto the label of the record that
/// represents them, looked up by the text of the cluster's representative.
/// Clusters whose text has no entry keep their labels.
pub fn relabel_members(
    comments: &mut [Comment],
    clusters: &[Cluster],
    label_by_text: &HashMap<String, String>,
) {
    for cluster in clusters {
        let Some(label) = cluster
            .representative
            .and_then(|index| comments.get(index))
            .and_then(|comment| label_by_text.get(&comment.text))
            .cloned()
        else {
            continue;
        };
        for &member in &cluster.members {
            if let Some(comment) = comments.get_mut(member) {
                comment.cluster_id = Some(label.clone());
            }
        }
    }
}

/// Writes each cluster's label onto its member comments. Later calls overwrite
/// labels from earlier passes.
pub fn assign_cluster_labels(comments: &mut [Comment], clusters: &[Cluster]) {
    for cluster in clusters {
        let label = cluster.label();
        for &member in &cluster.members {
            if let Some(comment) = comments.get_mut(member) {
                comment.cluster_id = Some(label.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::similarity_graph::{build_graph, SimilarityEdge};

    fn corpus(texts: &[&str]) -> Vec<Comment> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| Comment::new(format!("c-{}", i), "DOC-1", *text))
            .collect()
    }

    #[test]
    fn test_singleton_is_its_own_representative() {
        let graph = build_graph(&[SimilarityEdge::new(0, 1, 0.9)]);
        let cluster = Cluster::new(0, ClusterKind::Paraphrase, [7]);
        // 7 is not even in the graph; no centrality is computed for singletons.
        assert_eq!(select_representative(&graph, &cluster), Some(7));
        let empty = Cluster::new(1, ClusterKind::Paraphrase, Vec::new());
        assert_eq!(select_representative(&graph, &empty), None);
    }

    #[test]
    fn test_highest_degree_wins() {
        // Star centred on 3.
        let graph = build_graph(&[
            SimilarityEdge::new(3, 1, 0.5),
            SimilarityEdge::new(3, 2, 0.5),
            SimilarityEdge::new(3, 4, 0.5),
        ]);
        let cluster = Cluster::new(0, ClusterKind::Paraphrase, [1, 2, 3, 4]);
        assert_eq!(select_representative(&graph, &cluster), Some(3));
        let centrality = degree_centrality(&graph, &cluster);
        assert_eq!(centrality[2], (3, 1.0));
        assert!((centrality[0].1 - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_ties_go_to_lowest_index() {
        let graph = build_graph(&[
            SimilarityEdge::new(4, 6, 0.9),
            SimilarityEdge::new(6, 2, 0.9),
            SimilarityEdge::new(2, 4, 0.9),
        ]);
        let cluster = Cluster::new(0, ClusterKind::Paraphrase, [6, 4, 2]);
        assert_eq!(select_representative(&graph, &cluster), Some(2));
    }

    #[test]
    fn test_centrality_ignores_edges_leaving_the_cluster() {
        let graph = build_graph(&[
            SimilarityEdge::new(0, 1, 0.9),
            SimilarityEdge::new(1, 5, 0.9),
            SimilarityEdge::new(1, 6, 0.9),
            SimilarityEdge::new(2, 0, 0.9),
            SimilarityEdge::new(2, 1, 0.9),
            SimilarityEdge::new(2, 3, 0.9),
        ]);
        let cluster = Cluster::new(0, ClusterKind::Paraphrase, [0, 1, 2, 3]);
        assert_eq!(select_representative(&graph, &cluster), Some(2));
    }

    #[test]
    fn test_exact_band_deduplicates_by_text() {
        let comments = corpus(&["Same letter.", "Same letter.", "Other.", "Other.", "Same letter."]);
        let graph = build_graph(&[
            SimilarityEdge::new(0, 1, 0.999),
            SimilarityEdge::new(2, 3, 0.999),
            SimilarityEdge::new(4, 2, 0.995),
        ]);
        let clusters = vec![
            Cluster::new(0, ClusterKind::FormLetter, [0, 1]),
            Cluster::new(1, ClusterKind::FormLetter, [2, 3]),
            Cluster::new(2, ClusterKind::FormLetter, [4]),
        ];
        let records = representative_comments(&graph, &clusters, &comments, ClusterKind::FormLetter);
        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["Same letter.", "Other."]);
        assert!(records.iter().all(|r| r.is_form_letter && r.is_representative));
        // The singleton's count folds into the first "Same letter." record.
        assert_eq!(records[0].num_represented, 3);
        assert_eq!(records[0].cluster_id.as_deref(), Some("form-letter-0"));
        assert_eq!(records[1].num_represented, 2);
    }

    #[test]
    fn test_paraphrase_band_keeps_duplicates_and_sorts() {
        let comments = corpus(&["A.", "A.", "B.", "B.", "B."]);
        let graph = build_graph(&[
            SimilarityEdge::new(0, 1, 0.8),
            SimilarityEdge::new(2, 3, 0.8),
            SimilarityEdge::new(3, 4, 0.8),
        ]);
        let clusters = clusters_from_partition(
            &graph,
            vec![[0, 1].into_iter().collect(), [2, 3, 4].into_iter().collect()],
            ClusterKind::Paraphrase,
        );
        assert_eq!(clusters[0].representative, Some(0));
        assert_eq!(clusters[1].representative, Some(3));
        let records = representative_comments(&graph, &clusters, &comments, ClusterKind::Paraphrase);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "c-3");
        assert_eq!(records[0].num_represented, 3);
        assert_eq!(records[0].cluster_id.as_deref(), Some("paraphrase-1"));
        assert!(!records[0].is_form_letter);
    }

    #[test]
    fn test_out_of_range_representative_is_skipped() {
        let comments = corpus(&["Only one."]);
        let graph = build_graph(&[SimilarityEdge::new(3, 4, 0.9)]);
        let clusters = vec![Cluster::new(0, ClusterKind::Paraphrase, [3, 4])];
        assert!(representative_comments(&graph, &clusters, &comments, ClusterKind::Paraphrase).is_empty());
    }

    #[test]
    fn test_later_pass_overwrites_labels() {
        let mut comments = corpus(&["a", "b", "c"]);
        assign_cluster_labels(&mut comments, &[Cluster::new(0, ClusterKind::Paraphrase, [0, 1, 2])]);
        assign_cluster_labels(&mut comments, &[Cluster::new(4, ClusterKind::FormLetter, [1, 9])]);
        assert_eq!(comments[0].cluster_id.as_deref(), Some("paraphrase-0"));
        assert_eq!(comments[1].cluster_id.as_deref(), Some("form-letter-4"));
        assert_eq!(comments[2].cluster_id.as_deref(), Some("paraphrase-0"));
    }

    #[test]
    fn test_relabel_members_by_representative_text() {
        let mut comments = corpus(&["Same.", "Same.", "Other.", "Other.", "Else."]);
        let graph = build_graph(&[
            SimilarityEdge::new(0, 1, 0.999),
            SimilarityEdge::new(2, 3, 0.999),
        ]);
        let mut clusters = clusters_from_partition(
            &graph,
            vec![BTreeSet::from([0, 1]), BTreeSet::from([2, 3])],
            ClusterKind::FormLetter,
        );
        clusters.push(Cluster::new(2, ClusterKind::FormLetter, [4]));
        assign_cluster_labels(&mut comments, &clusters);

        let label_by_text: HashMap<String, String> =
            [("Same.".to_string(), "form-letter-9".to_string())].into_iter().collect();
        relabel_members(&mut comments, &clusters, &label_by_text);
        assert_eq!(comments[0].cluster_id.as_deref(), Some("form-letter-9"));
        assert_eq!(comments[1].cluster_id.as_deref(), Some("form-letter-9"));
        assert_eq!(comments[2].cluster_id.as_deref(), Some("form-letter-1"));
        // No representative selected, nothing to look up.
        assert_eq!(comments[4].cluster_id.as_deref(), Some("form-letter-2"));
    }
}

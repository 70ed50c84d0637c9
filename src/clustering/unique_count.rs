// src/clustering/unique_count.rs

use std::collections::HashSet;

use crate::clustering::similarity_graph::SimilarityEdge;

/// Estimates how many distinct comments a document has.
///
/// Every comment index touched by a paraphrase pair counts once. The form
/// letter cluster count is added only while that union is still below the
/// total, and the result never exceeds `total_comments`. This is a heuristic
/// and can over- or under-count on adversarial graphs.
pub fn count_unique(
    paraphrase_pairs: &[SimilarityEdge],
    num_form_letter_clusters: usize,
    total_comments: usize,
) -> usize {
    let touched: HashSet<usize> = paraphrase_pairs
        .iter()
        .flat_map(|pair| [pair.index_a, pair.index_b])
        .collect();

    let estimate = if touched.len() < total_comments {
        touched.len() + num_form_letter_clusters
    } else {
        touched.len()
    };
    estimate.min(total_comments)
}

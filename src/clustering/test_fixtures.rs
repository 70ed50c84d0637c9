//! Shared graph fixtures for clustering tests.

use crate::clustering::similarity_graph::SimilarityEdge;

pub const COMMUNITY_A: [usize; 14] = [0, 1, 2, 4, 6, 7, 8, 9, 11, 12, 13, 17, 18, 23];
pub const COMMUNITY_B: [usize; 14] = [3, 5, 10, 14, 15, 16, 19, 20, 21, 22, 24, 25, 26, 27];

/// 28 comments forming two dense groups joined by two weak pairs.
pub fn two_community_fixture() -> Vec<SimilarityEdge> {
    let mut pairs = Vec::new();
    for group in [&COMMUNITY_A, &COMMUNITY_B] {
        for (i, &a) in group.iter().enumerate() {
            for &b in &group[i + 1..] {
                let similarity = 0.80 + ((a * b) % 7) as f64 * 0.02;
                pairs.push(SimilarityEdge::new(a, b, similarity));
            }
        }
    }
    pairs.push(SimilarityEdge::new(2, 3, 0.41));
    pairs.push(SimilarityEdge::new(13, 14, 0.38));
    pairs
}

// src/services/paraphrase.rs

use async_trait::async_trait;
use log::{debug, info};
use ndarray::{s, Array2, Axis};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::clustering::similarity_graph::SimilarityEdge;
use crate::services::{embeddings_to_matrix, Embedder, ParaphraseMiner, ServiceError};
use crate::utils::env::env_or;

#[derive(Debug, Clone)]
pub struct ParaphraseConfig {
    /// Best partners kept per anchor comment.
    pub top_k: usize,
    /// Pairs at or below this cosine similarity are not reported.
    pub min_similarity: f64,
    /// Anchor rows scored against the corpus at once; bounds memory to
    /// `query_chunk_size x n` similarities.
    pub query_chunk_size: usize,
    /// Most pairs reported for one corpus, best first.
    pub max_pairs: usize,
}

impl Default for ParaphraseConfig {
    fn default() -> Self {
        Self {
            top_k: 100,
            min_similarity: 0.0,
            query_chunk_size: 1000,
            max_pairs: 500_000,
        }
    }
}

impl ParaphraseConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            top_k: env_or("PARAPHRASE_TOP_K", defaults.top_k).max(1),
            min_similarity: env_or("PARAPHRASE_MIN_SIMILARITY", defaults.min_similarity),
            query_chunk_size: env_or("PARAPHRASE_QUERY_CHUNK_SIZE", defaults.query_chunk_size)
                .max(1),
            max_pairs: env_or("PARAPHRASE_MAX_PAIRS", defaults.max_pairs),
        }
    }
}

fn by_similarity_desc(a: &(usize, f64), b: &(usize, f64)) -> Ordering {
    b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0))
}

/// Finds similar pairs by cosine similarity over embeddings: each row keeps
/// its `top_k` most similar other rows above the floor, and every unordered
/// pair is reported once (with `index_a < index_b`), most similar first, at
/// most `max_pairs` of them. Rows are scored in chunks of `query_chunk_size`.
pub fn mine_pairs(embeddings: &Array2<f32>, config: &ParaphraseConfig) -> Vec<SimilarityEdge> {
    let n = embeddings.nrows();
    if n < 2 {
        return Vec::new();
    }

    let mut normalized = embeddings.mapv(|x| x as f64);
    for mut row in normalized.axis_iter_mut(Axis(0)) {
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row.mapv_inplace(|x| x / norm);
        }
    }
    let corpus_t = normalized.t();
    let chunk_size = config.query_chunk_size.max(1);

    let mut pairs: HashMap<(usize, usize), f64> = HashMap::new();
    for start in (0..n).step_by(chunk_size) {
        let end = (start + chunk_size).min(n);
        let similarities = normalized.slice(s![start..end, ..]).dot(&corpus_t);

        for (offset, scores) in similarities.axis_iter(Axis(0)).enumerate() {
            let i = start + offset;
            let mut candidates: Vec<(usize, f64)> = scores
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(j, &score)| (j, score.min(1.0)))
                .filter(|&(_, score)| score > config.min_similarity)
                .collect();
            if candidates.len() > config.top_k {
                candidates.select_nth_unstable_by(config.top_k, by_similarity_desc);
                candidates.truncate(config.top_k);
            }
            for (j, score) in candidates {
                pairs.insert((i.min(j), i.max(j)), score);
            }
        }
        debug!("Scored rows {}..{} of {}", start, end, n);
    }

    let mut edges: Vec<SimilarityEdge> = pairs
        .into_iter()
        .map(|((a, b), score)| SimilarityEdge::new(a, b, score))
        .collect();
    edges.sort_by(|x, y| {
        y.similarity
            .partial_cmp(&x.similarity)
            .unwrap_or(Ordering::Equal)
            .then(x.index_a.cmp(&y.index_a))
            .then(x.index_b.cmp(&y.index_b))
    });
    if edges.len() > config.max_pairs {
        debug!("Keeping the best {} of {} pairs", config.max_pairs, edges.len());
        edges.truncate(config.max_pairs);
    }
    debug!("Mined {} pairs from {} rows", edges.len(), n);
    edges
}

/// Paraphrase miner on top of any embedder.
pub struct EmbeddingParaphraseMiner {
    embedder: Arc<dyn Embedder>,
    config: ParaphraseConfig,
}

impl EmbeddingParaphraseMiner {
    pub fn new(embedder: Arc<dyn Embedder>, config: ParaphraseConfig) -> Self {
        Self { embedder, config }
    }
}

#[async_trait]
impl ParaphraseMiner for EmbeddingParaphraseMiner {
    async fn mine(&self, texts: &[String]) -> Result<Vec<SimilarityEdge>, ServiceError> {
        if texts.len() < 2 {
            return Ok(Vec::new());
        }
        let vectors = self.embedder.embed(texts).await?;
        let matrix = embeddings_to_matrix(vectors, texts.len())?;
        let edges = mine_pairs(&matrix, &self.config);
        info!(
            "Paraphrase mining: {} texts -> {} pairs (top_k {})",
            texts.len(),
            edges.len(),
            self.config.top_k
        );
        Ok(edges)
    }
}

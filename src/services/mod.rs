// src/services/mod.rs
//
// Model collaborators the pipeline calls out to. Every service is a stateless
// trait object handed to the orchestrator, so tests can swap in fakes.

pub mod http;
pub mod paraphrase;

use async_trait::async_trait;
use ndarray::Array2;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::clustering::similarity_graph::SimilarityEdge;
use crate::topics::TopicModelError;

pub use http::{HttpModelClient, ModelServiceConfig};
pub use paraphrase::{EmbeddingParaphraseMiner, ParaphraseConfig};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("request to model service failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response from model service: {0}")]
    InvalidResponse(String),
    #[error("expected {expected} embeddings, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Raw topic model output over a list of sentences.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopicFit {
    /// Topic per sentence; -1 is unassigned.
    pub topics: Vec<i64>,
    /// Probability of the assigned topic, per sentence.
    pub probabilities: Vec<f64>,
    /// Ranked terms describing each topic.
    pub terms: HashMap<i64, Vec<String>>,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Fixed-dimension embeddings, one per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError>;
}

#[async_trait]
pub trait ParaphraseMiner: Send + Sync {
    /// Similar pairs above the miner's relevance floor. Indices point into `texts`.
    async fn mine(&self, texts: &[String]) -> Result<Vec<SimilarityEdge>, ServiceError>;
}

#[async_trait]
pub trait TopicModeler: Send + Sync {
    async fn fit_topics(&self, sentences: &[String]) -> Result<TopicFit, TopicModelError>;
}

#[async_trait]
pub trait Labeler: Send + Sync {
    async fn label(&self, terms: &[String]) -> Result<String, ServiceError>;
}

#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    async fn classify_sentiment(&self, text: &str) -> Result<String, ServiceError>;
}

#[async_trait]
pub trait Titler: Send + Sync {
    /// Plain-English title for a document, written from its summary.
    async fn title(&self, summary: &str) -> Result<String, ServiceError>;
}

/// The set of collaborators one pipeline run uses.
#[derive(Clone)]
pub struct ModelServices {
    pub embedder: Arc<dyn Embedder>,
    pub miner: Arc<dyn ParaphraseMiner>,
    pub topic_model: Arc<dyn TopicModeler>,
    pub labeler: Arc<dyn Labeler>,
    pub sentiment: Arc<dyn SentimentClassifier>,
    pub titler: Arc<dyn Titler>,
}

impl ModelServices {
    /// Every service backed by one HTTP model server; paraphrases are mined
    /// locally from its embeddings.
    pub fn http(
        config: &ModelServiceConfig,
        paraphrase: ParaphraseConfig,
    ) -> anyhow::Result<Self> {
        let client = Arc::new(HttpModelClient::new(config)?);
        let miner = EmbeddingParaphraseMiner::new(client.clone(), paraphrase);
        Ok(Self {
            embedder: client.clone(),
            miner: Arc::new(miner),
            topic_model: client.clone(),
            labeler: client.clone(),
            sentiment: client.clone(),
            titler: client,
        })
    }
}

/// Packs embeddings into a matrix, checking the row count and that all rows
/// share one dimension.
pub fn embeddings_to_matrix(
    vectors: Vec<Vec<f32>>,
    expected_rows: usize,
) -> Result<Array2<f32>, ServiceError> {
    if vectors.len() != expected_rows {
        return Err(ServiceError::DimensionMismatch {
            expected: expected_rows,
            actual: vectors.len(),
        });
    }
    let dim = vectors.first().map_or(0, Vec::len);
    if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
        return Err(ServiceError::InvalidResponse(format!(
            "embedding of dimension {} among dimension {}",
            bad.len(),
            dim
        )));
    }
    let flat: Vec<f32> = vectors.into_iter().flatten().collect();
    Array2::from_shape_vec((expected_rows, dim), flat)
        .map_err(|e| ServiceError::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embeddings_to_matrix() {
        let matrix = embeddings_to_matrix(vec![vec![1.0, 2.0], vec![3.0, 4.0]], 2).unwrap();
        assert_eq!(matrix.shape(), &[2, 2]);
        assert_eq!(matrix[[1, 0]], 3.0);

        assert!(matches!(
            embeddings_to_matrix(vec![vec![1.0]], 2),
            Err(ServiceError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            embeddings_to_matrix(vec![vec![1.0, 2.0], vec![3.0]], 2),
            Err(ServiceError::InvalidResponse(_))
        ));
        assert_eq!(embeddings_to_matrix(Vec::new(), 0).unwrap().nrows(), 0);
    }
}

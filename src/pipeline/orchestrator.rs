// src/pipeline/orchestrator.rs

use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::time::Instant;

use crate::clustering::community::{detect_with_config, CommunityConfig};
use crate::clustering::form_letters::{find_form_letters, FormLetterConfig, FormLetterGroups};
use crate::clustering::representatives::{
    assign_cluster_labels, clusters_from_partition, relabel_members, representative_comments,
};
use crate::clustering::similarity_graph::{build_graph, partition, SimilarityEdge, SimilarityGraph};
use crate::clustering::unique_count::count_unique;
use crate::models::{Cluster, ClusterKind, Comment, RepComments};
use crate::services::{embeddings_to_matrix, ModelServices};
use crate::storage::{CommentRepository, DocumentContext};
use crate::topics::analysis::{apply_topics, label_topics, model_topics, summarize_topics};
use crate::topics::{TopicModelError, TopicModelResult};
use crate::utils::config::PipelineConfig;

/// Which corpus a topic modelling attempt runs on. A failed attempt on the
/// representatives widens to the full corpus once; nothing follows that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicStage {
    Representative,
    FullCorpus,
}

impl TopicStage {
    pub fn next(self) -> Option<TopicStage> {
        match self {
            TopicStage::Representative => Some(TopicStage::FullCorpus),
            TopicStage::FullCorpus => None,
        }
    }
}

/// Counters from one document run, for logs and the batch summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentStats {
    pub total_comments: usize,
    pub paraphrase_pairs: usize,
    pub exact_pairs: usize,
    pub paraphrase_clusters: usize,
    pub exact_clusters: usize,
    pub form_letter_clusters: usize,
    pub topic_attempts: usize,
    pub too_few_topics: usize,
    pub topic_model_failures: usize,
    /// Stage whose attempt succeeded, if any did.
    pub topic_stage: Option<TopicStage>,
}

#[derive(Debug, Clone)]
pub struct DocumentOutcome {
    pub rep_comments: RepComments,
    /// The document's comments with cluster and topic labels applied.
    pub comments: Vec<Comment>,
    pub stats: DocumentStats,
}

/// Runs clustering, form letter detection and topic aggregation for one
/// document at a time. Holds no per-document state, so one instance can
/// serve concurrent documents.
pub struct PipelineOrchestrator {
    services: ModelServices,
    config: PipelineConfig,
}

/// Builds the band's graph and partitions it. An edgeless band, or one the
/// detector fails on, has no clusters.
fn cluster_band(
    document_id: &str,
    edges: &[SimilarityEdge],
    kind: ClusterKind,
    resolution: f64,
) -> (SimilarityGraph, Vec<Cluster>) {
    let graph = build_graph(edges);
    if graph.edge_count() == 0 {
        debug!("No {} edges; skipping community detection", kind);
        return (graph, Vec::new());
    }
    match detect_with_config(&graph, &CommunityConfig::with_resolution(resolution)) {
        Ok(communities) => {
            let clusters = clusters_from_partition(&graph, communities, kind);
            (graph, clusters)
        }
        Err(e) => {
            warn!(
                "Community detection on the {} band failed for document {}: {:?}",
                kind, document_id, e
            );
            (graph, Vec::new())
        }
    }
}

/// Form-letter records first, then paraphrase representatives, one record per text.
fn merge_representatives(form_letters: Vec<Comment>, paraphrases: Vec<Comment>) -> Vec<Comment> {
    let mut seen: HashSet<String> = HashSet::new();
    form_letters
        .into_iter()
        .chain(paraphrases)
        .filter(|record| seen.insert(record.text.clone()))
        .collect()
}

impl PipelineOrchestrator {
    pub fn new(services: ModelServices, config: PipelineConfig) -> Self {
        Self { services, config }
    }

    /// Fetches, analyses and stores one document. Analysis problems are
    /// recovered inside; storage errors are returned.
    pub async fn run(
        &self,
        repository: &dyn CommentRepository,
        document_id: &str,
    ) -> Result<DocumentOutcome> {
        let start = Instant::now();
        let comments = repository
            .fetch_comments(document_id)
            .await
            .with_context(|| format!("Failed to load comments for document {}", document_id))?;

        let context = repository
            .fetch_document_context(document_id)
            .await
            .with_context(|| format!("Failed to load document {}", document_id))?;

        let mut outcome = self.analyze(document_id, comments).await;
        outcome.rep_comments.plain_english_title = self.resolve_title(document_id, context).await;

        repository
            .upsert_rep_comments(&outcome.rep_comments)
            .await
            .with_context(|| format!("Failed to store results for document {}", document_id))?;

        info!(
            "Processed document {} in {:.2?}: {} comments, {} unique, {} representatives, {} topics",
            document_id,
            start.elapsed(),
            outcome.rep_comments.total_comment_count,
            outcome.rep_comments.unique_comment_count,
            outcome.rep_comments.num_representative_comments(),
            outcome.rep_comments.num_topics()
        );
        Ok(outcome)
    }

    /// Computes the aggregate for one document's comments. Never fails; a
    /// collaborator failure shrinks the result instead.
    pub async fn analyze(&self, document_id: &str, mut comments: Vec<Comment>) -> DocumentOutcome {
        let total = comments.len();
        let mut stats = DocumentStats {
            total_comments: total,
            ..DocumentStats::default()
        };

        if total < 2 {
            info!(
                "Document {} has {} comment(s); nothing to cluster",
                document_id, total
            );
            return DocumentOutcome {
                rep_comments: RepComments::minimal(document_id, total as u64),
                comments,
                stats,
            };
        }

        // Similar pairs
        let texts: Vec<String> = comments.iter().map(|c| c.text.clone()).collect();
        let pairs = match self.services.miner.mine(&texts).await {
            Ok(pairs) => pairs,
            Err(e) => {
                warn!("Paraphrase mining failed for document {}: {}", document_id, e);
                Vec::new()
            }
        };
        let bands = partition(&pairs, self.config.near_duplicate_threshold);
        stats.paraphrase_pairs = bands.paraphrase.len();
        stats.exact_pairs = bands.exact.len();

        // Paraphrase band, then the near-exact band; later labels win.
        let resolution = self.config.community_resolution;
        let (paraphrase_graph, paraphrase_clusters) =
            cluster_band(document_id, &bands.paraphrase, ClusterKind::Paraphrase, resolution);
        assign_cluster_labels(&mut comments, &paraphrase_clusters);
        let paraphrase_reps = representative_comments(
            &paraphrase_graph,
            &paraphrase_clusters,
            &comments,
            ClusterKind::Paraphrase,
        );

        let (exact_graph, exact_clusters) =
            cluster_band(document_id, &bands.exact, ClusterKind::FormLetter, resolution);
        assign_cluster_labels(&mut comments, &exact_clusters);
        let exact_reps =
            representative_comments(&exact_graph, &exact_clusters, &comments, ClusterKind::FormLetter);

        stats.paraphrase_clusters = paraphrase_clusters.len();
        stats.exact_clusters = exact_clusters.len();
        debug!(
            "Document {}: {} paraphrase clusters, {} exact clusters",
            document_id,
            paraphrase_clusters.len(),
            exact_clusters.len()
        );

        // Form letters among the exact-band representatives. Members follow
        // their cluster's representative into the record that absorbed it.
        let groups = self.detect_form_letters(document_id, &exact_reps).await;
        relabel_members(&mut comments, &exact_clusters, &groups.label_by_text(&exact_reps));
        let form_letter_clusters = groups.cluster_count;
        stats.form_letter_clusters = form_letter_clusters;

        let mut representatives = merge_representatives(groups.records, paraphrase_reps);
        let unique = count_unique(&bands.paraphrase, form_letter_clusters, total);

        // Topics
        let mut topic_result = self
            .model_topics_with_retry(document_id, &representatives, &comments, &mut stats)
            .await;
        if let Some(result) = topic_result.as_mut() {
            result.labels = label_topics(self.services.labeler.as_ref(), &result.terms).await;
            apply_topics(&mut representatives, result, self.config.topic_terms_per_comment);
            apply_topics(&mut comments, result, self.config.topic_terms_per_comment);
        }

        // Sentiment
        for representative in representatives.iter_mut() {
            match self
                .services
                .sentiment
                .classify_sentiment(&representative.text)
                .await
            {
                Ok(label) => representative.sentiment = Some(label),
                Err(e) => warn!(
                    "Sentiment classification failed for comment {}: {}",
                    representative.id, e
                ),
            }
        }

        let (topics, search_vector) = match &topic_result {
            Some(result) => (summarize_topics(&representatives, result), result.search_vector()),
            None => (Vec::new(), Default::default()),
        };

        let rep_comments = RepComments {
            document_id: document_id.to_string(),
            plain_english_title: None,
            total_comment_count: total as u64,
            unique_comment_count: unique as u64,
            representative_comments: representatives,
            topics,
            search_vector,
            last_updated: Utc::now(),
        };

        DocumentOutcome {
            rep_comments,
            comments,
            stats,
        }
    }

    /// Clusters the exact-band representatives by embedding. With fewer than
    /// two of them, or if embedding fails, they pass through unmerged.
    async fn detect_form_letters(&self, document_id: &str, exact_reps: &[Comment]) -> FormLetterGroups {
        let form_config = FormLetterConfig {
            distance_threshold: self.config.form_letter_distance_threshold,
            form_threshold: self.config.form_letter_min_comments,
        };
        let pass_through = || -> FormLetterGroups {
            let records: Vec<Comment> = exact_reps
                .iter()
                .cloned()
                .map(|mut rep| {
                    rep.is_form_letter = rep.num_represented > form_config.form_threshold;
                    rep
                })
                .collect();
            let row_labels = records
                .iter()
                .map(|rep| rep.cluster_id.clone().unwrap_or_default())
                .collect();
            FormLetterGroups {
                records,
                cluster_count: 0,
                row_labels,
            }
        };

        if exact_reps.len() < 2 {
            return pass_through();
        }

        let texts: Vec<String> = exact_reps.iter().map(|c| c.text.clone()).collect();
        let embeddings = self
            .services
            .embedder
            .embed(&texts)
            .await
            .and_then(|vectors| embeddings_to_matrix(vectors, texts.len()));
        let embeddings = match embeddings {
            Ok(matrix) => matrix,
            Err(e) => {
                warn!(
                    "Embedding form letter candidates failed for document {}: {}",
                    document_id, e
                );
                return pass_through();
            }
        };

        // Per-document RNG; nothing is shared between concurrent documents.
        let mut rng = match self.config.form_letter_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        match find_form_letters(exact_reps, &embeddings, &form_config, &mut rng) {
            Ok(groups) => groups,
            Err(e) => {
                warn!("Form letter detection failed for document {}: {}", document_id, e);
                pass_through()
            }
        }
    }

    /// Keeps a stored title unless refreshing; otherwise writes one from the
    /// summary. Documents without a summary keep whatever they had.
    async fn resolve_title(&self, document_id: &str, context: DocumentContext) -> Option<String> {
        let DocumentContext {
            summary,
            plain_english_title,
        } = context;
        let Some(summary) = summary else {
            return plain_english_title;
        };
        if plain_english_title.is_some() && !self.config.refresh {
            return plain_english_title;
        }
        match self.services.titler.title(&summary).await {
            Ok(title) => {
                debug!("Document {} titled '{}'", document_id, title);
                Some(title)
            }
            Err(e) => {
                warn!("Titling document {} failed: {}", document_id, e);
                plain_english_title
            }
        }
    }

    /// Topic modelling on the representatives, widened once to every comment
    /// on failure. `None` when both attempts fail.
    async fn model_topics_with_retry(
        &self,
        document_id: &str,
        representatives: &[Comment],
        comments: &[Comment],
        stats: &mut DocumentStats,
    ) -> Option<TopicModelResult> {
        let mut stage = Some(TopicStage::Representative);
        while let Some(current) = stage {
            let corpus = match current {
                TopicStage::Representative => representatives,
                TopicStage::FullCorpus => comments,
            };
            stats.topic_attempts += 1;
            match model_topics(self.services.topic_model.as_ref(), corpus).await {
                Ok(result) => {
                    stats.topic_stage = Some(current);
                    return Some(result);
                }
                Err(e) => {
                    match e {
                        TopicModelError::TooFewTopics => stats.too_few_topics += 1,
                        TopicModelError::ModelFailure(_) => stats.topic_model_failures += 1,
                    }
                    warn!(
                        "Topic modelling on {:?} corpus of {} comments failed for document {}: {}",
                        current,
                        corpus.len(),
                        document_id,
                        e
                    );
                    stage = current.next();
                }
            }
        }
        warn!("No topics for document {}", document_id);
        None
    }
}

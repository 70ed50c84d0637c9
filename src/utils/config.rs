// src/utils/config.rs
use log::info;

use crate::utils::env::{env_opt, env_or};

pub const DEFAULT_NEAR_DUPLICATE_THRESHOLD: f64 = 0.99;
pub const DEFAULT_FORM_LETTER_DISTANCE_THRESHOLD: f64 = 0.025;
pub const DEFAULT_FORM_LETTER_MIN_COMMENTS: u64 = 10;
pub const DEFAULT_COMMUNITY_RESOLUTION: f64 = 1.0;
pub const DEFAULT_TOPIC_TERMS_PER_COMMENT: usize = 5;
pub const DEFAULT_MIN_DOCUMENT_COMMENTS: i64 = 20;

/// Tunables for one document's clustering and topic run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Pairs with similarity above this are near-exact duplicates.
    pub near_duplicate_threshold: f64,
    /// Cosine distance at or above which form-letter clusters stop merging.
    pub form_letter_distance_threshold: f64,
    /// A cluster is a form letter when it represents more comments than this.
    pub form_letter_min_comments: u64,
    /// Fixed seed for form-letter representative sampling. `None` draws from entropy.
    pub form_letter_seed: Option<u64>,
    pub community_resolution: f64,
    pub topic_terms_per_comment: usize,
    /// Batch selection: documents need strictly more comments than this.
    pub min_document_comments: i64,
    pub concurrency: usize,
    /// Reprocess everything, including titles stored by earlier runs. Set from the CLI.
    pub refresh: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            near_duplicate_threshold: DEFAULT_NEAR_DUPLICATE_THRESHOLD,
            form_letter_distance_threshold: DEFAULT_FORM_LETTER_DISTANCE_THRESHOLD,
            form_letter_min_comments: DEFAULT_FORM_LETTER_MIN_COMMENTS,
            form_letter_seed: None,
            community_resolution: DEFAULT_COMMUNITY_RESOLUTION,
            topic_terms_per_comment: DEFAULT_TOPIC_TERMS_PER_COMMENT,
            min_document_comments: DEFAULT_MIN_DOCUMENT_COMMENTS,
            concurrency: num_cpus::get(),
            refresh: false,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            near_duplicate_threshold: env_or(
                "NEAR_DUPLICATE_THRESHOLD",
                defaults.near_duplicate_threshold,
            ),
            form_letter_distance_threshold: env_or(
                "FORM_LETTER_DISTANCE_THRESHOLD",
                defaults.form_letter_distance_threshold,
            ),
            form_letter_min_comments: env_or(
                "FORM_LETTER_MIN_COMMENTS",
                defaults.form_letter_min_comments,
            ),
            form_letter_seed: env_opt("FORM_LETTER_SEED"),
            community_resolution: env_or("COMMUNITY_RESOLUTION", defaults.community_resolution),
            topic_terms_per_comment: env_or(
                "TOPIC_TERMS_PER_COMMENT",
                defaults.topic_terms_per_comment,
            ),
            min_document_comments: env_or(
                "MIN_DOCUMENT_COMMENTS",
                defaults.min_document_comments,
            ),
            concurrency: env_or("PIPELINE_CONCURRENCY", defaults.concurrency).max(1),
            refresh: defaults.refresh,
        }
    }

    pub fn log_config(&self) {
        info!("🧮 Comment clustering configuration:");
        info!("   Near-duplicate threshold: {}", self.near_duplicate_threshold);
        info!(
            "   Form letters: distance threshold {}, more than {} comments",
            self.form_letter_distance_threshold, self.form_letter_min_comments
        );
        match self.form_letter_seed {
            Some(seed) => info!("   Form letter sampling seed: {}", seed),
            None => info!("   Form letter sampling seed: random"),
        }
        info!("   Community resolution: {}", self.community_resolution);
        info!("   Topic terms per comment: {}", self.topic_terms_per_comment);
        info!(
            "   Documents need more than {} comments, {} processed concurrently",
            self.min_document_comments, self.concurrency
        );
    }
}

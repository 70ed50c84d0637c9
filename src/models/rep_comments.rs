// src/models/rep_comments.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::comment::Comment;

/// Aggregate view of one topic across the representative comments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSummary {
    pub topic_id: i64,
    pub label: String,
    pub terms: Vec<String>,
    /// Sentiment label -> number of representative comments carrying it.
    pub sentiment: BTreeMap<String, u64>,
    /// Sum of `num_represented` over the topic's representative comments.
    pub total_represented: u64,
}

/// Splits topic terms into search terms. Commas separate terms in the stored
/// index, so a term containing one becomes several.
pub fn search_terms<'a>(terms: impl IntoIterator<Item = &'a String>) -> BTreeSet<String> {
    terms
        .into_iter()
        .flat_map(|term| term.split(','))
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(str::to_string)
        .collect()
}

/// The per-document aggregate, recomputed on every run and upserted by `document_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepComments {
    pub document_id: String,
    /// Title written from the document summary, kept across runs unless refreshed.
    #[serde(default)]
    pub plain_english_title: Option<String>,
    pub total_comment_count: u64,
    pub unique_comment_count: u64,
    pub representative_comments: Vec<Comment>,
    pub topics: Vec<TopicSummary>,
    pub search_vector: BTreeSet<String>,
    pub last_updated: DateTime<Utc>,
}

impl RepComments {
    /// Result for a document with nothing to cluster: every comment counts as unique.
    pub fn minimal(document_id: impl Into<String>, total_comment_count: u64) -> Self {
        Self {
            document_id: document_id.into(),
            plain_english_title: None,
            total_comment_count,
            unique_comment_count: total_comment_count,
            representative_comments: Vec::new(),
            topics: Vec::new(),
            search_vector: BTreeSet::new(),
            last_updated: Utc::now(),
        }
    }

    pub fn num_representative_comments(&self) -> usize {
        self.representative_comments.len()
    }

    pub fn num_topics(&self) -> usize {
        self.topics.len()
    }

    /// Terms for the external full-text index.
    pub fn search_vector(&self) -> &BTreeSet<String> {
        &self.search_vector
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_terms_split_on_commas() {
        let terms = vec![
            "water".to_string(),
            "river, stream".to_string(),
            " wetland ".to_string(),
            ",".to_string(),
        ];
        let expected: BTreeSet<String> = ["river", "stream", "water", "wetland"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(search_terms(&terms), expected);
    }

    #[test]
    fn test_minimal_counts_everything_unique() {
        let rep = RepComments::minimal("DOC-1", 1);
        assert_eq!(rep.unique_comment_count, 1);
        assert!(rep.plain_english_title.is_none());
        assert_eq!(rep.num_representative_comments(), 0);
    }
}

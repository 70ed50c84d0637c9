// src/topics/analysis.rs

use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{search_terms, Comment, TopicSummary};
use crate::services::{Labeler, TopicModeler};
use crate::topics::{SentenceIndex, TopicAggregator, TopicAssignments, TopicModelError};

pub const UNASSIGNED_TOPIC: i64 = -1;

/// Terms in a fallback label when the labeller is unavailable.
const FALLBACK_LABEL_TERMS: usize = 3;

/// Everything learned from one successful topic modelling attempt.
#[derive(Debug, Clone, Default)]
pub struct TopicModelResult {
    pub assignments: TopicAssignments,
    /// Ranked terms per topic id, unassigned excluded.
    pub terms: BTreeMap<i64, Vec<String>>,
    pub labels: BTreeMap<i64, String>,
}

impl TopicModelResult {
    pub fn topic_of(&self, comment_id: &str) -> Option<i64> {
        self.assignments
            .get(comment_id)
            .map(|a| a.topic_id)
            .filter(|&topic| topic != UNASSIGNED_TOPIC)
    }

    /// Union of every topic's terms, for the full-text index.
    pub fn search_vector(&self) -> BTreeSet<String> {
        search_terms(self.terms.values().flatten())
    }
}

/// Splits the comments into sentences, fits the topic model and resolves one
/// topic per comment. Labels are left empty; see [`label_topics`].
pub async fn model_topics(
    modeler: &dyn TopicModeler,
    comments: &[Comment],
) -> Result<TopicModelResult, TopicModelError> {
    let index = SentenceIndex::from_comments(comments);
    if index.is_empty() {
        return Err(TopicModelError::TooFewTopics);
    }

    let fit = modeler.fit_topics(&index.sentences()).await?;
    let assignments = TopicAggregator::new(&index, &fit.topics, &fit.probabilities)?.aggregate();

    let terms: BTreeMap<i64, Vec<String>> = fit
        .terms
        .into_iter()
        .filter(|(topic, _)| *topic != UNASSIGNED_TOPIC)
        .collect();
    info!(
        "Topic model: {} sentences from {} comments -> {} topics",
        index.len(),
        comments.len(),
        terms.len()
    );

    Ok(TopicModelResult {
        assignments,
        terms,
        labels: BTreeMap::new(),
    })
}

pub fn fallback_label(topic_id: i64, terms: &[String]) -> String {
    if terms.is_empty() {
        return format!("Topic {}", topic_id);
    }
    terms
        .iter()
        .take(FALLBACK_LABEL_TERMS)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ")
}

/// Labels each topic once from its terms.
pub async fn label_topics(
    labeler: &dyn Labeler,
    terms: &BTreeMap<i64, Vec<String>>,
) -> BTreeMap<i64, String> {
    let mut labels = BTreeMap::new();
    for (&topic_id, topic_terms) in terms {
        let label = match labeler.label(topic_terms).await {
            Ok(label) if !label.is_empty() => label,
            Ok(_) => fallback_label(topic_id, topic_terms),
            Err(e) => {
                warn!("Labelling topic {} failed, using its terms: {}", topic_id, e);
                fallback_label(topic_id, topic_terms)
            }
        };
        debug!("Topic {} labelled '{}'", topic_id, label);
        labels.insert(topic_id, label);
    }
    labels
}

/// Copies topic label and the top `terms_per_comment` terms onto every
/// comment with an assigned topic.
pub fn apply_topics(comments: &mut [Comment], result: &TopicModelResult, terms_per_comment: usize) {
    for comment in comments.iter_mut() {
        let Some(topic) = result.topic_of(&comment.id) else {
            continue;
        };
        let terms = result.terms.get(&topic).cloned().unwrap_or_default();
        comment.topic_label = Some(
            result
                .labels
                .get(&topic)
                .cloned()
                .unwrap_or_else(|| fallback_label(topic, &terms)),
        );
        comment.topic_terms = terms.into_iter().take(terms_per_comment).collect();
    }
}

/// Per-topic sentiment tally and represented-comment total over the
/// representative comments. Unassigned comments are left out.
pub fn summarize_topics(representatives: &[Comment], result: &TopicModelResult) -> Vec<TopicSummary> {
    let mut summaries: BTreeMap<i64, TopicSummary> = BTreeMap::new();
    for comment in representatives {
        let Some(topic) = result.topic_of(&comment.id) else {
            continue;
        };
        let summary = summaries.entry(topic).or_insert_with(|| {
            let terms = result.terms.get(&topic).cloned().unwrap_or_default();
            TopicSummary {
                topic_id: topic,
                label: result
                    .labels
                    .get(&topic)
                    .cloned()
                    .unwrap_or_else(|| fallback_label(topic, &terms)),
                terms,
                sentiment: BTreeMap::new(),
                total_represented: 0,
            }
        });
        if let Some(sentiment) = &comment.sentiment {
            *summary.sentiment.entry(sentiment.clone()).or_insert(0) += 1;
        }
        summary.total_represented += comment.num_represented;
    }
    summaries.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{ServiceError, TopicFit};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct KeywordTopics;

    #[async_trait]
    impl TopicModeler for KeywordTopics {
        async fn fit_topics(&self, sentences: &[String]) -> Result<TopicFit, TopicModelError> {
            let topics = sentences
                .iter()
                .map(|s| {
                    if s.contains("water") {
                        0
                    } else if s.contains("jobs") {
                        1
                    } else {
                        -1
                    }
                })
                .collect();
            let mut terms = HashMap::new();
            terms.insert(-1, Vec::new());
            terms.insert(0, vec!["water".into(), "river".into(), "wetland".into(), "fish".into()]);
            terms.insert(1, vec!["jobs".into(), "wages".into()]);
            Ok(TopicFit {
                topics,
                probabilities: vec![0.9; sentences.len()],
                terms,
            })
        }
    }

    struct BrokenLabeler;

    #[async_trait]
    impl Labeler for BrokenLabeler {
        async fn label(&self, _terms: &[String]) -> Result<String, ServiceError> {
            Err(ServiceError::InvalidResponse("offline".into()))
        }
    }

    fn comments() -> Vec<Comment> {
        let mut list = vec![
            Comment::new("1", "DOC", "Clean water now. The river is dying."),
            Comment::new("2", "DOC", "Think of the jobs."),
            Comment::new("3", "DOC", "No opinion."),
        ];
        list[0].num_represented = 12;
        list[0].sentiment = Some("negative".into());
        list[1].num_represented = 3;
        list[1].sentiment = Some("positive".into());
        list
    }

    #[tokio::test]
    async fn test_model_label_apply_and_summarize() {
        let mut comments = comments();
        let mut result = model_topics(&KeywordTopics, &comments).await.unwrap();
        result.labels = label_topics(&BrokenLabeler, &result.terms).await;
        assert_eq!(result.labels[&0], "water, river, wetland");
        assert_eq!(result.labels[&1], "jobs, wages");
        assert!(!result.terms.contains_key(&UNASSIGNED_TOPIC));

        apply_topics(&mut comments, &result, 2);
        assert_eq!(comments[0].topic_label.as_deref(), Some("water, river, wetland"));
        assert_eq!(comments[0].topic_terms, vec!["water".to_string(), "river".to_string()]);
        assert_eq!(comments[1].topic_label.as_deref(), Some("jobs, wages"));
        assert!(comments[2].topic_label.is_none());

        let summaries = summarize_topics(&comments, &result);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].topic_id, 0);
        assert_eq!(summaries[0].total_represented, 12);
        assert_eq!(summaries[0].sentiment.get("negative"), Some(&1));
        assert_eq!(summaries[1].total_represented, 3);

        let vector = result.search_vector();
        assert!(vector.contains("wetland") && vector.contains("wages"));
        assert_eq!(vector.len(), 6);
    }

    #[tokio::test]
    async fn test_no_sentences_is_too_few_topics() {
        let comments = vec![Comment::new("1", "DOC", "!!!")];
        assert_eq!(
            model_topics(&KeywordTopics, &comments).await.err(),
            Some(TopicModelError::TooFewTopics)
        );
    }
}

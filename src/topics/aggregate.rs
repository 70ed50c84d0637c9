// src/topics/aggregate.rs

use log::debug;
use std::collections::HashMap;

use crate::models::Comment;
use crate::topics::TopicModelError;
use crate::utils::text::{clean_comment, split_sentences};

/// Distinct sentences in first-seen order, each with the ids of every comment
/// that produced it.
#[derive(Debug, Clone, Default)]
pub struct SentenceIndex {
    sentences: Vec<(String, Vec<String>)>,
    position: HashMap<String, usize>,
}

impl SentenceIndex {
    pub fn insert(&mut self, sentence: impl Into<String>, comment_id: impl Into<String>) {
        let sentence = sentence.into();
        let comment_id = comment_id.into();
        match self.position.get(&sentence) {
            Some(&slot) => {
                let ids = &mut self.sentences[slot].1;
                if !ids.contains(&comment_id) {
                    ids.push(comment_id);
                }
            }
            None => {
                self.position.insert(sentence.clone(), self.sentences.len());
                self.sentences.push((sentence, vec![comment_id]));
            }
        }
    }

    /// Cleans and splits every comment into sentences.
    pub fn from_comments(comments: &[Comment]) -> Self {
        let mut index = Self::default();
        for comment in comments {
            for sentence in split_sentences(&clean_comment(&comment.text)) {
                index.insert(sentence, comment.id.clone());
            }
        }
        debug!(
            "Indexed {} distinct sentences from {} comments",
            index.len(),
            comments.len()
        );
        index
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    /// Sentence texts in index order, as sent to the topic model.
    pub fn sentences(&self) -> Vec<String> {
        self.sentences.iter().map(|(s, _)| s.clone()).collect()
    }

    fn iter(&self) -> impl Iterator<Item = &(String, Vec<String>)> {
        self.sentences.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopicAssignment {
    pub topic_id: i64,
    /// Probability mass accumulated for the winning topic.
    pub probability: f64,
}

/// One topic per comment id, in the order comments were first seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopicAssignments {
    order: Vec<String>,
    by_comment: HashMap<String, TopicAssignment>,
}

impl TopicAssignments {
    pub fn get(&self, comment_id: &str) -> Option<&TopicAssignment> {
        self.by_comment.get(comment_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TopicAssignment)> {
        self.order
            .iter()
            .filter_map(|id| self.by_comment.get(id).map(|a| (id.as_str(), a)))
    }
}

/// Resolves sentence-level topic output into one topic per comment.
pub struct TopicAggregator<'a> {
    index: &'a SentenceIndex,
    topics: &'a [i64],
    probabilities: &'a [f64],
}

impl<'a> TopicAggregator<'a> {
    /// `topics` and `probabilities` run parallel to `index.sentences()`.
    pub fn new(
        index: &'a SentenceIndex,
        topics: &'a [i64],
        probabilities: &'a [f64],
    ) -> Result<Self, TopicModelError> {
        if topics.len() != index.len() || probabilities.len() != index.len() {
            return Err(TopicModelError::ModelFailure(format!(
                "topic model returned {} topics and {} probabilities for {} sentences",
                topics.len(),
                probabilities.len(),
                index.len()
            )));
        }
        match topics.iter().max() {
            Some(&max) if max >= 0 => Ok(Self {
                index,
                topics,
                probabilities,
            }),
            _ => Err(TopicModelError::TooFewTopics),
        }
    }

    /// Sums probability per (comment, topic) over all sentences and keeps the
    /// topic with the largest sum. Ties go to the topic first seen for that
    /// comment.
    pub fn aggregate(&self) -> TopicAssignments {
        let mut order: Vec<String> = Vec::new();
        let mut sums: HashMap<String, Vec<(i64, f64)>> = HashMap::new();

        for (slot, (_, comment_ids)) in self.index.iter().enumerate() {
            let topic = self.topics[slot];
            let probability = self.probabilities[slot];
            for comment_id in comment_ids {
                let per_topic = sums.entry(comment_id.clone()).or_insert_with(|| {
                    order.push(comment_id.clone());
                    Vec::new()
                });
                match per_topic.iter_mut().find(|(t, _)| *t == topic) {
                    Some((_, total)) => *total += probability,
                    None => per_topic.push((topic, probability)),
                }
            }
        }

        let mut by_comment = HashMap::with_capacity(sums.len());
        for (comment_id, per_topic) in sums {
            let mut best: Option<TopicAssignment> = None;
            for (topic_id, probability) in per_topic {
                if best.map_or(true, |b| probability > b.probability) {
                    best = Some(TopicAssignment {
                        topic_id,
                        probability,
                    });
                }
            }
            if let Some(assignment) = best {
                by_comment.insert(comment_id, assignment);
            }
        }

        TopicAssignments { order, by_comment }
    }
}

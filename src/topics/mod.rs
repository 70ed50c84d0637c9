// src/topics/mod.rs
pub mod aggregate;
pub mod analysis;

use thiserror::Error;

pub use aggregate::{SentenceIndex, TopicAggregator, TopicAssignment, TopicAssignments};
pub use analysis::{TopicModelResult, UNASSIGNED_TOPIC};

/// Why a topic modelling attempt produced nothing usable. Both variants
/// trigger the same widening retry; they are kept apart for logging.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TopicModelError {
    #[error("topic model failed: {0}")]
    ModelFailure(String),
    #[error("topic model found too few topics")]
    TooFewTopics,
}

// src/pipeline/mod.rs
pub mod orchestrator;

pub use orchestrator::{DocumentOutcome, DocumentStats, PipelineOrchestrator, TopicStage};

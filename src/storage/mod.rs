// src/storage/mod.rs
pub mod db;

use anyhow::Result;
use async_trait::async_trait;
use log::debug;

use crate::models::{Comment, RepComments};
use crate::utils::text::is_attachment_placeholder;

pub use db::{NlpOutputRow, PgCommentRepository};

/// Share of a document's comments that must be new before an incremental run
/// reprocesses it.
pub const INCREMENTAL_NEW_COMMENT_SHARE: f64 = 0.1;

/// What is already known about a document before its comments are analysed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentContext {
    /// The document's published summary.
    pub summary: Option<String>,
    /// Title stored by an earlier run.
    pub plain_english_title: Option<String>,
}

/// Where comments come from and where document aggregates go.
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Comments of one document, ordered by id, without attachment placeholders.
    async fn fetch_comments(&self, document_id: &str) -> Result<Vec<Comment>>;

    async fn fetch_document_context(&self, document_id: &str) -> Result<DocumentContext>;

    /// Documents with more than `min_comments` comments. Unless `refresh`,
    /// only documents that gained enough new comments since the last run.
    async fn documents_to_update(&self, refresh: bool, min_comments: i64) -> Result<Vec<String>>;

    /// Writes the aggregate, replacing an older one for the same document.
    async fn upsert_rep_comments(&self, rep_comments: &RepComments) -> Result<()>;

    async fn fetch_rep_comments(&self, document_id: &str) -> Result<Option<RepComments>>;
}

/// Drops comments whose whole body is an attachment pointer.
pub fn drop_attachment_placeholders(comments: Vec<Comment>) -> Vec<Comment> {
    let before = comments.len();
    let kept: Vec<Comment> = comments
        .into_iter()
        .filter(|c| !is_attachment_placeholder(&c.text))
        .collect();
    if kept.len() != before {
        debug!("Dropped {} attachment-only comments", before - kept.len());
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_attachment_placeholders() {
        let comments = vec![
            Comment::new("1", "DOC", "See attached file(s)"),
            Comment::new("2", "DOC", "I support the rule."),
            Comment::new("3", "DOC", "please see attached."),
        ];
        let kept = drop_attachment_placeholders(comments);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "2");
    }
}

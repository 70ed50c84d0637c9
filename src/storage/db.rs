// src/storage/db.rs

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::BTreeSet;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;

use crate::models::{search_terms, Comment, RepComments, TopicSummary};
use crate::storage::{
    drop_attachment_placeholders, CommentRepository, DocumentContext, INCREMENTAL_NEW_COMMENT_SHARE,
};
use crate::utils::db_connect::PgPool;

const SEARCH_TOPICS_SEPARATOR: &str = ", ";

/// Column form of a document aggregate in `regulations_nlpoutput`.
#[derive(Debug, Clone, PartialEq)]
pub struct NlpOutputRow {
    pub document_id: String,
    pub doc_plain_english_title: Option<String>,
    pub comments: serde_json::Value,
    pub num_total_comments: i32,
    pub num_unique_comments: i32,
    pub num_representative_comment: i32,
    pub topics: serde_json::Value,
    pub num_topics: i32,
    pub last_updated: DateTime<Utc>,
    pub search_topics: String,
}

fn to_i32(value: u64, column: &str) -> Result<i32> {
    i32::try_from(value).with_context(|| format!("{} value {} does not fit the column", column, value))
}

impl TryFrom<&RepComments> for NlpOutputRow {
    type Error = anyhow::Error;

    fn try_from(rep: &RepComments) -> Result<Self> {
        Ok(Self {
            document_id: rep.document_id.clone(),
            doc_plain_english_title: rep.plain_english_title.clone(),
            comments: serde_json::to_value(&rep.representative_comments)
                .context("Failed to serialize representative comments")?,
            num_total_comments: to_i32(rep.total_comment_count, "num_total_comments")?,
            num_unique_comments: to_i32(rep.unique_comment_count, "num_unique_comments")?,
            num_representative_comment: to_i32(
                rep.num_representative_comments() as u64,
                "num_representative_comment",
            )?,
            topics: serde_json::to_value(&rep.topics).context("Failed to serialize topics")?,
            num_topics: to_i32(rep.num_topics() as u64, "num_topics")?,
            last_updated: rep.last_updated,
            search_topics: search_terms(&rep.search_vector)
                .into_iter()
                .collect::<Vec<_>>()
                .join(SEARCH_TOPICS_SEPARATOR),
        })
    }
}

impl TryFrom<NlpOutputRow> for RepComments {
    type Error = anyhow::Error;

    fn try_from(row: NlpOutputRow) -> Result<Self> {
        let representative_comments: Vec<Comment> = if row.comments.is_null() {
            Vec::new()
        } else {
            serde_json::from_value(row.comments).context("Failed to parse stored comments")?
        };
        let topics: Vec<TopicSummary> = if row.topics.is_null() {
            Vec::new()
        } else {
            serde_json::from_value(row.topics).context("Failed to parse stored topics")?
        };
        let search_vector: BTreeSet<String> = row
            .search_topics
            .split(SEARCH_TOPICS_SEPARATOR)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            document_id: row.document_id,
            plain_english_title: row.doc_plain_english_title,
            total_comment_count: row.num_total_comments.max(0) as u64,
            unique_comment_count: row.num_unique_comments.max(0) as u64,
            representative_comments,
            topics,
            search_vector,
            last_updated: row.last_updated,
        })
    }
}

impl NlpOutputRow {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            document_id: row.try_get("document_id")?,
            doc_plain_english_title: row.try_get("doc_plain_english_title")?,
            comments: row
                .try_get::<_, Option<serde_json::Value>>("comments")?
                .unwrap_or(serde_json::Value::Null),
            num_total_comments: row.try_get("num_total_comments")?,
            num_unique_comments: row.try_get("num_unique_comments")?,
            num_representative_comment: row.try_get("num_representative_comment")?,
            topics: row
                .try_get::<_, Option<serde_json::Value>>("topics")?
                .unwrap_or(serde_json::Value::Null),
            num_topics: row.try_get("num_topics")?,
            last_updated: row
                .try_get::<_, Option<DateTime<Utc>>>("last_updated")?
                .unwrap_or_default(),
            search_topics: row
                .try_get::<_, Option<String>>("search_topics")?
                .unwrap_or_default(),
        })
    }
}

/// Comment and aggregate storage on the regulations database.
pub struct PgCommentRepository {
    pool: PgPool,
}

impl PgCommentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Oldest aggregate timestamp, the cut-off for "new" comments.
    async fn oldest_update(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.pool.get().await.context("Failed to get DB connection")?;
        let row = conn
            .query_one(
                "SELECT MIN(last_updated) AS last_updated FROM regulations_nlpoutput",
                &[],
            )
            .await
            .context("Failed to query last NLP update")?;
        Ok(row.get("last_updated"))
    }
}

#[async_trait]
impl CommentRepository for PgCommentRepository {
    async fn fetch_comments(&self, document_id: &str) -> Result<Vec<Comment>> {
        let conn = self.pool.get().await.context("Failed to get DB connection")?;
        let rows = conn
            .query(
                "SELECT id, document_id, comment
                 FROM regulations_comment
                 WHERE document_id = $1
                 ORDER BY id",
                &[&document_id],
            )
            .await
            .with_context(|| format!("Failed to fetch comments for document {}", document_id))?;

        let mut comments = Vec::with_capacity(rows.len());
        for row in rows {
            let text: Option<String> = row.get("comment");
            match text {
                Some(text) => comments.push(Comment::new(
                    row.get::<_, String>("id"),
                    row.get::<_, String>("document_id"),
                    text,
                )),
                None => debug!("Skipping comment {} without text", row.get::<_, String>("id")),
            }
        }
        Ok(drop_attachment_placeholders(comments))
    }

    async fn fetch_document_context(&self, document_id: &str) -> Result<DocumentContext> {
        let conn = self.pool.get().await.context("Failed to get DB connection")?;
        let summary: Option<String> = conn
            .query_opt(
                "SELECT summary FROM regulations_document WHERE id = $1",
                &[&document_id],
            )
            .await
            .with_context(|| format!("Failed to fetch summary for document {}", document_id))?
            .and_then(|row| row.get("summary"));
        let plain_english_title: Option<String> = conn
            .query_opt(
                "SELECT doc_plain_english_title
                 FROM regulations_nlpoutput
                 WHERE document_id = $1",
                &[&document_id],
            )
            .await
            .with_context(|| format!("Failed to fetch title for document {}", document_id))?
            .and_then(|row| row.get("doc_plain_english_title"));

        Ok(DocumentContext {
            summary: summary.filter(|s| !s.trim().is_empty()),
            plain_english_title,
        })
    }

    async fn documents_to_update(&self, refresh: bool, min_comments: i64) -> Result<Vec<String>> {
        let since = if refresh { None } else { self.oldest_update().await? };
        let conn = self.pool.get().await.context("Failed to get DB connection")?;

        let rows = match since {
            Some(since) => {
                info!("Selecting documents with new comments since {}", since);
                let params: Vec<&(dyn ToSql + Sync)> =
                    vec![&since, &min_comments, &INCREMENTAL_NEW_COMMENT_SHARE];
                conn.query(
                    "SELECT document_id
                     FROM regulations_comment rc1
                     WHERE posted_date >= $1
                     GROUP BY document_id
                     HAVING COUNT(*) > $2
                     AND COUNT(*) >= $3::float8 * (
                         SELECT COUNT(*)
                         FROM regulations_comment rc2
                         WHERE rc2.document_id = rc1.document_id
                     )
                     ORDER BY document_id",
                    &params[..],
                )
                .await
                .context("Failed to select documents with new comments")?
            }
            None => conn
                .query(
                    "SELECT document_id
                     FROM regulations_comment
                     GROUP BY document_id
                     HAVING COUNT(*) > $1
                     ORDER BY document_id",
                    &[&min_comments],
                )
                .await
                .context("Failed to select documents")?,
        };

        Ok(rows.iter().map(|row| row.get("document_id")).collect())
    }

    async fn upsert_rep_comments(&self, rep_comments: &RepComments) -> Result<()> {
        let row = NlpOutputRow::try_from(rep_comments)?;
        let conn = self.pool.get().await.context("Failed to get DB connection")?;

        let params: Vec<Box<dyn ToSql + Sync + Send>> = vec![
            Box::new(row.doc_plain_english_title),
            Box::new(row.comments),
            Box::new(row.num_total_comments),
            Box::new(row.num_unique_comments),
            Box::new(row.num_representative_comment),
            Box::new(row.topics),
            Box::new(row.num_topics),
            Box::new(row.last_updated),
            Box::new(row.search_topics),
            Box::new(row.document_id.clone()),
        ];
        let params_slice: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|b| b.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let updated = conn
            .execute(
                "INSERT INTO regulations_nlpoutput (
                     doc_plain_english_title, comments, num_total_comments,
                     num_unique_comments, num_representative_comment, topics,
                     num_topics, last_updated, created_at, search_topics, document_id)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), $9, $10)
                 ON CONFLICT (document_id) DO UPDATE SET
                     doc_plain_english_title = EXCLUDED.doc_plain_english_title,
                     comments = EXCLUDED.comments,
                     num_total_comments = EXCLUDED.num_total_comments,
                     num_unique_comments = EXCLUDED.num_unique_comments,
                     num_representative_comment = EXCLUDED.num_representative_comment,
                     topics = EXCLUDED.topics,
                     num_topics = EXCLUDED.num_topics,
                     last_updated = EXCLUDED.last_updated,
                     search_topics = EXCLUDED.search_topics
                 WHERE regulations_nlpoutput.last_updated < EXCLUDED.last_updated
                    OR regulations_nlpoutput.last_updated IS NULL",
                &params_slice[..],
            )
            .await
            .with_context(|| format!("Failed to upsert NLP output for document {}", row.document_id))?;

        if updated == 0 {
            warn!(
                "NLP output for document {} not written: stored result is newer",
                row.document_id
            );
        }
        Ok(())
    }

    async fn fetch_rep_comments(&self, document_id: &str) -> Result<Option<RepComments>> {
        let conn = self.pool.get().await.context("Failed to get DB connection")?;
        let row = conn
            .query_opt(
                "SELECT document_id, doc_plain_english_title, comments,
                        num_total_comments, num_unique_comments,
                        num_representative_comment, topics, num_topics, last_updated,
                        search_topics
                 FROM regulations_nlpoutput
                 WHERE document_id = $1",
                &[&document_id],
            )
            .await
            .with_context(|| format!("Failed to read NLP output for document {}", document_id))?;

        row.map(|row| NlpOutputRow::from_row(&row).and_then(RepComments::try_from))
            .transpose()
    }
}

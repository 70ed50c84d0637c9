// src/models/comment.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a comment record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentSource {
    /// A comment as submitted on the document.
    Comment,
    /// A record standing in for a cluster of comments.
    Summary,
}

/// A public comment, or a representative record standing in for many.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub document_id: String,
    pub text: String,
    pub cluster_id: Option<String>,
    pub topic_label: Option<String>,
    #[serde(default)]
    pub topic_terms: Vec<String>,
    pub sentiment: Option<String>,
    pub num_represented: u64,
    pub is_form_letter: bool,
    pub is_representative: bool,
    pub source: CommentSource,
}

impl Comment {
    /// A raw comment as fetched from storage.
    pub fn new(
        id: impl Into<String>,
        document_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            document_id: document_id.into(),
            text: text.into(),
            cluster_id: None,
            topic_label: None,
            topic_terms: Vec::new(),
            sentiment: None,
            num_represented: 1,
            is_form_letter: false,
            is_representative: false,
            source: CommentSource::Comment,
        }
    }

    /// Copies this comment into a representative record for `cluster_label`.
    pub fn as_representative(
        &self,
        cluster_label: String,
        num_represented: u64,
        is_form_letter: bool,
    ) -> Self {
        Self {
            id: self.id.clone(),
            document_id: self.document_id.clone(),
            text: self.text.clone(),
            cluster_id: Some(cluster_label),
            topic_label: None,
            topic_terms: Vec::new(),
            sentiment: None,
            num_represented,
            is_form_letter,
            is_representative: true,
            source: CommentSource::Summary,
        }
    }
}

/// Which clustering pass produced a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterKind {
    Paraphrase,
    FormLetter,
}

impl ClusterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterKind::Paraphrase => "paraphrase",
            ClusterKind::FormLetter => "form-letter",
        }
    }
}

impl fmt::Display for ClusterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of comment indices grouped by one clustering pass.
/// Indices are local to the document's comment list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub id: usize,
    pub kind: ClusterKind,
    /// Member comment indices in ascending order.
    pub members: Vec<usize>,
    /// Member standing in for the cluster, once selected.
    pub representative: Option<usize>,
}

impl Cluster {
    pub fn new(id: usize, kind: ClusterKind, members: impl IntoIterator<Item = usize>) -> Self {
        let mut members: Vec<usize> = members.into_iter().collect();
        members.sort_unstable();
        members.dedup();
        Self {
            id,
            kind,
            members,
            representative: None,
        }
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }

    /// Label stored on member comments, e.g. `paraphrase-3`.
    pub fn label(&self) -> String {
        format!("{}-{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_members_sorted_and_unique() {
        let cluster = Cluster::new(2, ClusterKind::FormLetter, vec![9, 3, 3, 1]);
        assert_eq!(cluster.members, vec![1, 3, 9]);
        assert_eq!(cluster.size(), 3);
        assert_eq!(cluster.label(), "form-letter-2");
        assert!(cluster.representative.is_none());
        assert!(!cluster.is_singleton());
        assert!(Cluster::new(0, ClusterKind::Paraphrase, [4]).is_singleton());
    }

    #[test]
    fn test_representative_copy() {
        let raw = Comment::new("c-1", "DOC-1", "Protect the wetlands.");
        let rep = raw.as_representative("paraphrase-0".to_string(), 12, true);
        assert_eq!(rep.id, "c-1");
        assert_eq!(rep.num_represented, 12);
        assert!(rep.is_form_letter && rep.is_representative);
        assert_eq!(rep.source, CommentSource::Summary);
        assert_eq!(raw.source, CommentSource::Comment);
        assert_eq!(raw.num_represented, 1);
    }
}

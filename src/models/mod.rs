pub mod comment;
pub mod rep_comments;

pub use comment::{Cluster, ClusterKind, Comment, CommentSource};
pub use rep_comments::{search_terms, RepComments, TopicSummary};

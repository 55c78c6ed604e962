//! # Domain Models
//!
//! Posts and their threaded comments. Identities are plain integers handed
//! out by the backend in insertion order, starting at 0.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::path;

pub type PostId = i64;
pub type CommentId = i64;

/// A post owned by its author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author_id: Uuid,
    pub title: String,
    pub text: String,
    /// Only the author may flip this flag
    pub comments_enabled: bool,
    pub create_date: DateTime<Utc>,
}

/// A comment on a post, possibly replying to another comment of that post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub author_id: Uuid,
    pub post_id: PostId,
    /// `None` for root comments
    pub parent_id: Option<CommentId>,
    pub text: String,
    /// Materialized ancestry: `post_id[.ancestor_id]*`, fixed at insertion.
    pub path: String,
    pub create_date: DateTime<Utc>,
}

impl Comment {
    /// Number of ancestor comments encoded in the path (0 for root comments).
    pub fn depth(&self) -> u32 {
        path::depth(&self.path)
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Caller-supplied fields of a new post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub author_id: Uuid,
    pub title: String,
    pub text: String,
    pub comments_enabled: bool,
}

/// Caller-supplied fields of a new comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComment {
    pub author_id: Uuid,
    pub post_id: PostId,
    pub parent_id: Option<CommentId>,
    pub text: String,
}

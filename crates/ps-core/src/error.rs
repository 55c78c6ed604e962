//! # AppError
//!
//! Centralized error handling for the posts storage core.
//! Every failure kind an accessor can produce is its own variant so callers
//! can map them (not found, forbidden, ...) without string matching.

use thiserror::Error;
use uuid::Uuid;

use crate::models::{CommentId, PostId};

/// The primary error type for all ps-core operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Referenced resource does not exist (e.g., Post, Comment, parent Comment)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Caller is not the author of record
    #[error("forbidden: user {author_id} is not the author of post {post_id}")]
    Forbidden { post_id: PostId, author_id: Uuid },

    /// Comment insertion on a post with comments turned off
    #[error("comments on post {0} are disabled")]
    CommentsDisabled(PostId),

    /// Comment text exceeds the configured bound (in UTF-8 code units)
    #[error("comment text is too long: {len} > {max}")]
    TextTooLong { len: usize, max: usize },

    /// Cursor failed base64 decoding or digit validation
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    /// The operation context was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// Storage engine failure (e.g., query error, pool closed)
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl AppError {
    pub fn post_not_found(post_id: PostId) -> Self {
        AppError::NotFound("Post".to_string(), post_id.to_string())
    }

    pub fn comment_not_found(comment_id: CommentId) -> Self {
        AppError::NotFound("Comment".to_string(), comment_id.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(..))
    }
}

/// A specialized Result type for posts storage logic.
pub type Result<T> = std::result::Result<T, AppError>;

//! # Core Traits (Ports)
//!
//! Every storage plugin implements [`Accessor`]. Callers hold it as a trait
//! object and must not care which backend is behind it.

use async_trait::async_trait;
use uuid::Uuid;

use crate::context::Context;
use crate::error::Result;
use crate::models::{Comment, CommentId, NewComment, NewPost, Post, PostId};

/// Storage contract for posts and threaded comments.
///
/// All methods return `AppError::Cancelled` if `ctx` is already cancelled on
/// entry.
#[async_trait]
pub trait Accessor: Send + Sync {
    // Post Operations

    /// Stores a new post, assigning its id and creation date.
    async fn add_post(&self, ctx: &Context, new_post: NewPost) -> Result<Post>;
    async fn get_post(&self, ctx: &Context, post_id: PostId) -> Result<Post>;
    async fn get_all_posts(&self, ctx: &Context) -> Result<Vec<Post>>;

    /// Fails with `NotFound` for an unknown post and `Forbidden` if
    /// `author_id` did not write it; nothing is changed in either case.
    async fn update_comments_enabled(
        &self,
        ctx: &Context,
        post_id: PostId,
        author_id: Uuid,
        comments_enabled: bool,
    ) -> Result<Post>;

    // Comment Operations

    /// Checks, in order: post exists, comments enabled, text length, parent
    /// exists on the same post.
    async fn add_comment(&self, ctx: &Context, new_comment: NewComment) -> Result<Comment>;

    /// Path a new comment with this parent would be stored under.
    async fn get_comment_path(
        &self,
        ctx: &Context,
        post_id: PostId,
        parent_id: Option<CommentId>,
    ) -> Result<String>;

    /// Comments whose stored path equals `path` exactly, oldest first.
    /// Deeper replies are not included.
    async fn get_comments_level(
        &self,
        ctx: &Context,
        post_id: PostId,
        path: &str,
    ) -> Result<Vec<Comment>>;

    // Lifecycle

    /// Releases backend resources. Later calls on this accessor fail.
    async fn close_storage(&self);
}

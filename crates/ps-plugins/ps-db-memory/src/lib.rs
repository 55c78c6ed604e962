//! # ps-db-memory
//!
//! In-process implementation of `Accessor`, for tests and memory-mode
//! deployments. Nothing survives the process.
//!
//! All state lives in one [`SafeMap`] keyed by post id. Each entry is a
//! [`PostThread`] holding the post together with its comment indices, so
//! inserting a comment (validate post, resolve parent, append to the path
//! bucket, record the comment) happens under a single write lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use ps_core::error::{AppError, Result};
use ps_core::models::{Comment, CommentId, NewComment, NewPost, Post, PostId};
use ps_core::path::{self, ParentEntry, ParentIndex};
use ps_core::{Accessor, Context, KeyValueStore, SafeMap};
use uuid::Uuid;

/// A post plus everything indexed under it.
#[derive(Debug, Clone)]
struct PostThread {
    post: Post,
    /// Comment by id; the stored comment doubles as the id -> path index.
    comments: HashMap<CommentId, Comment>,
    /// Path -> ids of the comments stored under it, in insertion order.
    by_path: HashMap<String, Vec<CommentId>>,
}

impl PostThread {
    fn new(post: Post) -> Self {
        Self {
            post,
            comments: HashMap::new(),
            by_path: HashMap::new(),
        }
    }

    fn level(&self, path: &str) -> Vec<Comment> {
        self.by_path
            .get(path)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.comments.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl ParentIndex for PostThread {
    fn lookup_parent(&self, parent_id: CommentId) -> Option<ParentEntry> {
        self.comments.get(&parent_id).map(|parent| ParentEntry {
            post_id: parent.post_id,
            path: Some(parent.path.clone()),
        })
    }
}

pub struct MemoryAccessor {
    threads: SafeMap<PostId, PostThread>,
    last_post_id: AtomicI64,
    last_comment_id: AtomicI64,
    closed: AtomicBool,
}

impl Default for MemoryAccessor {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAccessor {
    pub fn new() -> Self {
        Self {
            threads: SafeMap::new(),
            last_post_id: AtomicI64::new(-1),
            last_comment_id: AtomicI64::new(-1),
            closed: AtomicBool::new(false),
        }
    }

    fn enter(&self, ctx: &Context) -> Result<()> {
        ctx.check()?;
        if self.closed.load(Ordering::Acquire) {
            return Err(AppError::Backend("storage is closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Accessor for MemoryAccessor {
    async fn add_post(&self, ctx: &Context, new_post: NewPost) -> Result<Post> {
        self.enter(ctx)?;

        let post = Post {
            id: self.last_post_id.fetch_add(1, Ordering::SeqCst) + 1,
            author_id: new_post.author_id,
            title: new_post.title,
            text: new_post.text,
            comments_enabled: new_post.comments_enabled,
            create_date: Utc::now(),
        };
        self.threads.set(post.id, PostThread::new(post.clone()));

        log::debug!("created post {}", post.id);
        Ok(post)
    }

    async fn get_post(&self, ctx: &Context, post_id: PostId) -> Result<Post> {
        self.enter(ctx)?;
        self.threads
            .read(&post_id, |thread| thread.post.clone())
            .ok_or_else(|| AppError::post_not_found(post_id))
    }

    async fn get_all_posts(&self, ctx: &Context) -> Result<Vec<Post>> {
        self.enter(ctx)?;
        let mut posts: Vec<Post> = self
            .threads
            .inspect(|threads| threads.values().map(|t| t.post.clone()).collect());
        posts.sort_by_key(|post| post.id);
        Ok(posts)
    }

    async fn update_comments_enabled(
        &self,
        ctx: &Context,
        post_id: PostId,
        author_id: Uuid,
        comments_enabled: bool,
    ) -> Result<Post> {
        self.enter(ctx)?;
        self.threads
            .update(&post_id, |thread| {
                if thread.post.author_id != author_id {
                    return Err(AppError::Forbidden { post_id, author_id });
                }
                thread.post.comments_enabled = comments_enabled;
                Ok(thread.post.clone())
            })
            .unwrap_or_else(|| Err(AppError::post_not_found(post_id)))
    }

    async fn add_comment(&self, ctx: &Context, new_comment: NewComment) -> Result<Comment> {
        self.enter(ctx)?;
        let post_id = new_comment.post_id;

        let comment = self
            .threads
            .update(&post_id, |thread| {
                if !thread.post.comments_enabled {
                    return Err(AppError::CommentsDisabled(post_id));
                }
                path::validate_text(&new_comment.text)?;
                let path = path::comment_path(&*thread, post_id, new_comment.parent_id)?;

                // Ids are only handed out once every check passed, under the
                // write lock, so they follow insertion order.
                let comment = Comment {
                    id: self.last_comment_id.fetch_add(1, Ordering::SeqCst) + 1,
                    author_id: new_comment.author_id,
                    post_id,
                    parent_id: new_comment.parent_id,
                    text: new_comment.text,
                    path,
                    create_date: Utc::now(),
                };
                thread
                    .by_path
                    .entry(comment.path.clone())
                    .or_default()
                    .push(comment.id);
                thread.comments.insert(comment.id, comment.clone());
                Ok(comment)
            })
            .unwrap_or_else(|| Err(AppError::post_not_found(post_id)))
            .inspect_err(|e| log::debug!("rejected comment on post {post_id}: {e}"))?;

        log::debug!("created comment {} at {}", comment.id, comment.path);
        Ok(comment)
    }

    async fn get_comment_path(
        &self,
        ctx: &Context,
        post_id: PostId,
        parent_id: Option<CommentId>,
    ) -> Result<String> {
        self.enter(ctx)?;
        self.threads
            .read(&post_id, |thread| path::comment_path(thread, post_id, parent_id))
            .unwrap_or_else(|| Err(AppError::post_not_found(post_id)))
    }

    async fn get_comments_level(
        &self,
        ctx: &Context,
        post_id: PostId,
        path: &str,
    ) -> Result<Vec<Comment>> {
        self.enter(ctx)?;
        self.threads
            .read(&post_id, |thread| thread.level(path))
            .ok_or_else(|| AppError::post_not_found(post_id))
    }

    async fn close_storage(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

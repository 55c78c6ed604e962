//! # ps-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational model
//! and the `ps-core` domain models.
//!
//! Ids are assigned inside the INSERT statement (`MAX + 1`, starting at 0),
//! so a fresh database hands out the same ids as the in-memory plugin.

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ps_core::error::{AppError, Result};
use ps_core::models::{Comment, CommentId, NewComment, NewPost, Post, PostId};
use ps_core::path::{self, ParentEntry, ParentIndex};
use ps_core::{Accessor, Context};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Executor, Row, Sqlite};
use uuid::Uuid;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

pub struct SqliteAccessor {
    pool: SqlitePool,
}

// Helper for UUID conversion
fn uuid_to_blob(id: Uuid) -> Vec<u8> {
    id.as_bytes().to_vec()
}

fn blob_to_uuid(blob: &[u8]) -> Result<Uuid> {
    Uuid::from_slice(blob).map_err(|e| AppError::Backend(format!("malformed author_id: {e}")))
}

fn backend(e: impl std::fmt::Display) -> AppError {
    log::warn!("sqlite error: {e}");
    AppError::Backend(e.to_string())
}

/// Awaits a statement unless `ctx` is cancelled first.
async fn run<T, F>(ctx: &Context, statement: F) -> Result<T>
where
    F: Future<Output = sqlx::Result<T>>,
{
    ctx.run(statement).await?.map_err(backend)
}

fn post_from_row(row: &SqliteRow) -> Result<Post> {
    Ok(Post {
        id: row.try_get("post_id").map_err(backend)?,
        author_id: blob_to_uuid(&row.try_get::<Vec<u8>, _>("author_id").map_err(backend)?)?,
        title: row.try_get("title").map_err(backend)?,
        text: row.try_get("text").map_err(backend)?,
        comments_enabled: row.try_get("comments_enabled").map_err(backend)?,
        create_date: row.try_get::<DateTime<Utc>, _>("create_date").map_err(backend)?,
    })
}

fn comment_from_row(row: &SqliteRow) -> Result<Comment> {
    Ok(Comment {
        id: row.try_get("comment_id").map_err(backend)?,
        author_id: blob_to_uuid(&row.try_get::<Vec<u8>, _>("author_id").map_err(backend)?)?,
        post_id: row.try_get("post_id").map_err(backend)?,
        parent_id: row.try_get("parent_id").map_err(backend)?,
        text: row.try_get("text").map_err(backend)?,
        path: row.try_get("path").map_err(backend)?,
        create_date: row.try_get::<DateTime<Utc>, _>("create_date").map_err(backend)?,
    })
}

/// The single parent row read before deriving a path.
struct FetchedParent(Option<(CommentId, ParentEntry)>);

impl ParentIndex for FetchedParent {
    fn lookup_parent(&self, parent_id: CommentId) -> Option<ParentEntry> {
        self.0
            .as_ref()
            .filter(|(id, _)| *id == parent_id)
            .map(|(_, entry)| entry.clone())
    }
}

/// Reads `(post_id, path)` of the parent comment, if one was given.
/// A missing row leaves the index empty; the path engine reports it.
async fn fetch_parent<'e, E>(
    ctx: &Context,
    executor: E,
    parent_id: Option<CommentId>,
) -> Result<FetchedParent>
where
    E: Executor<'e, Database = Sqlite>,
{
    let Some(parent_id) = parent_id else {
        return Ok(FetchedParent(None));
    };

    let row = run(
        ctx,
        sqlx::query("SELECT post_id, path FROM comments WHERE comment_id = ?")
            .bind(parent_id)
            .fetch_optional(executor),
    )
    .await?;

    let entry = match row {
        Some(row) => Some((
            parent_id,
            ParentEntry {
                post_id: row.try_get("post_id").map_err(backend)?,
                path: row.try_get("path").map_err(backend)?,
            },
        )),
        None => None,
    };
    Ok(FetchedParent(entry))
}

impl SqliteAccessor {
    /// Opens (creating if needed) the database at `database_url`.
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::connect(database_url, DEFAULT_MAX_CONNECTIONS).await
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(backend)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(backend)?;

        Self::from_pool(pool).await
    }

    /// A private in-memory database.
    ///
    /// Every SQLite connection to `:memory:` opens its own database, so the
    /// pool is pinned to one connection that is never recycled.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(backend)?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await
            .map_err(backend)?;

        Self::from_pool(pool).await
    }

    /// Wraps an existing pool, applying pending migrations.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(backend)?;
        Ok(Self { pool })
    }

    async fn require_post(&self, ctx: &Context, post_id: PostId) -> Result<()> {
        let found = run(
            ctx,
            sqlx::query_scalar::<_, i64>("SELECT post_id FROM posts WHERE post_id = ?")
                .bind(post_id)
                .fetch_optional(&self.pool),
        )
        .await?;
        found
            .map(|_| ())
            .ok_or_else(|| AppError::post_not_found(post_id))
    }
}

#[async_trait]
impl Accessor for SqliteAccessor {
    async fn add_post(&self, ctx: &Context, new_post: NewPost) -> Result<Post> {
        ctx.check()?;

        let create_date = Utc::now();
        let id: PostId = run(
            ctx,
            sqlx::query_scalar(
                "INSERT INTO posts (post_id, author_id, title, text, comments_enabled, create_date)
                 VALUES ((SELECT COALESCE(MAX(post_id) + 1, 0) FROM posts), ?, ?, ?, ?, ?)
                 RETURNING post_id",
            )
            .bind(uuid_to_blob(new_post.author_id))
            .bind(&new_post.title)
            .bind(&new_post.text)
            .bind(new_post.comments_enabled)
            .bind(create_date)
            .fetch_one(&self.pool),
        )
        .await?;

        log::debug!("created post {id}");
        Ok(Post {
            id,
            author_id: new_post.author_id,
            title: new_post.title,
            text: new_post.text,
            comments_enabled: new_post.comments_enabled,
            create_date,
        })
    }

    async fn get_post(&self, ctx: &Context, post_id: PostId) -> Result<Post> {
        ctx.check()?;

        let row = run(
            ctx,
            sqlx::query(
                "SELECT post_id, author_id, title, text, comments_enabled, create_date
                 FROM posts WHERE post_id = ?",
            )
            .bind(post_id)
            .fetch_optional(&self.pool),
        )
        .await?;

        match row {
            Some(row) => post_from_row(&row),
            None => Err(AppError::post_not_found(post_id)),
        }
    }

    async fn get_all_posts(&self, ctx: &Context) -> Result<Vec<Post>> {
        ctx.check()?;

        let rows = run(
            ctx,
            sqlx::query(
                "SELECT post_id, author_id, title, text, comments_enabled, create_date
                 FROM posts ORDER BY post_id",
            )
            .fetch_all(&self.pool),
        )
        .await?;

        rows.iter().map(post_from_row).collect()
    }

    async fn update_comments_enabled(
        &self,
        ctx: &Context,
        post_id: PostId,
        author_id: Uuid,
        comments_enabled: bool,
    ) -> Result<Post> {
        ctx.check()?;

        // Ownership is verified before anything is written.
        let owner = run(
            ctx,
            sqlx::query_scalar::<_, Vec<u8>>("SELECT author_id FROM posts WHERE post_id = ?")
                .bind(post_id)
                .fetch_optional(&self.pool),
        )
        .await?
        .ok_or_else(|| AppError::post_not_found(post_id))?;

        if blob_to_uuid(&owner)? != author_id {
            log::debug!("user {author_id} may not update post {post_id}");
            return Err(AppError::Forbidden { post_id, author_id });
        }

        let row = run(
            ctx,
            sqlx::query(
                "UPDATE posts SET comments_enabled = ?
                 WHERE post_id = ?
                 RETURNING post_id, author_id, title, text, comments_enabled, create_date",
            )
            .bind(comments_enabled)
            .bind(post_id)
            .fetch_one(&self.pool),
        )
        .await?;

        post_from_row(&row)
    }

    /// Validation, path derivation and the insert share one transaction;
    /// any early return rolls it back. `BEGIN IMMEDIATE` takes the write
    /// lock up front so concurrent writers wait on the busy timeout.
    async fn add_comment(&self, ctx: &Context, new_comment: NewComment) -> Result<Comment> {
        ctx.check()?;
        let post_id = new_comment.post_id;

        let mut tx = run(ctx, self.pool.begin_with("BEGIN IMMEDIATE")).await?;

        let comments_enabled = run(
            ctx,
            sqlx::query_scalar::<_, bool>("SELECT comments_enabled FROM posts WHERE post_id = ?")
                .bind(post_id)
                .fetch_optional(&mut *tx),
        )
        .await?
        .ok_or_else(|| AppError::post_not_found(post_id))?;

        if !comments_enabled {
            return Err(AppError::CommentsDisabled(post_id));
        }
        path::validate_text(&new_comment.text)?;

        let parent = fetch_parent(ctx, &mut *tx, new_comment.parent_id).await?;
        let path = path::comment_path(&parent, post_id, new_comment.parent_id)?;

        let create_date = Utc::now();
        let id: CommentId = run(
            ctx,
            sqlx::query_scalar(
                "INSERT INTO comments (comment_id, author_id, post_id, parent_id, text, create_date, path, depth)
                 VALUES ((SELECT COALESCE(MAX(comment_id) + 1, 0) FROM comments), ?, ?, ?, ?, ?, ?, ?)
                 RETURNING comment_id",
            )
            .bind(uuid_to_blob(new_comment.author_id))
            .bind(post_id)
            .bind(new_comment.parent_id)
            .bind(&new_comment.text)
            .bind(create_date)
            .bind(&path)
            .bind(path::depth(&path))
            .fetch_one(&mut *tx),
        )
        .await?;

        // Once sent, the commit is not raced against cancellation.
        tx.commit().await.map_err(backend)?;

        log::debug!("created comment {id} at {path}");
        Ok(Comment {
            id,
            author_id: new_comment.author_id,
            post_id,
            parent_id: new_comment.parent_id,
            text: new_comment.text,
            path,
            create_date,
        })
    }

    async fn get_comment_path(
        &self,
        ctx: &Context,
        post_id: PostId,
        parent_id: Option<CommentId>,
    ) -> Result<String> {
        ctx.check()?;
        self.require_post(ctx, post_id).await?;

        let parent = fetch_parent(ctx, &self.pool, parent_id).await?;
        path::comment_path(&parent, post_id, parent_id)
    }

    async fn get_comments_level(
        &self,
        ctx: &Context,
        post_id: PostId,
        path: &str,
    ) -> Result<Vec<Comment>> {
        ctx.check()?;
        self.require_post(ctx, post_id).await?;

        let rows = run(
            ctx,
            sqlx::query(
                "SELECT comment_id, author_id, post_id, parent_id, text, path, create_date
                 FROM comments
                 WHERE post_id = ? AND path = ?
                 ORDER BY comment_id",
            )
            .bind(post_id)
            .bind(path)
            .fetch_all(&self.pool),
        )
        .await?;

        rows.iter().map(comment_from_row).collect()
    }

    async fn close_storage(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn new_post(author_id: Uuid, comments_enabled: bool) -> NewPost {
        NewPost {
            author_id,
            title: "Test Title".into(),
            text: "Test Text".into(),
            comments_enabled,
        }
    }

    fn new_comment(author_id: Uuid, post_id: PostId, parent_id: Option<CommentId>) -> NewComment {
        NewComment {
            author_id,
            post_id,
            parent_id,
            text: "Test Text".into(),
        }
    }

    #[tokio::test]
    async fn test_add_and_update_post() {
        let repo = SqliteAccessor::in_memory().await.unwrap();
        let ctx = Context::background();
        let author = Uuid::new_v4();

        let post = repo.add_post(&ctx, new_post(author, true)).await.unwrap();
        assert_eq!(post.id, 0);
        assert_eq!(post.title, "Test Title");

        let stored = repo.get_post(&ctx, 0).await.unwrap();
        assert_eq!(stored.author_id, author);
        assert!(stored.comments_enabled);

        let updated = repo
            .update_comments_enabled(&ctx, 0, author, false)
            .await
            .unwrap();
        assert!(!updated.comments_enabled);
        assert!(!repo.get_post(&ctx, 0).await.unwrap().comments_enabled);

        assert!(repo.get_post(&ctx, -1).await.unwrap_err().is_not_found());
        assert_eq!(repo.add_post(&ctx, new_post(author, true)).await.unwrap().id, 1);
        assert_eq!(repo.get_all_posts(&ctx).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_checks_owner_first() {
        let repo = SqliteAccessor::in_memory().await.unwrap();
        let ctx = Context::background();
        let author = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        repo.add_post(&ctx, new_post(author, true)).await.unwrap();

        let err = repo
            .update_comments_enabled(&ctx, 0, stranger, false)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AppError::Forbidden {
                post_id: 0,
                author_id: stranger
            }
        );
        assert!(repo.get_post(&ctx, 0).await.unwrap().comments_enabled);

        let err = repo
            .update_comments_enabled(&ctx, 9, author, false)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_comment_paths_and_levels() {
        let repo = SqliteAccessor::in_memory().await.unwrap();
        let ctx = Context::background();
        let author = Uuid::new_v4();
        repo.add_post(&ctx, new_post(author, false)).await.unwrap();
        repo.add_post(&ctx, new_post(author, true)).await.unwrap();

        let root = repo
            .add_comment(&ctx, new_comment(author, 1, None))
            .await
            .unwrap();
        assert_eq!((root.id, root.path.as_str()), (0, "1"));

        let reply = repo
            .add_comment(&ctx, new_comment(author, 1, Some(0)))
            .await
            .unwrap();
        assert_eq!((reply.id, reply.path.as_str()), (1, "1.0"));

        let level = repo.get_comments_level(&ctx, 1, "1").await.unwrap();
        assert_eq!(level.iter().map(|c| c.id).collect::<Vec<_>>(), vec![0]);
        assert_eq!(level[0].parent_id, None);

        let replies = repo.get_comments_level(&ctx, 1, "1.0").await.unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].parent_id, Some(0));

        assert_eq!(repo.get_comment_path(&ctx, 1, None).await.unwrap(), "1");
        assert_eq!(repo.get_comment_path(&ctx, 1, Some(1)).await.unwrap(), "1.0.1");
        assert!(repo
            .get_comment_path(&ctx, 1, Some(42))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_rejected_comments_leave_no_rows() {
        let repo = SqliteAccessor::in_memory().await.unwrap();
        let ctx = Context::background();
        let author = Uuid::new_v4();
        repo.add_post(&ctx, new_post(author, false)).await.unwrap();
        repo.add_post(&ctx, new_post(author, true)).await.unwrap();

        assert_eq!(
            repo.add_comment(&ctx, new_comment(author, 0, Some(5)))
                .await
                .unwrap_err(),
            AppError::CommentsDisabled(0)
        );
        assert!(repo
            .add_comment(&ctx, new_comment(author, 1, Some(5)))
            .await
            .unwrap_err()
            .is_not_found());

        let mut long = new_comment(author, 1, None);
        long.text = "x".repeat(2001);
        assert!(matches!(
            repo.add_comment(&ctx, long).await,
            Err(AppError::TextTooLong { .. })
        ));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments")
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_cancelled_and_closed() {
        let repo = SqliteAccessor::in_memory().await.unwrap();
        let (ctx, handle) = Context::with_cancel();
        handle.cancel();

        assert_eq!(
            repo.add_post(&ctx, new_post(Uuid::new_v4(), true))
                .await
                .unwrap_err(),
            AppError::Cancelled
        );

        let ctx = Context::background();
        assert!(repo.get_all_posts(&ctx).await.unwrap().is_empty());

        repo.close_storage().await;
        assert!(matches!(
            repo.get_all_posts(&ctx).await,
            Err(AppError::Backend(_))
        ));
    }

    async fn file_backed(dir: &tempfile::TempDir) -> Arc<SqliteAccessor> {
        let url = format!("sqlite:{}", dir.path().join("posts.db").display());
        Arc::new(SqliteAccessor::connect(&url, 5).await.unwrap())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_comments_on_pooled_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let repo = file_backed(&dir).await;
        let ctx = Context::background();
        let author = Uuid::new_v4();
        repo.add_post(&ctx, new_post(author, true)).await.unwrap();

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let repo = Arc::clone(&repo);
                tokio::spawn(async move {
                    repo.add_comment(&Context::background(), new_comment(author, 0, None))
                        .await
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }
        ids.sort_unstable();
        assert_eq!(ids, (0..32).collect::<Vec<_>>());

        let level = repo.get_comments_level(&ctx, 0, "0").await.unwrap();
        assert_eq!(level.len(), 32);
        repo.close_storage().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancelled_comments_are_never_stored() {
        let dir = tempfile::tempdir().unwrap();
        let repo = file_backed(&dir).await;
        let author = Uuid::new_v4();
        repo.add_post(&Context::background(), new_post(author, true))
            .await
            .unwrap();

        let (ctx, handle) = Context::with_cancel();
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let repo = Arc::clone(&repo);
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let mut comment = new_comment(author, 0, None);
                    comment.text = format!("comment {i}");
                    (comment.text.clone(), repo.add_comment(&ctx, comment).await)
                })
            })
            .collect();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        handle.cancel();

        let mut accepted = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                (text, Ok(_)) => accepted.push(text),
                (_, Err(err)) => assert_eq!(err, AppError::Cancelled),
            }
        }
        accepted.sort();

        let mut stored: Vec<String> =
            sqlx::query_scalar("SELECT text FROM comments WHERE post_id = 0")
                .fetch_all(&repo.pool)
                .await
                .unwrap();
        stored.sort();
        assert_eq!(stored, accepted);
        repo.close_storage().await;
    }
}

//! Shared fixtures for the cross-backend test suites.
//!
//! Every suite receives one `Box<dyn Accessor>` per backend and must observe
//! the same results from each.

use ps_core::models::{CommentId, NewComment, NewPost, PostId};
use ps_core::{Accessor, Result};
use ps_db_memory::MemoryAccessor;
use ps_db_sqlite::SqliteAccessor;
use uuid::Uuid;

/// Both backends, labelled for assertion messages.
pub async fn backends() -> Result<Vec<(&'static str, Box<dyn Accessor>)>> {
    let memory: Box<dyn Accessor> = Box::new(MemoryAccessor::new());
    let sqlite: Box<dyn Accessor> = Box::new(SqliteAccessor::in_memory().await?);
    Ok(vec![("memory", memory), ("sqlite", sqlite)])
}

pub fn post_input(author_id: Uuid, comments_enabled: bool) -> NewPost {
    NewPost {
        author_id,
        title: "Test Title".to_string(),
        text: "Test Text".to_string(),
        comments_enabled,
    }
}

pub fn comment_input(author_id: Uuid, post_id: PostId, parent_id: Option<CommentId>) -> NewComment {
    NewComment {
        author_id,
        post_id,
        parent_id,
        text: "Test Text".to_string(),
    }
}

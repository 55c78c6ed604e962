//! # Materialized Paths
//!
//! A comment's position in its post's tree is stored as a dot-separated
//! chain of ids: the post id followed by every ancestor comment id, oldest
//! first. Root comments live in the bucket named after the post, a reply to
//! comment `7` whose path is `"3.2"` lives in `"3.2.7"`.
//!
//! Both backends derive paths through [`comment_path`]; they only differ in
//! how they answer [`ParentIndex::lookup_parent`].

use crate::error::{AppError, Result};
use crate::models::{CommentId, PostId};

/// Separator between ids in a path (and between path and id in a cursor).
pub const SEPARATOR: char = '.';

/// Upper bound on comment text, in UTF-8 code units.
pub const MAX_COMMENT_TEXT_LEN: usize = 2000;

/// What a backend knows about a would-be parent comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentEntry {
    pub post_id: PostId,
    /// `None` when the comment exists but its path is missing from the index.
    pub path: Option<String>,
}

/// Lookup capability injected into [`comment_path`].
pub trait ParentIndex {
    fn lookup_parent(&self, parent_id: CommentId) -> Option<ParentEntry>;
}

/// Path of the root-level bucket of a post.
pub fn root_path(post_id: PostId) -> String {
    post_id.to_string()
}

/// Path of the bucket holding the replies to `parent_id`.
pub fn child_path(parent_path: &str, parent_id: CommentId) -> String {
    format!("{parent_path}{SEPARATOR}{parent_id}")
}

/// Derives the path a new comment on `post_id` replying to `parent_id` gets.
///
/// Fails with `NotFound` if the parent does not exist, has no resolvable
/// path, or belongs to a different post.
pub fn comment_path<I>(index: &I, post_id: PostId, parent_id: Option<CommentId>) -> Result<String>
where
    I: ParentIndex + ?Sized,
{
    let Some(parent_id) = parent_id else {
        return Ok(root_path(post_id));
    };

    let parent = index
        .lookup_parent(parent_id)
        .ok_or_else(|| AppError::comment_not_found(parent_id))?;

    // A parent on another post does not exist as far as this post is concerned.
    if parent.post_id != post_id {
        log::debug!(
            "comment {parent_id} belongs to post {}, not {post_id}",
            parent.post_id
        );
        return Err(AppError::comment_not_found(parent_id));
    }

    let parent_path = parent.path.ok_or_else(|| {
        log::warn!("comment {parent_id} exists but has no stored path");
        AppError::NotFound("Path of comment".to_string(), parent_id.to_string())
    })?;

    Ok(child_path(&parent_path, parent_id))
}

/// Rejects comment text longer than [`MAX_COMMENT_TEXT_LEN`].
pub fn validate_text(text: &str) -> Result<()> {
    if text.len() > MAX_COMMENT_TEXT_LEN {
        return Err(AppError::TextTooLong {
            len: text.len(),
            max: MAX_COMMENT_TEXT_LEN,
        });
    }
    Ok(())
}

/// Number of comment ids in the path after the post id.
pub fn depth(path: &str) -> u32 {
    path.matches(SEPARATOR).count() as u32
}

/// True if `path` lies strictly below `ancestor`.
pub fn is_descendant(path: &str, ancestor: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path[ancestor.len()..].starts_with(SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Index(HashMap<CommentId, ParentEntry>);

    impl ParentIndex for Index {
        fn lookup_parent(&self, parent_id: CommentId) -> Option<ParentEntry> {
            self.0.get(&parent_id).cloned()
        }
    }

    fn index() -> Index {
        let mut entries = HashMap::new();
        entries.insert(0, ParentEntry { post_id: 1, path: Some("1".into()) });
        entries.insert(1, ParentEntry { post_id: 1, path: Some("1.0".into()) });
        entries.insert(2, ParentEntry { post_id: 2, path: Some("2".into()) });
        entries.insert(3, ParentEntry { post_id: 1, path: None });
        Index(entries)
    }

    #[test]
    fn root_comment_uses_post_id() {
        assert_eq!(comment_path(&index(), 1, None).unwrap(), "1");
        assert_eq!(comment_path(&index(), 42, None).unwrap(), "42");
    }

    #[test]
    fn reply_appends_parent_id() {
        assert_eq!(comment_path(&index(), 1, Some(0)).unwrap(), "1.0");
        assert_eq!(comment_path(&index(), 1, Some(1)).unwrap(), "1.0.1");
    }

    #[test]
    fn missing_parent_is_not_found() {
        let err = comment_path(&index(), 1, Some(99)).unwrap_err();
        assert_eq!(err, AppError::comment_not_found(99));
    }

    #[test]
    fn parent_from_other_post_is_rejected() {
        let err = comment_path(&index(), 1, Some(2)).unwrap_err();
        assert_eq!(err, AppError::comment_not_found(2));
    }

    #[test]
    fn parent_without_path_is_rejected() {
        let err = comment_path(&index(), 1, Some(3)).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn text_bound_is_inclusive() {
        assert!(validate_text(&"a".repeat(MAX_COMMENT_TEXT_LEN)).is_ok());
        assert_eq!(
            validate_text(&"a".repeat(MAX_COMMENT_TEXT_LEN + 1)),
            Err(AppError::TextTooLong { len: 2001, max: 2000 })
        );
        // 'é' is two code units
        assert!(validate_text(&"é".repeat(1001)).is_err());
    }

    #[test]
    fn depth_and_descendants() {
        assert_eq!(depth("1"), 0);
        assert_eq!(depth("1.0.4"), 2);
        assert!(is_descendant("1.0", "1"));
        assert!(is_descendant("1.0.4", "1"));
        assert!(!is_descendant("1", "1"));
        assert!(!is_descendant("12.3", "1"));
    }
}

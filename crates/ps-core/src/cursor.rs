//! # Pagination Cursors
//!
//! A cursor is `base64_no_padding(path "." comment_id)`. It is the only
//! persisted-state-adjacent format callers see, so it must not change when
//! the storage backend does.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;

use crate::error::{AppError, Result};
use crate::models::CommentId;
use crate::path::SEPARATOR;

/// Builds the cursor pointing at `comment_id`, which lives under `path`.
pub fn create(comment_id: CommentId, path: &str) -> String {
    STANDARD_NO_PAD.encode(format!("{path}{SEPARATOR}{comment_id}"))
}

/// Accepts a cursor only if its decoded content is digits and separators.
pub fn validate(cursor: &str) -> Result<()> {
    let decoded = decode(cursor)?;
    if decoded
        .chars()
        .filter(|c| *c != SEPARATOR)
        .all(|c| c.is_ascii_digit())
    {
        Ok(())
    } else {
        Err(AppError::InvalidCursor(cursor.to_string()))
    }
}

/// The path part of the cursor (everything before the last separator).
pub fn path(cursor: &str) -> Result<String> {
    let (decoded, split) = split_last(cursor)?;
    Ok(decoded[..split].to_string())
}

/// The id part of the cursor including its leading separator, e.g. `".5"`.
pub fn comment_id_suffix(cursor: &str) -> Result<String> {
    let (decoded, split) = split_last(cursor)?;
    Ok(decoded[split..].to_string())
}

/// The id part of the cursor, parsed.
pub fn comment_id(cursor: &str) -> Result<CommentId> {
    let (decoded, split) = split_last(cursor)?;
    decoded[split + SEPARATOR.len_utf8()..]
        .parse()
        .map_err(|_| AppError::InvalidCursor(cursor.to_string()))
}

fn split_last(cursor: &str) -> Result<(String, usize)> {
    let decoded = decode(cursor)?;
    let split = decoded
        .rfind(SEPARATOR)
        .ok_or_else(|| AppError::InvalidCursor(cursor.to_string()))?;
    Ok((decoded, split))
}

fn decode(cursor: &str) -> Result<String> {
    let bytes = STANDARD_NO_PAD
        .decode(cursor)
        .map_err(|e| AppError::InvalidCursor(format!("{cursor}: {e}")))?;
    String::from_utf8(bytes).map_err(|_| AppError::InvalidCursor(cursor.to_string()))
}

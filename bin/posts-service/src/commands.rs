//! Maps each subcommand onto one or more `Accessor` calls and prints the
//! result as JSON.

use anyhow::Context as _;
use ps_core::models::{Comment, NewComment, NewPost};
use ps_core::{cursor, path, Accessor, Context};
use serde::Serialize;
use uuid::Uuid;

use crate::config::Command;

#[derive(Serialize)]
struct LevelEntry {
    #[serde(flatten)]
    comment: Comment,
    cursor: String,
}

#[derive(Serialize)]
struct DecodedCursor {
    path: String,
    comment_id: i64,
}

fn print<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn run(repo: &dyn Accessor, ctx: &Context, command: Command) -> anyhow::Result<()> {
    match command {
        Command::AddPost {
            author,
            title,
            text,
            comments_disabled,
        } => {
            let post = repo
                .add_post(
                    ctx,
                    NewPost {
                        author_id: author,
                        title,
                        text,
                        comments_enabled: !comments_disabled,
                    },
                )
                .await?;
            print(&post)
        }
        Command::Post { post_id } => print(&repo.get_post(ctx, post_id).await?),
        Command::Posts => print(&repo.get_all_posts(ctx).await?),
        Command::SetComments {
            post_id,
            author,
            enabled,
        } => print(
            &repo
                .update_comments_enabled(ctx, post_id, author, enabled)
                .await?,
        ),
        Command::AddComment {
            author,
            post,
            parent,
            text,
        } => {
            let comment = repo
                .add_comment(
                    ctx,
                    NewComment {
                        author_id: author,
                        post_id: post,
                        parent_id: parent,
                        text,
                    },
                )
                .await?;
            print(&comment)
        }
        Command::Path { post_id, parent } => {
            print(&repo.get_comment_path(ctx, post_id, parent).await?)
        }
        Command::Level {
            post_id,
            path,
            after,
            limit,
        } => {
            let entries = level(repo, ctx, post_id, path, after.as_deref(), limit).await?;
            print(&entries)
        }
        Command::Cursor { cursor: raw } => {
            cursor::validate(&raw)?;
            print(&DecodedCursor {
                path: cursor::path(&raw)?,
                comment_id: cursor::comment_id(&raw)?,
            })
        }
        Command::Seed => seed(repo, ctx).await,
    }
}

async fn level(
    repo: &dyn Accessor,
    ctx: &Context,
    post_id: i64,
    requested: Option<String>,
    after: Option<&str>,
    limit: usize,
) -> anyhow::Result<Vec<LevelEntry>> {
    let (level_path, last_seen) = match after {
        Some(raw) => {
            cursor::validate(raw)?;
            (cursor::path(raw)?, Some(cursor::comment_id(raw)?))
        }
        None => (requested.unwrap_or_else(|| path::root_path(post_id)), None),
    };

    let comments = repo.get_comments_level(ctx, post_id, &level_path).await?;
    Ok(comments
        .into_iter()
        .filter(|c| last_seen.map_or(true, |seen| c.id > seen))
        .take(limit)
        .map(|comment| LevelEntry {
            cursor: cursor::create(comment.id, &comment.path),
            comment,
        })
        .collect())
}

/// One post, two root comments, a reply and a reply to the reply.
async fn seed(repo: &dyn Accessor, ctx: &Context) -> anyhow::Result<()> {
    let author = Uuid::new_v4();
    let post = repo
        .add_post(
            ctx,
            NewPost {
                author_id: author,
                title: "Hello".to_string(),
                text: "First post".to_string(),
                comments_enabled: true,
            },
        )
        .await
        .context("failed to create seed post")?;

    let mut parent = None;
    for text in ["first!", "a reply", "a reply to the reply"] {
        let comment = repo
            .add_comment(
                ctx,
                NewComment {
                    author_id: author,
                    post_id: post.id,
                    parent_id: parent,
                    text: text.to_string(),
                },
            )
            .await
            .with_context(|| format!("failed to add seed comment {text:?}"))?;
        log::info!("seeded comment {} at {}", comment.id, comment.path);
        parent = Some(comment.id);
    }
    repo.add_comment(
        ctx,
        NewComment {
            author_id: author,
            post_id: post.id,
            parent_id: None,
            text: "second root comment".to_string(),
        },
    )
    .await?;

    log::info!("seeded post {} by {author}", post.id);
    print(&level(repo, ctx, post.id, None, None, usize::MAX).await?)
}

//! Command-line and environment configuration.
//!
//! Every flag can also come from the environment (or a `.env` file loaded
//! before parsing).

use clap::{ArgAction, Parser, Subcommand};
use uuid::Uuid;

const DEFAULT_STORAGE: StorageKind = StorageKind::Sqlite;

#[derive(Debug, Parser)]
#[command(name = "posts-service", version, about = "Posts and threaded comments storage")]
pub struct Settings {
    /// Storage type: 'sqlite' ('p') or 'memory' ('m')
    #[arg(short = 's', long, env = "POSTS_STORAGE", default_value = "sqlite")]
    pub storage: String,

    /// Database location for the sqlite storage
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:posts.db?mode=rwc")]
    pub database_url: String,

    /// Connection pool size for the sqlite storage
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a post
    AddPost {
        #[arg(long)]
        author: Uuid,
        #[arg(long)]
        title: String,
        #[arg(long)]
        text: String,
        /// Create the post with comments turned off
        #[arg(long)]
        comments_disabled: bool,
    },
    /// Show one post
    Post { post_id: i64 },
    /// List all posts
    Posts,
    /// Turn comments on a post on or off (author only)
    SetComments {
        post_id: i64,
        #[arg(long)]
        author: Uuid,
        #[arg(long, action = ArgAction::Set)]
        enabled: bool,
    },
    /// Comment on a post, optionally replying to another comment
    AddComment {
        #[arg(long)]
        author: Uuid,
        #[arg(long)]
        post: i64,
        #[arg(long)]
        parent: Option<i64>,
        #[arg(long)]
        text: String,
    },
    /// Print the path a reply to `--parent` would get
    Path {
        post_id: i64,
        #[arg(long)]
        parent: Option<i64>,
    },
    /// List one level of a comment tree with a cursor per comment
    Level {
        post_id: i64,
        /// Level to list; defaults to the post's root comments
        #[arg(long, conflicts_with = "after")]
        path: Option<String>,
        /// Continue after this cursor
        #[arg(long)]
        after: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Decode a cursor
    Cursor { cursor: String },
    /// Create a demo post with a small comment tree
    Seed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Sqlite,
    Memory,
}

impl StorageKind {
    /// Unknown names fall back to the default storage with a warning.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw {
            "sqlite" | "p" | "postgres" => StorageKind::Sqlite,
            "memory" | "m" => StorageKind::Memory,
            other => {
                log::warn!("Incorrect storage type: {other}. {DEFAULT_STORAGE:?} will be used.");
                DEFAULT_STORAGE
            }
        }
    }
}

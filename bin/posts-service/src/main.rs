//! # posts-service Binary
//!
//! The entry point that assembles the storage backend based on compile-time
//! features and the `--storage` flag, then runs one subcommand against it.

mod commands;
mod config;

use anyhow::Context as _;
use clap::Parser;
use ps_core::{Accessor, Context};

use config::{Settings, StorageKind};

// Feature-gated imports: only the compiled-in plugins can be selected
#[cfg(feature = "db-sqlite")]
use ps_db_sqlite::SqliteAccessor;

#[cfg(feature = "db-memory")]
use ps_db_memory::MemoryAccessor;

async fn build_accessor(kind: StorageKind, settings: &Settings) -> anyhow::Result<Box<dyn Accessor>> {
    match kind {
        #[cfg(feature = "db-sqlite")]
        StorageKind::Sqlite => {
            let repo = SqliteAccessor::connect(&settings.database_url, settings.max_connections)
                .await
                .with_context(|| format!("failed to open {}", settings.database_url))?;
            Ok(Box::new(repo))
        }
        #[cfg(feature = "db-memory")]
        StorageKind::Memory => Ok(Box::new(MemoryAccessor::new())),
        #[allow(unreachable_patterns)]
        other => anyhow::bail!("storage type {other:?} is not compiled into this binary"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let settings = Settings::parse();
    let kind = StorageKind::parse_lenient(&settings.storage);
    let repo = build_accessor(kind, &settings).await?;
    log::info!("using {kind:?} storage");

    let (ctx, cancel) = Context::with_cancel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupted, cancelling");
            cancel.cancel();
        }
    });

    let result = commands::run(repo.as_ref(), &ctx, settings.command).await;
    repo.close_storage().await;
    result
}

//! # Context
//!
//! Cancellation signal passed into every accessor call. Accessors check it
//! on entry; backends doing real I/O also race their statements against it
//! through [`Context::run`].

use std::future::Future;

use tokio::sync::watch;

use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct Context {
    cancelled: watch::Receiver<bool>,
}

/// Cancels every [`Context`] cloned from the one it was created with.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl Context {
    /// A context that is never cancelled.
    pub fn background() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { cancelled: rx }
    }

    pub fn with_cancel() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (Self { cancelled: rx }, CancelHandle { tx })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Returns `Cancelled` if the context has already been cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(AppError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once the context is cancelled; never, for a background one.
    pub async fn cancelled(&self) {
        let mut rx = self.cancelled.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            // Sender gone without cancelling
            std::future::pending::<()>().await;
        }
    }

    /// Drives `fut` to completion unless the context is cancelled first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(AppError::Cancelled),
            out = fut => Ok(out),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

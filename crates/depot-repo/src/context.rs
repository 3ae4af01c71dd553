//! Per-request deadline and cancellation
//!
//! Every repository operation takes a [`RequestContext`]. Collaborator calls
//! are wrapped in [`RequestContext::run`], which races them against the
//! deadline and the cancellation signal.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{RepoError, Result};

/// Deadline and cancellation signal carried through an operation
#[derive(Debug, Clone)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancelled: watch::Receiver<bool>,
}

/// Handle that cancels every context derived from it
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}

impl RequestContext {
    /// No deadline, never cancelled
    pub fn background() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self {
            deadline: None,
            cancelled: rx,
        }
    }

    /// Context that expires `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().deadline_in(timeout)
    }

    /// Replace the deadline with one `timeout` from now
    pub fn deadline_in(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Attach a cancellation signal
    pub fn cancellable(mut self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        self.cancelled = rx;
        (self, CancelHandle(tx))
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Fail fast when the request is already over
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(RepoError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(RepoError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Drive `fut` unless the deadline passes or the request is cancelled first
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output> {
        self.check()?;

        let mut cancelled = self.cancelled.clone();
        let guarded = async move {
            tokio::select! {
                out = fut => Ok(out),
                _ = wait_cancelled(&mut cancelled) => Err(RepoError::Cancelled),
            }
        };

        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, guarded)
                .await
                .map_err(|_| RepoError::DeadlineExceeded)?,
            None => guarded.await,
        }
    }
}

async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone: this context can no longer be cancelled
            std::future::pending::<()>().await;
        }
    }
}

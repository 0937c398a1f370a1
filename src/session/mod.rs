// src/session/mod.rs
//! The observation session and its supervisor. A session is exclusively
//! owned: by the feed poller during live monitoring, or by the backfill
//! traversal. Fatal session errors bubble to `run_supervised`, which disposes
//! the session and starts over after a fixed cool-down; nothing else is
//! allowed to propagate out of the supervised task.

pub mod browser;

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::error::{SessionError, TraversalError};
use crate::types::{ActivityStub, RawFeedRow};

/// A live browser-level session against the site.
#[async_trait]
pub trait FeedSession: Send {
    /// Sample the current top of the live feed. Errors here mean the session
    /// is dead, never that a single row was bad.
    async fn sample_feed(&mut self) -> Result<Vec<RawFeedRow>, SessionError>;

    /// Open an identity's activity page and reset scroll state. Failing to
    /// load the page at all is a `TraversalError`.
    async fn begin_activity(&mut self, identity: &str) -> Result<(), TraversalError>;

    /// Advance the infinite scroll one step and return the newly revealed
    /// stubs; `None` once the feed is exhausted. Must be called after
    /// `begin_activity`; the traversal restarts from the top on a fresh call
    /// to `begin_activity`, it is not mid-stream resumable.
    async fn next_activity_page(&mut self) -> Result<Option<Vec<ActivityStub>>, SessionError>;

    /// Release server-side resources. Best-effort; called on both normal
    /// completion and fatal-error abort.
    async fn close(&mut self) -> Result<(), SessionError> {
        Ok(())
    }
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn FeedSession>, SessionError>;
}

/// Run `work` with a fresh session, forever. When the work reports a fatal
/// session error the dead session is dropped, the fixed cool-down elapses,
/// and a new session is acquired; there is no backoff escalation and no
/// retry ceiling. Returns only when the shutdown signal fires (the work
/// signals that by returning `Ok(())`).
pub async fn run_supervised<F, Fut>(
    factory: &dyn SessionFactory,
    cooldown: Duration,
    shutdown: broadcast::Sender<()>,
    work: F,
) where
    F: Fn(Box<dyn FeedSession>, broadcast::Receiver<()>) -> Fut,
    Fut: Future<Output = Result<(), SessionError>>,
{
    let mut shutdown_rx = shutdown.subscribe();
    loop {
        let session = tokio::select! {
            acquired = factory.acquire() => match acquired {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "failed to acquire session, retrying after cool-down");
                    metrics::counter!("session_restarts_total").increment(1);
                    tokio::select! {
                        _ = tokio::time::sleep(cooldown) => continue,
                        _ = shutdown_rx.recv() => return,
                    }
                }
            },
            _ = shutdown_rx.recv() => return,
        };

        info!("observation session started");
        match work(session, shutdown.subscribe()).await {
            Ok(()) => {
                info!("supervised task finished, shutting down");
                return;
            }
            Err(e) => {
                warn!(
                    error = %e,
                    cooldown_secs = cooldown.as_secs(),
                    "fatal session error, restarting session"
                );
                metrics::counter!("session_restarts_total").increment(1);
                tokio::select! {
                    _ = tokio::time::sleep(cooldown) => {}
                    _ = shutdown_rx.recv() => return,
                }
            }
        }
    }
}

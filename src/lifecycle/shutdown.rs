//! Deadline-bounded graceful shutdown.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::lifecycle::context::{ContextError, ShutdownContext};

/// Errors reported by a server's serve or shutdown calls.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The server was already stopped. Treated as a clean stop.
    #[error("server closed")]
    AlreadyClosed,
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Other(String),
}

/// The shutdown half of a server.
#[async_trait]
pub trait ServerControl: Send + Sync {
    /// Stop accepting work and wait for in-flight work, or for `ctx` to end.
    async fn shutdown(&self, ctx: &ShutdownContext) -> Result<(), ServerError>;
}

#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("graceful shutdown did not complete within {0:?}")]
    Timeout(Duration),
    #[error("graceful shutdown failed: {0}")]
    Failed(#[source] ServerError),
}

impl ShutdownError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// The parent context was cancelled before the server finished.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Failed(ServerError::Context(ContextError::Canceled)))
    }
}

/// Shut `srv` down within `timeout` of now.
///
/// `srv.shutdown` is called exactly once with a child of `parent` bounded by
/// `timeout`. An `AlreadyClosed` result counts as success. A zero timeout
/// still makes the call, with a context that has already expired.
pub async fn handle_shutdown(
    parent: &CancellationToken,
    srv: &dyn ServerControl,
    timeout: Duration,
) -> Result<(), ShutdownError> {
    let ctx = ShutdownContext::with_timeout(parent, timeout);

    let watcher = ctx.clone();
    tokio::spawn(async move {
        if watcher.done().await == ContextError::DeadlineExceeded {
            tracing::warn!(?timeout, "Shutdown deadline exceeded, forcing shutdown");
        }
    });

    let result = srv.shutdown(&ctx).await;
    ctx.cancel();

    match result {
        Ok(()) => Ok(()),
        Err(ServerError::AlreadyClosed) => {
            tracing::debug!("Server already closed before shutdown");
            Ok(())
        }
        Err(ServerError::Context(ContextError::DeadlineExceeded)) => {
            Err(ShutdownError::Timeout(timeout))
        }
        Err(e) => Err(ShutdownError::Failed(e)),
    }
}

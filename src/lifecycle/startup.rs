//! Startup orchestration.
//!
//! # Responsibilities
//! - Select the feature-flag provider and build the API handle
//! - Register bundles, then bind the listener
//! - Serve in the background until the server fails or a stop is requested
//! - Always finish with a deadline-bounded shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners bind last (traffic only when every bundle registered)
//! - Shutdown runs on a fresh context so an already cancelled parent
//!   does not cut the grace period short

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::api::{register_all, Api, ApiBundle};
use crate::config::schema::{SERVER_PORT, SERVER_SHUTDOWN_TIMEOUT};
use crate::config::ConfigStore;
use crate::error::RuntimeError;
use crate::flags;
use crate::http::{HttpServer, HttpTimeouts};
use crate::lifecycle::shutdown::{handle_shutdown, ServerControl, ServerError, ShutdownError};
use crate::lifecycle::signals;
use crate::observability::metrics;

/// Title of the served OpenAPI document.
pub const API_TITLE: &str = "API Runtime";

/// A server the orchestrator can run.
#[async_trait]
pub trait Serve: ServerControl {
    /// Serve until stopped. A stop caused by shutdown reports `AlreadyClosed`.
    async fn serve(&self) -> Result<(), ServerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Running,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to install signal handlers: {0}")]
    Signals(#[from] std::io::Error),
    #[error("server failed: {0}")]
    Serve(#[source] ServerError),
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
}

/// Runs one server from start to a completed shutdown.
pub struct Orchestrator {
    shutdown_timeout: Duration,
    state: watch::Sender<LifecycleState>,
}

impl Orchestrator {
    pub fn new(shutdown_timeout: Duration) -> Self {
        let (state, _) = watch::channel(LifecycleState::Running);
        Self {
            shutdown_timeout,
            state,
        }
    }

    /// Observe state transitions. Reports `Running` until shutdown begins.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Serve `server` until it fails, a shutdown signal arrives, or `parent`
    /// is cancelled; then shut it down within the configured timeout.
    ///
    /// A serve failure takes precedence over a shutdown failure.
    pub async fn run<S>(&self, parent: &CancellationToken, server: Arc<S>) -> Result<(), RunError>
    where
        S: Serve + 'static,
    {
        let serving = signals::notify_context(parent)?;
        self.state.send_replace(LifecycleState::Running);

        let (tx, rx) = oneshot::channel();
        let srv = server.clone();
        tokio::spawn(
            async move {
                let _ = tx.send(srv.serve().await);
            }
            .instrument(tracing::info_span!("server")),
        );

        let serve_failure = tokio::select! {
            result = rx => match result {
                Ok(Ok(())) | Ok(Err(ServerError::AlreadyClosed)) => {
                    tracing::info!("Server stopped");
                    None
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Server failed");
                    Some(e)
                }
                Err(_) => {
                    tracing::error!("Serving task ended without a result");
                    Some(ServerError::Other("serving task aborted".to_string()))
                }
            },
            _ = serving.cancelled() => {
                tracing::info!("Shutting down server");
                None
            }
        };
        serving.cancel();

        self.state.send_replace(LifecycleState::ShuttingDown);
        let shutdown = handle_shutdown(
            &CancellationToken::new(),
            server.as_ref(),
            self.shutdown_timeout,
        )
        .await;

        match &shutdown {
            Ok(()) => {
                tracing::info!("Server shutdown gracefully");
                metrics::record_shutdown("graceful");
            }
            Err(e) => {
                tracing::error!(error = %e, "Server shutdown failed");
                metrics::record_shutdown(if e.is_timeout() { "timeout" } else { "failed" });
            }
        }
        self.state.send_replace(LifecycleState::Stopped);

        match (serve_failure, shutdown) {
            (Some(e), _) => Err(RunError::Serve(e)),
            (None, Err(e)) => Err(RunError::Shutdown(e)),
            (None, Ok(())) => Ok(()),
        }
    }
}

fn seconds(value: i64) -> Duration {
    Duration::from_secs(value.max(0) as u64)
}

/// Build the API from `bundles`, bind `SERVER_PORT` and run until stopped.
pub async fn start(
    parent: &CancellationToken,
    store: &ConfigStore,
    bundles: &[ApiBundle],
) -> Result<(), RuntimeError> {
    let provider = flags::set_provider(store).await?;
    let mut api = Api::new(API_TITLE, env!("CARGO_PKG_VERSION"), provider);
    register_all(store, &mut api, bundles)?;

    let port = store.get_i64(SERVER_PORT);
    let port = u16::try_from(port).map_err(|_| RuntimeError::InvalidPort(port))?;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let server = HttpServer::bind(addr, api.into_router(), HttpTimeouts::from_store(store))
        .await
        .map_err(|source| RuntimeError::Bind { addr, source })?;
    tracing::info!(address = %server.local_addr(), "Listening for connections");

    Orchestrator::new(seconds(store.get_i64(SERVER_SHUTDOWN_TIMEOUT)))
        .run(parent, Arc::new(server))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::context::ShutdownContext;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum ServeBehaviour {
        UntilShutdown,
        FailAfter(Duration),
        ReturnClosed,
    }

    struct MockServer {
        serve: ServeBehaviour,
        stuck_shutdown: bool,
        stop: CancellationToken,
        shutdowns: AtomicUsize,
    }

    impl MockServer {
        fn new(serve: ServeBehaviour) -> Arc<Self> {
            Arc::new(Self {
                serve,
                stuck_shutdown: false,
                stop: CancellationToken::new(),
                shutdowns: AtomicUsize::new(0),
            })
        }

        fn shutdowns(&self) -> usize {
            self.shutdowns.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ServerControl for MockServer {
        async fn shutdown(&self, ctx: &ShutdownContext) -> Result<(), ServerError> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            if self.stuck_shutdown {
                return Err(ctx.done().await.into());
            }
            self.stop.cancel();
            Ok(())
        }
    }

    #[async_trait]
    impl Serve for MockServer {
        async fn serve(&self) -> Result<(), ServerError> {
            match self.serve {
                ServeBehaviour::UntilShutdown => {
                    self.stop.cancelled().await;
                    Err(ServerError::AlreadyClosed)
                }
                ServeBehaviour::FailAfter(delay) => {
                    tokio::time::sleep(delay).await;
                    Err(ServerError::Other("address in use".to_string()))
                }
                ServeBehaviour::ReturnClosed => Err(ServerError::AlreadyClosed),
            }
        }
    }

    #[tokio::test]
    async fn test_parent_cancellation_triggers_shutdown() {
        let parent = CancellationToken::new();
        let server = MockServer::new(ServeBehaviour::UntilShutdown);
        let orchestrator = Orchestrator::new(Duration::from_secs(1));
        let states = orchestrator.subscribe();

        let canceller = parent.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        orchestrator.run(&parent, server.clone()).await.unwrap();
        assert_eq!(server.shutdowns(), 1);
        assert_eq!(*states.borrow(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_serve_failure_is_returned_after_shutdown() {
        let server = MockServer::new(ServeBehaviour::FailAfter(Duration::from_millis(20)));
        let err = Orchestrator::new(Duration::from_secs(1))
            .run(&CancellationToken::new(), server.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::Serve(ServerError::Other(_))));
        assert_eq!(server.shutdowns(), 1);
    }

    #[tokio::test]
    async fn test_closed_server_is_a_clean_stop() {
        let server = MockServer::new(ServeBehaviour::ReturnClosed);
        Orchestrator::new(Duration::from_secs(1))
            .run(&CancellationToken::new(), server.clone())
            .await
            .unwrap();
        assert_eq!(server.shutdowns(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_timeout_is_returned() {
        let server = Arc::new(MockServer {
            serve: ServeBehaviour::UntilShutdown,
            stuck_shutdown: true,
            stop: CancellationToken::new(),
            shutdowns: AtomicUsize::new(0),
        });
        let parent = CancellationToken::new();
        parent.cancel();

        let err = Orchestrator::new(Duration::from_millis(50))
            .run(&parent, server.clone())
            .await
            .unwrap_err();

        match err {
            RunError::Shutdown(e) => assert!(e.is_timeout()),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(server.shutdowns(), 1);
    }

    #[test]
    fn test_negative_seconds_clamp_to_zero() {
        assert_eq!(seconds(-5), Duration::ZERO);
        assert_eq!(seconds(10), Duration::from_secs(10));
    }
}

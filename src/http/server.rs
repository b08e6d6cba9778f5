//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Wrap the registered API router in the shared middleware stack
//! - Serve on a pre-bound listener until asked to stop
//! - Drain in-flight requests on shutdown, bounded by the caller's context

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::{self, Next},
    response::Response,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::{
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    timeout::{RequestBodyTimeoutLayer, ResponseBodyTimeoutLayer, TimeoutLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use uuid::Uuid;

use crate::config::schema::{SERVER_READ_TIMEOUT, SERVER_REQUEST_TIMEOUT, SERVER_WRITE_TIMEOUT};
use crate::config::{ConfigStore, Variable};
use crate::lifecycle::context::ShutdownContext;
use crate::lifecycle::shutdown::{ServerControl, ServerError};
use crate::lifecycle::startup::Serve;
use crate::observability::metrics;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Per-request time limits. `None` disables a limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HttpTimeouts {
    /// Whole request, handler included.
    pub request: Option<Duration>,
    /// Reading the request body.
    pub read: Option<Duration>,
    /// Streaming the response body.
    pub write: Option<Duration>,
}

impl HttpTimeouts {
    /// Read the `SERVER_*_TIMEOUT` seconds; zero or negative disables a limit.
    pub fn from_store(store: &ConfigStore) -> Self {
        let secs = |key: Variable<i64>| {
            let value = store.get_i64(key);
            (value > 0).then(|| Duration::from_secs(value as u64))
        };

        Self {
            request: secs(SERVER_REQUEST_TIMEOUT),
            read: secs(SERVER_READ_TIMEOUT),
            write: secs(SERVER_WRITE_TIMEOUT),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServeState {
    Idle,
    Serving,
    Stopped,
}

/// HTTP server for the registered API.
pub struct HttpServer {
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    router: Router,
    stop: CancellationToken,
    shutdown_called: AtomicBool,
    state: watch::Sender<ServeState>,
}

impl HttpServer {
    /// Bind `addr` and prepare to serve `router`.
    pub async fn bind(
        addr: SocketAddr,
        router: Router,
        timeouts: HttpTimeouts,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Self::from_listener(listener, router, timeouts)
    }

    /// Serve on an already bound listener.
    pub fn from_listener(
        listener: TcpListener,
        router: Router,
        timeouts: HttpTimeouts,
    ) -> std::io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let (state, _) = watch::channel(ServeState::Idle);

        Ok(Self {
            listener: Mutex::new(Some(listener)),
            local_addr,
            router: Self::build_router(router, timeouts),
            stop: CancellationToken::new(),
            shutdown_called: AtomicBool::new(false),
            state,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wrap `router` in the middleware stack. The last layer added runs first.
    #[allow(deprecated)]
    fn build_router(mut router: Router, timeouts: HttpTimeouts) -> Router {
        if let Some(write) = timeouts.write {
            router = router.layer(ResponseBodyTimeoutLayer::new(write));
        }
        if let Some(read) = timeouts.read {
            router = router.layer(RequestBodyTimeoutLayer::new(read));
        }
        if let Some(request) = timeouts.request {
            router = router.layer(TimeoutLayer::new(request));
        }

        router
            .layer(middleware::from_fn(track_requests))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(|req: &Request<Body>| {
                        let request_id = req
                            .headers()
                            .get(X_REQUEST_ID)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("unknown");
                        tracing::info_span!(
                            "request",
                            method = %req.method(),
                            uri = %req.uri(),
                            request_id = %request_id,
                        )
                    })
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, NewRequestId))
    }
}

/// UUID v4 for requests that arrive without an `x-request-id`.
#[derive(Debug, Clone, Copy, Default)]
struct NewRequestId;

impl MakeRequestId for NewRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

async fn track_requests(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let res = next.run(req).await;
    metrics::record_request(&method, res.status().as_u16(), start);
    res
}

#[async_trait]
impl Serve for HttpServer {
    /// Serve until shutdown. A server stopped by shutdown returns `AlreadyClosed`.
    async fn serve(&self) -> Result<(), ServerError> {
        // Shutdown subscribes under the same lock, so it either sees `Serving`
        // or finds `stop` cancelled here.
        let listener = {
            let mut slot = self
                .listener
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if self.stop.is_cancelled() {
                return Err(ServerError::AlreadyClosed);
            }
            let listener = slot
                .take()
                .ok_or_else(|| ServerError::Other("server is already serving".to_string()))?;
            self.state.send_replace(ServeState::Serving);
            listener
        };

        tracing::info!(address = %self.local_addr, "HTTP server starting");

        let result = axum::serve(listener, self.router.clone())
            .with_graceful_shutdown(self.stop.clone().cancelled_owned())
            .await;

        self.state.send_replace(ServeState::Stopped);
        match result {
            Ok(()) => {
                tracing::info!("HTTP server stopped");
                Err(ServerError::AlreadyClosed)
            }
            Err(e) => Err(ServerError::Io(e)),
        }
    }
}

#[async_trait]
impl ServerControl for HttpServer {
    async fn shutdown(&self, ctx: &ShutdownContext) -> Result<(), ServerError> {
        if self.shutdown_called.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyClosed);
        }
        self.stop.cancel();

        let mut state = {
            let _slot = self
                .listener
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            self.state.subscribe()
        };
        tokio::select! {
            biased;
            drained = async { state.wait_for(|s| *s != ServeState::Serving).await.is_ok() } => {
                if drained {
                    Ok(())
                } else {
                    Err(ServerError::Other("server state channel closed".to_string()))
                }
            }
            err = ctx.done() => Err(ServerError::Context(err)),
        }
    }
}

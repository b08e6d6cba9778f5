//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use api_runtime::api::{default_bundles, register_all, Api, ApiBundle, BundleError};
use api_runtime::config::{schema, ConfigStore, EnvLoader};
use api_runtime::flags::{FeatureProvider, NoopProvider};
use api_runtime::http::{HttpServer, HttpTimeouts};
use api_runtime::lifecycle::{Orchestrator, RunError};
use api_runtime::storage::CLICKHOUSE_DSN;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Options applied to a test server before it starts.
pub struct TestServerConfig {
    store: ConfigStore,
    bundles: Option<Vec<ApiBundle>>,
    provider: Arc<dyn FeatureProvider>,
    shutdown_timeout: Duration,
}

pub type TestOption = Box<dyn FnOnce(&mut TestServerConfig)>;

/// Serve with `store` instead of the default configuration.
pub fn with_config(store: ConfigStore) -> TestOption {
    Box::new(move |cfg| cfg.store = store)
}

/// The first bundle replaces the defaults; later ones are appended.
pub fn with_bundle(bundle: ApiBundle) -> TestOption {
    Box::new(move |cfg| cfg.bundles.get_or_insert_with(Vec::new).push(bundle))
}

pub fn with_provider(provider: Arc<dyn FeatureProvider>) -> TestOption {
    Box::new(move |cfg| cfg.provider = provider)
}

pub fn with_shutdown_timeout(timeout: Duration) -> TestOption {
    Box::new(move |cfg| cfg.shutdown_timeout = timeout)
}

/// Default configuration without consulting the process environment.
pub fn default_store() -> ConfigStore {
    let mut loader = EnvLoader::with_lookup(|_| None);
    schema::register_defaults(&mut loader);
    loader
        .finish()
        .unwrap()
        .with(CLICKHOUSE_DSN, "clickhouse://localhost:9000/default".to_string())
}

/// A running server on an ephemeral loopback port.
pub struct TestServer {
    addr: SocketAddr,
    parent: CancellationToken,
    handle: JoinHandle<Result<(), RunError>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Cancel the server's parent context and wait for the orchestrator.
    pub async fn stop(self) -> Result<(), RunError> {
        self.parent.cancel();
        self.handle.await.unwrap()
    }
}

/// Register the bundles and start serving through the orchestrator.
pub async fn create_server(opts: Vec<TestOption>) -> Result<TestServer, BundleError> {
    let mut cfg = TestServerConfig {
        store: default_store(),
        bundles: None,
        provider: Arc::new(NoopProvider),
        shutdown_timeout: Duration::from_secs(2),
    };
    for opt in opts {
        opt(&mut cfg);
    }
    let bundles = cfg.bundles.unwrap_or_else(default_bundles);

    let mut api = Api::new("Test API", "1.0.0", cfg.provider);
    register_all(&cfg.store, &mut api, &bundles)?;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = Arc::new(
        HttpServer::from_listener(listener, api.into_router(), HttpTimeouts::from_store(&cfg.store))
            .unwrap(),
    );
    let addr = server.local_addr();

    let parent = CancellationToken::new();
    let token = parent.clone();
    let orchestrator = Orchestrator::new(cfg.shutdown_timeout);
    let handle = tokio::spawn(async move { orchestrator.run(&token, server).await });

    Ok(TestServer {
        addr,
        parent,
        handle,
    })
}

/// Start a mock GO Feature Flag relay answering OFREP evaluations from `flags`.
pub async fn start_flag_relay(healthy: bool, flags: HashMap<String, Value>) -> SocketAddr {
    async fn health(State((healthy, _)): State<(bool, Arc<HashMap<String, Value>>)>) -> StatusCode {
        if healthy {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }

    async fn evaluate(
        State((_, flags)): State<(bool, Arc<HashMap<String, Value>>)>,
        Path(key): Path<String>,
    ) -> (StatusCode, Json<Value>) {
        match flags.get(&key) {
            Some(value) => (
                StatusCode::OK,
                Json(json!({ "key": key, "value": value, "reason": "STATIC" })),
            ),
            None => (
                StatusCode::NOT_FOUND,
                Json(json!({ "key": key, "errorCode": "FLAG_NOT_FOUND" })),
            ),
        }
    }

    let app = Router::new()
        .route("/health", get(health))
        .route("/ofrep/v1/evaluate/flags/{key}", post(evaluate))
        .with_state((healthy, Arc::new(flags)));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

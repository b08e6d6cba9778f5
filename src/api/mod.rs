//! Endpoint registration surface.
//!
//! # Data Flow
//! ```text
//! bundle(store, &mut Api)
//!     → keys_registered (fail fast on missing config)
//!     → Api::group(prefix).register(Operation, handler)
//!     → catalogue of operations + axum Router
//!     → Api::into_router (adds /openapi.json) → http::server
//! ```

pub mod bundle;
pub mod hub;
pub mod ingestion;
pub mod organisations;
pub mod users;

use std::sync::Arc;

use axum::{
    handler::Handler,
    http::Method,
    routing::{get, on, MethodFilter},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::flags::{EvaluationContext, FeatureProvider};

pub use bundle::{bundle_by_name, default_bundles, register_all, ApiBundle, BundleError};

pub const OPENAPI_PATH: &str = "/openapi.json";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistrationError {
    #[error("operation id {0} already registered")]
    DuplicateOperation(String),
    #[error("route {method} {path} already registered")]
    DuplicateRoute { method: Method, path: String },
    #[error("unsupported method {0}")]
    UnsupportedMethod(Method),
    #[error("invalid path {0:?}: must start with '/'")]
    InvalidPath(String),
}

/// Description of one HTTP operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub operation_id: String,
    pub method: Method,
    pub path: String,
    pub tags: Vec<String>,
    pub summary: Option<String>,
}

impl Operation {
    pub fn new(operation_id: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            method,
            path: path.into(),
            tags: Vec::new(),
            summary: None,
        }
    }

    pub fn get(operation_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(operation_id, Method::GET, path)
    }

    pub fn post(operation_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(operation_id, Method::POST, path)
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

/// The shared API handle bundles register against.
pub struct Api {
    title: String,
    version: String,
    router: Router,
    operations: Vec<Operation>,
    flags: Arc<dyn FeatureProvider>,
}

impl Api {
    pub fn new(
        title: impl Into<String>,
        version: impl Into<String>,
        flags: Arc<dyn FeatureProvider>,
    ) -> Self {
        Self {
            title: title.into(),
            version: version.into(),
            router: Router::new(),
            operations: Vec::new(),
            flags,
        }
    }

    /// The feature-flag provider handlers should evaluate against.
    pub fn flags(&self) -> Arc<dyn FeatureProvider> {
        self.flags.clone()
    }

    /// Every operation registered so far, in registration order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Register `handler` for `op`. Synchronous; fails without side effects.
    pub fn register<H, T>(&mut self, op: Operation, handler: H) -> Result<(), RegistrationError>
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        let shape = parse_path(&op.path)?;
        if self.operations.iter().any(|o| o.operation_id == op.operation_id) {
            return Err(RegistrationError::DuplicateOperation(op.operation_id));
        }

        let reserved = op.method == Method::GET && op.path == OPENAPI_PATH;
        let taken = self.operations.iter().any(|o| {
            if o.path == op.path {
                // Identical paths share one method router.
                o.method == op.method
            } else {
                parse_path(&o.path).is_ok_and(|existing| conflicts(&existing, &shape))
            }
        });
        if reserved || taken {
            return Err(RegistrationError::DuplicateRoute {
                method: op.method,
                path: op.path,
            });
        }
        let filter = MethodFilter::try_from(op.method.clone())
            .map_err(|_| RegistrationError::UnsupportedMethod(op.method.clone()))?;

        let router = std::mem::take(&mut self.router);
        self.router = router.route(&op.path, on(filter, handler));

        tracing::debug!(
            operation_id = %op.operation_id,
            method = %op.method,
            path = %op.path,
            "Operation registered"
        );
        self.operations.push(op);
        Ok(())
    }

    /// A view of this API that prefixes every registered path.
    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        Group {
            prefix: prefix.trim_end_matches('/').to_string(),
            api: self,
        }
    }

    /// Minimal OpenAPI 3.1 document describing the registered operations.
    pub fn openapi(&self) -> Value {
        let mut paths = Map::new();
        for op in &self.operations {
            let entry = paths
                .entry(op.path.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(methods) = entry {
                let mut doc = json!({
                    "operationId": op.operation_id,
                    "tags": op.tags,
                    "responses": { "200": { "description": "OK" } },
                });
                if let Some(summary) = &op.summary {
                    doc["summary"] = Value::String(summary.clone());
                }
                methods.insert(op.method.as_str().to_lowercase(), doc);
            }
        }

        json!({
            "openapi": "3.1.0",
            "info": { "title": self.title, "version": self.version },
            "paths": paths,
        })
    }

    /// Finish registration; the returned router also serves `/openapi.json`.
    pub fn into_router(self) -> Router {
        let doc = Arc::new(self.openapi());
        self.router.route(
            OPENAPI_PATH,
            get(move || {
                let doc = doc.clone();
                async move { Json(doc.as_ref().clone()) }
            }),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
    CatchAll,
}

/// Split a route into segments, accepting only `{name}` and a trailing
/// `{*name}` as captures.
fn parse_path(path: &str) -> Result<Vec<Segment>, RegistrationError> {
    let invalid = || RegistrationError::InvalidPath(path.to_string());
    let rest = path.strip_prefix('/').ok_or_else(invalid)?;
    let raw: Vec<&str> = rest.split('/').collect();

    let mut segments = Vec::with_capacity(raw.len());
    for (i, seg) in raw.iter().enumerate() {
        if seg.starts_with(':') {
            return Err(invalid());
        }
        if !seg.contains(|c| c == '{' || c == '}') {
            segments.push(Segment::Static(seg.to_string()));
            continue;
        }

        let capture = seg
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .ok_or_else(invalid)?;
        let (catch_all, name) = match capture.strip_prefix('*') {
            Some(name) => (true, name),
            None => (false, capture),
        };
        if name.is_empty() || name.contains(|c| matches!(c, '{' | '}' | '*' | ':')) {
            return Err(invalid());
        }
        if catch_all {
            if i + 1 != raw.len() {
                return Err(invalid());
            }
            segments.push(Segment::CatchAll);
        } else {
            segments.push(Segment::Param(name.to_string()));
        }
    }
    Ok(segments)
}

/// Whether two distinct route strings would match the same requests.
///
/// Static segments may overlap captures. Captures at the same position must
/// share a name, and a catch-all overlaps any capture.
fn conflicts(a: &[Segment], b: &[Segment]) -> bool {
    for (x, y) in a.iter().zip(b) {
        match (x, y) {
            (Segment::Static(p), Segment::Static(q)) if p == q => continue,
            (Segment::Static(_), _) | (_, Segment::Static(_)) => return false,
            (Segment::Param(n), Segment::Param(m)) if n == m => continue,
            _ => return true,
        }
    }
    a.len() == b.len()
}

/// A prefixed view of an [`Api`].
pub struct Group<'a> {
    api: &'a mut Api,
    prefix: String,
}

impl Group<'_> {
    pub fn register<H, T>(&mut self, mut op: Operation, handler: H) -> Result<(), RegistrationError>
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        if !op.path.starts_with('/') {
            return Err(RegistrationError::InvalidPath(op.path));
        }
        op.path = format!("{}{}", self.prefix, op.path);
        self.api.register(op, handler)
    }

    pub fn flags(&self) -> Arc<dyn FeatureProvider> {
        self.api.flags()
    }
}

/// Flag every placeholder root endpoint reports.
pub const TEST_FLAG_KEY: &str = "test-flag";

/// Body of the placeholder root endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct RootResponse {
    #[serde(rename = "$schema")]
    pub schema: &'static str,
    pub message: &'static str,
    pub test_feature_flag: bool,
}

/// Register `GET <prefix>/` answering with `message` and the evaluated test flag.
pub(crate) fn register_root(
    group: &mut Group<'_>,
    operation_id: &str,
    tag: &str,
    message: &'static str,
    flag_default: bool,
) -> Result<(), RegistrationError> {
    let flags = group.flags();
    let handler = move || {
        let flags = flags.clone();
        async move {
            let test_feature_flag = flags
                .boolean_value(TEST_FLAG_KEY, flag_default, &EvaluationContext::default())
                .await;
            Json(RootResponse {
                schema: OPENAPI_PATH,
                message,
                test_feature_flag,
            })
        }
    };

    group.register(
        Operation::get(operation_id, "/")
            .tag(tag)
            .summary("Bootstrap root endpoint"),
        handler,
    )
}

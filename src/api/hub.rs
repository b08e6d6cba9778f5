//! Hub API bundle (`/api/hub`).
//!
//! The hub is backed by the analytical store. The storage driver is acquired
//! only after the configuration check passes, so a missing key never leaves a
//! half-initialised connection behind. `CLICKHOUSE_DSN` is required only when
//! no driver was injected with [`with_storage_driver`].

use std::sync::Arc;

use axum::{http::StatusCode, Json};
use serde_json::json;

use crate::api::{register_root, Api, ApiBundle, BundleError, Operation};
use crate::config::{ConfigStore, RequiredKey, Variable};
use crate::storage::{self, StorageDriver, CLICKHOUSE_DSN};

/// Bootstrap flag; default for the root endpoint's `test-flag` evaluation.
pub const HUB_API_TEST_FLAG: Variable<bool> = Variable::new("HUB_API_TEST_FLAG");

/// Overrides applied when the bundle is built.
#[derive(Default, Clone)]
pub struct HubOptions {
    storage: Option<Arc<dyn StorageDriver>>,
}

/// A single mutation of [`HubOptions`].
pub type HubOption = Box<dyn FnOnce(&mut HubOptions) + Send>;

/// Use `driver` instead of connecting with `CLICKHOUSE_DSN`.
pub fn with_storage_driver(driver: Arc<dyn StorageDriver>) -> HubOption {
    Box::new(move |opts| opts.storage = Some(driver))
}

/// Build the hub bundle; options are applied in order and then frozen.
pub fn bundle<I>(options: I) -> ApiBundle
where
    I: IntoIterator<Item = HubOption>,
{
    let mut opts = HubOptions::default();
    for apply in options {
        apply(&mut opts);
    }

    Arc::new(move |store: &ConfigStore, api: &mut Api| register(store, api, &opts))
}

fn register(store: &ConfigStore, api: &mut Api, opts: &HubOptions) -> Result<(), BundleError> {
    let mut required: Vec<&dyn RequiredKey> = vec![&HUB_API_TEST_FLAG];
    if opts.storage.is_none() {
        required.push(&CLICKHOUSE_DSN);
    }
    store.keys_registered(&required)?;

    let driver = match &opts.storage {
        Some(driver) => driver.clone(),
        None => storage::connect(&store.get_string(CLICKHOUSE_DSN))?,
    };
    tracing::debug!(driver = driver.name(), "Hub storage driver acquired");

    let mut group = api.group("/api/hub");
    register_root(
        &mut group,
        "HubRoot",
        "Hub",
        "Hub API root endpoint.",
        store.get_bool(HUB_API_TEST_FLAG),
    )?;

    let health = move || {
        let driver = driver.clone();
        async move {
            match driver.ping().await {
                Ok(()) => (
                    StatusCode::OK,
                    Json(json!({ "status": "ok", "storage": driver.name() })),
                ),
                Err(e) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "status": "unavailable", "error": e.to_string() })),
                ),
            }
        }
    };
    group.register(
        Operation::get("HubHealth", "/health")
            .tag("Hub")
            .summary("Storage reachability"),
        health,
    )?;

    Ok(())
}

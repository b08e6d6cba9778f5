//! Bundle composition.
//!
//! A bundle is a function taking the configuration and the API handle and
//! registering zero or more operations. Bundles are applied in order and the
//! first failure stops registration. Operations registered by earlier
//! bundles stay registered; a failed startup is expected to exit.

use std::sync::Arc;

use thiserror::Error;

use crate::api::{hub, ingestion, organisations, users, Api, RegistrationError};
use crate::config::{ConfigError, ConfigStore};
use crate::observability::metrics;
use crate::storage::StorageError;

/// Why a bundle refused to register.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A unit of API composition.
pub type ApiBundle = Arc<dyn Fn(&ConfigStore, &mut Api) -> Result<(), BundleError> + Send + Sync>;

/// Apply `bundles` in order, stopping at the first failure.
///
/// The failing bundle's error is returned unchanged.
pub fn register_all(
    store: &ConfigStore,
    api: &mut Api,
    bundles: &[ApiBundle],
) -> Result<(), BundleError> {
    for (index, bundle) in bundles.iter().enumerate() {
        if let Err(e) = bundle(store, api) {
            tracing::error!(bundle = index, error = %e, "Bundle registration failed");
            return Err(e);
        }
        metrics::record_bundle_registered();
    }

    tracing::info!(
        bundles = bundles.len(),
        operations = api.operations().len(),
        "API bundles registered"
    );
    Ok(())
}

/// Bundles served by the default runtime.
pub fn default_bundles() -> Vec<ApiBundle> {
    vec![ingestion::bundle(), hub::bundle(Vec::new())]
}

/// Look up a bundle by its CLI name.
pub fn bundle_by_name(name: &str) -> Option<ApiBundle> {
    match name {
        "hub" => Some(hub::bundle(Vec::new())),
        "ingestion" => Some(ingestion::bundle()),
        "organisations" => Some(organisations::bundle()),
        "users" => Some(users::bundle()),
        _ => None,
    }
}

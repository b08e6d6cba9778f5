//! Ingestion API bundle (`/api/ingestion`).
//!
//! Entry point for client data ingestion. Only the bootstrap root endpoint
//! exists so far.

use std::sync::Arc;

use crate::api::{register_root, Api, ApiBundle, BundleError};
use crate::config::{ConfigStore, Variable};

/// Bootstrap flag; default for the root endpoint's `test-flag` evaluation.
pub const INGESTION_API_TEST_FLAG: Variable<bool> = Variable::new("INGESTION_API_TEST_FLAG");

pub fn bundle() -> ApiBundle {
    Arc::new(register)
}

/// Register the Ingestion API on `api`.
pub fn register(store: &ConfigStore, api: &mut Api) -> Result<(), BundleError> {
    store.keys_registered(&[&INGESTION_API_TEST_FLAG])?;

    let mut group = api.group("/api/ingestion");
    register_root(
        &mut group,
        "IngestionRoot",
        "Ingestion",
        "Ingestion API root endpoint.",
        store.get_bool(INGESTION_API_TEST_FLAG),
    )?;
    Ok(())
}

//! Organisations API bundle (`/api/organisations`).

use std::sync::Arc;

use crate::api::{register_root, Api, ApiBundle, BundleError};
use crate::config::{ConfigStore, Variable};

pub const ORGANISATIONS_API_TEST_FLAG: Variable<bool> = Variable::new("ORGANISATIONS_API_TEST_FLAG");

pub fn bundle() -> ApiBundle {
    Arc::new(register)
}

pub fn register(store: &ConfigStore, api: &mut Api) -> Result<(), BundleError> {
    store.keys_registered(&[&ORGANISATIONS_API_TEST_FLAG])?;

    let mut group = api.group("/api/organisations");
    register_root(
        &mut group,
        "OrganisationsRoot",
        "Organisations",
        "Organisations API root endpoint.",
        store.get_bool(ORGANISATIONS_API_TEST_FLAG),
    )?;
    Ok(())
}

//! Users API bundle (`/api/users`).

use std::sync::Arc;

use crate::api::{register_root, Api, ApiBundle, BundleError};
use crate::config::{ConfigStore, Variable};

/// Bootstrap flag; default for the root endpoint's `test-flag` evaluation.
pub const USERS_API_TEST_FLAG: Variable<bool> = Variable::new("USERS_API_TEST_FLAG");

pub fn bundle() -> ApiBundle {
    Arc::new(register)
}

/// Register the Users API on `api`.
pub fn register(store: &ConfigStore, api: &mut Api) -> Result<(), BundleError> {
    store.keys_registered(&[&USERS_API_TEST_FLAG])?;

    let mut group = api.group("/api/users");
    register_root(
        &mut group,
        "UsersRoot",
        "Users",
        "Users API root endpoint.",
        store.get_bool(USERS_API_TEST_FLAG),
    )?;
    Ok(())
}

//! Server-wide configuration variables and their defaults.
//!
//! Bundle-specific variables are declared next to the bundle that consumes
//! them; this module only gathers them into the process loader.

use std::path::Path;

use crate::api::{hub, ingestion, organisations, users};
use crate::config::{ConfigStore, EnvLoader, LoadError, Variable};
use crate::storage::CLICKHOUSE_DSN;

/* Feature flags */
pub const SERVER_OPENFEATURE_PROVIDER_NAME: Variable<String> =
    Variable::new("SERVER_OPENFEATURE_PROVIDER_NAME");
pub const SERVER_OPENFEATURE_PROVIDER_URL: Variable<String> =
    Variable::new("SERVER_OPENFEATURE_PROVIDER_URL");

/* HTTP server, timeouts in seconds */
pub const SERVER_PORT: Variable<i64> = Variable::new("SERVER_PORT");
pub const SERVER_REQUEST_TIMEOUT: Variable<i64> = Variable::new("SERVER_REQUEST_TIMEOUT");
pub const SERVER_SHUTDOWN_TIMEOUT: Variable<i64> = Variable::new("SERVER_SHUTDOWN_TIMEOUT");
pub const SERVER_READ_TIMEOUT: Variable<i64> = Variable::new("SERVER_READ_TIMEOUT");
pub const SERVER_WRITE_TIMEOUT: Variable<i64> = Variable::new("SERVER_WRITE_TIMEOUT");

/* Observability */
pub const SERVER_LOG_LEVEL: Variable<String> = Variable::new("SERVER_LOG_LEVEL");
pub const SERVER_LOG_FORMAT: Variable<String> = Variable::new("SERVER_LOG_FORMAT");
pub const SERVER_METRICS_ENABLED: Variable<bool> = Variable::new("SERVER_METRICS_ENABLED");
pub const SERVER_METRICS_ADDRESS: Variable<String> = Variable::new("SERVER_METRICS_ADDRESS");

/// Register every known variable with its default on `loader`.
pub fn register_defaults(loader: &mut EnvLoader) {
    loader
        .load(SERVER_OPENFEATURE_PROVIDER_NAME, String::new())
        .load(SERVER_OPENFEATURE_PROVIDER_URL, String::new())
        .load(SERVER_PORT, 8080)
        .load(SERVER_REQUEST_TIMEOUT, 30)
        .load(SERVER_SHUTDOWN_TIMEOUT, 10)
        .load(SERVER_READ_TIMEOUT, 10)
        .load(SERVER_WRITE_TIMEOUT, 10)
        .load(SERVER_LOG_LEVEL, "info".to_string())
        .load(SERVER_LOG_FORMAT, "json".to_string())
        .load(SERVER_METRICS_ENABLED, false)
        .load(SERVER_METRICS_ADDRESS, "0.0.0.0:9090".to_string())
        .load(CLICKHOUSE_DSN, String::new())
        .load(ingestion::INGESTION_API_TEST_FLAG, false)
        .load(hub::HUB_API_TEST_FLAG, false)
        .load(organisations::ORGANISATIONS_API_TEST_FLAG, false)
        .load(users::USERS_API_TEST_FLAG, false);
}

/// Build the process configuration from the environment, optionally layered
/// over a TOML file.
pub fn load(path: Option<&Path>) -> Result<ConfigStore, LoadError> {
    let mut loader = EnvLoader::from_env();
    if let Some(path) = path {
        loader = loader.with_file(path)?;
    }
    register_defaults(&mut loader);
    loader.finish()
}

//! Storage driver interface.
//!
//! Bundles that persist data depend on [`StorageDriver`] only. Connection
//! pooling, queries and migrations live behind this trait and are not part of
//! the bootstrap layer; [`connect`] validates the DSN and hands out a driver
//! that connects lazily.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::config::Variable;

pub const CLICKHOUSE_DSN: Variable<String> = Variable::new("CLICKHOUSE_DSN");

const SUPPORTED_SCHEMES: &[&str] = &["clickhouse", "tcp", "http", "https"];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage dsn not set")]
    MissingDsn,
    #[error("invalid storage dsn {dsn:?}: {reason}")]
    InvalidDsn { dsn: String, reason: String },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Handle to an analytical store.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Short driver name used in logs.
    fn name(&self) -> &str;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), StorageError>;
}

/// Driver produced by [`connect`]. Holds the validated endpoint only.
#[derive(Debug, Clone)]
pub struct DsnDriver {
    endpoint: Url,
}

impl DsnDriver {
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl StorageDriver for DsnDriver {
    fn name(&self) -> &str {
        "clickhouse"
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Validate `dsn` and build a driver for it.
pub fn connect(dsn: &str) -> Result<Arc<dyn StorageDriver>, StorageError> {
    if dsn.is_empty() {
        return Err(StorageError::MissingDsn);
    }

    let endpoint = Url::parse(dsn).map_err(|e| StorageError::InvalidDsn {
        dsn: dsn.to_string(),
        reason: e.to_string(),
    })?;

    if !SUPPORTED_SCHEMES.contains(&endpoint.scheme()) {
        return Err(StorageError::InvalidDsn {
            dsn: dsn.to_string(),
            reason: format!("unsupported scheme {}", endpoint.scheme()),
        });
    }
    if endpoint.host_str().is_none() {
        return Err(StorageError::InvalidDsn {
            dsn: dsn.to_string(),
            reason: "missing host".to_string(),
        });
    }

    tracing::debug!(host = ?endpoint.host_str(), scheme = endpoint.scheme(), "Storage driver created");
    Ok(Arc::new(DsnDriver { endpoint }))
}

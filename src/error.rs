//! Top-level runtime errors.

use std::net::SocketAddr;

use thiserror::Error;

use crate::api::BundleError;
use crate::config::loader::LoadError;
use crate::flags::FlagError;
use crate::lifecycle::RunError;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error(transparent)]
    Flags(#[from] FlagError),
    #[error("failed to register bundles: {0}")]
    Bundle(#[from] BundleError),
    #[error("invalid SERVER_PORT {0}")]
    InvalidPort(i64),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Run(#[from] RunError),
}

impl RuntimeError {
    /// Failed before any traffic was served.
    pub fn is_startup(&self) -> bool {
        !matches!(self, Self::Run(_))
    }
}

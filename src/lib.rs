//! API runtime library: typed configuration, bundle registration and the
//! serve/shutdown lifecycle for an HTTP API process.

pub mod api;
pub mod config;
pub mod error;
pub mod flags;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod storage;

pub use api::{register_all, Api, ApiBundle};
pub use config::ConfigStore;
pub use error::RuntimeError;
pub use http::HttpServer;
pub use lifecycle::{handle_shutdown, Orchestrator};

//! HTTP serving subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (request ID, trace span, metrics, timeouts)
//!     → router built by api::Api::into_router
//!     → bundle handler
//! ```

pub mod server;

pub use server::{HttpServer, HttpTimeouts, X_REQUEST_ID};

//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Select flag provider → Register bundles → Bind listener → Orchestrator::run
//!
//! Run (startup.rs):
//!     serve() in background ──┐
//!     signal / parent cancel ─┴→ first wins → handle_shutdown
//!
//! Shutdown (shutdown.rs):
//!     ShutdownContext (deadline) → ServerControl::shutdown → classify result
//!
//! Signals (signals.rs):
//!     SIGHUP/SIGINT/SIGTERM/SIGQUIT → cancel serving token
//! ```
//!
//! # Design Decisions
//! - Shutdown is always attempted exactly once, even after the server stopped
//! - Shutdown has a timeout: a deadline overrun is reported, never awaited forever

pub mod context;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use context::{ContextError, ShutdownContext};
pub use shutdown::{handle_shutdown, ServerControl, ServerError, ShutdownError};
pub use startup::{start, LifecycleState, Orchestrator, RunError, Serve};

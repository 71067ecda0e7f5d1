//! vCloud Director control-plane access.
//!
//! Provides the session traits the driver programs against, the typed JSON
//! representations of the API objects it touches, the reqwest-backed client,
//! and the task wait loop.

pub mod api;
pub mod client;
pub mod task;
pub mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use api::{Connector, Credentials, Session};
pub use client::HttpConnector;
pub use task::{TaskWait, wait_for_task};

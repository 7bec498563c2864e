//! Heartbeat monitor service
//!
//! Runs the heartbeat monitor as a process: settings loading, the HTTP read
//! API and an optional loopback responder for local runs.

pub mod handler;
pub mod loopback;
pub mod settings;

pub use handler::{create_router, AppState};
pub use settings::Settings;

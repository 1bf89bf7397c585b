//! Council client
//!
//! Drives staged council deliberations streamed from the backend and keeps
//! an observable chat state in sync with them.

pub mod api;
pub mod config;
pub mod ranking;
pub mod session;
pub mod state;
pub mod stream;

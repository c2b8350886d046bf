// API crate clippy configuration
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Pauta API Server
//!
//! HTTP surface for the subscription lifecycle: public invite routes keyed
//! by token, the gateway webhook receiver, operator back-office routes, and
//! health/consistency reporting. All state-machine logic lives in
//! `pauta-billing`; handlers translate between HTTP and the engine.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;

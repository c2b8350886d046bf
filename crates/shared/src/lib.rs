//! Shared domain types and database helpers for the Pauta workspace.

pub mod db;
pub mod types;

pub use db::{create_migration_pool, create_pool, run_migrations};
pub use types::{Commitment, InviteStatus, Tier};

//! Storage module for StackleVest
//!
//! This module provides the single-file JSON store, the persisted models,
//! and the repositories the auth layer works through.

pub mod models;
pub mod repositories;
pub mod store;

// Re-export commonly used items
pub use models::*;
pub use repositories::{SessionRepository, UserRepository, UserRepositoryError};
pub use store::{JsonStore, StoreError};

//! Repositories over the JSON store
//!
//! Each repository owns one collection of the store document and exposes
//! the read, create, update-by-match and delete-by-match operations for it.

pub mod session;
pub mod user;

pub use session::SessionRepository;
pub use user::{UserRepository, UserRepositoryError};

//! Users module for StackleVest
//!
//! Credential CRUD for administrative callers. Every record leaving this
//! module is a `UserResponse`, never a stored password.

pub mod service;

pub use service::{CreateUserRequest, UpdateUserRequest, UserService, UserServiceError};

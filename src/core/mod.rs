//! Core domain models and business logic for credentials and sessions

pub mod auth;
pub mod config;
pub mod db;
pub mod users;

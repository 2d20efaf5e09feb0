//! StackleVest - credential and session backend
//!
//! Password login with transparent hash upgrade, short-lived JWT access
//! tokens and rotating refresh-token sessions, all persisted in a single
//! JSON file.

pub mod core;

//! virtrun command-line library.
//!
//! Exposes the binary's modules for integration testing; `virtrun` itself
//! is built from main.rs.

pub mod cli;
pub mod commands;
pub mod error;
pub mod job;
pub mod logging;
pub mod shell;

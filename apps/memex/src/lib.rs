//! # memex
//!
//! Library half of the Memex binary: the HTTP API, the CLI and the
//! configuration layer. `main.rs` only initialises tracing and dispatches.

pub mod api;
pub mod cli;
pub mod config;

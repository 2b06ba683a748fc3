//! Kiln CLI - build front-end bundles and serve them with live reload.
//!
//! - [`cli`] - Argument definitions
//! - [`config`] - Layered configuration loading with figment
//! - [`commands`] - `serve` and `build`
//! - [`error`] - CLI error types and miette conversion
//! - [`logger`] - tracing subscriber setup

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logger;

pub use error::{CliError, ConfigError, Result};

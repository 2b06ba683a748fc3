//! Error handling for the kiln CLI.
//!
//! Engine errors are wrapped as they are; the CLI adds configuration loading,
//! server and output failures. `main` turns the result into a miette report.

use miette::Report;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Errors from the engine
    #[error(transparent)]
    Engine(#[from] kiln::Error),

    /// I/O errors from file system operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// The bundler could not be run; details were logged
    #[error("Build did not run\n\nHint: Check that the bundler is installed or pass --esbuild <PROGRAM>")]
    NoOutput,

    /// The build ran and reported errors
    #[error("Build failed with {errors} error(s)")]
    BuildFailed {
        /// Number of compile errors
        errors: usize,
    },
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly named config file doesn't exist
    #[error("Config file not found: {}\n\nHint: Create a kiln.toml file or check the --config path", .0.display())]
    NotFound(PathBuf),

    /// Config file extension is not one figment can read
    #[error("Unsupported config format: {}\n\nHint: Use a .toml, .json, .yaml or .yml file", .0.display())]
    UnsupportedFormat(PathBuf),

    /// The merged configuration could not be extracted
    #[error("{0}\n\nHint: Check field names and types in the config file and KILN_* variables")]
    Extract(Box<figment::Error>),

    /// An entry point argument is malformed
    #[error("Invalid entry point {0:?}\n\nHint: Use `path` or `alias=path`")]
    InvalidEntry(String),
}

impl From<kiln::ConfigError> for CliError {
    fn from(err: kiln::ConfigError) -> Self {
        CliError::Engine(kiln::Error::Config(err))
    }
}

/// Result type alias using [`CliError`] as the default error type.
pub type Result<T, E = CliError> = std::result::Result<T, E>;

/// Convert a CLI error into a miette report.
pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        CliError::Engine(kiln::Error::Config(e)) => miette::miette!("Configuration error: {}", e),
        _ => miette::miette!("{}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_error_converts() {
        let err: CliError = kiln::ConfigError::UnknownLoader("svgr".to_string()).into();
        assert!(matches!(
            err,
            CliError::Engine(kiln::Error::Config(kiln::ConfigError::UnknownLoader(_)))
        ));
    }

    #[test]
    fn test_not_found_has_hint() {
        let msg = ConfigError::NotFound(PathBuf::from("kiln.toml")).to_string();
        assert!(msg.contains("kiln.toml"));
        assert!(msg.contains("Hint:"));
    }

    #[test]
    fn test_report_keeps_message() {
        let report = cli_error_to_miette(CliError::BuildFailed { errors: 2 });
        assert_eq!(report.to_string(), "Build failed with 2 error(s)");
    }
}

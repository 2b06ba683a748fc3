//! Error types for the kiln engine.
//!
//! Only [`ConfigError`] is fatal: it stops an engine from being provisioned.
//! Everything else degrades gracefully. A failed bundler invocation keeps the
//! previous snapshot, a failed watch registration skips one file, and a failed
//! stylesheet compile becomes a load error for that one input.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level engine error.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or incomplete engine configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The bundler could not be run at all
    #[error("Bundler invocation failed: {0}")]
    Bundler(#[from] BundlerError),

    /// File watcher could not be created or a path could not be registered
    #[error("File watcher error: {0}")]
    Watch(#[from] WatchError),

    /// Stylesheet compilation failed
    #[error("Stylesheet error: {0}")]
    Sass(#[from] SassError),

    /// I/O errors from file system operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration errors detected at validation time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Missing required configuration field
    #[error("Missing required field: {field}\n\nHint: {hint}")]
    MissingField {
        /// Name of the missing field
        field: String,
        /// Helpful hint for providing the field
        hint: String,
    },

    /// Invalid value for a configuration option
    #[error("Invalid value for '{field}': {value}\n\nHint: {hint}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The invalid value
        value: String,
        /// Helpful hint for correct values
        hint: String,
    },

    /// Loader name outside the known set
    #[error("Unknown loader: {0:?}\n\nHint: Use one of js, jsx, ts, tsx, css, json, text, base64, dataurl, file, binary, default")]
    UnknownLoader(String),
}

/// The bundler call itself failed to run.
///
/// This is distinct from compile diagnostics, which a successful invocation
/// reports as part of its output.
#[derive(Debug, Error)]
pub enum BundlerError {
    /// The bundler executable could not be started
    #[error("Failed to start {program}: {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The bundler ran but its output could not be collected
    #[error("Failed to collect bundler output: {0}")]
    Output(String),

    /// I/O error while staging inputs or reading outputs
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single path could not be registered with the file watcher.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The platform watcher could not be created
    #[error("Failed to create watcher: {0}")]
    Create(#[source] notify::Error),

    /// A path could not be added to the watcher
    #[error("Failed to watch {}: {source}", .path.display())]
    Register {
        /// Path that could not be watched
        path: PathBuf,
        /// Underlying notify error
        #[source]
        source: notify::Error,
    },
}

/// Compiling a single stylesheet failed.
#[derive(Debug, Error)]
pub enum SassError {
    /// The stylesheet could not be opened
    #[error("sass: unable to open {}: {source}", .path.display())]
    Open {
        /// Stylesheet path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The compiler could not be started
    #[error("sass: unable to start compiler {program}: {source}")]
    Spawn {
        /// Compiler executable
        program: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The compiler rejected the stylesheet
    #[error("sass: unable to compile {}: {message}", .path.display())]
    Compile {
        /// Stylesheet path
        path: PathBuf,
        /// Compiler output
        message: String,
    },
}

/// Result type alias using [`Error`] as the default error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_converts_into_error() {
        let err: Error = ConfigError::UnknownLoader("wat".to_string()).into();
        assert!(matches!(err, Error::Config(ConfigError::UnknownLoader(_))));
        assert!(err.to_string().contains("\"wat\""));
    }

    #[test]
    fn test_missing_field_message_has_hint() {
        let err = ConfigError::MissingField {
            field: "sources".to_string(),
            hint: "Provide at least one entry point".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("sources"));
        assert!(msg.contains("Hint: Provide at least one entry point"));
    }

    #[test]
    fn test_sass_error_mentions_path() {
        let err = SassError::Compile {
            path: PathBuf::from("styles/app.scss"),
            message: "expected \";\"".to_string(),
        };
        assert!(err.to_string().contains("styles/app.scss"));
    }
}

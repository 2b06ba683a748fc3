//! Kiln - build front-end entry points and serve the result from memory.
//!
//! The engine compiles a set of entry points with an external bundler, keeps
//! the output in an immutable snapshot for HTTP serving, rebuilds when a file
//! the build read changes, and tells connected browsers to reload.
//!
//! # Architecture
//!
//! - [`coordinator`] - Runs builds one at a time and publishes snapshots
//! - [`snapshot`] - Immutable build output with an O(1) path index
//! - [`manifest`] - Logical entry name to physical output resolution
//! - [`digest`] - Content hashes used as ETags
//! - [`watcher`] - Per-file change detection for the build's inputs
//! - [`live_reload`] - Server-sent reload notifications
//! - [`router`] - axum middleware serving the current snapshot
//! - [`engine`] - Provisioning and shutdown
//! - [`bundler`] / [`stylesheet`] - Contracts with the external compilers,
//!   plus adapters that run the `esbuild` and `sass` executables
//!
//! # Example
//!
//! ```rust,no_run
//! use kiln::{Engine, EngineConfig, EntryPoint, EsbuildCli};
//! use std::sync::Arc;
//!
//! # async fn run() -> kiln::Result<()> {
//! let config = EngineConfig {
//!     sources: vec![EntryPoint::new("src/index.js")],
//!     live_reload: true,
//!     ..EngineConfig::default()
//! };
//! let engine = Engine::provision(config, Arc::new(EsbuildCli::default()), None).await?;
//! let app: axum::Router = engine.layer(axum::Router::new());
//! # let _ = app;
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod bundler;
pub mod config;
pub mod coordinator;
pub mod digest;
pub mod engine;
pub mod env;
pub mod error;
pub mod live_reload;
pub mod loader;
pub mod manifest;
pub mod router;
pub mod shutdown;
pub mod snapshot;
pub mod stylesheet;
pub mod watcher;

pub use bundler::{BuildOptions, BundleOutput, Bundler, EntryPoint, EsbuildCli, OutputFile};
pub use config::EngineConfig;
pub use coordinator::BuildCoordinator;
pub use digest::Digest;
pub use engine::Engine;
pub use error::{BundlerError, ConfigError, Error, Result, SassError, WatchError};
pub use loader::Loader;
pub use manifest::Manifest;
pub use router::AssetState;
pub use shutdown::Shutdown;
pub use snapshot::{BuildSnapshot, Diagnostics, Message, OutputArtifact, SnapshotId};

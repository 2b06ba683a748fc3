//! Build coordination and snapshot publication.
//!
//! The coordinator owns the bundler, the options every build uses and the
//! currently published [`BuildSnapshot`]. Builds never overlap: a rebuild
//! requested while one is running is absorbed into a follow-up run of the
//! build that holds the lock.

use crate::bundler::{BuildOptions, BundleOutput, Bundler, LoadHook};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::manifest::Manifest;
use crate::snapshot::{BuildSnapshot, Diagnostics, OutputArtifact, SnapshotId};
use crate::stylesheet::{CachedCompiler, SassCli, SassPlugin, StylesheetCompiler};
use parking_lot::{Mutex, RwLock};
use path_clean::PathClean;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tempfile::TempDir;

/// Path component of the live-reload endpoint, below the target.
pub const LIVE_RELOAD_PATH: &str = "__livereload";

/// Client script injected into every entry point when live reload is on.
fn live_reload_shim(target: &str) -> String {
    format!(
        "(() => {{ const es = new EventSource('{target}/{LIVE_RELOAD_PATH}'); \
         es.addEventListener('message', e => e.data === 'reload' && (es.close() || location.reload())) }})()\n"
    )
}

/// Serializes builds and publishes their snapshots.
pub struct BuildCoordinator {
    bundler: Arc<dyn Bundler>,
    options: BuildOptions,
    current: RwLock<Option<Arc<BuildSnapshot>>>,
    generation: AtomicU64,
    building: Mutex<()>,
    pending: AtomicBool,
    /// Holds the live-reload shim for as long as builds may inject it
    _scratch: Option<TempDir>,
}

impl BuildCoordinator {
    /// Prepare a coordinator from a validated configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Configuration that has passed [`EngineConfig::validate`]
    /// * `bundler` - The external compiler
    /// * `stylesheets` - Compiler for `.scss`/`.sass` inputs; when `None` and
    ///   `config.sass` is set, the `sass` executable is used
    ///
    /// # Errors
    ///
    /// Returns an error if the working directory cannot be resolved, the env
    /// define cannot be encoded or the shim cannot be written.
    pub fn new(
        config: &EngineConfig,
        bundler: Arc<dyn Bundler>,
        stylesheets: Option<Arc<dyn StylesheetCompiler>>,
    ) -> Result<Self> {
        let cwd = config.resolved_cwd()?;

        let mut defines = config.defines.clone();
        if config.env {
            let (key, value) = crate::env::process_env_define(&cwd)?;
            defines.entry(key).or_insert(value);
        }

        let mut inject = Vec::new();
        let scratch = if config.live_reload {
            let dir = tempfile::Builder::new().prefix("kiln-").tempdir()?;
            let shim = dir.path().join("livereload-shim.js");
            std::fs::write(&shim, live_reload_shim(&config.target))?;
            inject.push(shim);
            Some(dir)
        } else {
            None
        };

        let mut load_hooks: Vec<Arc<dyn LoadHook>> = Vec::new();
        if config.sass {
            let compiler = stylesheets.unwrap_or_else(|| {
                Arc::new(CachedCompiler::new(SassCli::new("sass", &cwd))) as Arc<dyn StylesheetCompiler>
            });
            load_hooks.push(Arc::new(SassPlugin::new(compiler)));
        }

        let options = BuildOptions {
            cwd,
            entry_points: config.sources.clone(),
            target: config.target.clone(),
            loaders: config.loaders.clone(),
            defines,
            inject,
            node_paths: config.node_paths.clone(),
            file_hash: config.file_hash,
            sourcemap: config.sourcemap,
            load_hooks,
        };

        tracing::debug!(?options, "Build options prepared");

        Ok(Self {
            bundler,
            options,
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
            building: Mutex::new(()),
            pending: AtomicBool::new(false),
            _scratch: scratch,
        })
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// The published snapshot, if any build has produced one.
    pub fn current(&self) -> Option<Arc<BuildSnapshot>> {
        self.current.read().clone()
    }

    /// Identity of the published snapshot.
    pub fn current_id(&self) -> Option<SnapshotId> {
        self.current.read().as_ref().map(|snapshot| snapshot.id())
    }

    /// Run a build, waiting for any build in progress to finish first.
    ///
    /// Returns the published snapshot, or `None` if the bundler could not be
    /// invoked.
    pub fn build(&self) -> Option<Arc<BuildSnapshot>> {
        let _guard = self.building.lock();
        self.pending.store(false, Ordering::SeqCst);
        self.run_once()
    }

    /// Rebuild after a change.
    ///
    /// If a build is already running this only records the request and
    /// returns `None`; the running build performs one more pass before it
    /// releases the lock. Otherwise returns the last snapshot this call
    /// published.
    pub fn rebuild(&self) -> Option<Arc<BuildSnapshot>> {
        let mut latest = None;
        let mut queued = false;

        loop {
            let Some(guard) = self.building.try_lock() else {
                if queued || latest.is_some() {
                    return latest;
                }
                // The holder may have checked `pending` before this store;
                // one more attempt covers that window.
                self.pending.store(true, Ordering::SeqCst);
                tracing::debug!("Build in progress, rebuild queued");
                queued = true;
                continue;
            };

            self.pending.store(false, Ordering::SeqCst);
            if let Some(snapshot) = self.run_once() {
                latest = Some(snapshot);
            }
            drop(guard);

            if !self.pending.load(Ordering::SeqCst) {
                return latest;
            }
            tracing::debug!("Changes arrived during build, rebuilding");
            queued = true;
        }
    }

    fn run_once(&self) -> Option<Arc<BuildSnapshot>> {
        let start = Instant::now();
        let output = match self.bundler.build(&self.options) {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(error = %e, "Bundler invocation failed, keeping previous build");
                return None;
            }
        };
        let duration = start.elapsed();

        let snapshot = Arc::new(self.assemble(output, duration));
        *self.current.write() = Some(Arc::clone(&snapshot));

        tracing::info!(
            id = %snapshot.id(),
            artifacts = snapshot.artifacts().len(),
            errors = snapshot.diagnostics().errors.len(),
            warnings = snapshot.diagnostics().warnings.len(),
            duration_ms = duration.as_millis() as u64,
            "Build published"
        );

        Some(snapshot)
    }

    fn assemble(&self, output: BundleOutput, duration: std::time::Duration) -> BuildSnapshot {
        let BundleOutput {
            files,
            errors,
            warnings,
            metafile,
            watch_files,
        } = output;

        for error in &errors {
            tracing::error!("{}", error.text);
        }
        for warning in &warnings {
            tracing::warn!("{}", warning.text);
        }

        let cwd = &self.options.cwd;
        let manifest = metafile.and_then(|json| match Manifest::from_metafile(&json, cwd) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                tracing::error!(error = %e, "Failed to parse bundler metafile");
                None
            }
        });

        let mut dependencies = manifest
            .as_ref()
            .map(|manifest| manifest.input_paths(cwd))
            .unwrap_or_default();
        dependencies.extend(watch_files.iter().map(|file| absolute(cwd, file)));
        let mut seen = HashSet::new();
        dependencies.retain(|path| seen.insert(path.clone()));

        let artifacts = files
            .into_iter()
            .map(|file| OutputArtifact::new(file.path, file.contents))
            .collect();

        let id = SnapshotId(self.generation.fetch_add(1, Ordering::SeqCst) + 1);
        BuildSnapshot::new(
            id,
            artifacts,
            Diagnostics { errors, warnings },
            manifest,
            dependencies,
            duration,
        )
    }
}

fn absolute(cwd: &Path, path: &Path) -> PathBuf {
    cwd.join(path).clean()
}

//! Provisioning and teardown of a running engine.
//!
//! An [`Engine`] ties the pieces together: it runs the first build, starts
//! the driver task that turns file changes into rebuilds, and hands the HTTP
//! side an [`AssetState`] to serve from.

use crate::bundler::Bundler;
use crate::config::EngineConfig;
use crate::coordinator::BuildCoordinator;
use crate::error::Result;
use crate::router::{self, AssetState};
use crate::shutdown::Shutdown;
use crate::snapshot::BuildSnapshot;
use crate::stylesheet::StylesheetCompiler;
use crate::watcher::{self, ChangeWatcher};
use axum::Router;
use parking_lot::Mutex;
use path_clean::PathClean;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Quiet period that ends a burst of file changes.
const DEBOUNCE: Duration = Duration::from_millis(50);

/// Where the driver sends the result of a requested rebuild.
type RebuildReply = oneshot::Sender<Option<Arc<BuildSnapshot>>>;

/// A provisioned build-and-serve engine.
pub struct Engine {
    coordinator: Arc<BuildCoordinator>,
    shutdown: Shutdown,
    live_reload: bool,
    requests: mpsc::Sender<RebuildReply>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Validate `config`, run the first build and start watching.
    ///
    /// A failed first build is logged and leaves the engine without a
    /// snapshot; requests then fall through until a rebuild succeeds.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the file watcher
    /// cannot be created
    pub async fn provision(
        config: EngineConfig,
        bundler: Arc<dyn Bundler>,
        stylesheets: Option<Arc<dyn StylesheetCompiler>>,
    ) -> Result<Self> {
        let config = config.validate()?;
        let coordinator = Arc::new(BuildCoordinator::new(&config, bundler, stylesheets)?);

        let first = run_blocking(&coordinator, BuildCoordinator::build).await;
        match &first {
            Some(snapshot) if snapshot.is_failed() => {
                tracing::warn!(id = %snapshot.id(), "Initial build finished with errors")
            }
            Some(snapshot) => tracing::info!(
                id = %snapshot.id(),
                duration_ms = snapshot.duration().as_millis() as u64,
                "Initial build complete"
            ),
            None => tracing::error!("Initial build failed, nothing will be served until a rebuild succeeds"),
        }

        let (mut watcher, changes) = ChangeWatcher::new()?;
        watcher.watch(watch_paths(&coordinator, first.as_deref()));

        let shutdown = Shutdown::new();
        let (requests, requested) = mpsc::channel(1);
        let driver = tokio::spawn(drive(
            Arc::clone(&coordinator),
            watcher,
            changes,
            requested,
            shutdown.clone(),
        ));

        Ok(Self {
            coordinator,
            shutdown,
            live_reload: config.live_reload,
            requests,
            driver: Mutex::new(Some(driver)),
        })
    }

    pub fn coordinator(&self) -> &Arc<BuildCoordinator> {
        &self.coordinator
    }

    /// The published snapshot, if any.
    pub fn current(&self) -> Option<Arc<BuildSnapshot>> {
        self.coordinator.current()
    }

    /// State for the asset middleware.
    pub fn asset_state(&self) -> AssetState {
        AssetState::new(
            Arc::clone(&self.coordinator),
            self.shutdown.clone(),
            self.live_reload,
        )
    }

    /// Put the asset middleware in front of `router`.
    pub fn layer<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router::with_assets(router, self.asset_state())
    }

    pub fn shutdown_signal(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Rebuild now, outside of any file change.
    ///
    /// The driver task runs the build so the watch set picks up whatever it
    /// read. Returns `None` if the build was absorbed, failed to run, or the
    /// engine shut down first.
    pub async fn rebuild(&self) -> Option<Arc<BuildSnapshot>> {
        let (reply, response) = oneshot::channel();
        if self.requests.send(reply).await.is_err() {
            return None;
        }
        response.await.ok().flatten()
    }

    /// Stop the driver task and every live-reload stream.
    ///
    /// Safe to call more than once; later calls return immediately.
    pub async fn shutdown(&self) {
        if self.shutdown.trigger() {
            tracing::debug!("Engine shutting down");
        }

        let driver = self.driver.lock().take();
        if let Some(driver) = driver {
            if let Err(e) = driver.await {
                tracing::warn!(error = %e, "Watcher task ended abnormally");
            }
        }

        self.shutdown.mark_closed();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // The driver exits on its own once signalled
        self.shutdown.trigger();
    }
}

/// Run a coordinator call on a blocking thread.
async fn run_blocking(
    coordinator: &Arc<BuildCoordinator>,
    call: fn(&BuildCoordinator) -> Option<Arc<BuildSnapshot>>,
) -> Option<Arc<BuildSnapshot>> {
    let coordinator = Arc::clone(coordinator);
    match tokio::task::spawn_blocking(move || call(&coordinator)).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::error!(error = %e, "Build task panicked");
            None
        }
    }
}

/// Entry points plus everything the snapshot read. Entry points are always
/// included so a build that failed before reporting inputs is retried.
fn watch_paths(coordinator: &BuildCoordinator, snapshot: Option<&BuildSnapshot>) -> Vec<PathBuf> {
    let options = coordinator.options();
    let mut paths: Vec<PathBuf> = options
        .entry_points
        .iter()
        .map(|entry| options.cwd.join(&entry.input).clean())
        .collect();
    if let Some(snapshot) = snapshot {
        paths.extend(snapshot.dependencies().iter().cloned());
    }
    paths
}

/// What woke the driver.
enum Wake {
    Change(PathBuf),
    Request(RebuildReply),
}

async fn drive(
    coordinator: Arc<BuildCoordinator>,
    mut watcher: ChangeWatcher,
    mut changes: mpsc::Receiver<PathBuf>,
    mut requests: mpsc::Receiver<RebuildReply>,
    shutdown: Shutdown,
) {
    tracing::debug!(watched = watcher.len(), "Watching for changes");

    loop {
        let wake = tokio::select! {
            _ = shutdown.wait() => break,
            change = changes.recv() => match change {
                Some(path) => Wake::Change(path),
                None => break,
            },
            request = requests.recv() => match request {
                Some(reply) => Wake::Request(reply),
                None => break,
            },
        };

        let reply = match wake {
            Wake::Change(first) => {
                let burst = watcher::debounce(&mut changes, first, DEBOUNCE).await;
                tracing::info!(
                    changed = %burst[0].display(),
                    files = burst.len(),
                    "Change detected, rebuilding"
                );
                None
            }
            Wake::Request(reply) => {
                tracing::debug!("Rebuild requested");
                Some(reply)
            }
        };

        // The blocking build is left to finish on its own after shutdown
        let published = tokio::select! {
            _ = shutdown.wait() => break,
            published = run_blocking(&coordinator, BuildCoordinator::rebuild) => published,
        };

        // An absorbed rebuild returns nothing; the build that absorbed it
        // may still have read new files
        let current = coordinator.current();
        watcher.watch(watch_paths(&coordinator, current.as_deref()));

        if let Some(reply) = reply {
            let _ = reply.send(published);
        }
    }

    drop(watcher);
    tracing::debug!("Watcher stopped");
}

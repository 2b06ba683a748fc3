//! File watching for the build's dependencies.
//!
//! Only the files the last build actually read are watched, one
//! non-recursive registration per file. The watch set grows as builds
//! discover new dependencies and shrinks when a file is removed, so an
//! editor's delete-and-recreate save is picked up again after the next build.
//! Installed packages under `node_modules` are never watched.

use crate::error::WatchError;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Changes buffered before further events are dropped. A dropped event is
/// harmless as long as one from the same burst gets through.
const CHANGE_BUFFER: usize = 256;

/// Watches individual files and reports the ones that changed.
pub struct ChangeWatcher {
    watcher: RecommendedWatcher,
    watched: Arc<Mutex<HashSet<PathBuf>>>,
}

impl ChangeWatcher {
    /// Create a watcher with an empty watch set.
    ///
    /// # Returns
    ///
    /// Tuple of (ChangeWatcher, receiver for changed paths)
    ///
    /// # Errors
    ///
    /// Returns error if the platform watcher cannot be created
    pub fn new() -> Result<(Self, mpsc::Receiver<PathBuf>), WatchError> {
        let (tx, rx) = mpsc::channel(CHANGE_BUFFER);
        let watched: Arc<Mutex<HashSet<PathBuf>>> = Arc::default();
        let set = Arc::clone(&watched);

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "File watcher reported an error");
                    return;
                }
            };

            match event.kind {
                EventKind::Create(_) | EventKind::Modify(_) => {}
                EventKind::Remove(_) => {
                    let mut set = set.lock();
                    for path in &event.paths {
                        set.remove(path);
                    }
                }
                _ => return,
            }

            for path in event.paths {
                tracing::trace!(path = %path.display(), kind = ?event.kind, "File changed");
                // Non-blocking: a full buffer already guarantees a rebuild
                let _ = tx.try_send(path);
            }
        })
        .map_err(WatchError::Create)?;

        Ok((Self { watcher, watched }, rx))
    }

    /// Register every path not already in the watch set.
    ///
    /// A path that cannot be registered is logged and left out of the set,
    /// so the next call retries it. Paths inside `node_modules` are skipped.
    /// Returns how many paths were added.
    pub fn watch<I, P>(&mut self, paths: I) -> usize
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut added = 0;
        for path in paths {
            let path = path.as_ref();
            if is_installed_package(path) || self.watched.lock().contains(path) {
                continue;
            }

            match self.watcher.watch(path, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    self.watched.lock().insert(path.to_path_buf());
                    added += 1;
                }
                Err(source) => {
                    let err = WatchError::Register {
                        path: path.to_path_buf(),
                        source,
                    };
                    tracing::warn!(error = %err, "Skipping file");
                }
            }
        }

        if added > 0 {
            tracing::debug!(added, total = self.len(), "Watch set updated");
        }
        added
    }

    pub fn is_watched(&self, path: &Path) -> bool {
        self.watched.lock().contains(path)
    }

    pub fn len(&self) -> usize {
        self.watched.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.watched.lock().is_empty()
    }
}

fn is_installed_package(path: &Path) -> bool {
    path.components()
        .any(|component| component.as_os_str() == "node_modules")
}

/// Collect a burst of changes.
///
/// Starting from `first`, keeps draining `rx` until no change arrives for
/// `quiet`. Returns the distinct paths in arrival order.
pub async fn debounce(
    rx: &mut mpsc::Receiver<PathBuf>,
    first: PathBuf,
    quiet: Duration,
) -> Vec<PathBuf> {
    let mut seen = HashSet::from([first.clone()]);
    let mut burst = vec![first];

    while let Ok(Some(path)) = tokio::time::timeout(quiet, rx.recv()).await {
        if seen.insert(path.clone()) {
            burst.push(path);
        }
    }

    burst
}

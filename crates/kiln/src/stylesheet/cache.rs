//! Modification-time cache around a stylesheet compiler.

use super::{CompiledStylesheet, StylesheetCompiler};
use crate::error::SassError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone)]
struct CacheEntry {
    compiled: CompiledStylesheet,
    mtime: SystemTime,
}

/// Reuses the previous compile of a stylesheet while none of the files it
/// read has a newer modification time.
pub struct CachedCompiler<C> {
    inner: C,
    entries: Mutex<HashMap<PathBuf, CacheEntry>>,
}

impl<C: StylesheetCompiler> CachedCompiler<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<C: StylesheetCompiler> StylesheetCompiler for CachedCompiler<C> {
    fn compile(&self, path: &Path) -> Result<CompiledStylesheet, SassError> {
        if let Some(entry) = self.entries.lock().get(path) {
            if latest_mtime(&entry.compiled.sources) == Some(entry.mtime) {
                tracing::trace!(path = %path.display(), "Stylesheet unchanged, reusing CSS");
                return Ok(entry.compiled.clone());
            }
        }

        let mut compiled = self.inner.compile(path)?;
        if !compiled.sources.iter().any(|source| source == path) {
            compiled.sources.push(path.to_path_buf());
        }

        match latest_mtime(&compiled.sources) {
            Some(mtime) => {
                self.entries.lock().insert(
                    path.to_path_buf(),
                    CacheEntry {
                        compiled: compiled.clone(),
                        mtime,
                    },
                );
            }
            None => {
                self.entries.lock().remove(path);
            }
        }

        Ok(compiled)
    }
}

/// Newest modification time over `files`; `None` if any cannot be read.
fn latest_mtime(files: &[PathBuf]) -> Option<SystemTime> {
    files.iter().try_fold(SystemTime::UNIX_EPOCH, |latest, file| {
        let modified = std::fs::metadata(file).and_then(|m| m.modified()).ok()?;
        Some(latest.max(modified))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Counting {
        calls: AtomicUsize,
        partial: PathBuf,
    }

    impl StylesheetCompiler for Counting {
        fn compile(&self, path: &Path) -> Result<CompiledStylesheet, SassError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CompiledStylesheet {
                css: format!("/* build {n} */"),
                sources: vec![path.to_path_buf(), self.partial.clone()],
            })
        }
    }

    fn touch_later(path: &Path, secs: u64) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(secs))
            .unwrap();
    }

    fn setup() -> (TempDir, PathBuf, CachedCompiler<Counting>) {
        let temp = TempDir::new().unwrap();
        let main = temp.path().join("app.scss");
        let partial = temp.path().join("_vars.scss");
        std::fs::write(&main, "@use 'vars';").unwrap();
        std::fs::write(&partial, "$c: red;").unwrap();

        let cache = CachedCompiler::new(Counting {
            calls: AtomicUsize::new(0),
            partial,
        });
        (temp, main, cache)
    }

    #[test]
    fn test_unchanged_sources_reuse_css() {
        let (_temp, main, cache) = setup();

        let first = cache.compile(&main).unwrap();
        let second = cache.compile(&main).unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_touched_partial_recompiles() {
        let (temp, main, cache) = setup();

        cache.compile(&main).unwrap();
        touch_later(&temp.path().join("_vars.scss"), 30);
        let again = cache.compile(&main).unwrap();

        assert_eq!(again.css, "/* build 1 */");
        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missing_source_disables_cache() {
        let (temp, main, cache) = setup();

        cache.compile(&main).unwrap();
        std::fs::remove_file(temp.path().join("_vars.scss")).unwrap();
        cache.compile(&main).unwrap();
        cache.compile(&main).unwrap();

        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 3);
        assert!(cache.is_empty());
    }
}

//! SCSS/SASS support.
//!
//! The compiler itself is external ([`StylesheetCompiler`]). This module
//! caches its results ([`CachedCompiler`]) and plugs it into the bundler as a
//! load hook ([`SassPlugin`]) so the files a stylesheet pulled in end up in
//! the watch set.

mod cache;
mod sass;

pub use cache::CachedCompiler;
pub use sass::{SassCli, discover_imports};

use crate::bundler::{LoadHook, LoadResult};
use crate::error::{Result, SassError};
use crate::loader::Loader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Output of compiling one stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledStylesheet {
    pub css: String,
    /// Every file read to produce `css`, including the input itself
    pub sources: Vec<PathBuf>,
}

/// Turns one `.scss`/`.sass` file into CSS.
pub trait StylesheetCompiler: Send + Sync {
    fn compile(&self, path: &Path) -> std::result::Result<CompiledStylesheet, SassError>;
}

/// Whether a path is a SCSS or SASS source.
pub fn is_stylesheet(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "scss" || ext == "sass")
}

/// Load hook that compiles stylesheets to CSS.
pub struct SassPlugin {
    compiler: Arc<dyn StylesheetCompiler>,
}

impl SassPlugin {
    pub fn new(compiler: Arc<dyn StylesheetCompiler>) -> Self {
        Self { compiler }
    }
}

impl LoadHook for SassPlugin {
    fn name(&self) -> &str {
        "sass"
    }

    fn matches(&self, path: &Path) -> bool {
        is_stylesheet(path)
    }

    fn extensions(&self) -> &[&'static str] {
        &[".scss", ".sass"]
    }

    fn load(&self, path: &Path) -> Result<LoadResult> {
        let compiled = self.compiler.compile(path)?;
        Ok(LoadResult {
            contents: compiled.css,
            loader: Loader::Css,
            watch_files: compiled.sources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct Fixed;

    impl StylesheetCompiler for Fixed {
        fn compile(&self, path: &Path) -> std::result::Result<CompiledStylesheet, SassError> {
            if path.ends_with("broken.scss") {
                return Err(SassError::Compile {
                    path: path.to_path_buf(),
                    message: "expected \"}\"".to_string(),
                });
            }
            Ok(CompiledStylesheet {
                css: "body{color:red}".to_string(),
                sources: vec![path.to_path_buf(), PathBuf::from("/p/_vars.scss")],
            })
        }
    }

    #[test]
    fn test_is_stylesheet() {
        assert!(is_stylesheet(Path::new("a/app.scss")));
        assert!(is_stylesheet(Path::new("a/app.sass")));
        assert!(!is_stylesheet(Path::new("a/app.css")));
        assert!(!is_stylesheet(Path::new("a/scss")));
    }

    #[test]
    fn test_plugin_loads_css_with_sources() {
        let plugin = SassPlugin::new(Arc::new(Fixed));
        let loaded = plugin.load(Path::new("/p/app.scss")).unwrap();

        assert_eq!(loaded.contents, "body{color:red}");
        assert_eq!(loaded.loader, Loader::Css);
        assert_eq!(
            loaded.watch_files,
            vec![PathBuf::from("/p/app.scss"), PathBuf::from("/p/_vars.scss")]
        );
    }

    #[test]
    fn test_plugin_surfaces_compile_error() {
        let plugin = SassPlugin::new(Arc::new(Fixed));
        let err = plugin.load(Path::new("/p/broken.scss")).unwrap_err();
        assert!(matches!(err, Error::Sass(SassError::Compile { .. })));
    }
}

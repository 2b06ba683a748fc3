//! Command implementations.
//!
//! - [`serve`] - Build, serve and rebuild on change
//! - [`build`] - Build once and write the output to disk

pub mod build;
pub mod serve;

pub use build::execute as build_execute;
pub use serve::execute as serve_execute;

use crate::config::KilnConfig;
use kiln::stylesheet::{CachedCompiler, SassCli, StylesheetCompiler};
use kiln::{Bundler, EsbuildCli};
use std::path::Path;
use std::sync::Arc;

/// The bundler and stylesheet compiler configured under `tools`.
pub(crate) fn tools(
    config: &KilnConfig,
    cwd: &Path,
) -> (Arc<dyn Bundler>, Option<Arc<dyn StylesheetCompiler>>) {
    let bundler: Arc<dyn Bundler> = Arc::new(EsbuildCli::new(&config.tools.esbuild));
    let stylesheets = config.build.sass.then(|| {
        Arc::new(CachedCompiler::new(SassCli::new(&config.tools.sass, cwd)))
            as Arc<dyn StylesheetCompiler>
    });
    (bundler, stylesheets)
}

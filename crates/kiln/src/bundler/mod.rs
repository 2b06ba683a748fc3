//! Contract with the external bundler.
//!
//! The bundler is a black box: given [`BuildOptions`] it returns output files,
//! diagnostics and a JSON metafile. Anything that can honor that contract can
//! drive the engine; [`EsbuildCli`] runs the `esbuild` executable.

mod esbuild;

pub use esbuild::EsbuildCli;

use crate::error::{BundlerError, Result};
use crate::loader::Loader;
use crate::snapshot::Message;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A top-level compilation unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "EntrySpec")]
pub struct EntryPoint {
    /// Logical output name; defaults to the input's file stem
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Source path, relative to the working directory
    pub input: PathBuf,
}

/// Entry points are written either as a bare path or as `{alias, input}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum EntrySpec {
    Path(PathBuf),
    Full {
        #[serde(default)]
        alias: Option<String>,
        input: PathBuf,
    },
}

impl From<EntrySpec> for EntryPoint {
    fn from(spec: EntrySpec) -> Self {
        match spec {
            EntrySpec::Path(input) => Self { alias: None, input },
            EntrySpec::Full { alias, input } => Self { alias, input },
        }
    }
}

impl EntryPoint {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            alias: None,
            input: input.into(),
        }
    }

    pub fn with_alias(alias: impl Into<String>, input: impl Into<PathBuf>) -> Self {
        Self {
            alias: Some(alias.into()),
            input: input.into(),
        }
    }

    /// Name the output is written under.
    pub fn output_name(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => self
                .input
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "index".to_string()),
        }
    }
}

/// Contents produced for one input by a [`LoadHook`].
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub contents: String,
    pub loader: Loader,
    /// Files read to produce `contents`; they join the watch set
    pub watch_files: Vec<PathBuf>,
}

/// Replaces how the bundler loads inputs it matches.
pub trait LoadHook: Send + Sync {
    fn name(&self) -> &str;

    fn matches(&self, path: &Path) -> bool;

    /// Extensions (with the dot) of the files this hook handles when the
    /// bundler reaches them through an import.
    fn extensions(&self) -> &[&'static str] {
        &[]
    }

    /// Load one input. An error becomes a load error for that input only.
    fn load(&self, path: &Path) -> Result<LoadResult>;
}

/// Everything the bundler needs for one build.
#[derive(Clone)]
pub struct BuildOptions {
    pub cwd: PathBuf,
    pub entry_points: Vec<EntryPoint>,
    /// URL prefix; output paths are reported under it
    pub target: String,
    pub loaders: BTreeMap<String, Loader>,
    pub defines: BTreeMap<String, String>,
    /// Files injected into every entry point
    pub inject: Vec<PathBuf>,
    pub node_paths: Vec<PathBuf>,
    pub file_hash: bool,
    pub sourcemap: bool,
    pub load_hooks: Vec<Arc<dyn LoadHook>>,
}

impl fmt::Debug for BuildOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hooks: Vec<&str> = self.load_hooks.iter().map(|hook| hook.name()).collect();
        f.debug_struct("BuildOptions")
            .field("cwd", &self.cwd)
            .field("entry_points", &self.entry_points)
            .field("target", &self.target)
            .field("loaders", &self.loaders)
            .field("defines", &self.defines)
            .field("inject", &self.inject)
            .field("node_paths", &self.node_paths)
            .field("file_hash", &self.file_hash)
            .field("sourcemap", &self.sourcemap)
            .field("load_hooks", &hooks)
            .finish()
    }
}

/// One output file, addressed by its served path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    /// Served path (e.g., "/_build/index.js")
    pub path: String,
    pub contents: Vec<u8>,
}

/// What a bundler invocation produced.
///
/// A build with compile errors is still a successful invocation; the errors
/// travel here rather than as a [`BundlerError`].
#[derive(Debug, Clone, Default)]
pub struct BundleOutput {
    pub files: Vec<OutputFile>,
    pub errors: Vec<Message>,
    pub warnings: Vec<Message>,
    /// JSON build report, keyed by served output path
    pub metafile: Option<String>,
    /// Extra dependency files discovered while loading inputs
    pub watch_files: Vec<PathBuf>,
}

/// The external compiler.
///
/// Calls are synchronous and may be slow; the engine only invokes them from
/// blocking threads.
pub trait Bundler: Send + Sync {
    fn build(&self, options: &BuildOptions) -> std::result::Result<BundleOutput, BundlerError>;
}

//! Entry-name resolution from the bundler's metafile.
//!
//! When output filenames carry a content hash, callers cannot know at
//! configuration time which physical file an entry point ends up in. The
//! bundler's JSON metafile records it; [`Manifest`] inverts that report into
//! a `logical entry -> physical path` mapping.

use indexmap::IndexMap;
use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level shape of the bundler's metafile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metafile {
    #[serde(default)]
    pub inputs: IndexMap<String, InputDescriptor>,
    #[serde(default)]
    pub outputs: IndexMap<String, OutputDescriptor>,
}

/// One source file the bundler read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputDescriptor {
    #[serde(default)]
    pub bytes: u64,
}

/// One physical output file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
    #[serde(default)]
    pub inputs: IndexMap<String, InputUsage>,
    #[serde(default, rename = "bytes")]
    pub byte_size: u64,
}

/// How much of an input ended up in an output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputUsage {
    #[serde(default)]
    pub bytes_in_output: u64,
}

/// Resolved view of one build's metafile.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    metafile: Metafile,
    aliases: BTreeMap<String, String>,
}

impl Manifest {
    /// Parse a metafile and build the alias table.
    ///
    /// Output keys are taken relative to `cwd` and made absolute. If two
    /// outputs claim the same entry point, the first one in the metafile wins.
    pub fn from_metafile(json: &str, cwd: &Path) -> Result<Self, serde_json::Error> {
        let metafile: Metafile = serde_json::from_str(json)?;
        Ok(Self::from_parsed(metafile, cwd))
    }

    pub fn from_parsed(metafile: Metafile, cwd: &Path) -> Self {
        let mut aliases = BTreeMap::new();

        for (output, descriptor) in &metafile.outputs {
            let physical = absolute(cwd, output);
            let source = match descriptor.entry_point.as_deref() {
                Some(entry) if !entry.is_empty() => entry.to_string(),
                _ => physical.clone(),
            };

            if let Some(existing) = aliases.get(&source) {
                tracing::warn!(
                    entry = %source,
                    kept = %existing,
                    ignored = %physical,
                    "Entry point reported for more than one output"
                );
                continue;
            }
            aliases.insert(source, physical);
        }

        Self { metafile, aliases }
    }

    /// Physical output path for a logical entry or absolute output path.
    pub fn resolve(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(String::as_str)
    }

    /// The full mapping, sorted by source identifier.
    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }

    pub fn outputs(&self) -> &IndexMap<String, OutputDescriptor> {
        &self.metafile.outputs
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Absolute paths of every input the bundle was built from.
    ///
    /// Virtual modules (`namespace:path` keys) are skipped.
    pub fn input_paths(&self, cwd: &Path) -> Vec<PathBuf> {
        let top_level = self.metafile.inputs.keys();
        let per_output = self
            .metafile
            .outputs
            .values()
            .flat_map(|output| output.inputs.keys());

        let mut seen = std::collections::HashSet::new();
        top_level
            .chain(per_output)
            .filter(|input| !is_virtual(input))
            .map(|input| cwd.join(input).clean())
            .filter(|path| seen.insert(path.clone()))
            .collect()
    }
}

fn absolute(cwd: &Path, path: &str) -> String {
    cwd.join(path).clean().to_string_lossy().into_owned()
}

fn is_virtual(input: &str) -> bool {
    match input.split_once(':') {
        // Windows drive letters look like a namespace
        Some((namespace, _)) => namespace.len() > 1,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const METAFILE: &str = r#"{
        "inputs": {
            "src/index.js": { "bytes": 120, "imports": [] },
            "src/util.js": { "bytes": 40, "imports": [] }
        },
        "outputs": {
            "../../../../_build/index-5KXG2MNC.js": {
                "imports": [],
                "exports": [],
                "entryPoint": "src/index.js",
                "inputs": {
                    "src/index.js": { "bytesInOutput": 100 },
                    "src/util.js": { "bytesInOutput": 30 }
                },
                "bytes": 180
            },
            "../../../../_build/index-5KXG2MNC.js.map": {
                "imports": [],
                "exports": [],
                "inputs": {},
                "bytes": 310
            }
        }
    }"#;

    #[test]
    fn test_resolve_entry_point_to_hashed_output() {
        let manifest = Manifest::from_metafile(METAFILE, Path::new("/srv/app")).unwrap();

        assert_eq!(
            manifest.resolve("src/index.js"),
            Some("/_build/index-5KXG2MNC.js")
        );
        assert!(manifest.resolve("src/util.js").is_none());
    }

    #[test]
    fn test_outputs_without_entry_resolve_by_absolute_path() {
        let manifest = Manifest::from_metafile(METAFILE, Path::new("/srv/app")).unwrap();

        assert_eq!(
            manifest.resolve("/_build/index-5KXG2MNC.js.map"),
            Some("/_build/index-5KXG2MNC.js.map")
        );
        assert_eq!(manifest.entries().len(), 2);
    }

    #[test]
    fn test_duplicate_entry_keeps_first() {
        let json = r#"{
            "outputs": {
                "/_build/a-1111.js": { "entryPoint": "src/a.js", "inputs": {}, "bytes": 1 },
                "/_build/a-2222.js": { "entryPoint": "src/a.js", "inputs": {}, "bytes": 1 }
            }
        }"#;
        let manifest = Manifest::from_metafile(json, Path::new("/")).unwrap();

        assert_eq!(manifest.resolve("src/a.js"), Some("/_build/a-1111.js"));
        assert_eq!(manifest.entries().len(), 1);
    }

    #[test]
    fn test_empty_entry_point_treated_as_absent() {
        let json = r#"{ "outputs": { "/_build/chunk.js": { "entryPoint": "", "inputs": {}, "bytes": 1 } } }"#;
        let manifest = Manifest::from_metafile(json, Path::new("/")).unwrap();

        assert_eq!(manifest.resolve("/_build/chunk.js"), Some("/_build/chunk.js"));
        assert!(manifest.resolve("").is_none());
    }

    #[test]
    fn test_input_paths_are_absolute_and_unique() {
        let manifest = Manifest::from_metafile(METAFILE, Path::new("/srv/app")).unwrap();
        let inputs = manifest.input_paths(Path::new("/srv/app"));

        assert_eq!(
            inputs,
            vec![
                PathBuf::from("/srv/app/src/index.js"),
                PathBuf::from("/srv/app/src/util.js"),
            ]
        );
    }

    #[test]
    fn test_virtual_inputs_are_skipped() {
        assert!(is_virtual("sass:styles.scss"));
        assert!(!is_virtual("C:/project/index.js"));
        assert!(!is_virtual("src/index.js"));
    }

    #[test]
    fn test_invalid_metafile_is_an_error() {
        assert!(Manifest::from_metafile("not json", Path::new("/")).is_err());
    }

    #[test]
    fn test_empty_metafile_is_empty_manifest() {
        let manifest = Manifest::from_metafile("{}", Path::new("/")).unwrap();
        assert!(manifest.is_empty());
    }
}

//! Engine configuration.
//!
//! The struct is produced by whatever configuration front end hosts the
//! engine (the `kiln` CLI loads it with figment). The engine only consumes
//! it, after [`EngineConfig::validate`] has normalized it.

use crate::bundler::EntryPoint;
use crate::error::ConfigError;
use crate::loader::Loader;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Default URL prefix the built files are served under.
pub const DEFAULT_TARGET: &str = "/_build";

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EngineConfig {
    /// Entry points to bundle (e.g., ["src/index.js"])
    #[serde(default)]
    pub sources: Vec<EntryPoint>,

    /// URL prefix for built files
    #[serde(default = "default_target")]
    pub target: String,

    /// Serve the live-reload endpoint and inject the reload client
    #[serde(default)]
    pub live_reload: bool,

    /// Compile `.scss`/`.sass` inputs
    #[serde(default)]
    pub sass: bool,

    /// Inject `process.env` from the environment and `.env` files
    #[serde(default)]
    pub env: bool,

    /// Content-hash output filenames (`[name]-[hash]`)
    #[serde(default)]
    pub file_hash: bool,

    /// Extension to loader overrides (e.g., {".png": "dataurl"})
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub loaders: BTreeMap<String, Loader>,

    /// Compile-time substitutions
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub defines: BTreeMap<String, String>,

    /// Extra module resolution directories
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_paths: Vec<PathBuf>,

    /// Emit linked source maps
    #[serde(default = "default_sourcemap")]
    pub sourcemap: bool,

    /// Working directory; defaults to the process working directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

fn default_target() -> String {
    DEFAULT_TARGET.to_string()
}

fn default_sourcemap() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            target: default_target(),
            live_reload: false,
            sass: false,
            env: false,
            file_hash: false,
            loaders: BTreeMap::new(),
            defines: BTreeMap::new(),
            node_paths: Vec::new(),
            sourcemap: default_sourcemap(),
            cwd: None,
        }
    }
}

impl EngineConfig {
    /// Check the configuration and normalize it.
    ///
    /// The target gains a leading `/` and loses any trailing `/`.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::MissingField {
                field: "sources".to_string(),
                hint: "Provide at least one entry point".to_string(),
            });
        }

        for entry in &self.sources {
            if entry.input.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "sources".to_string(),
                    value: "\"\"".to_string(),
                    hint: "Entry points need an input path".to_string(),
                });
            }
            if entry.alias.as_deref() == Some("") {
                return Err(ConfigError::InvalidValue {
                    field: "sources.alias".to_string(),
                    value: "\"\"".to_string(),
                    hint: "Omit the alias to use the input file name".to_string(),
                });
            }
        }

        self.target = normalize_target(&self.target)?;

        for extension in self.loaders.keys() {
            if !extension.starts_with('.') || extension.len() < 2 {
                return Err(ConfigError::InvalidValue {
                    field: "loaders".to_string(),
                    value: extension.clone(),
                    hint: "Loader keys are file extensions such as \".png\"".to_string(),
                });
            }
        }

        Ok(self)
    }

    /// Working directory the engine resolves relative paths against.
    pub fn resolved_cwd(&self) -> std::io::Result<PathBuf> {
        match &self.cwd {
            Some(cwd) if cwd.is_absolute() => Ok(cwd.clone()),
            Some(cwd) => Ok(std::env::current_dir()?.join(cwd)),
            None => std::env::current_dir(),
        }
    }
}

/// Normalize a URL prefix to `/segment[/segment...]`.
pub fn normalize_target(target: &str) -> Result<String, ConfigError> {
    let trimmed = target.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::MissingField {
            field: "target".to_string(),
            hint: format!("Set a URL prefix such as {DEFAULT_TARGET}"),
        });
    }

    let inner = trimmed.trim_matches('/');
    if inner.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "target".to_string(),
            value: target.to_string(),
            hint: format!("The target cannot be the site root; use a prefix such as {DEFAULT_TARGET}"),
        });
    }

    Ok(format!("/{inner}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(sources: &[&str]) -> EngineConfig {
        EngineConfig {
            sources: sources.iter().map(|s| EntryPoint::new(*s)).collect(),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_normalize_target() {
        assert_eq!(normalize_target("/_build").unwrap(), "/_build");
        assert_eq!(normalize_target("_build").unwrap(), "/_build");
        assert_eq!(normalize_target("/_build/").unwrap(), "/_build");
        assert_eq!(normalize_target("assets/js/").unwrap(), "/assets/js");
        assert!(matches!(
            normalize_target(""),
            Err(ConfigError::MissingField { .. })
        ));
        assert!(matches!(
            normalize_target("/"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validate_requires_sources() {
        let err = EngineConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref field, .. } if field == "sources"));
    }

    #[test]
    fn test_validate_normalizes_target() {
        let config = EngineConfig {
            target: "build/".to_string(),
            ..config_with(&["index.js"])
        }
        .validate()
        .unwrap();
        assert_eq!(config.target, "/build");
    }

    #[test]
    fn test_validate_rejects_bad_loader_extension() {
        let mut config = config_with(&["index.js"]);
        config.loaders.insert("png".to_string(), Loader::DataUrl);
        assert!(config.validate().is_err());

        let mut config = config_with(&["index.js"]);
        config.loaders.insert(".png".to_string(), Loader::DataUrl);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_alias() {
        let config = EngineConfig {
            sources: vec![EntryPoint::with_alias("", "index.js")],
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_sources_in_both_forms() {
        let json = r#"{
            "sources": ["src/index.js", { "alias": "admin", "input": "src/admin/main.tsx" }],
            "fileHash": true,
            "loaders": { ".svg": "dataurl" }
        }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.sources[0], EntryPoint::new("src/index.js"));
        assert_eq!(
            config.sources[1],
            EntryPoint::with_alias("admin", "src/admin/main.tsx")
        );
        assert!(config.file_hash);
        assert_eq!(config.target, DEFAULT_TARGET);
        assert!(config.sourcemap);
        assert_eq!(config.loaders[".svg"], Loader::DataUrl);
    }

    #[test]
    fn test_unknown_loader_fails_to_deserialize() {
        let json = r#"{ "sources": ["a.js"], "loaders": { ".svg": "svgr" } }"#;
        assert!(serde_json::from_str::<EngineConfig>(json).is_err());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let json = r#"{ "sources": ["a.js"], "autoReload": true }"#;
        assert!(serde_json::from_str::<EngineConfig>(json).is_err());
    }
}

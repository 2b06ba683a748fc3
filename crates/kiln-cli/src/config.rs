//! Configuration loading.
//!
//! Sources are merged in increasing priority:
//! 1. Defaults
//! 2. Config file (`--config`, or `kiln.toml` / `kiln.json` / `kiln.yaml`)
//! 3. `KILN_*` environment variables, `__` separating sections
//!    (e.g., `KILN_BUILD__FILE_HASH=true`)
//! 4. Command-line arguments

use crate::cli::BuildFlags;
use crate::error::{ConfigError, Result};
use figment::Figment;
use figment::providers::{Env, Format as _, Json, Serialized, Toml, Yaml};
use kiln::{EngineConfig, EntryPoint};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Config files looked up in the working directory, in order.
pub const CONFIG_FILES: [&str; 4] = ["kiln.toml", "kiln.json", "kiln.yaml", "kiln.yml"];

/// Prefix of environment variables read as configuration.
pub const ENV_PREFIX: &str = "KILN_";

/// Complete CLI configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KilnConfig {
    /// What to build and how
    #[serde(default)]
    pub build: EngineConfig,

    /// HTTP server settings for `kiln serve`
    #[serde(default)]
    pub server: ServerConfig,

    /// External programs
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to listen on
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Directory served for requests the build does not answer
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            root: default_root(),
        }
    }
}

/// External programs the engine runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ToolsConfig {
    #[serde(default = "default_esbuild")]
    pub esbuild: PathBuf,

    #[serde(default = "default_sass")]
    pub sass: PathBuf,
}

fn default_esbuild() -> PathBuf {
    PathBuf::from("esbuild")
}

fn default_sass() -> PathBuf {
    PathBuf::from("sass")
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            esbuild: default_esbuild(),
            sass: default_sass(),
        }
    }
}

impl KilnConfig {
    /// Merge defaults, config file, environment and `flags`.
    ///
    /// Commands merge their own arguments on top before calling
    /// [`KilnConfig::extract`].
    ///
    /// # Arguments
    ///
    /// * `flags` - Build options from the command line
    /// * `cwd` - Process working directory
    pub fn figment(flags: &BuildFlags, cwd: &Path) -> Result<Figment> {
        let project_dir = match &flags.cwd {
            Some(dir) => cwd.join(dir),
            None => cwd.to_path_buf(),
        };

        let mut figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Serialized::default("build.cwd", &project_dir));

        let config_file = match &flags.config {
            Some(path) => {
                let path = cwd.join(path);
                if !path.is_file() {
                    return Err(ConfigError::NotFound(path).into());
                }
                Some(path)
            }
            None => CONFIG_FILES
                .iter()
                .map(|name| project_dir.join(name))
                .find(|path| path.is_file()),
        };

        if let Some(path) = config_file {
            tracing::debug!(path = %path.display(), "Loading config file");
            figment = merge_file(figment, &path)?;
        }

        figment = figment.merge(env_provider());

        if !flags.sources.is_empty() {
            let sources = flags
                .sources
                .iter()
                .map(|source| parse_entry(source))
                .collect::<Result<Vec<_>>>()?;
            figment = figment.merge(Serialized::default("build.sources", sources));
        }
        if let Some(dir) = &flags.cwd {
            figment = figment.merge(Serialized::default("build.cwd", cwd.join(dir)));
        }
        if let Some(target) = &flags.target {
            figment = figment.merge(Serialized::default("build.target", target));
        }
        if flags.file_hash {
            figment = figment.merge(Serialized::default("build.fileHash", true));
        }
        if flags.sass {
            figment = figment.merge(Serialized::default("build.sass", true));
        }
        if flags.env {
            figment = figment.merge(Serialized::default("build.env", true));
        }
        if flags.no_sourcemap {
            figment = figment.merge(Serialized::default("build.sourcemap", false));
        }
        if let Some(program) = &flags.esbuild {
            figment = figment.merge(Serialized::default("tools.esbuild", program));
        }
        if let Some(program) = &flags.sass_bin {
            figment = figment.merge(Serialized::default("tools.sass", program));
        }

        Ok(figment)
    }

    pub fn extract(figment: &Figment) -> Result<Self> {
        figment
            .extract()
            .map_err(|e| ConfigError::Extract(Box::new(e)).into())
    }

    /// Load the configuration for a command without extra arguments.
    pub fn load(flags: &BuildFlags, cwd: &Path) -> Result<Self> {
        Self::extract(&Self::figment(flags, cwd)?)
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    match extension {
        "toml" => Ok(figment.merge(Toml::file(path))),
        "json" => Ok(figment.merge(Json::file(path))),
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf()).into()),
    }
}

/// `KILN_BUILD__LIVE_RELOAD` becomes `build.liveReload`.
fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX)
        .lowercase(false)
        .map(|key| env_key(key.as_str()).into())
}

pub(crate) fn env_key(raw: &str) -> String {
    raw.split("__")
        .map(camel_case)
        .collect::<Vec<_>>()
        .join(".")
}

fn camel_case(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut upper_next = false;
    for c in segment.chars() {
        if c == '_' {
            upper_next = !out.is_empty();
            continue;
        }
        if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// Parse `path` or `alias=path`.
pub fn parse_entry(raw: &str) -> Result<EntryPoint> {
    match raw.split_once('=') {
        Some((alias, input)) if !alias.is_empty() && !input.is_empty() => {
            Ok(EntryPoint::with_alias(alias, input))
        }
        Some(_) => Err(ConfigError::InvalidEntry(raw.to_string()).into()),
        None if raw.is_empty() => Err(ConfigError::InvalidEntry(raw.to_string()).into()),
        None => Ok(EntryPoint::new(raw)),
    }
}

//! `process.env` defines from the environment and `.env` files.
//!
//! The mode comes from `NODE_ENV` (default `development`). Files are read in
//! order `.env.{mode}.local`, `.env.local`, `.env.{mode}`, `.env`; the first
//! definition of a key wins and the process environment beats every file.
//! Only `NODE_ENV` and `REACT_APP_*` variables are exposed to the bundle.

use crate::error::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Define key the variables are injected under.
pub const PROCESS_ENV: &str = "process.env";

/// Prefix of variables exposed to client code.
pub const PUBLIC_PREFIX: &str = "REACT_APP_";

const DEFAULT_MODE: &str = "development";

/// Env files to read for `mode`, highest precedence first.
pub fn env_files(cwd: &Path, mode: &str) -> Vec<PathBuf> {
    [
        format!(".env.{mode}.local"),
        ".env.local".to_string(),
        format!(".env.{mode}"),
        ".env".to_string(),
    ]
    .into_iter()
    .map(|name| cwd.join(name))
    .collect()
}

/// Variables visible to the bundle, given the process environment.
pub fn collect(cwd: &Path, process: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mode = process
        .get("NODE_ENV")
        .filter(|mode| !mode.is_empty())
        .cloned()
        .unwrap_or_else(|| DEFAULT_MODE.to_string());

    let mut merged = process.clone();
    for file in env_files(cwd, &mode) {
        let text = match std::fs::read_to_string(&file) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "Failed to read env file");
                continue;
            }
        };
        tracing::debug!(file = %file.display(), "Loading env file");
        for (key, value) in parse(&text, &file) {
            merged.entry(key).or_insert(value);
        }
    }

    let mut public: BTreeMap<String, String> = merged
        .into_iter()
        .filter(|(key, _)| key.starts_with(PUBLIC_PREFIX))
        .collect();
    public.insert("NODE_ENV".to_string(), mode);
    public
}

/// The `process.env` define for the current process.
pub fn process_env_define(cwd: &Path) -> Result<(String, String)> {
    let process: BTreeMap<String, String> = std::env::vars().collect();
    let vars = collect(cwd, &process);
    Ok((PROCESS_ENV.to_string(), serde_json::to_string(&vars)?))
}

/// Parse `KEY=VALUE` lines. Malformed lines are logged and skipped.
fn parse(text: &str, file: &Path) -> Vec<(String, String)> {
    let mut vars = Vec::new();
    for (number, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((key, value)) = line.split_once('=') else {
            tracing::warn!(file = %file.display(), line = number + 1, "Skipping malformed env line");
            continue;
        };
        let key = key.trim();
        if !is_valid_key(key) {
            tracing::warn!(file = %file.display(), line = number + 1, key, "Skipping invalid env key");
            continue;
        }
        vars.push((key.to_string(), unquote(value.trim())));
    }
    vars
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 {
        if let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
            return inner.replace("\\n", "\n").replace("\\\"", "\"");
        }
        if let Some(inner) = value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')) {
            return inner.to_string();
        }
    }
    // Unquoted values may carry a trailing comment
    match value.find(" #") {
        Some(pos) => value[..pos].trim_end().to_string(),
        None => value.to_string(),
    }
}

//! Stylesheet compiler that runs the `sass` executable.
//!
//! The executable prints CSS but not the list of files it read, so the
//! dependency list is recovered by following `@use`, `@forward` and `@import`
//! rules with Sass' partial resolution rules.

use super::{CompiledStylesheet, StylesheetCompiler};
use crate::error::SassError;
use path_clean::PathClean;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

static RULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*@(?:use|forward|import)\s+(.+)$").expect("rule pattern is valid")
});
static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["']([^"']+)["']"#).expect("quoted pattern is valid"));

/// Runs `sass` as a child process.
#[derive(Debug, Clone)]
pub struct SassCli {
    program: PathBuf,
    cwd: PathBuf,
    load_paths: Vec<PathBuf>,
}

impl SassCli {
    /// Create a compiler rooted at `cwd`.
    ///
    /// `cwd` and every `*/node_modules` directory directly below it are used
    /// as load paths, after the directory of the stylesheet being compiled.
    pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        let cwd = cwd.into();
        let mut load_paths = vec![cwd.clone()];
        load_paths.extend(node_modules_below(&cwd));
        Self {
            program: program.into(),
            cwd,
            load_paths,
        }
    }

    pub fn load_paths(&self) -> &[PathBuf] {
        &self.load_paths
    }

    fn load_paths_for(&self, path: &Path) -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(self.load_paths.len() + 1);
        if let Some(dir) = path.parent() {
            paths.push(dir.to_path_buf());
        }
        paths.extend(self.load_paths.iter().cloned());
        paths
    }
}

impl StylesheetCompiler for SassCli {
    fn compile(&self, path: &Path) -> Result<CompiledStylesheet, SassError> {
        if let Err(source) = std::fs::File::open(path) {
            return Err(SassError::Open {
                path: path.to_path_buf(),
                source,
            });
        }

        let load_paths = self.load_paths_for(path);
        let mut command = Command::new(&self.program);
        command.arg("--no-source-map").current_dir(&self.cwd);
        for dir in &load_paths {
            command.arg(format!("--load-path={}", dir.display()));
        }
        command.arg(path);

        let output = command.output().map_err(|source| SassError::Spawn {
            program: self.program.display().to_string(),
            source,
        })?;

        if !output.status.success() {
            return Err(SassError::Compile {
                path: path.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let mut sources = vec![path.to_path_buf()];
        sources.extend(discover_imports(path, &load_paths[1..]));

        Ok(CompiledStylesheet {
            css: String::from_utf8_lossy(&output.stdout).into_owned(),
            sources,
        })
    }
}

fn node_modules_below(cwd: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(cwd) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path().join("node_modules"))
        .filter(|candidate| candidate.is_dir())
        .collect();
    dirs.sort();
    dirs
}

/// Every stylesheet reachable from `path` through import rules, in discovery
/// order, excluding `path` itself. Unresolvable imports are skipped.
pub fn discover_imports(path: &Path, load_paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut seen: HashSet<PathBuf> = HashSet::from([path.to_path_buf()]);
    let mut pending = vec![path.to_path_buf()];

    while let Some(file) = pending.pop() {
        let Ok(text) = std::fs::read_to_string(&file) else {
            continue;
        };
        let indented = file.extension().is_some_and(|ext| ext == "sass");
        let mut base_dirs: Vec<PathBuf> = file.parent().map(Path::to_path_buf).into_iter().collect();
        base_dirs.extend(load_paths.iter().cloned());

        let mut discovered = Vec::new();
        for spec in text.lines().flat_map(|line| import_specs(line, indented)) {
            if let Some(resolved) = resolve_import(&spec, &base_dirs) {
                if seen.insert(resolved.clone()) {
                    discovered.push(resolved);
                }
            }
        }

        found.extend(discovered.iter().cloned());
        pending.extend(discovered.into_iter().rev());
    }

    found
}

/// Import targets named on one line.
fn import_specs(line: &str, indented: bool) -> Vec<String> {
    let Some(captures) = RULE.captures(line) else {
        return Vec::new();
    };
    let clause = &captures[1];

    let mut specs: Vec<String> = QUOTED
        .captures_iter(clause)
        .map(|c| c[1].to_string())
        .collect();

    if specs.is_empty() && indented {
        if let Some(bare) = clause.split_whitespace().next() {
            specs.push(bare.trim_end_matches([';', ',']).to_string());
        }
    }

    specs.retain(|spec| {
        !(spec.starts_with("sass:")
            || spec.starts_with("http://")
            || spec.starts_with("https://")
            || spec.starts_with("url(")
            || spec.ends_with(".css"))
    });
    specs
}

/// Resolve an import the way Sass does: partials, both syntaxes, index files.
fn resolve_import(spec: &str, base_dirs: &[PathBuf]) -> Option<PathBuf> {
    let spec_path = Path::new(spec);
    let name = spec_path.file_name()?.to_string_lossy().into_owned();
    let parent = spec_path.parent().unwrap_or(Path::new(""));

    let has_extension = spec_path
        .extension()
        .is_some_and(|ext| ext == "scss" || ext == "sass");

    let mut candidates: Vec<PathBuf> = Vec::new();
    if has_extension {
        candidates.push(parent.join(format!("_{name}")));
        candidates.push(parent.join(&name));
    } else {
        for ext in ["scss", "sass"] {
            candidates.push(parent.join(format!("_{name}.{ext}")));
            candidates.push(parent.join(format!("{name}.{ext}")));
        }
        for ext in ["scss", "sass"] {
            candidates.push(spec_path.join(format!("_index.{ext}")));
            candidates.push(spec_path.join(format!("index.{ext}")));
        }
    }

    base_dirs.iter().find_map(|dir| {
        candidates
            .iter()
            .map(|candidate| dir.join(candidate).clean())
            .find(|full| full.is_file())
    })
}

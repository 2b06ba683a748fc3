//! Bundler adapter that runs the `esbuild` executable.
//!
//! Each build writes into a private temporary directory which is read back
//! into memory and discarded, so nothing is left on disk. Output paths and the
//! metafile are rewritten to the served paths under the configured target.
//!
//! Load hooks run ahead of esbuild. Entry points a hook matches are compiled
//! into a staging directory first. Files a script reaches through an import
//! are found with a first run in which hooked extensions use the `empty`
//! loader; when any turn up, they are compiled and a second run adds one CSS
//! bundle per script entry that imports them.

use super::{BuildOptions, BundleOutput, Bundler, OutputFile};
use crate::error::BundlerError;
use crate::manifest::Metafile;
use crate::snapshot::Message;
use path_clean::PathClean;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use walkdir::WalkDir;

const ERROR_MARKERS: [&str; 2] = ["✘ [ERROR]", "X [ERROR]"];
const WARNING_MARKERS: [&str; 1] = ["▲ [WARNING]"];

/// Runs `esbuild` as a child process.
#[derive(Debug, Clone)]
pub struct EsbuildCli {
    program: PathBuf,
}

impl Default for EsbuildCli {
    fn default() -> Self {
        Self::new("esbuild")
    }
}

/// Where a staged entry point came from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Origin {
    Configured,
    /// Produced by a load hook from this configured input
    Hooked(String),
    /// CSS bundle of the hooked files a script entry imports
    Companion,
}

/// An entry point as handed to the executable.
struct StagedEntry {
    name: String,
    input: PathBuf,
    origin: Origin,
}

/// What one esbuild run left behind.
struct Run {
    outdir: PathBuf,
    metafile: PathBuf,
    status: ExitStatus,
    stderr: String,
}

/// The slice of esbuild's metafile that records imports.
#[derive(Deserialize)]
struct ImportGraph {
    #[serde(default)]
    inputs: HashMap<String, ImportNode>,
}

#[derive(Deserialize)]
struct ImportNode {
    #[serde(default)]
    imports: Vec<ImportRecord>,
}

#[derive(Deserialize)]
struct ImportRecord {
    path: String,
    #[serde(default)]
    external: bool,
}

impl EsbuildCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Command-line arguments for one build.
    fn arguments(
        options: &BuildOptions,
        entries: &[StagedEntry],
        outdir: &Path,
        metafile: &Path,
    ) -> Vec<String> {
        let mut args: Vec<String> = entries
            .iter()
            .map(|entry| format!("{}={}", entry.name, entry.input.display()))
            .collect();

        args.push("--bundle".to_string());
        args.push(format!("--outdir={}", outdir.display()));
        args.push(format!("--metafile={}", metafile.display()));
        args.push(format!("--public-path={}", options.target));
        args.push(if options.file_hash {
            "--entry-names=[name]-[hash]".to_string()
        } else {
            "--entry-names=[name]".to_string()
        });
        args.push("--jsx=transform".to_string());
        if options.sourcemap {
            args.push("--sourcemap=linked".to_string());
        }
        for (extension, loader) in &options.loaders {
            args.push(format!("--loader:{extension}={loader}"));
        }
        for extension in hooked_extensions(options) {
            args.push(format!("--loader:{extension}=empty"));
        }
        for (key, value) in &options.defines {
            args.push(format!("--define:{key}={value}"));
        }
        for file in &options.inject {
            args.push(format!("--inject:{}", file.display()));
        }
        args.push("--log-level=warning".to_string());
        args.push("--color=false".to_string());
        args
    }

    /// Run load hooks over the entry points, writing their output to `staging`.
    fn stage_entries(
        options: &BuildOptions,
        staging: &Path,
        output: &mut BundleOutput,
    ) -> Result<Vec<StagedEntry>, BundlerError> {
        let mut entries = Vec::with_capacity(options.entry_points.len());

        for (i, entry) in options.entry_points.iter().enumerate() {
            let input = options.cwd.join(&entry.input).clean();
            let name = entry.output_name();

            let Some(hook) = options.load_hooks.iter().find(|hook| hook.matches(&input)) else {
                entries.push(StagedEntry {
                    name,
                    input,
                    origin: Origin::Configured,
                });
                continue;
            };

            match hook.load(&input) {
                Ok(loaded) => {
                    let dir = staging.join(i.to_string());
                    std::fs::create_dir_all(&dir)?;
                    let staged = dir.join(format!("{name}.{}", loaded.loader));
                    std::fs::write(&staged, loaded.contents)?;

                    output.watch_files.extend(loaded.watch_files);
                    entries.push(StagedEntry {
                        name,
                        input: staged,
                        origin: Origin::Hooked(entry.input.to_string_lossy().into_owned()),
                    });
                }
                Err(e) => {
                    tracing::debug!(hook = hook.name(), input = %input.display(), "Load hook failed");
                    output.errors.push(Message::new(format!(
                        "[plugin {}] {}: {}",
                        hook.name(),
                        entry.input.display(),
                        e
                    )));
                }
            }
        }

        Ok(entries)
    }

    /// Compile the hooked files that configured entry points import.
    ///
    /// `metafile` comes from a run where hooked extensions used the `empty`
    /// loader. Returns one CSS entry per script entry that imports any, each
    /// `@import`ing the compiled files in the order they were reached.
    fn stage_imports(
        options: &BuildOptions,
        entries: &[StagedEntry],
        metafile: &str,
        staging: &Path,
        output: &mut BundleOutput,
    ) -> Result<Vec<StagedEntry>, BundlerError> {
        let graph: ImportGraph = serde_json::from_str(metafile)
            .map_err(|e| BundlerError::Output(format!("metafile: {e}")))?;
        let resolve = |path: &str| options.cwd.join(path).clean();
        let imports: HashMap<PathBuf, Vec<PathBuf>> = graph
            .inputs
            .into_iter()
            .map(|(input, node)| {
                let children = node
                    .imports
                    .into_iter()
                    .filter(|record| !record.external)
                    .map(|record| resolve(&record.path))
                    .collect();
                (resolve(&input), children)
            })
            .collect();

        let mut compiled: HashMap<PathBuf, Option<PathBuf>> = HashMap::new();
        let mut companions = Vec::new();

        for (i, entry) in entries.iter().enumerate() {
            if entry.origin != Origin::Configured {
                continue;
            }

            let mut found = Vec::new();
            hooked_imports(&entry.input, &imports, options, &mut HashSet::new(), &mut found);

            let mut bundle = String::new();
            for stylesheet in found {
                let staged = match compiled.get(&stylesheet) {
                    Some(staged) => staged.clone(),
                    None => {
                        let staged =
                            Self::compile_import(options, &stylesheet, staging, compiled.len(), output)?;
                        compiled.insert(stylesheet, staged.clone());
                        staged
                    }
                };
                if let Some(staged) = staged {
                    bundle.push_str(&format!(
                        "@import \"{}\";\n",
                        staged.to_string_lossy().replace('\\', "/")
                    ));
                }
            }
            if bundle.is_empty() {
                continue;
            }

            let dir = staging.join("bundles").join(i.to_string());
            std::fs::create_dir_all(&dir)?;
            let input = dir.join(format!("{}.css", entry.name));
            std::fs::write(&input, bundle)?;
            companions.push(StagedEntry {
                name: entry.name.clone(),
                input,
                origin: Origin::Companion,
            });
        }

        Ok(companions)
    }

    /// Run the matching hook over one imported file. A hook failure is
    /// recorded as a compile error and yields `None`.
    fn compile_import(
        options: &BuildOptions,
        path: &Path,
        staging: &Path,
        n: usize,
        output: &mut BundleOutput,
    ) -> Result<Option<PathBuf>, BundlerError> {
        let Some(hook) = options.load_hooks.iter().find(|hook| hook.matches(path)) else {
            return Ok(None);
        };

        match hook.load(path) {
            Ok(loaded) => {
                let dir = staging.join("imports");
                std::fs::create_dir_all(&dir)?;
                let staged = dir.join(format!("{n}.{}", loaded.loader));
                std::fs::write(&staged, loaded.contents)?;
                output.watch_files.extend(loaded.watch_files);
                Ok(Some(staged))
            }
            Err(e) => {
                tracing::debug!(hook = hook.name(), input = %path.display(), "Load hook failed");
                let shown = path.strip_prefix(&options.cwd).unwrap_or(path);
                output.errors.push(Message::new(format!(
                    "[plugin {}] {}: {}",
                    hook.name(),
                    shown.display(),
                    e
                )));
                Ok(None)
            }
        }
    }

    /// Run the executable once, writing below `dir`.
    fn invoke(
        &self,
        options: &BuildOptions,
        entries: &[StagedEntry],
        dir: &Path,
    ) -> Result<Run, BundlerError> {
        let outdir = dir.join("out");
        let metafile = dir.join("meta.json");

        let mut command = Command::new(&self.program);
        command
            .args(Self::arguments(options, entries, &outdir, &metafile))
            .current_dir(&options.cwd);
        if !options.node_paths.is_empty() {
            let joined = std::env::join_paths(&options.node_paths)
                .map_err(|e| BundlerError::Output(format!("invalid node path: {e}")))?;
            command.env("NODE_PATH", joined);
        }

        tracing::debug!(program = %self.program.display(), entries = entries.len(), "Running esbuild");
        let result = command.output().map_err(|source| BundlerError::Spawn {
            program: self.program.display().to_string(),
            source,
        })?;

        Ok(Run {
            outdir,
            metafile,
            status: result.status,
            stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
        })
    }
}

impl Bundler for EsbuildCli {
    fn build(&self, options: &BuildOptions) -> Result<BundleOutput, BundlerError> {
        let work = tempfile::Builder::new().prefix("kiln-esbuild-").tempdir()?;
        // esbuild reports real paths; a symlinked temp dir would not match them
        let root = std::fs::canonicalize(work.path())?;
        let staging = root.join("staged");

        let mut output = BundleOutput::default();
        let mut entries = Self::stage_entries(options, &staging, &mut output)?;
        if entries.is_empty() {
            return Ok(output);
        }

        let mut run = self.invoke(options, &entries, &root.join("first"))?;
        if !hooked_extensions(options).is_empty() && run.metafile.exists() {
            let raw = std::fs::read_to_string(&run.metafile)?;
            let companions = Self::stage_imports(options, &entries, &raw, &staging, &mut output)?;
            if !companions.is_empty() {
                tracing::debug!(bundles = companions.len(), "Rebuilding with compiled imports");
                entries.extend(companions);
                run = self.invoke(options, &entries, &root.join("second"))?;
            }
        }

        let (errors, warnings) = parse_diagnostics(&run.stderr);
        output.warnings.extend(warnings);
        if errors.is_empty() && !run.status.success() {
            let detail = run.stderr.trim();
            output.errors.push(Message::new(if detail.is_empty() {
                format!("esbuild exited with {}", run.status)
            } else {
                detail.to_string()
            }));
        }
        output.errors.extend(errors);

        output.files = collect_outputs(&run.outdir, &options.target)?;

        if run.metafile.exists() {
            let raw = std::fs::read_to_string(&run.metafile)?;
            let rewritten = rewrite_metafile(&raw, options, &root, &run.outdir, &entries)?;
            output.metafile = Some(rewritten);
        }

        Ok(output)
    }
}

/// Extensions load hooks claim that have no configured loader.
fn hooked_extensions(options: &BuildOptions) -> Vec<&'static str> {
    let mut extensions: Vec<&'static str> = Vec::new();
    for extension in options.load_hooks.iter().flat_map(|hook| hook.extensions()) {
        if !options.loaders.contains_key(*extension) && !extensions.contains(extension) {
            extensions.push(*extension);
        }
    }
    extensions
}

/// Depth-first walk of the import graph from `from`, collecting files a hook
/// matches in the order they are reached. Hooked files are not descended
/// into; the hook reports their own dependencies.
fn hooked_imports(
    from: &Path,
    imports: &HashMap<PathBuf, Vec<PathBuf>>,
    options: &BuildOptions,
    seen: &mut HashSet<PathBuf>,
    found: &mut Vec<PathBuf>,
) {
    let Some(children) = imports.get(from) else {
        return;
    };
    for child in children {
        if !seen.insert(child.clone()) {
            continue;
        }
        if options.load_hooks.iter().any(|hook| hook.matches(child)) {
            found.push(child.clone());
        } else {
            hooked_imports(child, imports, options, seen, found);
        }
    }
}

/// Split esbuild's log output into error and warning messages.
///
/// Each message starts with a marker line; the first location line that
/// follows (`  src/index.js:1:18:`) is appended to it.
fn parse_diagnostics(stderr: &str) -> (Vec<Message>, Vec<Message>) {
    #[derive(PartialEq)]
    enum Kind {
        Error,
        Warning,
    }

    let mut messages: Vec<(Kind, String, bool)> = Vec::new();

    for line in stderr.lines() {
        let trimmed = line.trim();

        let header = ERROR_MARKERS
            .iter()
            .find_map(|marker| trimmed.strip_prefix(marker).map(|rest| (Kind::Error, rest)))
            .or_else(|| {
                WARNING_MARKERS
                    .iter()
                    .find_map(|marker| trimmed.strip_prefix(marker).map(|rest| (Kind::Warning, rest)))
            });

        if let Some((kind, rest)) = header {
            messages.push((kind, rest.trim().to_string(), false));
            continue;
        }

        if let Some((_, text, located)) = messages.last_mut() {
            if !*located && line.starts_with(' ') && is_location(trimmed) {
                text.push_str(&format!(" ({})", trimmed.trim_end_matches(':')));
                *located = true;
            }
        }
    }

    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    for (kind, text, _) in messages {
        match kind {
            Kind::Error => errors.push(Message::new(text)),
            Kind::Warning => warnings.push(Message::new(text)),
        }
    }
    (errors, warnings)
}

/// `path:line:column:`
fn is_location(line: &str) -> bool {
    let Some(body) = line.strip_suffix(':') else {
        return false;
    };
    let mut parts = body.rsplitn(3, ':');
    let column = parts.next().unwrap_or("");
    let row = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("");
    !path.is_empty()
        && !column.is_empty()
        && column.chars().all(|c| c.is_ascii_digit())
        && !row.is_empty()
        && row.chars().all(|c| c.is_ascii_digit())
}

/// Served path for a file under `outdir`.
fn served_path(target: &str, outdir: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(outdir).ok()?;
    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(format!("{}/{}", target, segments.join("/")))
}

/// Read every file esbuild wrote, sorted by served path.
fn collect_outputs(outdir: &Path, target: &str) -> Result<Vec<OutputFile>, BundlerError> {
    if !outdir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(outdir).sort_by_file_name() {
        let entry = entry.map_err(|e| BundlerError::Output(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(path) = served_path(target, outdir, entry.path()) else {
            continue;
        };
        files.push(OutputFile {
            path,
            contents: std::fs::read(entry.path())?,
        });
    }
    Ok(files)
}

/// Rewrite esbuild's metafile so outputs are keyed by served path and staged
/// entry points name their configured input. Temporary inputs are dropped.
fn rewrite_metafile(
    raw: &str,
    options: &BuildOptions,
    root: &Path,
    outdir: &Path,
    entries: &[StagedEntry],
) -> Result<String, BundlerError> {
    let parsed: Metafile =
        serde_json::from_str(raw).map_err(|e| BundlerError::Output(format!("metafile: {e}")))?;

    let staged: HashMap<PathBuf, &Origin> = entries
        .iter()
        .map(|entry| (entry.input.clone(), &entry.origin))
        .collect();
    let resolve = |path: &str| options.cwd.join(path).clean();
    let is_temporary = |path: &str| resolve(path).starts_with(root);

    let mut rewritten = Metafile::default();
    for (input, descriptor) in parsed.inputs {
        if !is_temporary(&input) {
            rewritten.inputs.insert(input, descriptor);
        }
    }
    for (output, mut descriptor) in parsed.outputs {
        let Some(served) = served_path(&options.target, outdir, &resolve(&output)) else {
            continue;
        };
        if let Some(entry) = descriptor.entry_point.take() {
            descriptor.entry_point = match staged.get(&resolve(&entry)) {
                Some(Origin::Hooked(original)) => Some(original.clone()),
                // Keyed by its served path, so the script keeps its entry name
                Some(Origin::Companion) => None,
                _ => Some(entry),
            };
        }
        descriptor.inputs.retain(|input, _| !is_temporary(input));
        rewritten.outputs.insert(served, descriptor);
    }

    serde_json::to_string(&rewritten).map_err(|e| BundlerError::Output(format!("metafile: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{EntryPoint, LoadHook, LoadResult};
    use crate::loader::Loader;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn options(cwd: &Path) -> BuildOptions {
        BuildOptions {
            cwd: cwd.to_path_buf(),
            entry_points: vec![EntryPoint::new("src/index.js")],
            target: "/_build".to_string(),
            loaders: BTreeMap::new(),
            defines: BTreeMap::new(),
            inject: Vec::new(),
            node_paths: Vec::new(),
            file_hash: false,
            sourcemap: true,
            load_hooks: Vec::new(),
        }
    }

    struct Upper;

    impl LoadHook for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn matches(&self, path: &Path) -> bool {
            path.extension().is_some_and(|ext| ext == "txt")
        }

        fn extensions(&self) -> &[&'static str] {
            &[".txt"]
        }

        fn load(&self, path: &Path) -> crate::Result<LoadResult> {
            let text = std::fs::read_to_string(path)?;
            Ok(LoadResult {
                contents: text.to_uppercase(),
                loader: Loader::Css,
                watch_files: vec![path.to_path_buf()],
            })
        }
    }

    #[test]
    fn test_arguments() {
        let mut opts = options(Path::new("/srv/app"));
        opts.file_hash = true;
        opts.loaders.insert(".png".to_string(), Loader::DataUrl);
        opts.defines
            .insert("process.env".to_string(), "{\"NODE_ENV\":\"development\"}".to_string());
        opts.inject.push(PathBuf::from("/tmp/shim.js"));
        opts.load_hooks = vec![Arc::new(Upper)];

        let entries = vec![StagedEntry {
            name: "index".to_string(),
            input: PathBuf::from("/srv/app/src/index.js"),
            origin: Origin::Configured,
        }];
        let args = EsbuildCli::arguments(
            &opts,
            &entries,
            Path::new("/tmp/w/out"),
            Path::new("/tmp/w/meta.json"),
        );

        assert_eq!(args[0], "index=/srv/app/src/index.js");
        assert!(args.contains(&"--bundle".to_string()));
        assert!(args.contains(&"--outdir=/tmp/w/out".to_string()));
        assert!(args.contains(&"--public-path=/_build".to_string()));
        assert!(args.contains(&"--entry-names=[name]-[hash]".to_string()));
        assert!(args.contains(&"--sourcemap=linked".to_string()));
        assert!(args.contains(&"--loader:.png=dataurl".to_string()));
        assert!(args.contains(&"--define:process.env={\"NODE_ENV\":\"development\"}".to_string()));
        assert!(args.contains(&"--inject:/tmp/shim.js".to_string()));
        assert!(args.contains(&"--loader:.txt=empty".to_string()));
    }

    #[test]
    fn test_configured_loader_wins_over_hook() {
        let mut opts = options(Path::new("/srv/app"));
        opts.loaders.insert(".txt".to_string(), Loader::Text);
        opts.load_hooks = vec![Arc::new(Upper), Arc::new(Upper)];
        assert!(hooked_extensions(&opts).is_empty());

        opts.loaders.clear();
        assert_eq!(hooked_extensions(&opts), vec![".txt"]);
    }

    #[test]
    fn test_parse_diagnostics() {
        let stderr = "\
✘ [ERROR] Could not resolve \"react\"

    src/index.js:1:18:
      1 │ import React from \"react\";
        ╵                   ~~~~~~~

  You can mark the path \"react\" as external to exclude it from the bundle.

▲ [WARNING] Comparison with -0 using the \"===\" operator will also match 0

    src/util.js:3:6:
      3 │ if (x === -0) {}
        ╵       ~~~

1 warning and 1 error
";
        let (errors, warnings) = parse_diagnostics(stderr);

        assert_eq!(
            errors,
            vec![Message::new("Could not resolve \"react\" (src/index.js:1:18)")]
        );
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].text.ends_with("(src/util.js:3:6)"));
    }

    #[test]
    fn test_is_location() {
        assert!(is_location("src/index.js:1:18:"));
        assert!(is_location("C:/app/src/index.js:10:2:"));
        assert!(!is_location("You can mark the path as external:"));
        assert!(!is_location("src/index.js:1:18"));
    }

    #[test]
    fn test_collect_outputs_maps_to_served_paths() {
        let temp = tempfile::TempDir::new().unwrap();
        let out = temp.path().join("out");
        std::fs::create_dir_all(out.join("chunks")).unwrap();
        std::fs::write(out.join("index.js"), "a").unwrap();
        std::fs::write(out.join("chunks/shared.js"), "b").unwrap();

        let files = collect_outputs(&out, "/_build").unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["/_build/chunks/shared.js", "/_build/index.js"]);
        assert_eq!(files[1].contents, b"a");
    }

    #[test]
    fn test_collect_outputs_missing_dir_is_empty() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(collect_outputs(&temp.path().join("out"), "/_build")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_rewrite_metafile() {
        let cwd = Path::new("/srv/app");
        let root = Path::new("/tmp/kiln-esbuild-x");
        let outdir = root.join("out");
        let entries = vec![
            StagedEntry {
                name: "app".to_string(),
                input: root.join("staged/1/app.css"),
                origin: Origin::Hooked("styles/app.scss".to_string()),
            },
            StagedEntry {
                name: "index".to_string(),
                input: root.join("staged/bundles/0/index.css"),
                origin: Origin::Companion,
            },
        ];
        let raw = r#"{
            "inputs": {
                "src/index.js": { "bytes": 10 },
                "../../tmp/kiln-esbuild-x/staged/1/app.css": { "bytes": 5 }
            },
            "outputs": {
                "../../tmp/kiln-esbuild-x/out/index.js": {
                    "entryPoint": "src/index.js",
                    "inputs": { "src/index.js": { "bytesInOutput": 9 } },
                    "bytes": 20
                },
                "../../tmp/kiln-esbuild-x/out/app.css": {
                    "entryPoint": "../../tmp/kiln-esbuild-x/staged/1/app.css",
                    "inputs": { "../../tmp/kiln-esbuild-x/staged/1/app.css": { "bytesInOutput": 5 } },
                    "bytes": 5
                },
                "../../tmp/kiln-esbuild-x/out/index.css": {
                    "entryPoint": "../../tmp/kiln-esbuild-x/staged/bundles/0/index.css",
                    "inputs": {},
                    "bytes": 3
                }
            }
        }"#;

        let rewritten =
            rewrite_metafile(raw, &options(cwd), root, &outdir, &entries).unwrap();
        let metafile: Metafile = serde_json::from_str(&rewritten).unwrap();

        assert_eq!(metafile.inputs.len(), 1);
        assert!(metafile.inputs.contains_key("src/index.js"));

        let js = &metafile.outputs["/_build/index.js"];
        assert_eq!(js.entry_point.as_deref(), Some("src/index.js"));
        let css = &metafile.outputs["/_build/app.css"];
        assert_eq!(css.entry_point.as_deref(), Some("styles/app.scss"));
        assert!(css.inputs.is_empty());
        let bundle = &metafile.outputs["/_build/index.css"];
        assert!(bundle.entry_point.is_none());
    }

    #[test]
    fn test_stage_entries_runs_matching_hook() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("words.txt"), "body{}").unwrap();

        let mut opts = options(temp.path());
        opts.entry_points = vec![EntryPoint::new("words.txt"), EntryPoint::new("src/index.js")];
        opts.load_hooks = vec![Arc::new(Upper)];

        let staging = temp.path().join("staged");
        let mut output = BundleOutput::default();
        let entries = EsbuildCli::stage_entries(&opts, &staging, &mut output).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].input, staging.join("0/words.css"));
        assert_eq!(entries[0].origin, Origin::Hooked("words.txt".to_string()));
        assert_eq!(std::fs::read_to_string(&entries[0].input).unwrap(), "BODY{}");
        assert_eq!(entries[1].origin, Origin::Configured);
        assert_eq!(output.watch_files, vec![temp.path().join("words.txt")]);
    }

    #[test]
    fn test_stage_entries_reports_hook_failure_as_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut opts = options(temp.path());
        opts.entry_points = vec![EntryPoint::new("missing.txt")];
        opts.load_hooks = vec![Arc::new(Upper)];

        let mut output = BundleOutput::default();
        let entries =
            EsbuildCli::stage_entries(&opts, &temp.path().join("staged"), &mut output).unwrap();

        assert!(entries.is_empty());
        assert_eq!(output.errors.len(), 1);
        assert!(output.errors[0].text.starts_with("[plugin upper] missing.txt"));
    }

    #[test]
    fn test_stage_imports_bundles_hooked_imports_of_a_script() {
        let temp = tempfile::TempDir::new().unwrap();
        let cwd = temp.path();
        std::fs::create_dir_all(cwd.join("src")).unwrap();
        std::fs::write(cwd.join("src/app.txt"), "body{}").unwrap();
        std::fs::write(cwd.join("src/widget.txt"), "p{}").unwrap();

        let mut opts = options(cwd);
        opts.load_hooks = vec![Arc::new(Upper)];
        let staging = cwd.join("staged");
        let mut output = BundleOutput::default();
        let entries = EsbuildCli::stage_entries(&opts, &staging, &mut output).unwrap();

        // index.js imports app.txt and widget.js, which imports widget.txt
        let metafile = r#"{
            "inputs": {
                "src/index.js": { "imports": [
                    { "path": "src/app.txt", "kind": "import-statement" },
                    { "path": "src/widget.js", "kind": "import-statement" },
                    { "path": "react", "kind": "import-statement", "external": true }
                ] },
                "src/widget.js": { "imports": [
                    { "path": "src/widget.txt", "kind": "import-statement" },
                    { "path": "src/app.txt", "kind": "import-statement" }
                ] },
                "src/app.txt": { "imports": [] },
                "src/widget.txt": { "imports": [] }
            }
        }"#;

        let companions =
            EsbuildCli::stage_imports(&opts, &entries, metafile, &staging, &mut output).unwrap();

        assert_eq!(companions.len(), 1);
        assert_eq!(companions[0].name, "index");
        assert_eq!(companions[0].origin, Origin::Companion);
        assert_eq!(companions[0].input, staging.join("bundles/0/index.css"));

        let first = staging.join("imports/0.css");
        let second = staging.join("imports/1.css");
        let bundle = std::fs::read_to_string(&companions[0].input).unwrap();
        assert_eq!(
            bundle,
            format!(
                "@import \"{}\";\n@import \"{}\";\n",
                first.to_string_lossy().replace('\\', "/"),
                second.to_string_lossy().replace('\\', "/")
            )
        );
        assert_eq!(std::fs::read_to_string(&first).unwrap(), "BODY{}");
        assert_eq!(std::fs::read_to_string(&second).unwrap(), "P{}");
        assert_eq!(
            output.watch_files,
            vec![cwd.join("src/app.txt"), cwd.join("src/widget.txt")]
        );
        assert!(output.errors.is_empty());
    }

    #[test]
    fn test_stage_imports_reports_hook_failure() {
        let temp = tempfile::TempDir::new().unwrap();
        let cwd = temp.path();

        let mut opts = options(cwd);
        opts.load_hooks = vec![Arc::new(Upper)];
        let staging = cwd.join("staged");
        let mut output = BundleOutput::default();
        let entries = EsbuildCli::stage_entries(&opts, &staging, &mut output).unwrap();

        let metafile = r#"{
            "inputs": {
                "src/index.js": { "imports": [ { "path": "src/gone.txt", "kind": "import-statement" } ] }
            }
        }"#;
        let companions =
            EsbuildCli::stage_imports(&opts, &entries, metafile, &staging, &mut output).unwrap();

        assert!(companions.is_empty());
        assert_eq!(output.errors.len(), 1);
        assert!(output.errors[0].text.starts_with("[plugin upper] src/gone.txt"));
    }

    #[test]
    fn test_stage_imports_without_hooked_imports_is_empty() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut opts = options(temp.path());
        opts.load_hooks = vec![Arc::new(Upper)];
        let staging = temp.path().join("staged");
        let mut output = BundleOutput::default();
        let entries = EsbuildCli::stage_entries(&opts, &staging, &mut output).unwrap();

        let metafile = r#"{ "inputs": { "src/index.js": { "imports": [] } } }"#;
        let companions =
            EsbuildCli::stage_imports(&opts, &entries, metafile, &staging, &mut output).unwrap();

        assert!(companions.is_empty());
        assert!(!staging.join("bundles").exists());
    }

    #[test]
    fn test_missing_executable_is_spawn_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let bundler = EsbuildCli::new(temp.path().join("no-such-esbuild"));
        let err = bundler.build(&options(temp.path())).unwrap_err();
        assert!(matches!(err, BundlerError::Spawn { .. }));
    }
}

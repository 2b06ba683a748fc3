//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use kiln::digest::digest;
use kiln::{BuildOptions, BundleOutput, Bundler, BundlerError, EngineConfig, EntryPoint, Message, OutputFile};
use serde_json::{Map, Value, json};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Body the fallback handler answers with, so tests can tell a
/// pass-through from a served asset.
pub const FALLTHROUGH: &str = "fallthrough";

/// Bundles each entry point by copying its source into one output file.
///
/// With file hashing on, the output name carries the first eight hex digits
/// of the source digest. A source containing `SYNTAX ERROR` produces a
/// compile error.
#[derive(Default)]
pub struct CopyBundler {
    pub calls: AtomicUsize,
    pub delay: Duration,
}

impl CopyBundler {
    pub fn slow(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Bundler for CopyBundler {
    fn build(&self, options: &BuildOptions) -> Result<BundleOutput, BundlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);

        let mut output = BundleOutput::default();
        let mut inputs = Map::new();
        let mut outputs = Map::new();

        for entry in &options.entry_points {
            let input = entry.input.to_string_lossy().into_owned();
            let source = std::fs::read_to_string(options.cwd.join(&entry.input))?;
            if source.contains("SYNTAX ERROR") {
                output
                    .errors
                    .push(Message::new(format!("{input}:1:0: Unexpected token")));
            }

            let name = entry.output_name();
            let file_name = if options.file_hash {
                format!("{name}-{}.js", &digest(source.as_bytes()).as_str()[..8])
            } else {
                format!("{name}.js")
            };
            let served = format!("{}/{file_name}", options.target);
            let contents = format!("/* {name} */\n{source}");

            inputs.insert(input.clone(), json!({ "bytes": source.len() }));
            let mut used = Map::new();
            used.insert(input.clone(), json!({ "bytesInOutput": source.len() }));
            outputs.insert(
                served.clone(),
                json!({ "entryPoint": input, "inputs": Value::Object(used), "bytes": contents.len() }),
            );
            output.files.push(OutputFile {
                path: served,
                contents: contents.into_bytes(),
            });
        }

        output.metafile = Some(
            json!({ "inputs": Value::Object(inputs), "outputs": Value::Object(outputs) })
                .to_string(),
        );
        Ok(output)
    }
}

/// A project directory with `src/index.js`.
pub fn project(source: &str) -> tempfile::TempDir {
    let temp = tempfile::TempDir::new().unwrap();
    write_source(temp.path(), source);
    temp
}

pub fn write_source(root: &Path, source: &str) {
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::write(root.join("src/index.js"), source).unwrap();
}

pub fn config(root: &Path) -> EngineConfig {
    EngineConfig {
        sources: vec![EntryPoint::new("src/index.js")],
        cwd: Some(root.canonicalize().unwrap()),
        ..EngineConfig::default()
    }
}

/// Router whose only route is a fallback answering 404 [`FALLTHROUGH`].
pub fn fallback_router() -> Router {
    Router::new().fallback(|| async { (StatusCode::NOT_FOUND, FALLTHROUGH) })
}

pub fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

pub async fn body_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

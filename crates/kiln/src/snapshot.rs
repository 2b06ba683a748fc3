//! Immutable build snapshots.
//!
//! A [`BuildSnapshot`] is everything one build produced: the output
//! artifacts indexed by served path, the diagnostics, the parsed manifest and
//! the files the build depended on. Snapshots are never edited once built;
//! the coordinator publishes a whole new one instead, so a reader holding an
//! `Arc<BuildSnapshot>` always sees one consistent build.

use crate::digest::{Digest, digest};
use crate::manifest::Manifest;
use axum::body::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// One compiled output file.
#[derive(Debug, Clone)]
pub struct OutputArtifact {
    path: String,
    bytes: Bytes,
    digest: Digest,
}

impl OutputArtifact {
    /// Create an artifact, hashing its content.
    ///
    /// # Arguments
    ///
    /// * `path` - Served path (e.g., "/_build/index.js")
    /// * `bytes` - File content
    pub fn new(path: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let digest = digest(&bytes);
        Self {
            path: path.into(),
            bytes,
            digest,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Content, cheap to clone into a response body.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }
}

/// A diagnostic message reported by the bundler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub text: String,
}

impl Message {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Errors and warnings from one build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub errors: Vec<Message>,
    pub warnings: Vec<Message>,
}

impl Diagnostics {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Opaque identity of a published snapshot.
///
/// Ids increase with every publication, so comparing two ids is enough to
/// tell whether a new build has been published since.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotId(pub(crate) u64);

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The complete, immutable result of one build.
#[derive(Debug)]
pub struct BuildSnapshot {
    id: SnapshotId,
    artifacts: Vec<OutputArtifact>,
    index: HashMap<String, usize>,
    diagnostics: Diagnostics,
    manifest: Option<Manifest>,
    dependencies: Vec<PathBuf>,
    built_at: DateTime<Utc>,
    duration: Duration,
}

impl BuildSnapshot {
    /// Assemble a snapshot. Later artifacts with a duplicate path shadow
    /// earlier ones in the index.
    pub fn new(
        id: SnapshotId,
        artifacts: Vec<OutputArtifact>,
        diagnostics: Diagnostics,
        manifest: Option<Manifest>,
        dependencies: Vec<PathBuf>,
        duration: Duration,
    ) -> Self {
        let index = artifacts
            .iter()
            .enumerate()
            .map(|(i, artifact)| (artifact.path.clone(), i))
            .collect();

        Self {
            id,
            artifacts,
            index,
            diagnostics,
            manifest,
            dependencies,
            built_at: Utc::now(),
            duration,
        }
    }

    pub fn id(&self) -> SnapshotId {
        self.id
    }

    /// Find the artifact served at exactly `path`.
    pub fn lookup(&self, path: &str) -> Option<&OutputArtifact> {
        self.index.get(path).map(|&i| &self.artifacts[i])
    }

    /// Digest of the artifact served at `path`, for ETag generation.
    pub fn digest_for(&self, path: &str) -> Option<&Digest> {
        self.lookup(path).map(OutputArtifact::digest)
    }

    /// Artifacts in the order the bundler reported them.
    pub fn artifacts(&self) -> &[OutputArtifact] {
        &self.artifacts
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    /// Files the build read; these make up the watch set.
    pub fn dependencies(&self) -> &[PathBuf] {
        &self.dependencies
    }

    /// Whether the build reported errors. Outputs of a failed build may be
    /// stale or partial.
    pub fn is_failed(&self) -> bool {
        self.diagnostics.has_errors()
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Wall time spent in the bundler call.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

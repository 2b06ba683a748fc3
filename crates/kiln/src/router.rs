//! HTTP middleware that serves the published build.
//!
//! Requests under the target prefix are answered from the current snapshot:
//! built files with ETags, the manifest and (when enabled) the live-reload
//! stream. Everything else, including paths the build did not produce, falls
//! through to the next handler.

use crate::coordinator::{BuildCoordinator, LIVE_RELOAD_PATH};
use crate::digest::{Digest, digest};
use crate::live_reload;
use crate::shutdown::Shutdown;
use crate::snapshot::BuildSnapshot;
use axum::Router;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response, Sse};
use std::sync::Arc;

/// Path of the manifest endpoint, below the target.
pub const MANIFEST_PATH: &str = "manifest.json";

/// Cache policy for content-hashed files, whose URL changes with their content.
pub const IMMUTABLE: &str = "public,max-age=31536000";

/// Everything the middleware needs per request.
#[derive(Clone)]
pub struct AssetState {
    coordinator: Arc<BuildCoordinator>,
    shutdown: Shutdown,
    target: String,
    live_reload: bool,
    file_hash: bool,
}

impl AssetState {
    pub fn new(coordinator: Arc<BuildCoordinator>, shutdown: Shutdown, live_reload: bool) -> Self {
        let options = coordinator.options();
        let target = options.target.clone();
        let file_hash = options.file_hash;
        Self {
            coordinator,
            shutdown,
            target,
            live_reload,
            file_hash,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

/// Put the asset middleware in front of `router`.
pub fn with_assets<S>(router: Router<S>, state: AssetState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(state, serve_assets))
}

/// Middleware entry point, for use with [`middleware::from_fn_with_state`].
pub async fn serve_assets(State(state): State<AssetState>, request: Request, next: Next) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    // Artifacts are indexed by their decoded served path
    let path = match urlencoding::decode(request.uri().path()) {
        Ok(path) => path.into_owned(),
        Err(_) => return next.run(request).await,
    };
    let Some(rest) = path
        .strip_prefix(state.target.as_str())
        .and_then(|rest| rest.strip_prefix('/'))
    else {
        return next.run(request).await;
    };

    if state.live_reload && rest == LIVE_RELOAD_PATH {
        let stream = live_reload::events(Arc::clone(&state.coordinator), state.shutdown.clone());
        return Sse::new(stream).into_response();
    }

    let snapshot = state.coordinator.current();

    if rest == MANIFEST_PATH {
        return manifest_response(snapshot.as_deref(), request.headers());
    }

    let Some(snapshot) = snapshot else {
        tracing::trace!(path = %path, "No build published yet");
        return next.run(request).await;
    };
    let Some(artifact) = snapshot.lookup(&path) else {
        return next.run(request).await;
    };

    let etag = artifact.digest().etag();
    if is_fresh(request.headers(), artifact.digest()) {
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response();
    }

    let cache_control = if state.file_hash { IMMUTABLE } else { "no-cache" };
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type(&path)),
            (header::ETAG, etag.as_str()),
            (header::CACHE_CONTROL, cache_control),
        ],
        artifact.bytes().clone(),
    )
        .into_response()
}

fn manifest_response(snapshot: Option<&BuildSnapshot>, headers: &HeaderMap) -> Response {
    let body = match snapshot.and_then(BuildSnapshot::manifest) {
        Some(manifest) => match serde_json::to_vec(manifest.entries()) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize manifest");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to serialize manifest")
                    .into_response();
            }
        },
        None => b"{}".to_vec(),
    };

    let digest = digest(&body);
    let etag = digest.etag();
    if is_fresh(headers, &digest) {
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response();
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::ETAG, etag.as_str()),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

fn is_fresh(headers: &HeaderMap, digest: &Digest) -> bool {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| digest.matches(value))
}

/// Determine content type from file extension.
///
/// Bundles are mostly scripts, so unknown extensions are served as
/// JavaScript.
pub fn content_type(path: &str) -> &'static str {
    let extension = std::path::Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("");

    match extension {
        "js" | "mjs" | "cjs" => "application/javascript",
        "css" => "text/css; charset=utf-8",
        "json" | "map" => "application/json",
        "html" => "text/html; charset=utf-8",
        "txt" => "text/plain; charset=utf-8",
        "wasm" => "application/wasm",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        _ => "application/javascript",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_by_extension() {
        assert_eq!(content_type("/_build/index.js"), "application/javascript");
        assert_eq!(content_type("/_build/app-3f2a.css"), "text/css; charset=utf-8");
        assert_eq!(content_type("/_build/index.js.map"), "application/json");
        assert_eq!(content_type("/_build/logo.svg"), "image/svg+xml");
        assert_eq!(content_type("/_build/font.woff2"), "font/woff2");
    }

    #[test]
    fn test_content_type_falls_back_to_javascript() {
        assert_eq!(content_type("/_build/chunk"), "application/javascript");
        assert_eq!(content_type("/_build/blob.xyz"), "application/javascript");
    }

    #[test]
    fn test_is_fresh() {
        let d = digest(b"body{}");
        let mut headers = HeaderMap::new();
        assert!(!is_fresh(&headers, &d));

        headers.insert(header::IF_NONE_MATCH, d.etag().parse().unwrap());
        assert!(is_fresh(&headers, &d));

        headers.insert(header::IF_NONE_MATCH, "\"stale\"".parse().unwrap());
        assert!(!is_fresh(&headers, &d));
    }

    #[test]
    fn test_empty_manifest_is_empty_object() {
        let response = manifest_response(None, &HeaderMap::new());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
    }
}

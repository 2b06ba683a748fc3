//! `kiln build`: build once and write the output to disk.

use crate::cli::BuildArgs;
use crate::config::KilnConfig;
use crate::error::{CliError, Result};
use kiln::{BuildCoordinator, BuildSnapshot};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Execute the build command.
///
/// Output files are written below `--out-dir` at their served path with the
/// target prefix removed, next to a `manifest.json` with the entry mapping.
///
/// # Errors
///
/// Returns errors for invalid configuration, a bundler that cannot run,
/// compile errors and failed writes
pub async fn execute(args: BuildArgs) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let config = KilnConfig::load(&args.build, &cwd)?;
    let engine_config = config.build.clone().validate()?;
    let project_dir = engine_config.resolved_cwd()?;
    let out_dir = project_dir.join(&args.out_dir);

    let (bundler, stylesheets) = super::tools(&config, &project_dir);
    let coordinator = Arc::new(BuildCoordinator::new(&engine_config, bundler, stylesheets)?);

    let snapshot = {
        let coordinator = Arc::clone(&coordinator);
        tokio::task::spawn_blocking(move || coordinator.build())
            .await
            .map_err(std::io::Error::other)?
    }
    .ok_or(CliError::NoOutput)?;

    if snapshot.is_failed() {
        return Err(CliError::BuildFailed {
            errors: snapshot.diagnostics().errors.len(),
        });
    }

    let written = write_snapshot(&snapshot, &engine_config.target, &out_dir).await?;
    tracing::info!(
        "Wrote {} file(s) to {} in {}ms",
        written,
        out_dir.display(),
        snapshot.duration().as_millis()
    );
    Ok(())
}

/// Write every artifact plus the manifest. Returns the number of files.
async fn write_snapshot(snapshot: &BuildSnapshot, target: &str, out_dir: &Path) -> Result<usize> {
    tokio::fs::create_dir_all(out_dir).await?;
    let mut written = 0;

    for artifact in snapshot.artifacts() {
        let Some(path) = output_path(out_dir, target, artifact.path()) else {
            tracing::warn!(path = artifact.path(), "Skipping output outside the target");
            continue;
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, artifact.bytes()).await?;
        tracing::debug!(path = %path.display(), bytes = artifact.bytes().len(), "Wrote");
        written += 1;
    }

    if let Some(manifest) = snapshot.manifest() {
        let json = serde_json::to_vec_pretty(manifest.entries()).map_err(kiln::Error::from)?;
        tokio::fs::write(out_dir.join("manifest.json"), json).await?;
        written += 1;
    }

    Ok(written)
}

/// Where a served path lands below `out_dir`.
///
/// Paths outside `target`, or that would escape `out_dir`, give `None`.
fn output_path(out_dir: &Path, target: &str, served: &str) -> Option<PathBuf> {
    let relative = Path::new(served.strip_prefix(target)?.strip_prefix('/')?);
    if relative.as_os_str().is_empty()
        || !relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
    {
        return None;
    }
    Some(out_dir.join(relative))
}

//! `kiln serve`: build, serve from memory and rebuild on change.

use crate::cli::ServeArgs;
use crate::config::KilnConfig;
use crate::error::{CliError, Result};
use axum::Router;
use figment::providers::Serialized;
use kiln::Engine;
use tower_http::services::ServeDir;

/// Execute the serve command.
///
/// # Process Flow
///
/// 1. Load configuration
/// 2. Provision the engine (first build, watcher)
/// 3. Serve the build in front of the static root
/// 4. On Ctrl+C, end live-reload streams, drain connections, stop watching
///
/// # Errors
///
/// Returns errors for invalid configuration, an unusable watcher or a
/// listener that cannot be bound
pub async fn execute(args: ServeArgs) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let mut figment = KilnConfig::figment(&args.build, &cwd)?;
    if let Some(listen) = args.listen {
        figment = figment.merge(Serialized::default("server.listen", listen));
    }
    if let Some(root) = &args.root {
        figment = figment.merge(Serialized::default("server.root", cwd.join(root)));
    }
    if args.live_reload {
        figment = figment.merge(Serialized::default("build.liveReload", true));
    }
    let config = KilnConfig::extract(&figment)?;

    let project_dir = config.build.resolved_cwd()?;
    let (bundler, stylesheets) = super::tools(&config, &project_dir);
    let engine = Engine::provision(config.build.clone(), bundler, stylesheets).await?;

    let root = project_dir.join(&config.server.root);
    let app = engine.layer(Router::new().fallback_service(ServeDir::new(&root)));

    let listener = tokio::net::TcpListener::bind(config.server.listen)
        .await
        .map_err(|e| CliError::Server(format!("Failed to bind to {}: {}", config.server.listen, e)))?;
    let target = engine.asset_state().target().to_string();
    tracing::info!(
        "Serving {} entry point(s) at http://{}{}/ (static files from {})",
        config.build.sources.len(),
        config.server.listen,
        target,
        root.display()
    );

    let signal = engine.shutdown_signal();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down");
            // Ends live-reload streams so open connections can drain
            signal.trigger();
        })
        .await;

    engine.shutdown().await;
    served.map_err(|e| CliError::Server(format!("Server error: {}", e)))
}

//! Command-line interface definition.
//!
//! - `kiln serve` - Build, serve from memory, rebuild on change
//! - `kiln build` - Build once and write the output to disk

use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Kiln - build front-end entry points and serve them with live reload
#[derive(Parser, Debug)]
#[command(name = "kiln", version, about = "Build and serve front-end bundles")]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the build over HTTP, rebuilding when inputs change
    ///
    /// Requests under the target prefix are answered from memory; everything
    /// else is served from the static root.
    Serve(ServeArgs),

    /// Build once and write the output files
    Build(BuildArgs),
}

/// Options shared by every command that builds.
#[derive(Args, Debug, Clone, Default)]
pub struct BuildFlags {
    /// Entry points, as `path` or `alias=path`
    ///
    /// Overrides `sources` from the config file.
    #[arg(value_name = "ENTRY")]
    pub sources: Vec<String>,

    /// Config file (defaults to kiln.toml, kiln.json or kiln.yaml in the working directory)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Working directory entry points are resolved against
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// URL prefix the build is served under
    #[arg(short, long, value_name = "PREFIX")]
    pub target: Option<String>,

    /// Content-hash output filenames
    #[arg(long)]
    pub file_hash: bool,

    /// Compile .scss/.sass inputs
    #[arg(long)]
    pub sass: bool,

    /// Inject process.env from the environment and .env files
    #[arg(long)]
    pub env: bool,

    /// Do not emit source maps
    #[arg(long)]
    pub no_sourcemap: bool,

    /// esbuild executable
    #[arg(long, value_name = "PROGRAM")]
    pub esbuild: Option<PathBuf>,

    /// sass executable
    #[arg(long, value_name = "PROGRAM")]
    pub sass_bin: Option<PathBuf>,
}

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub build: BuildFlags,

    /// Address to listen on
    #[arg(short, long, value_name = "ADDR")]
    pub listen: Option<SocketAddr>,

    /// Directory served for requests outside the build
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Serve the live-reload endpoint and inject the reload client
    #[arg(long)]
    pub live_reload: bool,
}

/// Arguments for the build command
#[derive(Args, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub build: BuildFlags,

    /// Directory the output is written to
    #[arg(short = 'd', long, default_value = "dist", value_name = "DIR")]
    pub out_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve() {
        let cli = Cli::parse_from([
            "kiln",
            "serve",
            "src/index.js",
            "admin=src/admin.tsx",
            "--live-reload",
            "--listen",
            "0.0.0.0:3000",
            "-t",
            "/assets",
        ]);

        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.build.sources, vec!["src/index.js", "admin=src/admin.tsx"]);
        assert!(args.live_reload);
        assert_eq!(args.listen, Some("0.0.0.0:3000".parse().unwrap()));
        assert_eq!(args.build.target.as_deref(), Some("/assets"));
    }

    #[test]
    fn test_parse_build_defaults() {
        let cli = Cli::parse_from(["kiln", "build", "--file-hash"]);

        let Command::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert!(args.build.sources.is_empty());
        assert!(args.build.file_hash);
        assert_eq!(args.out_dir, PathBuf::from("dist"));
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["kiln", "-v", "-q", "build"]).is_err());
    }
}

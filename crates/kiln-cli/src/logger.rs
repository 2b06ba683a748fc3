//! Logging setup for the kiln CLI.
//!
//! The engine only emits `tracing` events; this module installs the
//! subscriber that prints them.
//!
//! # Verbosity
//!
//! 1. `--verbose`: DEBUG for kiln crates
//! 2. `--quiet`: errors only
//! 3. `RUST_LOG`: custom filter
//! 4. Default: INFO for kiln crates

use std::io::IsTerminal;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const VERBOSE_FILTER: &str = "kiln=debug,kiln_cli=debug,tower_http=debug";
const QUIET_FILTER: &str = "kiln=error,kiln_cli=error";
const DEFAULT_FILTER: &str = "kiln=info,kiln_cli=info";

/// Filter for the given flags; `RUST_LOG` applies only when neither is set.
pub fn filter_for(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Initialize the tracing subscriber.
///
/// Call once at startup, before anything logs.
///
/// # Arguments
///
/// * `verbose` - Enable debug-level logging (overrides `quiet`)
/// * `quiet` - Only show error-level logs
/// * `no_color` - Disable colored output
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color && should_use_colors())
        .with_writer(std::io::stderr)
        .compact();

    tracing_subscriber::registry()
        .with(filter_for(verbose, quiet))
        .with(fmt_layer)
        .init();
}

/// Whether stderr should get ANSI colors.
///
/// `NO_COLOR` disables colors, `FORCE_COLOR` forces them, otherwise they are
/// used when stderr is a terminal.
pub fn should_use_colors() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var_os("FORCE_COLOR").is_some() {
        return true;
    }
    std::io::stderr().is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;

    // The global subscriber can only be installed once per process, so these
    // tests only check filter construction.

    #[test]
    fn test_filters_parse() {
        let _ = EnvFilter::new(VERBOSE_FILTER);
        let _ = EnvFilter::new(QUIET_FILTER);
        let _ = EnvFilter::new(DEFAULT_FILTER);
    }

    #[test]
    fn test_verbose_wins_over_quiet() {
        assert_eq!(filter_for(true, true).to_string(), EnvFilter::new(VERBOSE_FILTER).to_string());
        assert_eq!(filter_for(false, true).to_string(), EnvFilter::new(QUIET_FILTER).to_string());
    }
}

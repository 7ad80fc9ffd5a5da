//! Log configuration for the `repex` binary.
//!
//! Verbosity is decided once from [`LogArgs`] and installed as a
//! `tracing-subscriber` filter at startup. Library code only emits `tracing`
//! events and never touches log levels.

use clap::Args;
use std::env;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, registry, EnvFilter};

/// Crate target our events are emitted under.
pub const TARGET: &str = "repex";

/// Logging controls shared by every subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct LogArgs {
    /// Show debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only show warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Explicit tracing filter directive (overrides other flags),
    /// e.g. "repex::engine=trace"
    #[arg(long, global = true)]
    pub log_filter: Option<String>,
}

/// Filter directive for `level` on our target only.
pub fn level_spec_for(level: &str) -> String {
    format!("{}={}", TARGET, level.to_ascii_lowercase())
}

/// Compute the filter spec with precedence: `log_filter`, then
/// `verbose`/`quiet`, then `rust_log`, then `info`.
pub fn compute_spec(
    verbose: bool,
    quiet: bool,
    log_filter: Option<&str>,
    rust_log: Option<&str>,
) -> String {
    if let Some(spec) = log_filter {
        return spec.to_string();
    }
    if verbose {
        return level_spec_for("debug");
    }
    if quiet {
        return level_spec_for("warn");
    }
    match rust_log {
        Some(spec) if !spec.trim().is_empty() => spec.to_string(),
        _ => level_spec_for("info"),
    }
}

/// Install the global subscriber. Events go to stderr so stdout stays free
/// for results.
pub fn init(args: &LogArgs) -> String {
    let rust_log = env::var("RUST_LOG").ok();
    let spec = compute_spec(
        args.verbose,
        args.quiet,
        args.log_filter.as_deref(),
        rust_log.as_deref(),
    );
    registry()
        .with(EnvFilter::new(&spec))
        .with(
            fmt::layer()
                .without_time()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .ok();
    spec
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_wins() {
        assert_eq!(
            compute_spec(true, false, Some("repex::engine=trace"), Some("warn")),
            "repex::engine=trace"
        );
    }

    #[test]
    fn test_flags_before_rust_log() {
        assert_eq!(compute_spec(true, false, None, Some("warn")), "repex=debug");
        assert_eq!(compute_spec(false, true, None, Some("trace")), "repex=warn");
    }

    #[test]
    fn test_rust_log_then_default() {
        assert_eq!(compute_spec(false, false, None, Some("repex=trace")), "repex=trace");
        assert_eq!(compute_spec(false, false, None, Some("  ")), "repex=info");
        assert_eq!(compute_spec(false, false, None, None), "repex=info");
    }
}

//! Logging initialization
//!
//! Installs a `tracing` subscriber that writes to stderr, leaving stdout to
//! command output. `RUST_LOG` overrides the default filter.

use std::error::Error;
use std::sync::Once;

use tracing_subscriber::EnvFilter;

use crate::storage::LogFormat;

static INIT_ONCE: Once = Once::new();

/// Default filter directive for the given verbosity
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "strata_cli=debug"
    } else {
        "strata_cli=warn"
    }
}

/// Installs the global subscriber; later calls are no-ops
pub fn init(verbose: bool, format: LogFormat) {
    INIT_ONCE.call_once(|| {
        // An embedding application or test harness may own the subscriber
        if let Err(e) = install(verbose, format) {
            tracing::debug!(error = %e, "keeping existing tracing subscriber");
        }
    });
}

fn install(verbose: bool, format: LogFormat) -> Result<(), Box<dyn Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
}

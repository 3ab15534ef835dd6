//! Structured logging setup.
//!
//! Logs go to stderr so stdout stays a clean JSON-lines channel.

use tracing_subscriber::EnvFilter;

/// Filter directive for the given verbosity, falling back to `configured`.
///
/// `-v` maps to debug and `-vv` to trace; quiet mode only keeps errors.
pub fn filter_directive(verbose: u8, quiet: bool, configured: &str) -> String {
    if quiet {
        return "error".to_string();
    }
    match verbose {
        0 if configured.trim().is_empty() => crate::defaults::LOG_LEVEL.to_string(),
        0 => configured.trim().to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over everything else.
///
/// Calling this twice is harmless; the second call is ignored.
pub fn init(verbose: u8, quiet: bool, configured: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directive = filter_directive(verbose, quiet, configured);
        EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(crate::defaults::LOG_LEVEL))
    });

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    if installed.is_err() {
        tracing::debug!("Logging already initialised");
    }
}

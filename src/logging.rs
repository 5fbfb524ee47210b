//! Log output setup.
//!
//! Logs go to stderr so stdout only carries command output. The level is
//! `info`, or `debug` with `--debug`; `RUST_LOG` takes precedence when set.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Calling it twice is harmless.
pub fn init(debug: bool) {
    let default = if debug { "dodo=debug" } else { "dodo=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(debug)
        .without_time()
        .try_init();
}

//! Diagnostic tracing for the test driver.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: Diagnostics via `RUST_LOG`, output to stderr.
//!
//! - **Console (`console`)**: Step banners, assertion results and the final
//!   summary on stdout. Always printed, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` takes precedence. Otherwise the filter is `warn`, or
/// `podrunner=debug` when `debug` is set (`--debug`).
///
/// # Example
/// ```bash
/// RUST_LOG=podrunner=trace podrunner run tests/pin.yaml
/// ```
pub fn init(debug: bool) {
    let fallback = if debug { "warn,podrunner=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

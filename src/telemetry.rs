//! Tracing and diagnostics setup for applications embedding the crate.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Install a global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG` when set, and quiets everything but
/// warnings from this crate otherwise. Safe to call more than once; later
/// calls are no-ops.
pub fn init_tracing() {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,patchbay=info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

/// Pretty panic reports through miette.
pub fn init_panic_hook() {
    miette::set_panic_hook();
}

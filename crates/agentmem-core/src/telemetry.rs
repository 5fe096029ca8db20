//! Log output for the `agentmem` binary and for embedders that want the same
//! formatting.
//!
//! Logs always go to stderr: `agentmem list` and `agentmem ingest` print JSON
//! on stdout, and the two streams must not interleave.

use std::io;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the process-wide subscriber for agentmem events.
///
/// Verbosity comes from `RUST_LOG` when set, else from `level` (`--verbose`
/// maps to `DEBUG`). `json` selects one JSON object per line, which keeps the
/// `event = "..."` fields from [`crate::obs`] machine-filterable. Returns
/// `false` when a subscriber was already installed, e.g. by a host
/// application or an earlier call.
pub fn init_tracing(json: bool, level: Level) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let json_layer = json.then(|| {
        fmt::layer()
            .json()
            .with_target(false)
            .with_writer(io::stderr)
    });
    let text_layer = (!json).then(|| fmt::layer().with_target(false).with_writer(io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .is_ok()
}

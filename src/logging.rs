//! Tracing subscriber setup.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::types::Settings;

/// Filter used when `RUST_LOG` is not set.
fn default_directives(settings: &Settings) -> &'static str {
    if settings.log_verbose {
        "kb_chunker=debug"
    } else {
        "kb_chunker=info"
    }
}

/// Install the global subscriber: an `EnvFilter` from `RUST_LOG` (or the
/// defaults above) and a pretty or JSON formatting layer per
/// `settings.log_format`.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(settings: &Settings) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(settings)));

    let format = if settings.log_format.eq_ignore_ascii_case("json") {
        fmt::layer().json().with_current_span(false).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry().with(filter).with(format).try_init()
}

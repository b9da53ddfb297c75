//! Tracing initialization for the Lambda function.
//!
//! Configures JSON-formatted tracing output suitable for CloudWatch Logs.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing with flattened JSON events for CloudWatch Logs.
///
/// Call once at the start of `main`, before `lambda_runtime::run()`. The
/// level comes from `RUST_LOG` and defaults to `info`. Returns `false` if a
/// global subscriber was already installed.
///
/// # Example
///
/// ```no_run
/// use wildrydes_lambda::init_tracing;
///
/// #[tokio::main]
/// async fn main() -> Result<(), lambda_runtime::Error> {
///     init_tracing();
///     // ... rest of Lambda setup
///     Ok(())
/// }
/// ```
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_level(true)
        .with_current_span(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .is_ok()
}

use std::sync::Once;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::SubscriberInitExt;

static INIT: Once = Once::new();

/// Logs to stderr so stdout only carries the result. `RUST_LOG` picks the
/// filter, otherwise only warnings are shown.
pub fn setup_logger() {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

        tracing_subscriber::fmt::Subscriber::builder()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_env_filter(env_filter)
            .finish()
            .init();
    });
}

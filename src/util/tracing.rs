use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub type Result<T> = core::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Installs the global subscriber.
///
/// `filter` uses `EnvFilter` directive syntax, e.g. `tmi_duplex=trace,info`. Returns `Ok(false)`
/// when a subscriber was already installed (repeat calls from tests).
pub fn build_subscriber(filter: &str) -> Result<bool> {
    let filter = EnvFilter::try_new(filter)?;

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .try_init()
        .is_ok();

    Ok(installed)
}

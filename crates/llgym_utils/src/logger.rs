use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

/// Filter applied when neither `RUST_LOG` nor the caller supplies one.
pub const DEFAULT_FILTER: &str = "info";

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `fallback`, which wins over [`DEFAULT_FILTER`].
/// Calling this more than once is harmless: later calls keep the subscriber
/// that was installed first.
pub fn init_logging(fallback: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback.unwrap_or(DEFAULT_FILTER)))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialisation_is_a_no_op() {
        init_logging(Some("debug"));
        init_logging(Some("not a [valid filter"));
        tracing::debug!("logger still usable");
    }
}

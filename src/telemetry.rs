use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the JSON subscriber. `RUST_LOG` wins over `default_level`.
///
/// Calling it twice is harmless: the second install is ignored.
pub fn init_telemetry(default_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let formatting_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .json();

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(formatting_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_telemetry_twice_does_not_panic() {
        init_telemetry("warn");
        init_telemetry("warn");
        tracing::warn!("telemetry initialised");
    }
}

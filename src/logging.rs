//! Logging initialisation for the `capcat` binary.
//!
//! Log records go to stderr so command output on stdout stays parseable.
//! `RUST_LOG` takes precedence over `[logging] filter`.

use std::sync::Once;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    pub fn from_config(config: &LoggingConfig) -> Self {
        match config.format.as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Install the global subscriber. Subsequent calls are no-ops.
pub fn init(config: &LoggingConfig) {
    let format = LogFormat::from_config(config);
    let fallback = config.filter.clone();
    INIT.call_once(move || {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

        match format {
            LogFormat::Json => {
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json().with_writer(std::io::stderr))
                    .try_init();
            }
            LogFormat::Text => {
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        fmt::layer()
                            .with_target(false)
                            .with_writer(std::io::stderr),
                    )
                    .try_init();
            }
        }
    });
}

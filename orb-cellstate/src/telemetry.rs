//! Logging setup for the daemon.

use std::io::{IsTerminal as _, Write as _};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    EnvFilter,
    layer::SubscriberExt as _,
    util::{SubscriberInitExt as _, TryInitError},
};

/// Logs at INFO unless `RUST_LOG` says otherwise. Goes to journald when a syslog
/// identifier is set and stderr is not a terminal, to stderr otherwise.
#[derive(Debug, Default)]
pub struct TelemetryConfig {
    syslog_identifier: Option<String>,
}

impl TelemetryConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_journald(self, syslog_identifier: &str) -> Self {
        Self {
            syslog_identifier: Some(syslog_identifier.to_owned()),
        }
    }

    pub fn try_init(self) -> Result<TelemetryFlusher, TryInitError> {
        let journald_layer = self
            .syslog_identifier
            .filter(|_| !std::io::stderr().is_terminal())
            .and_then(|identifier| {
                tracing_journald::layer()
                    .inspect_err(|err| {
                        eprintln!("no journald socket, logging to stderr: {err}");
                    })
                    .map(|layer| layer.with_syslog_identifier(identifier))
                    .ok()
            });
        let stderr_layer = journald_layer
            .is_none()
            .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

        let filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy();

        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(journald_layer)
            .with(filter)
            .try_init()?;

        Ok(TelemetryFlusher { _private: () })
    }

    /// Call once, first thing in `main`.
    pub fn init(self) -> TelemetryFlusher {
        self.try_init().expect("failed to initialize telemetry")
    }
}

#[must_use = "call .flush before exiting or buffered logs are lost"]
pub struct TelemetryFlusher {
    _private: (),
}

impl TelemetryFlusher {
    pub async fn flush(self) {
        std::io::stderr().flush().ok();
        std::io::stdout().flush().ok();
    }
}

//! # Structured Logging
//!
//! Environment-aware tracing initialization. Console output honors
//! `RUST_LOG`; `DCA_LOG_FORMAT=json` switches to JSON lines for ingestion
//! by a log collector.

use std::env;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process.
///
/// Safe to call multiple times; later calls are no-ops. If a global
/// subscriber is already installed (e.g. by a test harness), the existing
/// subscriber is kept.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

        let json_output = env::var("DCA_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let registry = tracing_subscriber::registry().with(filter);

        let init_result = if json_output {
            registry
                .with(fmt::layer().json().with_target(true).with_ansi(false))
                .try_init()
        } else {
            registry.with(fmt::layer().with_target(true)).try_init()
        };

        if init_result.is_err() {
            tracing::debug!("global tracing subscriber already initialized");
        }
    });
}

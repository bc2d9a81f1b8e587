//! Tracing subscriber setup

use opentube_core::{AppError, ErrorMetadata, LogFormat, LogLevel};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_FILTER: &str = "opentube=info,sqlx=warn";

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_telemetry(format: LogFormat) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()?,
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?,
    }

    tracing::debug!(format = ?format, "Tracing initialized");
    Ok(())
}

/// Log `error` at the level its kind calls for, so cancellations and bad
/// input stay out of error-level output.
pub fn log_error(error: &AppError, context: &str) {
    let error_type = error.error_type();
    match error.log_level() {
        LogLevel::Debug => tracing::debug!(error = %error, error_type, "{}", context),
        LogLevel::Warn => tracing::warn!(error = %error, error_type, "{}", context),
        LogLevel::Error => tracing::error!(
            error = %error,
            error_type,
            details = %error.detailed_message(),
            "{}",
            context
        ),
    }
}

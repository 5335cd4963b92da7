use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "stampa_pdf_cache_hit_total",
            Unit::Count,
            "Total number of PDF downloads served from the artifact cache."
        );
        describe_counter!(
            "stampa_pdf_cache_miss_total",
            Unit::Count,
            "Total number of PDF downloads that had to be rendered."
        );
        describe_counter!(
            "stampa_pdf_fetch_error_total",
            Unit::Count,
            "Total number of failed loop-back fetches."
        );
        describe_counter!(
            "stampa_pdf_render_error_total",
            Unit::Count,
            "Total number of failed HTML-to-PDF conversions."
        );
        describe_counter!(
            "stampa_pdf_invalidate_total",
            Unit::Count,
            "Total number of cache entries evicted by save events, key resets and purges."
        );
        describe_histogram!(
            "stampa_pdf_render_ms",
            Unit::Milliseconds,
            "HTML-to-PDF conversion latency in milliseconds."
        );
    });
}

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

pub(crate) const METRIC_RENDER_MS: &str = "vetrina_render_ms";
pub(crate) const METRIC_PROXY_FAILURE: &str = "vetrina_proxy_failure_total";

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
            crate::cache::METRIC_HIT,
            Unit::Count,
            "Total number of rendered pages served from the response cache."
        );
        describe_counter!(
            crate::cache::METRIC_MISS,
            Unit::Count,
            "Total number of response-cache misses, expired entries included."
        );
        describe_counter!(
            crate::cache::METRIC_STORE,
            Unit::Count,
            "Total number of rendered pages written to the response cache."
        );
        describe_counter!(
            crate::cache::METRIC_UNAVAILABLE,
            Unit::Count,
            "Total number of response-cache operations that failed and degraded to a miss."
        );
        describe_counter!(
            "vetrina_route_outcome_total",
            Unit::Count,
            "Server route resolutions, labelled by outcome."
        );
        describe_counter!(
            "vetrina_graphql_retry_total",
            Unit::Count,
            "Total number of GraphQL operations re-sent after a retryable failure."
        );
        describe_counter!(
            "vetrina_graphql_benign_errors_total",
            Unit::Count,
            "Total number of stock-related GraphQL errors removed from responses."
        );
        describe_counter!(
            METRIC_PROXY_FAILURE,
            Unit::Count,
            "Total number of proxied backend requests that failed before a response."
        );
        describe_histogram!(
            METRIC_RENDER_MS,
            Unit::Milliseconds,
            "Server render latency in milliseconds."
        );
    });
}

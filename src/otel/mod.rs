//! Observability: OTLP export, gateway metrics and the `tracing` subscriber
//!
//! With `otel.enabled` off, metrics go to an exporter-less meter provider and
//! only the local log layer is installed.

use crate::config::{LoggingConfig, OtelConfig};
use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter, MeterProvider as _},
    trace::TracerProvider as TracerProviderTrait,
    KeyValue,
};
use opentelemetry_sdk::{metrics::SdkMeterProvider, trace::TracerProvider, Resource};
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Observability setup and teardown errors
#[derive(Debug, Error)]
pub enum OtelError {
    /// Span exporter or subscriber setup failed
    #[error("Failed to initialize tracer: {0}")]
    TracerInit(String),

    /// Metrics exporter setup failed
    #[error("Failed to initialize meter: {0}")]
    MeterInit(String),

    /// Flushing or stopping a provider failed
    #[error("Failed to shutdown: {0}")]
    Shutdown(String),

    /// Export enabled without a usable endpoint
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Tracer and meter providers for the process
///
/// The tracer provider exists only when export is enabled.
pub struct OtelProvider {
    tracer_provider: Option<TracerProvider>,
    meter_provider: SdkMeterProvider,
    config: OtelConfig,
}

impl OtelProvider {
    /// Build the providers described by `config`
    ///
    /// With export enabled, `endpoint` is required and the tracer provider is
    /// installed globally. Otherwise metrics stay in-process.
    pub fn new(config: &OtelConfig) -> Result<Self, OtelError> {
        let resource = Resource::new(vec![KeyValue::new(
            "service.name",
            config.service_name.clone(),
        )]);

        let (tracer_provider, meter_provider) = if config.enabled {
            let endpoint = config.endpoint.as_ref().ok_or_else(|| {
                OtelError::Config("OTLP endpoint is required when enabled".into())
            })?;

            let tracer_provider = Self::init_tracer_provider(endpoint, &resource)?;
            let meter_provider = Self::init_meter_provider(endpoint, &resource)?;
            (Some(tracer_provider), meter_provider)
        } else {
            let meter_provider = SdkMeterProvider::builder().with_resource(resource).build();
            (None, meter_provider)
        };

        if let Some(ref tp) = tracer_provider {
            global::set_tracer_provider(tp.clone());
        }

        Ok(Self {
            tracer_provider,
            meter_provider,
            config: config.clone(),
        })
    }

    /// OTLP/gRPC span exporter behind a batch processor
    fn init_tracer_provider(
        endpoint: &str,
        resource: &Resource,
    ) -> Result<TracerProvider, OtelError> {
        use opentelemetry_otlp::WithExportConfig;
        use opentelemetry_sdk::runtime;
        use opentelemetry_sdk::trace::{Config, Sampler};

        let exporter = opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(endpoint)
            .build_span_exporter()
            .map_err(|e| OtelError::TracerInit(e.to_string()))?;

        let trace_config = Config::default()
            .with_sampler(Sampler::AlwaysOn)
            .with_resource(resource.clone());

        Ok(TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_config(trace_config)
            .build())
    }

    /// OTLP/gRPC metrics exporter behind a periodic reader
    fn init_meter_provider(
        endpoint: &str,
        resource: &Resource,
    ) -> Result<SdkMeterProvider, OtelError> {
        use opentelemetry_otlp::{MetricsExporterBuilder, WithExportConfig};
        use opentelemetry_sdk::metrics::reader::{
            DefaultAggregationSelector, DefaultTemporalitySelector,
        };
        use opentelemetry_sdk::{metrics::PeriodicReader, runtime};

        let exporter = MetricsExporterBuilder::from(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .build_metrics_exporter(
            Box::new(DefaultTemporalitySelector::new()),
            Box::new(DefaultAggregationSelector::new()),
        )
        .map_err(|e| OtelError::MeterInit(e.to_string()))?;

        let reader = PeriodicReader::builder(exporter, runtime::Tokio).build();

        Ok(SdkMeterProvider::builder()
            .with_resource(resource.clone())
            .with_reader(reader)
            .build())
    }

    /// Get a tracer from the provider, or a no-op tracer when disabled
    pub fn tracer(&self, name: &'static str) -> opentelemetry_sdk::trace::Tracer {
        match self.tracer_provider {
            Some(ref tp) => tp.tracer(name),
            None => TracerProvider::builder().build().tracer(name),
        }
    }

    /// Meter named after the configured service
    pub fn meter(&self) -> Meter {
        self.meter_provider.meter(self.config.service_name.clone())
    }

    /// Whether OTLP export is active
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Flush spans and stop the meter provider
    pub fn shutdown(&self) -> Result<(), OtelError> {
        if let Err(e) = self.meter_provider.shutdown() {
            return Err(OtelError::Shutdown(format!(
                "Meter shutdown failed: {:?}",
                e
            )));
        }

        if let Some(ref tp) = self.tracer_provider {
            for result in tp.force_flush() {
                if let Err(e) = result {
                    return Err(OtelError::Shutdown(format!("Tracer flush failed: {:?}", e)));
                }
            }
        }

        Ok(())
    }
}

impl Drop for OtelProvider {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Gateway metrics
pub struct GatewayMetrics {
    /// Requests handled, by route and status class
    pub requests_total: Counter<u64>,

    /// Requests refused by the rate limiter, by scope
    pub rate_limited_total: Counter<u64>,

    /// Bearer tokens issued, by verifier
    pub tokens_issued_total: Counter<u64>,

    /// Credential checks refused, by verifier
    pub credentials_rejected_total: Counter<u64>,

    /// Access-request submissions, by outcome
    pub access_requests_total: Counter<u64>,

    /// Tiles returned per query
    pub tiles_matched: Histogram<u64>,

    /// Wall time per request, seconds
    pub request_duration: Histogram<f64>,
}

impl GatewayMetrics {
    /// Register every instrument on `meter`
    pub fn new(meter: &Meter) -> Self {
        Self {
            requests_total: meter
                .u64_counter("atlas_gateway_requests_total")
                .with_description("Total number of requests handled")
                .init(),
            rate_limited_total: meter
                .u64_counter("atlas_gateway_rate_limited_total")
                .with_description("Requests refused by the rate limiter")
                .init(),
            tokens_issued_total: meter
                .u64_counter("atlas_gateway_tokens_issued_total")
                .with_description("Bearer tokens issued")
                .init(),
            credentials_rejected_total: meter
                .u64_counter("atlas_gateway_credentials_rejected_total")
                .with_description("Credential checks refused")
                .init(),
            access_requests_total: meter
                .u64_counter("atlas_gateway_access_requests_total")
                .with_description("Access-request submissions by outcome")
                .init(),
            tiles_matched: meter
                .u64_histogram("atlas_gateway_tiles_matched")
                .with_description("Tiles returned per query")
                .init(),
            request_duration: meter
                .f64_histogram("atlas_gateway_request_duration_seconds")
                .with_description("Wall time per request in seconds")
                .init(),
        }
    }

    /// Count a finished request and record its duration
    pub fn record_request(&self, route: &str, status: u16, duration_secs: f64) {
        let attrs = [
            KeyValue::new("route", route.to_string()),
            KeyValue::new("status", status_class(status)),
        ];
        self.requests_total.add(1, &attrs);
        self.request_duration.record(duration_secs, &attrs);
    }

    pub fn record_rate_limited(&self, scope: &str) {
        self.rate_limited_total
            .add(1, &[KeyValue::new("scope", scope.to_string())]);
    }

    pub fn record_token_issued(&self, verifier: &str) {
        self.tokens_issued_total
            .add(1, &[KeyValue::new("verifier", verifier.to_string())]);
    }

    pub fn record_credentials_rejected(&self, verifier: &str) {
        self.credentials_rejected_total
            .add(1, &[KeyValue::new("verifier", verifier.to_string())]);
    }

    pub fn record_access_request(&self, outcome: &str) {
        self.access_requests_total
            .add(1, &[KeyValue::new("outcome", outcome.to_string())]);
    }

    pub fn record_tiles_matched(&self, dataset: &str, count: usize) {
        self.tiles_matched.record(
            count as u64,
            &[KeyValue::new("dataset", dataset.to_string())],
        );
    }
}

fn status_class(status: u16) -> &'static str {
    match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

/// Install the global `tracing` subscriber
///
/// `RUST_LOG` overrides the configured level when set. The format is JSON
/// unless `pretty` is configured.
pub fn init_tracing(otel: &OtelProvider, logging: &LoggingConfig) -> Result<(), OtelError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(logging.level.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let pretty = logging.format.eq_ignore_ascii_case("pretty");
    let json_layer = (!pretty).then(|| fmt::layer().json());
    let pretty_layer = pretty.then(fmt::layer);
    let otel_layer = otel
        .is_enabled()
        .then(|| tracing_opentelemetry::layer().with_tracer(otel.tracer("atlas-gateway")));

    tracing_subscriber::registry()
        .with(filter)
        .with(otel_layer)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .map_err(|e| OtelError::TracerInit(e.to_string()))
}

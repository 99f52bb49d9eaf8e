use opentelemetry_sdk::{logs::LoggerProvider, trace::TracerProvider as SdkTracerProvider};

/// Settings for [`init_telemetry`](super::init_telemetry)
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// Reported as `service.version` on exported traces and logs
    pub service_version: String,
    pub otel_endpoint: String,
    pub otel_enabled: bool,
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "devicetwin".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            otel_endpoint: "http://localhost:4317".to_string(),
            otel_enabled: false,
            log_level: "info".to_string(),
        }
    }
}

/// Providers kept alive until shutdown so pending exports can be flushed
pub struct TelemetryProviders {
    pub tracer_provider: SdkTracerProvider,
    pub logger_provider: LoggerProvider,
}

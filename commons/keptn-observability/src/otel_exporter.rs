use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    propagation::TraceContextPropagator,
    trace::{Sampler, SdkTracerProvider, ShouldSample, Tracer},
};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("could not build OTLP span exporter for '{endpoint}': {reason}")]
    Exporter { endpoint: String, reason: String },
}

/// Source of tracers for lifecycle spans.
///
/// Controllers only see this trait so tests can hand in a registry that
/// never exports anything.
pub trait TracerFactory: Send + Sync {
    fn tracer(&self, name: &str) -> Tracer;

    /// Switch span export to `endpoint` (`None` stops exporting). Returns
    /// whether anything changed.
    fn configure(&self, endpoint: Option<&str>) -> Result<bool, TelemetryError>;
}

struct Installed {
    endpoint: Option<String>,
    provider: SdkTracerProvider,
}

/// Owner of the tracer provider used for lifecycle spans.
///
/// Lifecycle:
/// - `new` installs a provider that records spans but exports nothing.
/// - `configure(Some(url))` builds an OTLP/gRPC exporter for `url`, swaps it
///   in and shuts the previous provider down. Re-configuring with the URL that
///   is already installed is a no-op.
/// - `configure(None)` reverts to the non-exporting provider.
/// - `shutdown` flushes and tears down whatever is installed.
///
/// The registry is an ordinary value; `main` owns the process-wide instance and
/// hands it to the controllers behind an `Arc`.
pub struct TracerRegistry {
    service_name: String,
    installed: RwLock<Installed>,
}

impl TracerRegistry {
    pub fn new(service_name: impl Into<String>) -> Self {
        let service_name = service_name.into();
        let provider = local_provider(&service_name);
        Self {
            service_name,
            installed: RwLock::new(Installed {
                endpoint: None,
                provider,
            }),
        }
    }

    /// Build a registry and immediately point it at `endpoint` if one is set.
    pub fn with_collector(
        service_name: impl Into<String>,
        endpoint: Option<&str>,
    ) -> Result<Self, TelemetryError> {
        let registry = Self::new(service_name);
        registry.configure(endpoint)?;
        Ok(registry)
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Collector URL currently in use, `None` when spans are not exported.
    pub fn endpoint(&self) -> Option<String> {
        self.read().endpoint.clone()
    }

    /// Point the registry at a collector. Returns whether the provider was
    /// rebuilt.
    pub fn configure(
        &self,
        endpoint: Option<&str>,
    ) -> Result<bool, TelemetryError> {
        let endpoint = endpoint.map(str::trim).filter(|e| !e.is_empty());

        let mut installed = self.write();
        if installed.endpoint.as_deref() == endpoint {
            return Ok(false);
        }

        let provider = match endpoint {
            Some(url) => otlp_provider(&self.service_name, url)?,
            None => local_provider(&self.service_name),
        };
        let previous = std::mem::replace(
            &mut *installed,
            Installed {
                endpoint: endpoint.map(str::to_string),
                provider,
            },
        );
        drop(installed);

        info!(
            service = %self.service_name,
            endpoint = ?endpoint,
            "tracer provider reconfigured"
        );
        shutdown_provider(previous);
        Ok(true)
    }

    /// Tear down the installed provider. The registry keeps working afterwards
    /// with a non-exporting provider.
    pub fn shutdown(&self) {
        let mut installed = self.write();
        let previous = std::mem::replace(
            &mut *installed,
            Installed {
                endpoint: None,
                provider: local_provider(&self.service_name),
            },
        );
        drop(installed);
        shutdown_provider(previous);
    }

    fn read(&self) -> RwLockReadGuard<'_, Installed> {
        self.installed
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Installed> {
        self.installed
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TracerFactory for TracerRegistry {
    fn tracer(&self, name: &str) -> Tracer {
        self.read().provider.tracer(name.to_string())
    }

    fn configure(&self, endpoint: Option<&str>) -> Result<bool, TelemetryError> {
        TracerRegistry::configure(self, endpoint)
    }
}

/// Install the W3C trace-context propagator as the global text map propagator.
pub fn init_propagation() {
    opentelemetry::global::set_text_map_propagator(
        TraceContextPropagator::new(),
    );
}

fn resource(service_name: &str) -> Resource {
    Resource::builder()
        .with_attribute(KeyValue::new("service.name", service_name.to_string()))
        .build()
}

fn local_provider(service_name: &str) -> SdkTracerProvider {
    SdkTracerProvider::builder()
        .with_resource(resource(service_name))
        .build()
}

fn otlp_provider(
    service_name: &str,
    endpoint: &str,
) -> Result<SdkTracerProvider, TelemetryError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TelemetryError::Exporter {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(sampler_from_env())
        .with_resource(resource(service_name))
        .build())
}

/// Sampler selection via `OTEL_TRACES_SAMPLER` (`always_on`, `always_off`,
/// `traceidratio` with `OTEL_TRACES_SAMPLER_ARG`), always parent based.
fn sampler_from_env() -> Sampler {
    let root: Box<dyn ShouldSample> = match std::env::var("OTEL_TRACES_SAMPLER")
        .unwrap_or_else(|_| "always_on".to_string())
        .to_lowercase()
        .as_str()
    {
        "always_off" => Box::new(Sampler::AlwaysOff),
        "traceidratio" => {
            let ratio = std::env::var("OTEL_TRACES_SAMPLER_ARG")
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(1.0);
            Box::new(Sampler::TraceIdRatioBased(ratio))
        }
        _ => Box::new(Sampler::AlwaysOn),
    };
    Sampler::ParentBased(root)
}

fn shutdown_provider(installed: Installed) {
    match installed.provider.shutdown() {
        Ok(()) => debug!(endpoint = ?installed.endpoint, "tracer provider shut down"),
        Err(e) => warn!(
            endpoint = ?installed.endpoint,
            error = %e,
            "tracer provider shutdown failed"
        ),
    }
}

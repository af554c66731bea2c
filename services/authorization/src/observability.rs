//! Observability wiring for the authorization service.
//!
//! # Purpose
//! Installs the tracing subscriber (env filter, fmt output, and an OTLP span
//! exporter when one can be built) and provides the span helpers every
//! service operation uses to report failures.
//!
//! # Notes
//! Initialization is guarded by `OnceLock` to keep startup idempotent in tests.
//! Library code never installs a subscriber; only the binary calls
//! [`init_observability`].
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::sync::OnceLock;
use tracing::Span;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static OBS_INIT: OnceLock<()> = OnceLock::new();
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

pub fn init_observability(service_name: &str) {
    OBS_INIT.get_or_init(|| {
        global::set_text_map_propagator(
            opentelemetry_sdk::propagation::TraceContextPropagator::new(),
        );

        let provider = build_tracer_provider(service_name);
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer();
        let registry = tracing_subscriber::registry().with(filter).with(fmt_layer);
        if let Some(provider) = provider {
            let tracer = provider.tracer(service_name.to_string());
            let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
            let _ = registry.with(otel_layer).try_init();
            global::set_tracer_provider(provider.clone());
            let _ = TRACER_PROVIDER.set(provider);
        } else {
            let _ = registry.try_init();
        }
    });
}

/// Flush pending spans. Call once before the process exits.
pub fn shutdown_observability() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(err) = provider.shutdown() {
            tracing::warn!(error = %err, "failed to shut down tracer provider");
        }
    }
}

fn build_tracer_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let resource = Resource::builder_empty()
        .with_attributes(resource_attributes(service_name))
        .build();
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()
        .ok()?;
    Some(
        SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(resource)
            .build(),
    )
}

/// Optional resource attributes and the environment variables they come from.
const RESOURCE_ENV: [(&str, &str); 5] = [
    ("K8S_CLUSTER_NAME", "k8s.cluster.name"),
    ("K8S_NAMESPACE_NAME", "k8s.namespace.name"),
    ("K8S_POD_NAME", "k8s.pod.name"),
    ("CLOUD_REGION", "cloud.region"),
    ("DEPLOYMENT_ENVIRONMENT", "deployment.environment"),
];

fn resource_attributes(service_name: &str) -> Vec<KeyValue> {
    let mut attrs = vec![KeyValue::new("service.name", service_name.to_string())];
    if let Ok(value) =
        std::env::var("AUTHZ_SERVICE_INSTANCE_ID").or_else(|_| std::env::var("HOSTNAME"))
    {
        attrs.push(KeyValue::new("service.instance.id", value));
    }
    attrs.extend(RESOURCE_ENV.iter().filter_map(|(var, key)| {
        std::env::var(var)
            .ok()
            .map(|value| KeyValue::new(*key, value))
    }));
    attrs
}

/// Mark `span` failed with `err` as its status message.
///
/// The span must declare `otel.status_code` and `otel.status_message` as
/// `Empty` fields; the OpenTelemetry layer maps them onto the exported span
/// status.
pub fn mark_span_failed(span: &Span, err: &(dyn std::error::Error + 'static)) {
    span.record("otel.status_code", "ERROR");
    span.record(
        "otel.status_message",
        crate::error::error_chain(err).as_str(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::EnvGuard;
    use serial_test::serial;

    #[test]
    #[serial]
    fn resource_attributes_capture_env() {
        let _g1 = EnvGuard::set("AUTHZ_SERVICE_INSTANCE_ID", "instance-1");
        let _g2 = EnvGuard::set("K8S_CLUSTER_NAME", "cluster-a");
        let _g3 = EnvGuard::set("K8S_NAMESPACE_NAME", "ns-a");
        let _g4 = EnvGuard::set("K8S_POD_NAME", "pod-a");
        let _g5 = EnvGuard::set("CLOUD_REGION", "region-a");
        let _g6 = EnvGuard::set("DEPLOYMENT_ENVIRONMENT", "staging");

        let attrs = resource_attributes("authorization");
        let found: std::collections::HashMap<String, String> = attrs
            .into_iter()
            .map(|attr| (attr.key.as_str().to_string(), attr.value.to_string()))
            .collect();

        assert_eq!(
            found.get("service.name").map(String::as_str),
            Some("authorization")
        );
        assert_eq!(
            found.get("service.instance.id").map(String::as_str),
            Some("instance-1")
        );
        assert_eq!(
            found.get("k8s.cluster.name").map(String::as_str),
            Some("cluster-a")
        );
        assert_eq!(found.get("k8s.pod.name").map(String::as_str), Some("pod-a"));
        assert_eq!(
            found.get("deployment.environment").map(String::as_str),
            Some("staging")
        );
    }

    #[test]
    #[serial]
    fn resource_attributes_hostname_fallback() {
        let _g1 = EnvGuard::unset("AUTHZ_SERVICE_INSTANCE_ID");
        let _g2 = EnvGuard::set("HOSTNAME", "host-1");

        let attrs = resource_attributes("authorization");
        let instance = attrs
            .iter()
            .find(|attr| attr.key.as_str() == "service.instance.id")
            .map(|attr| attr.value.to_string());
        assert_eq!(instance, Some("host-1".to_string()));
    }

    #[tokio::test(flavor = "multi_thread")]
    #[serial]
    async fn init_observability_is_idempotent() {
        init_observability("authorization-test");
        init_observability("authorization-test");
        tracing::info!("observability initialized twice");
    }

    #[test]
    fn mark_span_failed_accepts_declared_fields() {
        let span = tracing::info_span!(
            "CheckAccess",
            otel.status_code = tracing::field::Empty,
            otel.status_message = tracing::field::Empty
        );
        let err = crate::error::AuthzError::Evaluation("rule model lock poisoned".to_string());
        mark_span_failed(&span, &err);
    }
}

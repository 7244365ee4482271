use crate::detection::DetectionErrorKind;
use crate::source::SourceKind;
use opentelemetry::{
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionOutcome {
    Captured,
    Cancelled,
    Failed,
}

impl AcquisitionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionOutcome::Captured => "captured",
            AcquisitionOutcome::Cancelled => "cancelled",
            AcquisitionOutcome::Failed => "failed",
        }
    }
}

pub struct Metrics {
    detect_requests: Counter<u64>,
    detect_duration: Histogram<u64>,
    acquisitions: Counter<u64>,
    // Dropping the provider shuts the reader down.
    _provider: SdkMeterProvider,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        let meter = provider.meter("snap_detect");

        let detect_requests = meter
            .u64_counter("detect_requests_total")
            .with_description("Uploads sent to the detection service, by outcome")
            .build();

        let boundaries = generate_boundaries((50, 250, 1000, 5000, 30000));

        let detect_duration = meter
            .u64_histogram("detect_duration_ms")
            .with_boundaries(boundaries)
            .with_description("Round trip of detection uploads in milliseconds")
            .build();

        let acquisitions = meter
            .u64_counter("acquisitions_total")
            .with_description("Image acquisitions, by source and outcome")
            .build();

        Ok(Metrics {
            detect_requests,
            detect_duration,
            acquisitions,
            _provider: provider,
            registry,
        })
    }

    pub fn record_detection(&self, outcome: Result<(), DetectionErrorKind>, duration_ms: u64) {
        let outcome = match outcome {
            Ok(()) => "success",
            Err(kind) => kind.as_str(),
        };
        let attributes = [KeyValue::new("outcome", outcome)];
        self.detect_requests.add(1, &attributes);
        self.detect_duration.record(duration_ms, &attributes);
    }

    pub fn record_acquisition(&self, source: SourceKind, outcome: AcquisitionOutcome) {
        let attributes = [
            KeyValue::new("source", source.as_str()),
            KeyValue::new("outcome", outcome.as_str()),
        ];
        self.acquisitions.add(1, &attributes);
    }

    /// Prometheus text exposition of everything recorded so far.
    pub fn render(&self) -> anyhow::Result<String> {
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }
}

fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 50;
    let middle_step: usize = 250;
    let end_step: usize = 1000;
    let tail_step: usize = 5000;
    let first_part = (parts.0..=parts.1).step_by(first_step);
    let middle_part = (parts.1..=parts.2).step_by(middle_step);
    let end_part = (parts.2..=parts.3).step_by(end_step);
    let tail_part = (parts.3..=parts.4).step_by(tail_step);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}

//! Recorder backends.
//!
//! A recorder receives views once, before it is shared, and then accepts
//! values from any number of calls concurrently through `&self`.

use crate::measures::{Aggregation, Measure, MeasureValue, TagKey, ValueKind, View};
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tandem_core::{TandemError, TandemResult};
use tracing::debug;

/// Sink for measured values
pub trait StatsRecorder: Send + Sync + 'static {
    /// Register the views values will be recorded against
    fn register(&mut self, views: &[View]) -> TandemResult<()>;

    /// Record one value. Values for unregistered measures are ignored.
    fn record(&self, measure: &Measure, value: MeasureValue, tags: &[(TagKey, &str)]);
}

fn check_unique(is_registered: impl Fn(&str) -> bool, views: &[View]) -> TandemResult<()> {
    for (i, view) in views.iter().enumerate() {
        let name = view.measure.name;
        if is_registered(name) || views[..i].iter().any(|v| v.measure.name == name) {
            return Err(TandemError::Registration(format!("view already registered: {}", name)));
        }
    }
    Ok(())
}

/// Tags of `tags` the view keeps, in view order
fn view_tags<'a>(view: &View, tags: &[(TagKey, &'a str)]) -> Vec<(TagKey, &'a str)> {
    view.tag_keys
        .iter()
        .filter_map(|key| tags.iter().find(|(k, _)| k == key).copied())
        .collect()
}

enum Instrument {
    IntHistogram(Histogram<u64>),
    FloatHistogram(Histogram<f64>),
    Counter(Counter<u64>),
}

struct Registered {
    view: View,
    instrument: Instrument,
}

/// Recorder backed by an OpenTelemetry meter.
///
/// Distributions become histograms and counts become counters. Instruments
/// created through the metrics API carry no bucket bounds, so the host must
/// install an SDK view per distribution, matching the instrument name to
/// `view.measure.name` with explicit bucket boundaries taken from
/// [`Aggregation::Distribution`]. [`OtelStatsRecorder::views`] lists the
/// registered views, and with them the latency buckets from
/// [`DiagnosticsConfig`](crate::config::DiagnosticsConfig).
pub struct OtelStatsRecorder {
    meter: Meter,
    instruments: HashMap<&'static str, Registered>,
}

impl OtelStatsRecorder {
    pub fn new(meter: Meter) -> Self {
        Self {
            meter,
            instruments: HashMap::new(),
        }
    }

    fn instrument(&self, view: &View) -> Instrument {
        let measure = view.measure;
        match (&view.aggregation, measure.kind) {
            (Aggregation::Distribution(_), ValueKind::Int64) => Instrument::IntHistogram(
                self.meter
                    .u64_histogram(measure.name)
                    .with_description(measure.description)
                    .with_unit(measure.unit.symbol())
                    .init(),
            ),
            (Aggregation::Distribution(_), ValueKind::Float64) => Instrument::FloatHistogram(
                self.meter
                    .f64_histogram(measure.name)
                    .with_description(measure.description)
                    .with_unit(measure.unit.symbol())
                    .init(),
            ),
            (Aggregation::Count, _) => Instrument::Counter(
                self.meter
                    .u64_counter(measure.name)
                    .with_description(measure.description)
                    .with_unit(measure.unit.symbol())
                    .init(),
            ),
        }
    }

    /// Registered views, sorted by measure name
    pub fn views(&self) -> Vec<&View> {
        let mut views: Vec<_> = self.instruments.values().map(|r| &r.view).collect();
        views.sort_unstable_by_key(|v| v.measure.name);
        views
    }

    /// Bucket bounds the host must configure for the instrument `name`
    pub fn bucket_bounds(&self, name: &str) -> Option<&[f64]> {
        match &self.instruments.get(name)?.view.aggregation {
            Aggregation::Distribution(bounds) => Some(bounds.as_slice()),
            Aggregation::Count => None,
        }
    }

    /// Number of registered instruments
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

impl StatsRecorder for OtelStatsRecorder {
    fn register(&mut self, views: &[View]) -> TandemResult<()> {
        check_unique(|name| self.instruments.contains_key(name), views)?;

        for view in views {
            let instrument = self.instrument(view);
            self.instruments.insert(
                view.measure.name,
                Registered {
                    view: view.clone(),
                    instrument,
                },
            );
        }
        Ok(())
    }

    fn record(&self, measure: &Measure, value: MeasureValue, tags: &[(TagKey, &str)]) {
        let Some(registered) = self.instruments.get(measure.name) else {
            debug!(measure = measure.name, "no view registered for measure");
            return;
        };

        let attributes: Vec<KeyValue> = view_tags(&registered.view, tags)
            .into_iter()
            .map(|(key, value)| KeyValue::new(key.name(), value.to_string()))
            .collect();

        match (&registered.instrument, value) {
            // Counts occurrences regardless of the value.
            (Instrument::Counter(counter), _) => counter.add(1, &attributes),
            (Instrument::IntHistogram(h), MeasureValue::Int(v)) => h.record(non_negative(v), &attributes),
            (Instrument::FloatHistogram(h), MeasureValue::Float(v)) => h.record(v, &attributes),
            _ => debug!(measure = measure.name, ?value, "value kind does not match measure"),
        }
    }
}

fn non_negative(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}

/// A value captured by [`MemoryStatsRecorder`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedValue {
    pub measure: &'static str,
    pub value: MeasureValue,
    pub tags: Vec<(TagKey, String)>,
}

impl RecordedValue {
    pub fn tag(&self, key: TagKey) -> Option<&str> {
        self.tags.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    views: HashMap<&'static str, View>,
    values: Vec<RecordedValue>,
}

/// Recorder that keeps every value in memory.
///
/// Clones share storage, so a clone kept by the caller observes what the
/// registered instance records.
#[derive(Debug, Clone, Default)]
pub struct MemoryStatsRecorder {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every recorded value, in recording order
    pub fn values(&self) -> Vec<RecordedValue> {
        self.lock().values.clone()
    }

    /// Values recorded for the measure named `name`
    pub fn values_for(&self, name: &str) -> Vec<RecordedValue> {
        self.lock().values.iter().filter(|v| v.measure == name).cloned().collect()
    }

    /// Names of the registered views
    pub fn view_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.lock().views.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.lock().values.is_empty()
    }

    pub fn clear(&self) {
        self.lock().values.clear();
    }
}

impl StatsRecorder for MemoryStatsRecorder {
    fn register(&mut self, views: &[View]) -> TandemResult<()> {
        let mut inner = self.lock();
        check_unique(|name| inner.views.contains_key(name), views)?;
        for view in views {
            inner.views.insert(view.measure.name, view.clone());
        }
        Ok(())
    }

    fn record(&self, measure: &Measure, value: MeasureValue, tags: &[(TagKey, &str)]) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let Some(view) = inner.views.get(measure.name) else {
            return;
        };

        let tags = view_tags(view, tags)
            .into_iter()
            .map(|(key, value)| (key, value.to_string()))
            .collect();
        inner.values.push(RecordedValue {
            measure: measure.name,
            value,
            tags,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measures::{
        grpc_views, DEFAULT_LATENCY_DISTRIBUTION, DEFAULT_SIZE_DISTRIBUTION, SERVER_COMPLETED_RPCS, SERVER_SENT_BYTES,
    };

    #[test]
    fn test_memory_recorder_keeps_view_tags_only() {
        let mut recorder = MemoryStatsRecorder::new();
        recorder.register(&grpc_views(DEFAULT_LATENCY_DISTRIBUTION)).unwrap();

        recorder.record(
            &SERVER_SENT_BYTES,
            MeasureValue::Int(42),
            &[
                (TagKey::APP_ID, "app"),
                (TagKey::SERVER_METHOD, "/svc/Call"),
                (TagKey::SERVER_STATUS, "OK"),
            ],
        );

        let values = recorder.values_for(SERVER_SENT_BYTES.name);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].value, MeasureValue::Int(42));
        assert_eq!(values[0].tag(TagKey::SERVER_METHOD), Some("/svc/Call"));
        assert_eq!(values[0].tag(TagKey::SERVER_STATUS), None);
    }

    #[test]
    fn test_memory_recorder_ignores_unregistered() {
        let recorder = MemoryStatsRecorder::new();
        recorder.record(&SERVER_COMPLETED_RPCS, MeasureValue::Int(1), &[]);
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let views = grpc_views(DEFAULT_LATENCY_DISTRIBUTION);
        let mut recorder = MemoryStatsRecorder::new();
        recorder.register(&views).unwrap();

        let err = recorder.register(&views[..1]).unwrap_err();
        assert!(matches!(err, TandemError::Registration(_)));

        let mut fresh = MemoryStatsRecorder::new();
        let doubled = vec![views[0].clone(), views[0].clone()];
        assert!(fresh.register(&doubled).is_err());
        assert!(fresh.view_names().is_empty());
    }

    #[test]
    fn test_clones_share_storage() {
        let mut recorder = MemoryStatsRecorder::new();
        let observer = recorder.clone();
        recorder.register(&grpc_views(DEFAULT_LATENCY_DISTRIBUTION)).unwrap();

        recorder.record(&SERVER_COMPLETED_RPCS, MeasureValue::Int(1), &[(TagKey::APP_ID, "app")]);

        assert_eq!(observer.values().len(), 1);
        assert_eq!(observer.view_names().len(), 10);
        observer.clear();
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_otel_recorder_registers_instruments() {
        let meter = opentelemetry::global::meter("tandem-diagnostics-test");
        let mut recorder = OtelStatsRecorder::new(meter);
        assert!(recorder.is_empty());

        recorder.register(&grpc_views(DEFAULT_LATENCY_DISTRIBUTION)).unwrap();
        assert_eq!(recorder.len(), 10);

        recorder.record(&SERVER_SENT_BYTES, MeasureValue::Int(-5), &[(TagKey::APP_ID, "app")]);
        recorder.record(&SERVER_COMPLETED_RPCS, MeasureValue::Int(1), &[(TagKey::APP_ID, "app")]);
        recorder.record(&SERVER_SENT_BYTES, MeasureValue::Float(1.0), &[]);

        assert!(recorder.register(&grpc_views(&[1.0])[..1]).is_err());
    }

    #[test]
    fn test_otel_recorder_exposes_bucket_bounds() {
        let meter = opentelemetry::global::meter("tandem-diagnostics-test");
        let mut recorder = OtelStatsRecorder::new(meter);
        recorder.register(&grpc_views(&[5.0, 50.0, 500.0])).unwrap();

        assert_eq!(recorder.views().len(), 10);
        assert!(recorder.views().windows(2).all(|w| w[0].measure.name < w[1].measure.name));
        assert_eq!(recorder.bucket_bounds("grpc.io/server/server_latency"), Some(&[5.0, 50.0, 500.0][..]));
        assert_eq!(
            recorder.bucket_bounds("grpc.io/client/sent_bytes_per_rpc"),
            Some(DEFAULT_SIZE_DISTRIBUTION)
        );
        assert_eq!(recorder.bucket_bounds("grpc.io/server/completed_rpcs"), None);
        assert_eq!(recorder.bucket_bounds("unknown"), None);
    }

    #[test]
    fn test_non_negative() {
        assert_eq!(non_negative(-1), 0);
        assert_eq!(non_negative(7), 7);
    }
}

//! Metric descriptors and per-scrape sample buffers.
//!
//! Collectors build their [`Desc`] sets once, when the exporter is
//! assembled, and push [`Sample`]s into a [`MetricBatch`] on every scrape.
//! The batch is rendered to the Prometheus text exposition format with the
//! `prometheus` crate's [`TextEncoder`]. Families are built directly rather
//! than through a `Registry` because the interface label set depends on the
//! device's description regex and differs from device to device.

use prometheus::proto::{Counter, Gauge, LabelPair, Metric, MetricFamily, MetricType};
use prometheus::{Encoder, TextEncoder};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("metric {name}: expected {expected} label values, got {got}")]
    Cardinality {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("failed to encode metrics: {0}")]
    Encode(#[from] prometheus::Error),
    #[error("encoded metrics are not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub type MetricsResult<T> = Result<T, MetricsError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Gauge,
    Counter,
}

/// Name, help text, type and ordered label names of one metric
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Desc {
    name: String,
    help: String,
    value_type: ValueType,
    labels: Vec<String>,
}

impl Desc {
    pub fn new(name: &str, help: &str, value_type: ValueType, labels: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            help: help.to_string(),
            value_type,
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    pub fn gauge(name: &str, help: &str, labels: &[&str]) -> Arc<Self> {
        Arc::new(Self::new(name, help, ValueType::Gauge, labels))
    }

    pub fn counter(name: &str, help: &str, labels: &[&str]) -> Arc<Self> {
        Arc::new(Self::new(name, help, ValueType::Counter, labels))
    }

    /// Append runtime label names after the fixed ones
    pub fn with_labels(mut self, extra: &[String]) -> Self {
        self.labels.extend(extra.iter().cloned());
        self
    }
}

/// One observation of a described metric
#[derive(Debug, Clone)]
pub struct Sample {
    desc: Arc<Desc>,
    label_values: Vec<String>,
    value: f64,
}

/// Samples collected for one scrape, or one part of it
#[derive(Debug, Default)]
pub struct MetricBatch {
    samples: Vec<Sample>,
}

impl MetricBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` for `desc`. The label values must line up with the
    /// descriptor's label names.
    pub fn push(&mut self, desc: &Arc<Desc>, value: f64, label_values: Vec<String>) -> MetricsResult<()> {
        if label_values.len() != desc.labels.len() {
            return Err(MetricsError::Cardinality {
                name: desc.name.clone(),
                expected: desc.labels.len(),
                got: label_values.len(),
            });
        }

        self.samples.push(Sample {
            desc: Arc::clone(desc),
            label_values,
            value,
        });
        Ok(())
    }

    /// Move every sample of `other` into this batch
    pub fn merge(&mut self, other: MetricBatch) {
        self.samples.extend(other.samples);
    }

    /// Group samples into metric families, in order of first appearance.
    /// A repeated series (same name and label values) keeps its first value.
    fn families(&self) -> Vec<MetricFamily> {
        let mut families: Vec<MetricFamily> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut seen: HashSet<(&str, &[String])> = HashSet::new();

        for sample in &self.samples {
            let desc = &sample.desc;
            if !seen.insert((desc.name.as_str(), sample.label_values.as_slice())) {
                tracing::debug!("Dropping duplicate series for {}", desc.name);
                continue;
            }

            let idx = *index.entry(desc.name.as_str()).or_insert_with(|| {
                let mut family = MetricFamily::default();
                family.set_name(desc.name.clone());
                family.set_help(desc.help.clone());
                family.set_field_type(match desc.value_type {
                    ValueType::Gauge => MetricType::GAUGE,
                    ValueType::Counter => MetricType::COUNTER,
                });
                families.push(family);
                families.len() - 1
            });

            let mut metric = Metric::default();
            for (name, value) in desc.labels.iter().zip(&sample.label_values) {
                let mut pair = LabelPair::default();
                pair.set_name(name.clone());
                pair.set_value(value.clone());
                metric.mut_label().push(pair);
            }
            match desc.value_type {
                ValueType::Gauge => {
                    let mut gauge = Gauge::default();
                    gauge.set_value(sample.value);
                    metric.set_gauge(gauge);
                }
                ValueType::Counter => {
                    let mut counter = Counter::default();
                    counter.set_value(sample.value);
                    metric.set_counter(counter);
                }
            }
            families[idx].mut_metric().push(metric);
        }

        families
    }

    /// Render in the Prometheus text exposition format
    pub fn render(&self) -> MetricsResult<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.families(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Content type of [`MetricBatch::render`] output
pub fn content_type() -> String {
    TextEncoder::new().format_type().to_string()
}

#[cfg(test)]
impl Desc {
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

#[cfg(test)]
impl Sample {
    pub fn name(&self) -> &str {
        &self.desc.name
    }

    pub fn label_values(&self) -> &[String] {
        &self.label_values
    }
}

#[cfg(test)]
impl MetricBatch {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Value of the series `name` with exactly `label_values`
    pub fn get(&self, name: &str, label_values: &[&str]) -> Option<f64> {
        self.samples
            .iter()
            .find(|s| s.name() == name && s.label_values == label_values)
            .map(|s| s.value)
    }

    /// All samples of metric `name`
    pub fn named(&self, name: &str) -> Vec<&Sample> {
        self.samples.iter().filter(|s| s.name() == name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_checks_cardinality() {
        let desc = Desc::gauge("cisco_up", "Device reachable", &["target"]);
        let mut batch = MetricBatch::new();

        assert!(batch.push(&desc, 1.0, vec!["sw1".to_string()]).is_ok());
        let err = batch.push(&desc, 1.0, vec![]).unwrap_err();
        assert!(matches!(
            err,
            MetricsError::Cardinality {
                expected: 1,
                got: 0,
                ..
            }
        ));
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_with_labels_appends_in_order() {
        let desc = Desc::new("x", "x", ValueType::Gauge, &["target", "name"])
            .with_labels(&["site".to_string(), "role".to_string()]);
        assert_eq!(desc.labels(), &["target", "name", "site", "role"]);
    }

    #[test]
    fn test_render_text_format() {
        let up = Desc::gauge("cisco_up", "Device reachable", &["target"]);
        let found = Desc::counter("cisco_nat64_sessions_found", "Sessions found", &["target"]);

        let mut batch = MetricBatch::new();
        batch.push(&up, 1.0, vec!["sw1".to_string()]).unwrap();
        batch.push(&found, 42.0, vec!["sw1".to_string()]).unwrap();
        batch.push(&up, 0.0, vec!["sw2".to_string()]).unwrap();

        let text = batch.render().unwrap();
        assert!(text.contains("# HELP cisco_up Device reachable"));
        assert!(text.contains("# TYPE cisco_up gauge"));
        assert!(text.contains("cisco_up{target=\"sw1\"} 1"));
        assert!(text.contains("cisco_up{target=\"sw2\"} 0"));
        assert!(text.contains("# TYPE cisco_nat64_sessions_found counter"));
        assert!(text.contains("cisco_nat64_sessions_found{target=\"sw1\"} 42"));
        assert_eq!(text.matches("# TYPE cisco_up").count(), 1);
    }

    #[test]
    fn test_render_keeps_label_order() {
        let desc = Desc::gauge("cisco_interface_up", "up", &["target", "name", "description"]);
        let mut batch = MetricBatch::new();
        batch
            .push(
                &desc,
                1.0,
                vec!["sw1".into(), "Vlan1".into(), "mgmt".into()],
            )
            .unwrap();

        let text = batch.render().unwrap();
        assert!(text.contains(
            "cisco_interface_up{target=\"sw1\",name=\"Vlan1\",description=\"mgmt\"} 1"
        ));
    }

    #[test]
    fn test_render_drops_duplicate_series() {
        let desc = Desc::gauge("cisco_inventory_item", "item", &["target", "name"]);
        let mut batch = MetricBatch::new();
        batch.push(&desc, 1.0, vec!["sw1".into(), "PSU".into()]).unwrap();
        batch.push(&desc, 1.0, vec!["sw1".into(), "PSU".into()]).unwrap();

        let text = batch.render().unwrap();
        assert_eq!(text.matches("cisco_inventory_item{").count(), 1);
    }

    #[test]
    fn test_families_with_different_label_sets() {
        let a = Arc::new(
            Desc::new("cisco_interface_speed", "speed", ValueType::Gauge, &["target"])
                .with_labels(&["site".to_string()]),
        );
        let b = Desc::gauge("cisco_interface_speed", "speed", &["target"]);

        let mut batch = MetricBatch::new();
        batch.push(&a, 1e9, vec!["sw1".into(), "ams".into()]).unwrap();
        batch.push(&b, 1e8, vec!["sw2".into()]).unwrap();

        let text = batch.render().unwrap();
        assert_eq!(text.matches("# TYPE cisco_interface_speed").count(), 1);
        assert!(text.contains("cisco_interface_speed{target=\"sw1\",site=\"ams\"}"));
        assert!(text.contains("cisco_interface_speed{target=\"sw2\"}"));
    }

    #[test]
    fn test_merge_and_empty_render() {
        let desc = Desc::gauge("cisco_up", "up", &["target"]);
        let mut a = MetricBatch::new();
        let mut b = MetricBatch::new();
        b.push(&desc, 1.0, vec!["sw1".into()]).unwrap();
        a.merge(b);
        assert_eq!(a.get("cisco_up", &["sw1"]), Some(1.0));

        assert_eq!(MetricBatch::new().render().unwrap(), "");
    }

    #[test]
    fn test_content_type() {
        assert!(content_type().starts_with("text/plain"));
    }
}

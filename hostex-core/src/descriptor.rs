use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

/// The kind of an exported metric.
///
/// Only the two kinds the exporter actually emits are modeled; histograms
/// and summaries are out of scope for raw counter pass-through.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ValueKind {
    /// A value that can go up and down.
    Gauge,
    /// A monotonically increasing value.
    Counter,
}

impl ValueKind {
    /// The Prometheus exposition-format type string for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Gauge => "gauge",
            ValueKind::Counter => "counter",
        }
    }
}

/// Error returned when parsing a [`ValueKind`] from configuration.
#[derive(Debug, Error)]
#[error("unknown metric type '{0}', expected 'gauge' or 'counter'")]
pub struct UnknownValueKind(pub String);

impl FromStr for ValueKind {
    type Err = UnknownValueKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gauge" => Ok(ValueKind::Gauge),
            "counter" => Ok(ValueKind::Counter),
            other => Err(UnknownValueKind(other.to_string())),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds a fully-qualified metric name from namespace, subsystem, and
/// short name, skipping empty parts.
pub fn build_fq_name(namespace: &str, subsystem: &str, name: &str) -> String {
    let mut fq = String::with_capacity(namespace.len() + subsystem.len() + name.len() + 2);
    for part in [namespace, subsystem, name] {
        if part.is_empty() {
            continue;
        }
        if !fq.is_empty() {
            fq.push('_');
        }
        fq.push_str(part);
    }
    fq
}

/// Describes one exported metric family.
///
/// Descriptors are created at collector-construction time and never mutated
/// afterwards, so they are shared read-only (behind an `Arc`) across
/// concurrent scrapes.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct MetricDescriptor {
    name: String,
    help: String,
    label_names: Vec<String>,
}

impl MetricDescriptor {
    /// Creates a descriptor with a fully-qualified name, help text, and an
    /// ordered list of label names.
    pub fn new(
        name: impl Into<String>,
        help: impl Into<String>,
        label_names: Vec<String>,
    ) -> Self {
        Self { name: name.into(), help: help.into(), label_names }
    }

    /// The fully-qualified metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The help text shown in the exposition output.
    pub fn help(&self) -> &str {
        &self.help
    }

    /// The ordered label names every sample of this family must carry.
    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }
}

/// One emitted metric: a descriptor, a kind, a numeric value, and label
/// values index-aligned with the descriptor's label names.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    /// The family this sample belongs to.
    pub descriptor: Arc<MetricDescriptor>,
    /// Gauge or counter.
    pub kind: ValueKind,
    /// The numeric value.
    pub value: f64,
    /// Label values, enrichment labels first, metric-specific labels after.
    pub label_values: Vec<String>,
}

impl Sample {
    /// Creates a sample for the given family.
    pub fn new(
        descriptor: Arc<MetricDescriptor>,
        kind: ValueKind,
        value: f64,
        label_values: Vec<String>,
    ) -> Self {
        Self { descriptor, kind, value, label_values }
    }

    /// Whether the label values line up with the descriptor's label names.
    pub fn arity_matches(&self) -> bool {
        self.label_values.len() == self.descriptor.label_names().len()
    }
}

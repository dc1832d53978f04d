//! The collector plugin interface.
//!
//! A plugin is a thin data-source adapter: it performs one raw read per
//! scrape, emits its built-in metrics directly onto the shared sample
//! stream, and hands back an opaque [`RawSnapshot`] that the templated
//! engine uses to resolve computed-metric variables. Everything else (the
//! descriptor bookkeeping, expression evaluation, label plumbing) lives in
//! [`engine`](crate::engine).

use std::sync::Arc;
use std::time::Duration;

use hostex_core::varname::Dimensions;
use hostex_core::{build_fq_name, MetricDescriptor, Sample, Value, ValueKind};
use indexmap::IndexMap;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

pub mod cpu;
mod registry;
pub use self::registry::{PluginFactory, Registry};

/// The shared output stream a scrape writes into.
///
/// Many collector tasks send into one stream concurrently; no ordering is
/// guaranteed across collectors.
pub type SampleSink = UnboundedSender<Sample>;

/// Error from a plugin's raw read.
///
/// Collect errors are per-collector and never fatal to the scrape as a
/// whole: the failing collector contributes zero metrics and a failure
/// outcome, the rest proceed.
#[derive(Debug, Error)]
pub enum CollectError {
    /// The underlying OS query failed.
    #[error("raw read failed: {0}")]
    Source(String),

    /// An I/O error from the data source.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The collector exceeded the configured per-collector deadline.
    #[error("collector timed out after {0:?}")]
    Timeout(Duration),

    /// The collector task panicked.
    #[error("collector task panicked")]
    Panicked,
}

/// The set of metric descriptors owned by one collector instance.
///
/// Built once at construction (plugin built-ins plus configured metrics)
/// and read-only afterwards, so concurrent scrapes share it without
/// locking. Iteration order is registration order.
#[derive(Debug)]
pub struct DescriptorSet {
    namespace: String,
    subsystem: String,
    enrichment_labels: Vec<String>,
    inner: IndexMap<String, Arc<MetricDescriptor>>,
}

impl DescriptorSet {
    /// Creates an empty set for `namespace_subsystem_*` metrics whose
    /// samples will carry the given enrichment label names first.
    pub fn new(namespace: &str, subsystem: &str, enrichment_labels: Vec<String>) -> Self {
        Self {
            namespace: namespace.to_string(),
            subsystem: subsystem.to_string(),
            enrichment_labels,
            inner: IndexMap::new(),
        }
    }

    /// Registers a descriptor under its short name, returning the shared
    /// handle. Label order is enrichment labels first, then the
    /// metric-specific `extra_labels`.
    pub fn register(
        &mut self,
        name: &str,
        help: &str,
        extra_labels: &[&str],
    ) -> Arc<MetricDescriptor> {
        let mut labels = self.enrichment_labels.clone();
        labels.extend(extra_labels.iter().map(|l| l.to_string()));

        let descriptor = Arc::new(MetricDescriptor::new(
            build_fq_name(&self.namespace, &self.subsystem, name),
            help,
            labels,
        ));
        self.inner.insert(name.to_string(), descriptor.clone());
        descriptor
    }

    /// Looks up a descriptor by short name.
    pub fn get(&self, name: &str) -> Option<&Arc<MetricDescriptor>> {
        self.inner.get(name)
    }

    /// Number of registered descriptors.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no descriptors are registered.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Everything a plugin needs during one collect call: its descriptor set,
/// the current enrichment label values, and the shared sample stream.
pub struct CollectContext<'a> {
    descriptors: &'a DescriptorSet,
    label_values: &'a [String],
    sink: &'a SampleSink,
}

impl<'a> CollectContext<'a> {
    pub(crate) fn new(
        descriptors: &'a DescriptorSet,
        label_values: &'a [String],
        sink: &'a SampleSink,
    ) -> Self {
        Self { descriptors, label_values, sink }
    }

    /// Looks up one of this collector's descriptors by short name. Returns
    /// `None` when configuration dropped the built-in, in which case the
    /// plugin simply skips emitting it.
    pub fn descriptor(&self, name: &str) -> Option<&Arc<MetricDescriptor>> {
        self.descriptors.get(name)
    }

    /// The current enrichment label values.
    pub fn label_values(&self) -> &[String] {
        self.label_values
    }

    /// Emits one sample, prefixing the enrichment label values to the
    /// metric-specific `extra_labels`.
    pub fn emit(
        &self,
        descriptor: &Arc<MetricDescriptor>,
        kind: ValueKind,
        value: f64,
        extra_labels: &[&str],
    ) {
        let mut values = Vec::with_capacity(self.label_values.len() + extra_labels.len());
        values.extend_from_slice(self.label_values);
        values.extend(extra_labels.iter().map(|l| l.to_string()));

        // The receiver only goes away when the whole scrape is dropped, at
        // which point losing samples is the intended behavior.
        let _ = self.sink.send(Sample::new(descriptor.clone(), kind, value, values));
    }
}

/// The raw result of one collect call.
///
/// Snapshots are owned exclusively by the scrape that produced them and are
/// discarded when it completes; they are the engine's only channel for
/// resolving computed-metric variables.
pub trait RawSnapshot: Send {
    /// Resolves a decoded variable name against this snapshot.
    ///
    /// Returns a scalar when `dims` pins every instance dimension, a
    /// sequence (one value per instance) when a dimension carries the
    /// aggregate marker, and `None` when the name does not exist — the
    /// engine logs and skips the metric rather than emitting a wrong zero.
    fn resolve(&self, base: &str, dims: &Dimensions) -> Option<Value>;
}

/// A data-source adapter producing one family of related metrics.
pub trait CollectorPlugin: Send {
    /// Constant name used for registry lookup and as the metric subsystem.
    fn id(&self) -> &'static str;

    /// Registers this plugin's built-in descriptors. Called once at
    /// construction, and skipped entirely when the subsystem is configured
    /// to drop its built-ins.
    fn describe(&self, descriptors: &mut DescriptorSet);

    /// Performs one raw read, emitting built-in metrics through `ctx` and
    /// returning the snapshot for computed-metric resolution.
    ///
    /// A single instance is only ever driven by one thread per scrape; the
    /// engine serializes overlapping scrapes of the same collector.
    fn collect(&mut self, ctx: &CollectContext<'_>) -> Result<Box<dyn RawSnapshot>, CollectError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_set_prefixes_enrichment_labels() {
        let mut set = DescriptorSet::new("hostex", "cpu", vec!["app".to_string()]);
        let desc = set.register("usage_ratio", "CPU usage.", &["core"]);

        assert_eq!(desc.name(), "hostex_cpu_usage_ratio");
        assert_eq!(desc.label_names(), &["app".to_string(), "core".to_string()]);
        assert!(set.get("usage_ratio").is_some());
        assert!(set.get("nope").is_none());
    }

    #[test]
    fn emit_prefixes_enrichment_values() {
        let mut set = DescriptorSet::new("hostex", "cpu", vec!["app".to_string()]);
        let desc = set.register("usage_ratio", "CPU usage.", &["core"]);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let labels = vec!["webapp".to_string()];
        let ctx = CollectContext::new(&set, &labels, &tx);
        ctx.emit(&desc, ValueKind::Gauge, 0.25, &["3"]);

        let sample = rx.try_recv().unwrap();
        assert_eq!(sample.label_values, vec!["webapp".to_string(), "3".to_string()]);
        assert!(sample.arity_matches());
    }
}

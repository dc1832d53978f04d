//! The templated collector engine.
//!
//! Wraps one collector plugin and owns every exported-metric descriptor for
//! its subsystem: the plugin's built-ins (unless configuration drops them)
//! plus the configured metric maps, whose compute expressions are compiled
//! once at construction. Construction failures are fatal at startup;
//! per-metric failures during a scrape log and skip only that metric.

use std::sync::Arc;

use hostex_core::varname::{self, VarNameError};
use hostex_core::{MetricDescriptor, ValueKind};
use hostex_eval::{Bindings, Expression, ExpressionError};
use thiserror::Error;
use tracing::warn;

use crate::collector::{
    CollectContext, CollectError, CollectorPlugin, DescriptorSet, RawSnapshot, SampleSink,
};
use crate::config::CollectorSpec;
use crate::error::BuildError;
use crate::labels::LabelSet;

/// How a configured metric obtains its value.
enum ValueSource {
    /// Pass one raw value through unchanged.
    PassThrough(String),
    /// Evaluate a compiled expression over resolved variables.
    Computed(Expression),
}

struct CompiledMapping {
    export_name: String,
    descriptor: Arc<MetricDescriptor>,
    kind: ValueKind,
    source: ValueSource,
}

/// Per-metric failure during a scrape. Recovered by skipping the metric.
#[derive(Debug, Error)]
enum ComputeError {
    #[error(transparent)]
    Name(#[from] VarNameError),

    #[error("variable '{0}' did not resolve against the snapshot")]
    Unresolved(String),

    #[error(transparent)]
    Eval(#[from] ExpressionError),

    #[error("source '{0}' resolved to a sequence, expected a scalar")]
    NonScalar(String),
}

/// One collector as seen by the orchestrator: a plugin plus its compiled
/// configuration.
pub struct TemplatedCollector {
    name: String,
    plugin: Box<dyn CollectorPlugin>,
    descriptors: DescriptorSet,
    mappings: Vec<CompiledMapping>,
}

impl TemplatedCollector {
    /// Builds the engine for one subsystem, registering built-in and
    /// configured descriptors and compiling every compute expression.
    ///
    /// # Errors
    ///
    /// Fails fast on a bad metric type, a non-computed metric without a
    /// source name, or compute logic that does not compile; the error
    /// carries the offending metric's export name.
    pub fn new(
        subsystem: &str,
        plugin: Box<dyn CollectorPlugin>,
        spec: &CollectorSpec,
        enrichment_names: &[String],
    ) -> Result<Self, BuildError> {
        let mut descriptors =
            DescriptorSet::new(&spec.namespace, subsystem, enrichment_names.to_vec());
        if !spec.default_drop {
            plugin.describe(&mut descriptors);
        }

        let mut mappings = Vec::with_capacity(spec.exported.len());
        for map in &spec.exported {
            let kind = map.kind()?;
            let source = if map.computed {
                let expression = Expression::compile(&map.compute_logic).map_err(|source| {
                    BuildError::ComputeLogic { name: map.export_name.clone(), source }
                })?;
                ValueSource::Computed(expression)
            } else {
                let source = map
                    .source_names
                    .first()
                    .cloned()
                    .ok_or_else(|| BuildError::MissingSource(map.export_name.clone()))?;
                ValueSource::PassThrough(source)
            };

            let descriptor = descriptors.register(&map.export_name, &map.description, &[]);
            mappings.push(CompiledMapping {
                export_name: map.export_name.clone(),
                descriptor,
                kind,
                source,
            });
        }

        Ok(Self { name: subsystem.to_string(), plugin, descriptors, mappings })
    }

    /// The subsystem name this engine collects for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The descriptor set built at construction. Read-only.
    pub fn descriptors(&self) -> &DescriptorSet {
        &self.descriptors
    }

    /// Runs one collection pass: the plugin's built-ins are emitted first,
    /// then every configured metric is computed against the fresh snapshot
    /// and emitted with the given enrichment labels.
    pub fn collect(&mut self, sink: &SampleSink, labels: &LabelSet) -> Result<(), CollectError> {
        let ctx = CollectContext::new(&self.descriptors, labels.values(), sink);
        let snapshot = self.plugin.collect(&ctx)?;

        for mapping in &self.mappings {
            match compute(snapshot.as_ref(), mapping) {
                Ok(value) => ctx.emit(&mapping.descriptor, mapping.kind, value, &[]),
                Err(err) => warn!(
                    collector = %self.name,
                    metric = %mapping.export_name,
                    error = %err,
                    "skipping configured metric for this scrape",
                ),
            }
        }
        Ok(())
    }
}

fn compute(snapshot: &dyn RawSnapshot, mapping: &CompiledMapping) -> Result<f64, ComputeError> {
    match &mapping.source {
        ValueSource::PassThrough(source) => {
            let (base, dims) = varname::decode(source)?;
            let value = snapshot
                .resolve(&base, &dims)
                .ok_or_else(|| ComputeError::Unresolved(source.clone()))?;
            value.as_scalar().ok_or_else(|| ComputeError::NonScalar(source.clone()))
        }
        ValueSource::Computed(expression) => {
            let mut bindings = Bindings::with_capacity(expression.variables().len());
            for name in expression.variables() {
                let (base, dims) = varname::decode(name)?;
                let value = snapshot
                    .resolve(&base, &dims)
                    .ok_or_else(|| ComputeError::Unresolved(name.clone()))?;
                bindings.insert(name.clone(), value);
            }
            Ok(expression.evaluate(&bindings)?)
        }
    }
}

//! Test-only collector stubs.

use std::collections::HashMap;

use hostex_core::varname::Dimensions;
use hostex_core::{Value, ValueKind};

use crate::collector::{
    CollectContext, CollectError, CollectorPlugin, DescriptorSet, RawSnapshot,
};

/// A plugin backed by a fixed table of raw values.
///
/// Registers one built-in (`raw_total`, always emitted as 7) and resolves
/// variables against the table, keyed by their re-encoded name.
pub(crate) struct StaticPlugin {
    id: &'static str,
    values: HashMap<String, Value>,
    fail: bool,
    delay: Option<std::time::Duration>,
}

impl StaticPlugin {
    pub(crate) fn new(id: &'static str) -> Self {
        Self { id, values: HashMap::new(), fail: false, delay: None }
    }

    pub(crate) fn with_value(mut self, name: &str, value: Value) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    pub(crate) fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub(crate) fn delayed(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl CollectorPlugin for StaticPlugin {
    fn id(&self) -> &'static str {
        self.id
    }

    fn describe(&self, descriptors: &mut DescriptorSet) {
        descriptors.register("raw_total", "Stub built-in.", &[]);
    }

    fn collect(
        &mut self,
        ctx: &CollectContext<'_>,
    ) -> Result<Box<dyn RawSnapshot>, CollectError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail {
            return Err(CollectError::Source("stub failure".to_string()));
        }
        if let Some(desc) = ctx.descriptor("raw_total") {
            ctx.emit(desc, ValueKind::Counter, 7.0, &[]);
        }
        Ok(Box::new(StaticSnapshot { values: self.values.clone() }))
    }
}

struct StaticSnapshot {
    values: HashMap<String, Value>,
}

impl RawSnapshot for StaticSnapshot {
    fn resolve(&self, base: &str, dims: &Dimensions) -> Option<Value> {
        let mut key = base.to_string();
        for (dim, value) in dims {
            key.push('.');
            key.push_str(dim);
            key.push('@');
            key.push_str(value);
        }
        self.values.get(&key).cloned()
    }
}

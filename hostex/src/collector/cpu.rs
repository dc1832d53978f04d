//! The bundled CPU collector plugin.
//!
//! Reads per-core usage and frequency through `sysinfo`. Usage is reported
//! as a 0..1 ratio computed against the previous refresh, so the first
//! scrape after startup reports zeros.

use hostex_core::varname::Dimensions;
use hostex_core::{Value, ValueKind};
use sysinfo::System;

use crate::collector::{
    CollectContext, CollectError, CollectorPlugin, DescriptorSet, RawSnapshot,
};

const USAGE: &str = "usage_ratio";
const FREQUENCY: &str = "frequency_hertz";
const COUNT: &str = "count";

/// Per-core CPU usage and frequency readings.
pub struct CpuPlugin {
    system: System,
}

impl CpuPlugin {
    /// Creates the plugin and takes the baseline usage reading.
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self { system }
    }
}

impl Default for CpuPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectorPlugin for CpuPlugin {
    fn id(&self) -> &'static str {
        "cpu"
    }

    fn describe(&self, descriptors: &mut DescriptorSet) {
        descriptors.register(USAGE, "Share of time each core spent busy since the last scrape.", &["core"]);
        descriptors.register(FREQUENCY, "Current frequency of each core.", &["core"]);
        descriptors.register(COUNT, "Number of logical cores.", &[]);
    }

    fn collect(&mut self, ctx: &CollectContext<'_>) -> Result<Box<dyn RawSnapshot>, CollectError> {
        self.system.refresh_cpu_all();

        let cores: Vec<CoreReading> = self
            .system
            .cpus()
            .iter()
            .map(|cpu| CoreReading {
                usage_ratio: f64::from(cpu.cpu_usage()) / 100.0,
                frequency_hertz: cpu.frequency() as f64 * 1_000_000.0,
            })
            .collect();

        if cores.is_empty() {
            return Err(CollectError::Source("no CPUs reported by the system".to_string()));
        }

        for (index, core) in cores.iter().enumerate() {
            let core_label = index.to_string();
            if let Some(desc) = ctx.descriptor(USAGE) {
                ctx.emit(desc, ValueKind::Gauge, core.usage_ratio, &[&core_label]);
            }
            if let Some(desc) = ctx.descriptor(FREQUENCY) {
                ctx.emit(desc, ValueKind::Gauge, core.frequency_hertz, &[&core_label]);
            }
        }
        if let Some(desc) = ctx.descriptor(COUNT) {
            ctx.emit(desc, ValueKind::Gauge, cores.len() as f64, &[]);
        }

        Ok(Box::new(CpuSnapshot { cores }))
    }
}

struct CoreReading {
    usage_ratio: f64,
    frequency_hertz: f64,
}

impl CoreReading {
    fn field(&self, base: &str) -> Option<f64> {
        match base {
            USAGE => Some(self.usage_ratio),
            FREQUENCY => Some(self.frequency_hertz),
            _ => None,
        }
    }
}

struct CpuSnapshot {
    cores: Vec<CoreReading>,
}

impl RawSnapshot for CpuSnapshot {
    fn resolve(&self, base: &str, dims: &Dimensions) -> Option<Value> {
        if base == COUNT {
            return Some(Value::Scalar(self.cores.len() as f64));
        }

        match dims.get("core").map(String::as_str) {
            // Pinned to one core.
            Some(core) if !core.is_empty() => {
                let index: usize = core.parse().ok()?;
                self.cores.get(index)?.field(base).map(Value::Scalar)
            }
            // Aggregate marker (or no dimension at all): one value per core.
            _ => {
                let values: Option<Vec<f64>> =
                    self.cores.iter().map(|core| core.field(base)).collect();
                values.map(Value::from)
            }
        }
    }
}

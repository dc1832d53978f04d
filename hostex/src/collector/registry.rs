use indexmap::IndexMap;

use crate::collector::CollectorPlugin;
use crate::error::BuildError;

/// Factory function producing a fresh plugin instance.
pub type PluginFactory = fn() -> Box<dyn CollectorPlugin>;

/// Name-keyed set of collector factories.
///
/// Populated once at process init; resolving the enabled-collector list
/// happens at startup, before any scrape is served, so a misconfigured name
/// is an immediate, visible failure instead of a silently missing
/// collector.
pub struct Registry {
    factories: IndexMap<&'static str, PluginFactory>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self { factories: IndexMap::new() }
    }

    /// Creates a registry holding every built-in plugin.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("cpu", || Box::new(super::cpu::CpuPlugin::new()));
        registry
    }

    /// Registers a factory under a collector name. Re-registering a name
    /// replaces the previous factory.
    pub fn register(&mut self, name: &'static str, factory: PluginFactory) {
        self.factories.insert(name, factory);
    }

    /// Registered collector names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    /// Builds a fresh plugin instance for `name`.
    pub fn build(&self, name: &str) -> Result<Box<dyn CollectorPlugin>, BuildError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| BuildError::UnknownCollector(name.to_string()))
    }

    /// Checks that every name in `enabled` has a factory.
    pub fn check(&self, enabled: impl IntoIterator<Item = impl AsRef<str>>) -> Result<(), BuildError> {
        for name in enabled {
            let name = name.as_ref();
            if !self.factories.contains_key(name) {
                return Err(BuildError::UnknownCollector(name.to_string()));
            }
        }
        Ok(())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

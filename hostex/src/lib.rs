//! Templated host-metrics exporter.
//!
//! Collector plugins read raw OS counters once per scrape; a
//! configuration-driven engine maps those readings, directly or through
//! arithmetic and aggregate expressions, into Prometheus metric families;
//! a concurrent orchestrator fans each scrape out across collectors with
//! per-collector failure isolation; and an asynchronously refreshed label
//! set enriches every sample without ever blocking a scrape.

#![deny(missing_docs)]

pub mod collector;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod exporter;
pub mod labels;
pub mod metadata;
pub mod scrape;

#[cfg(test)]
pub(crate) mod testutil;

pub use self::config::Config;
pub use self::engine::TemplatedCollector;
pub use self::error::BuildError;
pub use self::exporter::Server;
pub use self::scrape::{Orchestrator, Scrape, ScrapeOutcome};

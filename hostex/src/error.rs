//! Startup error taxonomy.

use std::io;
use std::path::PathBuf;

use hostex_core::UnknownValueKind;
use hostex_eval::ExpressionError;
use thiserror::Error;

/// Errors that prevent the exporter from starting.
///
/// Everything here is fatal: the process must not begin serving scrapes
/// with a partially valid configuration. Per-scrape failures are modeled by
/// [`CollectError`](crate::collector::CollectError) instead.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The configuration file could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    ReadConfig {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse config file: {0}")]
    ParseConfig(#[from] toml::de::Error),

    /// The listen address was not a valid `ip:port` pair.
    #[error("invalid listen address '{0}'")]
    ListenAddress(String),

    /// An enabled collector name has no registered factory.
    #[error("collector '{0}' is not available")]
    UnknownCollector(String),

    /// A configured metric declared a kind other than gauge or counter.
    #[error("metric '{name}': {source}")]
    MetricType {
        /// Export name of the offending metric.
        name: String,
        /// The parse failure.
        source: UnknownValueKind,
    },

    /// A computed metric's expression failed to compile.
    #[error("metric '{name}': invalid compute logic: {source}")]
    ComputeLogic {
        /// Export name of the offending metric.
        name: String,
        /// The compile failure.
        source: ExpressionError,
    },

    /// A non-computed metric has no source variable to pass through.
    #[error("metric '{0}' is not computed but lists no source names")]
    MissingSource(String),

    /// A tag-to-label rule is unusable.
    #[error("tag rule for label '{0}' lists no source tags")]
    EmptyTagRule(String),

    /// Binding the scrape endpoint failed.
    #[error("failed to bind scrape endpoint: {0}")]
    Bind(#[source] io::Error),
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::BuildError;

    #[test]
    fn read_config_renders_the_path() {
        let err = BuildError::ReadConfig {
            path: PathBuf::from("/etc/hostex/hostex.toml"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("/etc/hostex/hostex.toml"));
        assert!(rendered.contains("no such file"));
    }
}

//! Exporter configuration.
//!
//! Loaded once from a TOML file at startup and immutable thereafter.
//! Command-line flags may override the listen address, the metrics path,
//! and the enabled-collector list. Every validation failure here is fatal:
//! the process refuses to serve with a configuration it cannot honor.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use hostex_core::ValueKind;
use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::BuildError;

/// Placeholder users may put in the enabled-collector list to pull in every
/// collector enabled by default.
pub const DEFAULTS_PLACEHOLDER: &str = "[defaults]";

/// Collectors enabled when the configuration names none.
pub const DEFAULT_COLLECTORS: &[&str] = &["cpu"];

const DEFAULT_LISTEN_PORT: u16 = 9182;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Listen/serving parameters.
    #[serde(default)]
    pub service: ServiceConfig,
    /// Service-discovery registration.
    #[serde(default)]
    pub service_discovery: DiscoveryConfig,
    /// Instance-metadata provider.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Label enrichment.
    #[serde(default)]
    pub labels: LabelConfig,
    /// Enabled collectors keyed by name, in declaration order.
    #[serde(default)]
    pub collectors: IndexMap<String, CollectorSpec>,
}

/// Listen/serving parameters.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// IP to bind the scrape endpoint to.
    #[serde(default = "default_listen_ip")]
    pub listen_ip: String,
    /// Port to bind the scrape endpoint to.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// URL path serving the metrics.
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
    /// Service name used for discovery registration.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Optional per-collector deadline. The original exporter had none; a
    /// collector that exceeds it counts as failed for that scrape only.
    #[serde(default)]
    pub collect_timeout_secs: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_ip: default_listen_ip(),
            listen_port: default_listen_port(),
            metrics_path: default_metrics_path(),
            service_name: default_service_name(),
            collect_timeout_secs: None,
        }
    }
}

impl ServiceConfig {
    /// The socket address to bind.
    pub fn listen_addr(&self) -> Result<SocketAddr, BuildError> {
        let joined = format!("{}:{}", self.listen_ip, self.listen_port);
        joined.parse().map_err(|_| BuildError::ListenAddress(joined))
    }

    /// Overrides ip/port from a command-line `ip:port` string.
    pub fn set_listen_addr(&mut self, addr: &str) -> Result<(), BuildError> {
        let parsed: SocketAddr = addr
            .parse()
            .map_err(|_| BuildError::ListenAddress(addr.to_string()))?;
        self.listen_ip = parsed.ip().to_string();
        self.listen_port = parsed.port();
        Ok(())
    }
}

/// Service-registry registration parameters.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Whether to register with the service registry at startup.
    #[serde(default)]
    pub enabled: bool,
    /// Registry endpoint, e.g. `http://consul.internal:8500`.
    #[serde(default)]
    pub endpoint: String,
    /// Datacenter to register under.
    #[serde(default)]
    pub datacenter: String,
    /// Service instance id.
    #[serde(default)]
    pub service_id: String,
    /// Service name to register as.
    #[serde(default)]
    pub register_service_name: String,
    /// Node name; defaults to the `HOSTNAME` environment variable.
    #[serde(default)]
    pub node: Option<String>,
    /// Address other services should reach this exporter on; defaults to
    /// the listen IP.
    #[serde(default)]
    pub advertise_address: Option<String>,
}

/// Instance-metadata provider parameters.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetadataConfig {
    /// Whether instance metadata is fetched at all.
    #[serde(default)]
    pub enabled: bool,
    /// Metadata service base URL.
    #[serde(default = "default_metadata_endpoint")]
    pub endpoint: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self { enabled: false, endpoint: default_metadata_endpoint() }
    }
}

/// Label enrichment parameters.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelConfig {
    /// Whether enrichment labels are applied to exported metrics.
    #[serde(default)]
    pub enabled: bool,
    /// Seconds between metadata refreshes.
    #[serde(default = "default_refresh_period")]
    pub refresh_period_secs: u64,
    /// Tag-to-label mapping rules, applied in declaration order. Rule order
    /// fixes the label-name order for the life of the process.
    #[serde(default)]
    pub rules: Vec<TagRule>,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self { enabled: false, refresh_period_secs: default_refresh_period(), rules: Vec::new() }
    }
}

/// Maps one or more source tags onto one export label.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagRule {
    /// Source tag names looked up in the metadata tag map.
    pub source_tags: Vec<String>,
    /// Export label name (lowercased on application).
    pub label: String,
    /// Separator used when several source tags merge into one label.
    #[serde(default)]
    pub merge_separator: String,
    /// Value substituted when a source tag is absent.
    #[serde(default)]
    pub missing_placeholder: String,
}

/// Per-subsystem collector configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectorSpec {
    /// Metric namespace prefix.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// When set, the plugin's built-in metrics are dropped and only the
    /// configured exported metrics are emitted.
    #[serde(default)]
    pub default_drop: bool,
    /// Configured exported metrics, in declaration order.
    #[serde(default)]
    pub exported: Vec<MetricMap>,
}

impl Default for CollectorSpec {
    fn default() -> Self {
        Self { namespace: default_namespace(), default_drop: false, exported: Vec::new() }
    }
}

/// One configurable exported metric.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricMap {
    /// Source variable names; the first one is the pass-through source for
    /// non-computed metrics.
    #[serde(default)]
    pub source_names: Vec<String>,
    /// Short export name, namespaced under `namespace_subsystem_`.
    pub export_name: String,
    /// Human description.
    #[serde(default)]
    pub description: String,
    /// `gauge` or `counter`.
    #[serde(default = "default_metric_type")]
    pub metric_type: String,
    /// Whether the value is derived by evaluating `compute_logic`.
    #[serde(default)]
    pub computed: bool,
    /// Expression evaluated over the source variables when `computed`.
    #[serde(default)]
    pub compute_logic: String,
}

impl MetricMap {
    /// Parses the declared metric type, reporting the export name on
    /// failure.
    pub fn kind(&self) -> Result<ValueKind, BuildError> {
        self.metric_type
            .parse()
            .map_err(|source| BuildError::MetricType { name: self.export_name.clone(), source })
    }
}

fn default_listen_ip() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    DEFAULT_LISTEN_PORT
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_service_name() -> String {
    "hostex".to_string()
}

fn default_metadata_endpoint() -> String {
    "http://169.254.169.254".to_string()
}

fn default_refresh_period() -> u64 {
    300
}

fn default_namespace() -> String {
    "hostex".to_string()
}

fn default_metric_type() -> String {
    "gauge".to_string()
}

impl Config {
    /// Loads and parses a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, BuildError> {
        let contents = fs::read_to_string(path)
            .map_err(|source| BuildError::ReadConfig { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&contents)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self, BuildError> {
        Ok(toml::from_str(contents)?)
    }

    /// Applies a command-line enabled-collector list. Names absent from the
    /// configuration get a default spec; `[defaults]` expands to the
    /// built-in default set.
    pub fn apply_enabled_list(&mut self, list: &str) {
        for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if name == DEFAULTS_PLACEHOLDER {
                for default in DEFAULT_COLLECTORS {
                    self.collectors.entry(default.to_string()).or_default();
                }
            } else {
                self.collectors.entry(name.to_string()).or_default();
            }
        }
    }

    /// Fills in the default collector set when the configuration (and the
    /// command line) named none.
    pub fn ensure_collectors(&mut self) {
        if self.collectors.is_empty() {
            for default in DEFAULT_COLLECTORS {
                self.collectors.entry(default.to_string()).or_default();
            }
        }
    }

    /// Validates everything that does not require constructing collectors:
    /// tag rules and label arity preconditions. Expression compilation and
    /// metric-type checks happen during engine construction, which is still
    /// before the first scrape.
    pub fn validate(&self) -> Result<(), BuildError> {
        for rule in &self.labels.rules {
            if rule.source_tags.is_empty() || rule.label.is_empty() {
                return Err(BuildError::EmptyTagRule(rule.label.clone()));
            }
        }
        Ok(())
    }
}

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hostex::collector::Registry;
use hostex::discovery::CatalogClient;
use hostex::labels::{spawn_refresher, LabelEnricher};
use hostex::metadata::{ImdsProvider, MetadataProvider};
use hostex::{BuildError, Config, Orchestrator, Server, TemplatedCollector};

#[derive(Debug, Parser)]
#[command(name = "hostex", version, about = "Templated host-metrics exporter")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "hostex.toml")]
    config: PathBuf,

    /// Override the listen address as `ip:port`.
    #[arg(long)]
    listen: Option<String>,

    /// Override the URL path serving the metrics.
    #[arg(long)]
    metrics_path: Option<String>,

    /// Comma-separated collectors to enable in addition to the
    /// configuration; `[defaults]` expands to the default set.
    #[arg(long)]
    enabled: Option<String>,

    /// List the available collectors and exit.
    #[arg(long)]
    print_collectors: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(err) = run(Args::parse()).await {
        error!(error = %err, "exporter failed to start");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run(args: Args) -> Result<(), BuildError> {
    let registry = Registry::with_builtins();
    if args.print_collectors {
        for name in registry.names() {
            println!("{name}");
        }
        return Ok(());
    }

    let mut config = Config::load(&args.config)?;
    if let Some(listen) = &args.listen {
        config.service.set_listen_addr(listen)?;
    }
    if let Some(path) = &args.metrics_path {
        config.service.metrics_path = path.clone();
    }
    if let Some(enabled) = &args.enabled {
        config.apply_enabled_list(enabled);
    }
    config.ensure_collectors();
    config.validate()?;
    registry.check(config.collectors.keys())?;

    // Label names come from the rule set, so engines can be built before
    // any metadata fetch; the initial fetch only primes the values.
    let rules = if config.labels.enabled { config.labels.rules.clone() } else { Vec::new() };
    let enricher = Arc::new(LabelEnricher::new(rules));
    if config.labels.enabled && config.metadata.enabled {
        let provider = ImdsProvider::new(config.metadata.endpoint.clone());
        match provider.fetch().await {
            Ok(tags) => enricher.apply(&tags),
            Err(err) => {
                warn!(error = %err, "initial metadata fetch failed, label values start empty");
            }
        }
        spawn_refresher(
            enricher.clone(),
            provider,
            Duration::from_secs(config.labels.refresh_period_secs),
        );
    }

    let label_names = enricher.label_names().to_vec();
    let mut engines = Vec::with_capacity(config.collectors.len());
    for (name, spec) in &config.collectors {
        let plugin = registry.build(name)?;
        engines.push(TemplatedCollector::new(name, plugin, spec, &label_names)?);
    }
    info!(collectors = engines.len(), "collectors ready");

    let timeout = config.service.collect_timeout_secs.map(Duration::from_secs);
    let orchestrator = Orchestrator::new(engines, enricher.clone(), timeout);

    let addr = config.service.listen_addr()?;
    let server = Server::bind(addr, config.service.metrics_path.clone(), orchestrator).await?;
    info!(%addr, path = %config.service.metrics_path, "serving metrics");

    let catalog = config
        .service_discovery
        .enabled
        .then(|| CatalogClient::from_config(&config.service_discovery, &config.service));
    if let Some(catalog) = &catalog {
        match catalog.register(enricher.snapshot().registration_tags()).await {
            Ok(()) => info!("registered with service discovery"),
            Err(err) => warn!(error = %err, "service registration failed"),
        }
    }

    tokio::select! {
        () = server.serve() => {}
        _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
    }

    if let Some(catalog) = &catalog {
        if let Err(err) = catalog.deregister().await {
            warn!(error = %err, "service deregistration failed");
        }
    }
    Ok(())
}

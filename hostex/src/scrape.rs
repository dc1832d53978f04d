//! The concurrent scrape orchestrator.
//!
//! Fans one scrape out across every configured collector, timing each and
//! isolating failures: a collector that errors, times out, or panics
//! contributes zero metrics and a failure outcome while the rest proceed.
//! Overlapping scrapes of the same collector serialize on a per-collector
//! mutex so a plugin only ever sees one collect call at a time.

use std::sync::Arc;
use std::time::Duration;

use hostex_core::{build_fq_name, MetricDescriptor, Sample, ValueKind};
use parking_lot::Mutex;
use quanta::Clock;
use tokio::sync::mpsc::unbounded_channel;
use tokio::task::JoinSet;
use tracing::warn;

use crate::collector::CollectError;
use crate::engine::TemplatedCollector;
use crate::labels::LabelEnricher;

/// One collector plus the lock that serializes overlapping scrapes of it.
struct CollectorSlot {
    name: String,
    engine: Mutex<TemplatedCollector>,
}

/// How one collector fared during one scrape.
#[derive(Debug)]
pub struct ScrapeOutcome {
    /// Collector name.
    pub collector: String,
    /// Wall time the collect call took.
    pub duration: Duration,
    /// Rendered failure, or `None` on success.
    pub error: Option<String>,
}

/// The result of one full scrape: every sample the collectors emitted plus
/// the per-collector outcomes (already appended as exporter self-metrics).
#[derive(Debug)]
pub struct Scrape {
    /// Samples grouped per collector, in task-completion order; no
    /// cross-collector ordering is promised.
    pub samples: Vec<Sample>,
    /// One outcome per collector, sorted by collector name.
    pub outcomes: Vec<ScrapeOutcome>,
}

/// Drives all collectors for the lifetime of the exporter.
pub struct Orchestrator {
    collectors: Vec<Arc<CollectorSlot>>,
    enricher: Arc<LabelEnricher>,
    timeout: Option<Duration>,
    clock: Clock,
    duration_desc: Arc<MetricDescriptor>,
    success_desc: Arc<MetricDescriptor>,
}

impl Orchestrator {
    /// Takes ownership of the constructed engines. `timeout` bounds each
    /// collector's collect call; `None` lets a slow collector run as long
    /// as the client waits.
    pub fn new(
        engines: Vec<TemplatedCollector>,
        enricher: Arc<LabelEnricher>,
        timeout: Option<Duration>,
    ) -> Self {
        let collectors = engines
            .into_iter()
            .map(|engine| {
                Arc::new(CollectorSlot {
                    name: engine.name().to_string(),
                    engine: Mutex::new(engine),
                })
            })
            .collect();

        let duration_desc = Arc::new(MetricDescriptor::new(
            build_fq_name("hostex", "exporter", "scrape_duration_seconds"),
            "Wall time of the collector's last collect call.",
            vec!["collector".to_string()],
        ));
        let success_desc = Arc::new(MetricDescriptor::new(
            build_fq_name("hostex", "exporter", "scrape_success"),
            "Whether the collector's last collect call succeeded.",
            vec!["collector".to_string()],
        ));

        Self {
            collectors,
            enricher,
            timeout,
            clock: Clock::new(),
            duration_desc,
            success_desc,
        }
    }

    /// Number of collectors being driven.
    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    /// Whether no collectors are configured.
    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    /// Runs one scrape across all collectors concurrently.
    ///
    /// Each collector writes into its own channel, merged only after its
    /// task reports back: a collector that fails or times out contributes
    /// zero samples even if it emitted some before going wrong, and a
    /// timed-out collector's detached read cannot delay the scrape.
    pub async fn scrape(&self) -> Scrape {
        let labels = self.enricher.snapshot();
        let mut tasks = JoinSet::new();

        for slot in &self.collectors {
            let slot = slot.clone();
            let labels = labels.clone();
            let clock = self.clock.clone();
            let timeout = self.timeout;

            tasks.spawn(async move {
                let (tx, mut rx) = unbounded_channel();
                let start = clock.now();
                let work = tokio::task::spawn_blocking({
                    let slot = slot.clone();
                    move || slot.engine.lock().collect(&tx, &labels)
                });

                let joined = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, work).await {
                        Ok(joined) => joined,
                        Err(_) => {
                            // The blocking call keeps running detached; the
                            // per-slot mutex keeps it from overlapping the
                            // next scrape of this collector, and dropping
                            // the receiver discards whatever it emits after
                            // the deadline.
                            let outcome = ScrapeOutcome {
                                collector: slot.name.clone(),
                                duration: limit,
                                error: Some(CollectError::Timeout(limit).to_string()),
                            };
                            return (outcome, Vec::new());
                        }
                    },
                    None => work.await,
                };

                let duration = clock.now().duration_since(start);
                let error = match joined {
                    Ok(Ok(())) => None,
                    Ok(Err(err)) => Some(err.to_string()),
                    Err(join_err) if join_err.is_panic() => {
                        Some(CollectError::Panicked.to_string())
                    }
                    Err(join_err) => Some(join_err.to_string()),
                };

                // The blocking call has returned and dropped its sender, so
                // the channel drains without waiting. A failed collector
                // contributes no samples, partial emissions included.
                let mut samples = Vec::new();
                if error.is_none() {
                    while let Ok(sample) = rx.try_recv() {
                        samples.push(sample);
                    }
                }
                (ScrapeOutcome { collector: slot.name.clone(), duration, error }, samples)
            });
        }

        let mut outcomes = Vec::with_capacity(self.collectors.len());
        let mut samples = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok((outcome, mut collected)) = joined {
                if let Some(error) = &outcome.error {
                    warn!(collector = %outcome.collector, error = %error, "collector failed");
                }
                samples.append(&mut collected);
                outcomes.push(outcome);
            }
        }
        outcomes.sort_by(|a, b| a.collector.cmp(&b.collector));

        for outcome in &outcomes {
            samples.push(Sample::new(
                self.duration_desc.clone(),
                ValueKind::Gauge,
                outcome.duration.as_secs_f64(),
                vec![outcome.collector.clone()],
            ));
            samples.push(Sample::new(
                self.success_desc.clone(),
                ValueKind::Gauge,
                if outcome.error.is_none() { 1.0 } else { 0.0 },
                vec![outcome.collector.clone()],
            ));
        }

        Scrape { samples, outcomes }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use hostex_core::Value;

    use super::Orchestrator;
    use crate::config::CollectorSpec;
    use crate::engine::TemplatedCollector;
    use crate::labels::LabelEnricher;
    use crate::testutil::StaticPlugin;

    fn engine(id: &'static str, plugin: StaticPlugin) -> TemplatedCollector {
        let spec = CollectorSpec {
            namespace: "hostex".to_string(),
            default_drop: false,
            exported: Vec::new(),
        };
        TemplatedCollector::new(id, Box::new(plugin), &spec, &[]).unwrap()
    }

    fn orchestrator(
        engines: Vec<TemplatedCollector>,
        timeout: Option<Duration>,
    ) -> Orchestrator {
        Orchestrator::new(engines, Arc::new(LabelEnricher::new(Vec::new())), timeout)
    }

    #[tokio::test]
    async fn failing_collector_does_not_poison_the_scrape() {
        let good =
            engine("good", StaticPlugin::new("good").with_value("raw.core@0", Value::Scalar(1.0)));
        let bad = engine("bad", StaticPlugin::new("bad").failing());
        let orch = orchestrator(vec![good, bad], None);

        let scrape = orch.scrape().await;

        assert_eq!(scrape.outcomes.len(), 2);
        let bad_outcome = &scrape.outcomes[0];
        assert_eq!(bad_outcome.collector, "bad");
        assert!(bad_outcome.error.as_deref().unwrap().contains("stub failure"));
        assert!(scrape.outcomes[1].error.is_none());

        // Only the good collector's built-in, plus two self-metrics per
        // collector.
        assert!(scrape
            .samples
            .iter()
            .any(|s| s.descriptor.name() == "hostex_good_raw_total"));
        assert!(scrape
            .samples
            .iter()
            .all(|s| s.descriptor.name() != "hostex_bad_raw_total"));
        let successes: Vec<f64> = scrape
            .samples
            .iter()
            .filter(|s| s.descriptor.name() == "hostex_exporter_scrape_success")
            .map(|s| s.value)
            .collect();
        assert_eq!(successes, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn slow_collector_times_out_as_its_own_failure() {
        let slow = engine("slow", StaticPlugin::new("slow").delayed(Duration::from_millis(300)));
        let orch = orchestrator(vec![slow], Some(Duration::from_millis(10)));

        let started = std::time::Instant::now();
        let scrape = orch.scrape().await;

        assert_eq!(scrape.outcomes.len(), 1);
        assert!(scrape.outcomes[0].error.as_deref().unwrap().contains("timed out"));
        // The deadline bounds the scrape; it never waits out the detached
        // read.
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn timed_out_collector_contributes_no_samples() {
        let slow = engine("slow", StaticPlugin::new("slow").delayed(Duration::from_millis(300)));
        let fast = engine("fast", StaticPlugin::new("fast"));
        let orch = orchestrator(vec![slow, fast], Some(Duration::from_millis(10)));

        let scrape = orch.scrape().await;

        assert!(scrape.samples.iter().any(|s| s.descriptor.name() == "hostex_fast_raw_total"));
        assert!(scrape.samples.iter().all(|s| s.descriptor.name() != "hostex_slow_raw_total"));
        let success: Vec<(String, f64)> = scrape
            .samples
            .iter()
            .filter(|s| s.descriptor.name() == "hostex_exporter_scrape_success")
            .map(|s| (s.label_values[0].clone(), s.value))
            .collect();
        assert_eq!(
            success,
            vec![("fast".to_string(), 1.0), ("slow".to_string(), 0.0)]
        );
    }

    #[tokio::test]
    async fn empty_orchestrator_yields_an_empty_scrape() {
        let orch = orchestrator(Vec::new(), None);
        let scrape = orch.scrape().await;
        assert!(scrape.samples.is_empty());
        assert!(scrape.outcomes.is_empty());
    }
}

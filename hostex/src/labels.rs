//! Label enrichment pipeline.
//!
//! Environment-derived tags (cloud instance metadata) are mapped through
//! configured rules into one process-wide label set applied to every
//! exported metric. The label *names* are fixed at construction, in rule
//! declaration order, so descriptors built against them stay valid no
//! matter when the first metadata fetch succeeds; every refresh only
//! replaces the *values* (empty strings until then), published as a single
//! atomic swap so an in-flight scrape always reads a coherent names/values
//! pair.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::config::TagRule;
use crate::metadata::{MetadataProvider, TagMap};

/// An immutable names/values snapshot.
///
/// `names.len() == values.len()` always holds; values are empty strings
/// until the first successful refresh.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelSet {
    names: Vec<String>,
    values: Vec<String>,
}

impl LabelSet {
    /// The ordered label names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The label values, index-aligned with [`names`](Self::names).
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Whether no enrichment labels are configured.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Encodes the set as `name=value;` strings for service-registry tags.
    pub fn registration_tags(&self) -> Vec<String> {
        self.names
            .iter()
            .zip(&self.values)
            .map(|(name, value)| format!("{name}={value};"))
            .collect()
    }
}

/// Process-wide holder of the current label snapshot.
pub struct LabelEnricher {
    rules: Vec<TagRule>,
    names: Vec<String>,
    current: ArcSwap<LabelSet>,
}

impl LabelEnricher {
    /// Creates an enricher whose label names are derived from the rule set
    /// (declaration order, lowercased, first occurrence wins). Values start
    /// as empty strings so the snapshot is index-aligned with the names
    /// before the first fetch ever happens.
    pub fn new(rules: Vec<TagRule>) -> Self {
        let mut names: Vec<String> = Vec::with_capacity(rules.len());
        for rule in &rules {
            let name = rule.label.to_lowercase();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        let initial = LabelSet {
            names: names.clone(),
            values: vec![String::new(); names.len()],
        };
        Self { rules, names, current: ArcSwap::from_pointee(initial) }
    }

    /// The fixed label names, known without any metadata fetch.
    pub fn label_names(&self) -> &[String] {
        &self.names
    }

    /// The currently published snapshot. Cheap; never blocks on a refresh.
    pub fn snapshot(&self) -> Arc<LabelSet> {
        self.current.load_full()
    }

    /// Applies freshly fetched tags and publishes a new snapshot.
    ///
    /// The names never change; each application rebuilds the values in the
    /// fixed index order, so a descriptor built against
    /// [`label_names`](Self::label_names) always matches.
    pub fn apply(&self, tags: &TagMap) {
        if self.names.is_empty() {
            return;
        }

        let resolved = apply_rules(&self.rules, tags);
        let next = LabelSet {
            names: self.names.clone(),
            values: self
                .names
                .iter()
                .map(|name| resolved.get(name).cloned().unwrap_or_default())
                .collect(),
        };

        debug!(labels = next.names.len(), "published label snapshot");
        self.current.store(Arc::new(next));
    }
}

/// Resolves the configured rules against a tag map.
///
/// Multi-tag rules merge their source values with the rule's separator;
/// absent tags contribute the rule's placeholder. Label names are
/// lowercased. Duplicate labels keep their first position, last value.
fn apply_rules(rules: &[TagRule], tags: &TagMap) -> IndexMap<String, String> {
    let mut resolved = IndexMap::new();
    for rule in rules {
        let value = if rule.source_tags.len() > 1 {
            let parts: Vec<&str> = rule
                .source_tags
                .iter()
                .map(|tag| tags.get(tag).map_or(rule.missing_placeholder.as_str(), String::as_str))
                .collect();
            parts.join(&rule.merge_separator)
        } else {
            tags.get(&rule.source_tags[0]).cloned().unwrap_or_else(|| rule.missing_placeholder.clone())
        };
        resolved.insert(rule.label.to_lowercase(), value);
    }
    resolved
}

/// Spawns the background refresh task.
///
/// Runs independently of scrape cadence; a failed fetch logs and leaves the
/// previous snapshot in place until the next tick.
pub fn spawn_refresher<P>(
    enricher: Arc<LabelEnricher>,
    provider: P,
    period: Duration,
) -> tokio::task::JoinHandle<()>
where
    P: MetadataProvider + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match provider.fetch().await {
                Ok(tags) => enricher.apply(&tags),
                Err(err) => warn!(error = %err, "metadata refresh failed, keeping previous labels"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::{apply_rules, LabelEnricher, LabelSet};
    use crate::config::TagRule;

    fn rule(sources: &[&str], label: &str, sep: &str, missing: &str) -> TagRule {
        TagRule {
            source_tags: sources.iter().map(|s| s.to_string()).collect(),
            label: label.to_string(),
            merge_separator: sep.to_string(),
            missing_placeholder: missing.to_string(),
        }
    }

    fn tags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn names_are_fixed_at_construction() {
        let enricher = LabelEnricher::new(vec![
            rule(&["App"], "App", "", ""),
            rule(&["Env"], "env", "", ""),
        ]);
        assert_eq!(enricher.label_names(), &["app".to_string(), "env".to_string()]);

        // Before any fetch the snapshot is already index-aligned.
        let snapshot = enricher.snapshot();
        assert_eq!(snapshot.names(), enricher.label_names());
        assert_eq!(snapshot.values(), &["".to_string(), "".to_string()]);
    }

    #[test]
    fn refreshes_replace_values_and_never_names() {
        let enricher = LabelEnricher::new(vec![rule(&["App"], "app", "", "")]);

        enricher.apply(&tags(&[("App", "x")]));
        let first = enricher.snapshot();
        assert_eq!(first.names(), &["app".to_string()]);
        assert_eq!(first.values(), &["x".to_string()]);

        enricher.apply(&tags(&[("App", "y")]));
        let second = enricher.snapshot();
        assert_eq!(second.names(), &["app".to_string()]);
        assert_eq!(second.values(), &["y".to_string()]);

        // The first snapshot is immutable; readers holding it are unaffected.
        assert_eq!(first.values(), &["x".to_string()]);
    }

    #[test]
    fn late_first_fetch_cannot_change_the_name_set() {
        // A failed initial fetch leaves the values empty; a later refresh
        // must fill the same slots instead of growing the set.
        let enricher = LabelEnricher::new(vec![rule(&["App"], "app", "", "")]);
        let before = enricher.snapshot();
        assert_eq!(before.names().len(), before.values().len());

        enricher.apply(&tags(&[("App", "webapp")]));
        let after = enricher.snapshot();
        assert_eq!(after.names(), before.names());
        assert_eq!(after.values(), &["webapp".to_string()]);
    }

    #[test]
    fn merge_and_placeholder_rules() {
        let rules = vec![
            rule(&["Team", "Env"], "Owner", "-", "none"),
            rule(&["Missing"], "fallback", "", "n/a"),
        ];
        let resolved = apply_rules(&rules, &tags(&[("Team", "core")]));
        assert_eq!(resolved.get("owner").map(String::as_str), Some("core-none"));
        assert_eq!(resolved.get("fallback").map(String::as_str), Some("n/a"));
    }

    #[test]
    fn failed_refresh_leaves_prior_snapshot() {
        let enricher = LabelEnricher::new(vec![rule(&["App"], "app", "", "")]);
        enricher.apply(&tags(&[("App", "x")]));

        // A refresh that produced nothing (no rules matched because the
        // rule set is empty) must not clear the published set.
        let empty = LabelEnricher::new(Vec::new());
        empty.apply(&tags(&[("App", "x")]));
        assert!(empty.snapshot().is_empty());

        assert_eq!(enricher.snapshot().values(), &["x".to_string()]);
    }

    #[test]
    fn registration_tag_encoding() {
        let set = LabelSet {
            names: vec!["app".to_string(), "env".to_string()],
            values: vec!["web".to_string(), "prod".to_string()],
        };
        assert_eq!(set.registration_tags(), vec!["app=web;".to_string(), "env=prod;".to_string()]);
    }

    #[test]
    fn concurrent_readers_never_observe_a_torn_pair() {
        let enricher = Arc::new(LabelEnricher::new(vec![
            rule(&["A"], "a", "", ""),
            rule(&["B"], "b", "", ""),
        ]));
        enricher.apply(&tags(&[("A", "0"), ("B", "0")]));

        let writer = {
            let enricher = enricher.clone();
            std::thread::spawn(move || {
                for i in 0..1000 {
                    let value = i.to_string();
                    enricher.apply(&tags(&[("A", &value), ("B", &value)]));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let enricher = enricher.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let snapshot = enricher.snapshot();
                        assert_eq!(snapshot.names().len(), snapshot.values().len());
                        // Both values come from the same application.
                        assert_eq!(snapshot.values()[0], snapshot.values()[1]);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}

//! The import engine.
//!
//! Owns the rule store, the duplicate cache and the statistics, and runs one
//! message through match, dedup, translate and deliver. It performs no I/O of
//! its own; the transport feeds it and the sink drains it.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::dedup::Deduplicator;
use crate::identity::VesselIdentity;
use crate::matcher::RuleSetError;
use crate::planner::plan_subscriptions;
use crate::rule::ImportRule;
use crate::sink::{deliver, DeliverySink, SinkError};
use crate::stats::ImportStatistics;
use crate::store::{RuleSnapshot, RuleStore};
use crate::translate::{translate, TopicContext, TranslateError};

/// What happened to one message.
#[derive(Debug)]
pub enum Outcome {
    /// Delivered under the named rule.
    Delivered { rule: String },
    /// No enabled rule matches the topic.
    NoMatch,
    /// Every matching rule excluded the sending vessel.
    Excluded { rules: Vec<String> },
    /// Seen before on a rule that ignores duplicates.
    Duplicate { rule: String },
    /// The payload could not be translated.
    Untranslatable { rule: String, error: TranslateError },
    /// The sink refused the delta.
    Undelivered { rule: String, error: SinkError },
}

impl Outcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Outcome::Delivered { .. })
    }
}

#[derive(Debug)]
pub struct ImportEngine {
    store: RuleStore,
    dedup: Mutex<Deduplicator>,
    stats: Arc<ImportStatistics>,
}

impl ImportEngine {
    /// Build an engine over an initial rule list.
    pub fn new(
        rules: Vec<ImportRule>,
        prefix: Option<&str>,
        identity: Option<VesselIdentity>,
    ) -> Result<Self, RuleSetError> {
        Ok(Self {
            store: RuleStore::new(rules, prefix, identity)?,
            dedup: Mutex::new(Deduplicator::new()),
            stats: Arc::new(ImportStatistics::new()),
        })
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    /// The current rule snapshot.
    pub fn rules(&self) -> Arc<RuleSnapshot> {
        self.store.load()
    }

    pub fn statistics(&self) -> &Arc<ImportStatistics> {
        &self.stats
    }

    pub fn identity(&self) -> Option<&VesselIdentity> {
        self.store.identity()
    }

    fn dedup(&self) -> MutexGuard<'_, Deduplicator> {
        self.dedup.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Topic filters the transport should be subscribed to right now.
    pub fn subscription_plan(&self) -> BTreeSet<String> {
        let snapshot = self.store.load();
        plan_subscriptions(snapshot.rules(), snapshot.prefix(), snapshot.identity())
    }

    /// Number of cached (topic, payload) pairs.
    pub fn messages_received(&self) -> usize {
        self.dedup().len()
    }

    /// Forget every remembered (topic, payload) pair.
    pub fn clear_duplicates(&self) {
        self.dedup().clear();
    }

    /// Process one inbound message.
    pub fn handle_message<S: DeliverySink + ?Sized>(
        &self,
        topic: &str,
        payload: &str,
        sink: &S,
    ) -> Outcome {
        self.stats.record_received();
        let outcome = self.process(topic, payload, sink);
        if outcome.is_delivered() {
            self.stats.record_delivered();
        } else {
            self.stats.record_dropped();
        }
        outcome
    }

    fn process<S: DeliverySink + ?Sized>(&self, topic: &str, payload: &str, sink: &S) -> Outcome {
        let snapshot = self.store.load();
        let scan = snapshot.scan(topic);

        let Some(found) = scan.selected else {
            if scan.excluded.is_empty() {
                debug!(topic, "no import rule matches");
                return Outcome::NoMatch;
            }
            return Outcome::Excluded {
                rules: scan.excluded.iter().map(|id| id.to_string()).collect(),
            };
        };

        let rule = found.rule;
        debug!(topic, rule = %rule.id, "matched import rule");

        if self
            .dedup()
            .should_suppress(topic, payload, rule.ignore_duplicates)
        {
            debug!(topic, rule = %rule.id, "duplicate message ignored");
            return Outcome::Duplicate {
                rule: rule.id.clone(),
            };
        }

        let ctx = TopicContext {
            prefix: snapshot.prefix(),
            identity: snapshot.identity(),
        };
        let delta = match translate(payload, rule, topic, found.capture.as_deref(), ctx) {
            Ok(delta) => delta,
            Err(error) => {
                debug!(topic, rule = %rule.id, "cannot translate payload: {}", error);
                return Outcome::Untranslatable {
                    rule: rule.id.clone(),
                    error,
                };
            }
        };

        match deliver(sink, delta, rule) {
            Ok(()) => Outcome::Delivered {
                rule: rule.id.clone(),
            },
            Err(error) => Outcome::Undelivered {
                rule: rule.id.clone(),
                error,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::MAX_ENTRIES;
    use crate::rule::{default_rules, PayloadFormat};
    use crate::sink::MemorySink;
    use serde_json::json;

    fn identity() -> Option<VesselIdentity> {
        VesselIdentity::new("urn:mrn:imo:mmsi:111222333")
    }

    #[test]
    fn test_self_alias_end_to_end() {
        let rule = ImportRule {
            payload_format: PayloadFormat::ValueOnly,
            ..ImportRule::new("own-sog", "vessels/self/navigation/speedOverGround")
        };
        let engine = ImportEngine::new(vec![rule], None, identity()).unwrap();
        let sink = MemorySink::new();

        let outcome = engine.handle_message(
            "vessels/urn_mrn_imo_mmsi_111222333/navigation/speedOverGround",
            "4.2",
            &sink,
        );
        assert!(outcome.is_delivered());

        let deltas = sink.take();
        assert_eq!(deltas[0].context, "vessels.self");
        assert_eq!(deltas[0].updates[0].values[0].path, "navigation.speedOverGround");
        assert_eq!(deltas[0].updates[0].values[0].value, json!(4.2));
    }

    #[test]
    fn test_duplicates_delivered_once() {
        let engine = ImportEngine::new(default_rules(), None, identity()).unwrap();
        let sink = MemorySink::new();
        let topic = "vessels/urn_mrn_imo_mmsi_368396230/navigation/speedOverGround";

        assert!(engine.handle_message(topic, "3.1", &sink).is_delivered());
        assert!(matches!(
            engine.handle_message(topic, "3.1", &sink),
            Outcome::Duplicate { .. }
        ));
        assert_eq!(sink.len(), 1);
        assert_eq!(engine.messages_received(), 1);

        let stats = engine.statistics().snapshot();
        assert_eq!(stats.total_received, 2);
        assert_eq!(stats.messages_delivered, 1);
        assert_eq!(stats.messages_dropped, 1);
    }

    #[test]
    fn test_cache_bound_through_engine() {
        let engine = ImportEngine::new(default_rules(), None, None).unwrap();
        let sink = MemorySink::new();
        for i in 0..=MAX_ENTRIES {
            engine.handle_message("vessels/a/navigation/log", &i.to_string(), &sink);
        }
        assert_eq!(engine.messages_received(), 501);

        engine.clear_duplicates();
        assert_eq!(engine.messages_received(), 0);
    }

    #[test]
    fn test_excluded_and_unmatched() {
        let mut nav = ImportRule::new("nav", "vessels/+/navigation/#");
        nav.exclude_identifiers = "368396230,123456789".to_string();
        let engine = ImportEngine::new(vec![nav], None, None).unwrap();
        let sink = MemorySink::new();

        let outcome = engine.handle_message(
            "vessels/urn_mrn_imo_mmsi_368396230/navigation/position",
            "{}",
            &sink,
        );
        assert!(matches!(outcome, Outcome::Excluded { ref rules } if rules == &["nav"]));

        let outcome = engine.handle_message("weather/wind", "1", &sink);
        assert!(matches!(outcome, Outcome::NoMatch));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_bad_payload_dropped() {
        let engine = ImportEngine::new(default_rules(), None, None).unwrap();
        let sink = MemorySink::new();
        let outcome = engine.handle_message("vessels/a/navigation/x", "{oops", &sink);
        assert!(matches!(outcome, Outcome::Untranslatable { .. }));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_subscription_plan_follows_edits() {
        let engine = ImportEngine::new(default_rules(), None, identity()).unwrap();
        assert_eq!(engine.subscription_plan().len(), 3);

        engine
            .store()
            .replace(vec![ImportRule::new("own", "vessels/self/#")])
            .unwrap();
        let plan = engine.subscription_plan();
        assert!(plan.contains("vessels/urn:mrn:imo:mmsi:111222333/#"));
        assert!(plan.contains("vessels/urn_mrn_imo_mmsi_111222333/#"));
        assert!(plan.contains("vessels/self/#"));
    }
}

//! The import service.
//!
//! Ties the engine to its collaborators: rule storage, the delivery sink and
//! the MQTT connection state. The bridge feeds it messages, the HTTP API reads
//! and edits rules through it.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use signalk_mqtt_core::config::load_rules_or_default;
use signalk_mqtt_core::{
    default_rules, ConfigError, DeliverySink, ImportConfig, ImportEngine, ImportRule, Outcome,
    RuleSetError, RuleStorage,
};

/// Errors returned by rule edits.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The submitted rule list is invalid; nothing changed.
    #[error("invalid rule set: {0}")]
    InvalidRules(#[from] RuleSetError),
    /// The rule list could not be saved; nothing changed.
    #[error("failed to save rules: {0}")]
    Persistence(#[from] ConfigError),
}

/// Broker connection details reported by the status endpoint.
#[derive(Debug)]
pub struct ConnectionStatus {
    connected: AtomicBool,
    broker: String,
    client_id: String,
}

impl ConnectionStatus {
    pub fn new(broker: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            connected: AtomicBool::new(false),
            broker: broker.into(),
            client_id: client_id.into(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    pub fn broker(&self) -> &str {
        &self.broker
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

/// Statistics reported by `/api/stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStats {
    pub total_rules: usize,
    pub enabled_rules: usize,
    /// Occupancy of the duplicate cache.
    pub messages_received: usize,
    pub mqtt_connected: bool,
    pub topics_subscribed: usize,
    pub messages_delivered: u64,
    pub messages_dropped: u64,
    pub last_message_time: Option<DateTime<Utc>>,
}

/// Client id to use for the broker; an empty setting gets a random suffix.
pub fn effective_client_id(configured: &str) -> String {
    if configured.trim().is_empty() {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("signalk-mqtt-import-{}", &suffix[..8])
    } else {
        configured.to_string()
    }
}

pub struct ImportService {
    engine: ImportEngine,
    storage: Arc<dyn RuleStorage>,
    sink: Arc<dyn DeliverySink>,
    status: ConnectionStatus,
    /// Bumped after every rule edit; the bridge re-subscribes on change.
    rules_changed: watch::Sender<u64>,
    /// Serializes rule edits.
    edit_lock: Mutex<()>,
}

impl ImportService {
    /// Build the service from configuration, loading the startup rules.
    ///
    /// Stored rules that fail validation are replaced by the defaults.
    pub fn new(
        config: &ImportConfig,
        storage: Arc<dyn RuleStorage>,
        sink: Arc<dyn DeliverySink>,
    ) -> Result<Self, ServiceError> {
        let identity = config.vessel_identity();
        match &identity {
            Some(id) => info!("Self vessel identity: {}", id),
            None => warn!("No self vessel identity configured, 'vessels/self' matches literally"),
        }

        let prefix = config.topic_prefix();
        let rules = load_rules_or_default(storage.as_ref(), config.import_rules.as_deref());
        let engine = match ImportEngine::new(rules, prefix, identity.clone()) {
            Ok(engine) => engine,
            Err(e) => {
                warn!("stored rules are invalid ({}), using defaults", e);
                ImportEngine::new(default_rules(), prefix, identity)?
            }
        };
        info!(rules = engine.rules().len(), "import rules loaded");

        let (rules_changed, _) = watch::channel(0);
        Ok(Self {
            engine,
            storage,
            sink,
            status: ConnectionStatus::new(
                config.mqtt_broker.clone(),
                effective_client_id(&config.mqtt_client_id),
            ),
            rules_changed,
            edit_lock: Mutex::new(()),
        })
    }

    pub fn engine(&self) -> &ImportEngine {
        &self.engine
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }

    /// The current rules in list order.
    pub fn rules(&self) -> Vec<ImportRule> {
        self.engine.rules().to_rules()
    }

    /// Filters the broker should currently be subscribed to.
    pub fn subscription_plan(&self) -> BTreeSet<String> {
        self.engine.subscription_plan()
    }

    /// Receiver that changes whenever the rule set is replaced.
    pub fn watch_rules(&self) -> watch::Receiver<u64> {
        self.rules_changed.subscribe()
    }

    /// Replace the whole rule list.
    ///
    /// The list is validated first, then saved, and only then installed. A
    /// failure at either step leaves the running rules untouched.
    pub async fn replace_rules(&self, rules: Vec<ImportRule>) -> Result<(), ServiceError> {
        let _guard = self.edit_lock.lock().await;

        let compiled = self.engine.store().compile(rules)?;
        self.storage.save_rules(&compiled.to_rules())?;
        let snapshot = self.engine.store().install(compiled);

        self.rules_changed.send_modify(|generation| *generation += 1);
        info!(
            version = snapshot.version,
            rules = snapshot.len(),
            "import rules updated"
        );
        Ok(())
    }

    /// Run one inbound MQTT message through the engine.
    pub fn handle_message(&self, topic: &str, payload: &[u8]) -> Outcome {
        let payload = String::from_utf8_lossy(payload);
        let outcome = self
            .engine
            .handle_message(topic, &payload, self.sink.as_ref());

        match &outcome {
            Outcome::Delivered { rule } => debug!(topic, rule = %rule, "imported"),
            Outcome::Excluded { rules } => {
                debug!(topic, rules = ?rules, "message excluded by every matching rule")
            }
            Outcome::Undelivered { rule, error } => {
                warn!(topic, rule = %rule, "delta dropped: {}", error)
            }
            Outcome::Untranslatable { rule, error } => {
                debug!(topic, rule = %rule, "payload dropped: {}", error)
            }
            Outcome::NoMatch | Outcome::Duplicate { .. } => {}
        }
        outcome
    }

    /// Record the number of active broker subscriptions.
    pub fn set_topics_subscribed(&self, count: usize) {
        self.engine.statistics().set_topics_subscribed(count);
    }

    pub fn stats(&self) -> ImportStats {
        let rules = self.engine.rules();
        let counters = self.engine.statistics().snapshot();
        ImportStats {
            total_rules: rules.len(),
            enabled_rules: rules.enabled_count(),
            messages_received: self.engine.messages_received(),
            mqtt_connected: self.is_connected(),
            topics_subscribed: counters.topics_subscribed,
            messages_delivered: counters.messages_delivered,
            messages_dropped: counters.messages_dropped,
            last_message_time: counters.last_message_time,
        }
    }

    /// Drop transient state on shutdown.
    pub fn shutdown(&self) {
        self.status.set_connected(false);
        self.engine.clear_duplicates();
        info!("import service stopped");
    }
}

impl std::fmt::Debug for ImportService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportService")
            .field("status", &self.status)
            .field("rules", &self.engine.rules().len())
            .finish()
    }
}

//! Configuration types and rule storage abstraction.
//!
//! The importer's settings are a single JSON document ([`ImportConfig`]).
//! Rule persistence goes through the [`RuleStorage`] trait so the service
//! and API logic do not care whether rules live in a file or in memory.

use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::identity::VesselIdentity;
use crate::rule::{default_rules, ImportRule};

/// File name of the persisted rule list inside the data directory.
pub const RULES_FILE_NAME: &str = "mqtt-import-rules.json";

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration.
    #[error("Read error: {0}")]
    ReadError(String),
    /// Failed to write configuration.
    #[error("Write error: {0}")]
    WriteError(String),
    /// Configuration data is invalid.
    #[error("Invalid data: {0}")]
    InvalidData(String),
    /// Storage is not available.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

/// Persistent storage for the rule list.
///
/// All methods are synchronous; rule files are small and written rarely.
pub trait RuleStorage: Send + Sync {
    /// Load the persisted rules. `Ok(None)` means nothing has been saved yet.
    fn load_rules(&self) -> Result<Option<Vec<ImportRule>>, ConfigError>;

    /// Replace the persisted rules.
    fn save_rules(&self, rules: &[ImportRule]) -> Result<(), ConfigError>;
}

/// Load the startup rule list.
///
/// Stored rules win. Rules embedded in the configuration (`importRules`,
/// written by older versions) are only migrated into storage while nothing
/// has been stored yet, so later edits survive a restart. Without either,
/// or when the stored data cannot be read, [`default_rules`] are used.
pub fn load_rules_or_default<S: RuleStorage + ?Sized>(
    storage: &S,
    legacy: Option<&[ImportRule]>,
) -> Vec<ImportRule> {
    match storage.load_rules() {
        Ok(Some(rules)) => {
            if legacy.is_some() {
                info!("rule file exists, ignoring importRules in configuration");
            }
            info!(rules = rules.len(), "loaded import rules from storage");
            rules
        }
        Ok(None) => match legacy {
            Some(legacy) => {
                info!(rules = legacy.len(), "migrating import rules from configuration");
                if let Err(e) = storage.save_rules(legacy) {
                    warn!("failed to persist migrated rules: {}", e);
                }
                legacy.to_vec()
            }
            None => {
                info!("no stored import rules, using defaults");
                default_rules()
            }
        },
        Err(e) => match legacy {
            // Leave the unreadable file in place for inspection.
            Some(legacy) => {
                warn!("failed to load stored rules, using importRules from configuration: {}", e);
                legacy.to_vec()
            }
            None => {
                warn!("failed to load stored rules, using defaults: {}", e);
                default_rules()
            }
        },
    }
}

/// In-memory rule storage, used when nothing should touch the disk.
#[derive(Debug, Default)]
pub struct MemoryRuleStorage {
    rules: RwLock<Option<Vec<ImportRule>>>,
    read_only: bool,
}

impl MemoryRuleStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<ImportRule>) -> Self {
        Self {
            rules: RwLock::new(Some(rules)),
            read_only: false,
        }
    }

    /// Storage that rejects every write.
    pub fn read_only() -> Self {
        Self {
            rules: RwLock::new(None),
            read_only: true,
        }
    }
}

impl RuleStorage for MemoryRuleStorage {
    fn load_rules(&self) -> Result<Option<Vec<ImportRule>>, ConfigError> {
        let rules = self
            .rules
            .read()
            .map_err(|e| ConfigError::StorageUnavailable(e.to_string()))?;
        Ok(rules.clone())
    }

    fn save_rules(&self, rules: &[ImportRule]) -> Result<(), ConfigError> {
        if self.read_only {
            return Err(ConfigError::WriteError("storage is read-only".to_string()));
        }
        let mut stored = self
            .rules
            .write()
            .map_err(|e| ConfigError::StorageUnavailable(e.to_string()))?;
        *stored = Some(rules.to_vec());
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_broker() -> String {
    "mqtt://localhost:1883".to_string()
}

fn default_client_id() -> String {
    "signalk-mqtt-import".to_string()
}

fn default_data_dir() -> String {
    ".".to_string()
}

fn default_public_dir() -> String {
    "public".to_string()
}

fn default_http_bind() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_output() -> String {
    "stdout".to_string()
}

/// Importer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportConfig {
    /// Connect to the broker at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Broker URL (`mqtt://host:port`, `tcp://host:port` or `host[:port]`).
    #[serde(default = "default_broker")]
    pub mqtt_broker: String,

    #[serde(default = "default_client_id")]
    pub mqtt_client_id: String,

    #[serde(default)]
    pub mqtt_username: String,

    #[serde(default)]
    pub mqtt_password: String,

    /// Prefix in front of every rule pattern, without a trailing `/`.
    #[serde(default)]
    pub topic_prefix: String,

    /// Local vessel identity, e.g. `urn:mrn:imo:mmsi:368396230`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_urn: Option<String>,

    /// Local vessel MMSI, used when `selfUrn` is not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_mmsi: Option<String>,

    /// Directory holding the rule file.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Directory of static web assets.
    #[serde(default = "default_public_dir")]
    pub public_dir: String,

    #[serde(default = "default_http_bind")]
    pub http_bind: String,

    /// Where delivered deltas go: `stdout` or `tcp://host:port`.
    #[serde(default = "default_output")]
    pub output: String,

    /// Rules embedded by older versions; migrated to the rule file on start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_rules: Option<Vec<ImportRule>>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mqtt_broker: default_broker(),
            mqtt_client_id: default_client_id(),
            mqtt_username: String::new(),
            mqtt_password: String::new(),
            topic_prefix: String::new(),
            self_urn: None,
            self_mmsi: None,
            data_dir: default_data_dir(),
            public_dir: default_public_dir(),
            http_bind: default_http_bind(),
            output: default_output(),
            import_rules: None,
        }
    }
}

impl ImportConfig {
    /// Parse a configuration document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::InvalidData(e.to_string()))
    }

    /// The topic prefix, or `None` when unset.
    pub fn topic_prefix(&self) -> Option<&str> {
        let prefix = self.topic_prefix.trim_end_matches('/');
        (!prefix.is_empty()).then_some(prefix)
    }

    /// The local vessel identity from `selfUrn`, else `selfMmsi`.
    pub fn vessel_identity(&self) -> Option<VesselIdentity> {
        self.self_urn
            .as_deref()
            .and_then(VesselIdentity::new)
            .or_else(|| self.self_mmsi.as_deref().and_then(VesselIdentity::from_mmsi))
    }

    /// Broker credentials, only when both username and password are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        (!self.mqtt_username.is_empty() && !self.mqtt_password.is_empty())
            .then_some((self.mqtt_username.as_str(), self.mqtt_password.as_str()))
    }

    /// Full path of the persisted rule file.
    pub fn rules_file(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(RULES_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = ImportConfig::from_json("{}").unwrap();
        assert!(config.enabled);
        assert_eq!(config.mqtt_broker, "mqtt://localhost:1883");
        assert_eq!(config.mqtt_client_id, "signalk-mqtt-import");
        assert_eq!(config.http_bind, "0.0.0.0:3001");
        assert_eq!(config.output, "stdout");
        assert_eq!(config.topic_prefix(), None);
        assert!(config.credentials().is_none());
        assert!(config.vessel_identity().is_none());
        assert_eq!(config.rules_file(), PathBuf::from("./mqtt-import-rules.json"));
    }

    #[test]
    fn test_full_document() {
        let config = ImportConfig::from_json(
            r#"{
                "enabled": false,
                "mqttBroker": "tcp://broker.local:1884",
                "mqttUsername": "boat",
                "mqttPassword": "secret",
                "topicPrefix": "boat1/",
                "selfMmsi": "368396230",
                "dataDir": "/var/lib/mqtt-import"
            }"#,
        )
        .unwrap();

        assert!(!config.enabled);
        assert_eq!(config.topic_prefix(), Some("boat1"));
        assert_eq!(config.credentials(), Some(("boat", "secret")));
        assert_eq!(
            config.vessel_identity().unwrap().canonical(),
            "urn:mrn:imo:mmsi:368396230"
        );
        assert_eq!(
            config.rules_file(),
            PathBuf::from("/var/lib/mqtt-import/mqtt-import-rules.json")
        );
    }

    #[test]
    fn test_self_urn_wins_over_mmsi() {
        let config = ImportConfig {
            self_urn: Some("vessels.urn:mrn:signalk:uuid:abc".to_string()),
            self_mmsi: Some("1".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.vessel_identity().unwrap().canonical(),
            "urn:mrn:signalk:uuid:abc"
        );
    }

    #[test]
    fn test_username_without_password_is_ignored() {
        let config = ImportConfig {
            mqtt_username: "boat".to_string(),
            ..Default::default()
        };
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_invalid_document() {
        assert!(matches!(
            ImportConfig::from_json(r#"{"enabled": "yes"}"#),
            Err(ConfigError::InvalidData(_))
        ));
    }

    #[test]
    fn test_missing_storage_gives_defaults() {
        let storage = MemoryRuleStorage::new();
        assert_eq!(load_rules_or_default(&storage, None), default_rules());
    }

    #[test]
    fn test_stored_rules_are_used() {
        let rules = vec![ImportRule::new("only", "sensors/#")];
        let storage = MemoryRuleStorage::with_rules(rules.clone());
        assert_eq!(load_rules_or_default(&storage, None), rules);
    }

    #[test]
    fn test_legacy_rules_migrated() {
        let storage = MemoryRuleStorage::new();
        let legacy = vec![ImportRule::new("legacy", "old/#")];

        let loaded = load_rules_or_default(&storage, Some(&legacy));
        assert_eq!(loaded, legacy);
        assert_eq!(storage.load_rules().unwrap(), Some(legacy));
    }

    #[test]
    fn test_stored_rules_win_over_legacy() {
        let edited = vec![ImportRule::new("edited", "sensors/#")];
        let storage = MemoryRuleStorage::with_rules(edited.clone());
        let legacy = vec![ImportRule::new("legacy", "old/#")];

        assert_eq!(load_rules_or_default(&storage, Some(&legacy)), edited);
        assert_eq!(storage.load_rules().unwrap(), Some(edited));
    }

    #[test]
    fn test_read_only_storage() {
        let storage = MemoryRuleStorage::read_only();
        assert!(matches!(
            storage.save_rules(&default_rules()),
            Err(ConfigError::WriteError(_))
        ));
    }
}

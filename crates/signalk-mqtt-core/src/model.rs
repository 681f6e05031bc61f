//! Signal K delta types produced by the import engine.
//!
//! Only the delta side of the Signal K data model is needed here: every
//! accepted MQTT message becomes one [`Delta`] with a context and a list of
//! updates. Full-format payloads that already carry a delta are passed
//! through, so the source fields a Signal K server may send are kept.

use serde::{Deserialize, Serialize};

/// Source type stamped on every delta built from an MQTT message.
pub const MQTT_SOURCE_TYPE: &str = "mqtt";

/// Context used for the local vessel.
pub const SELF_CONTEXT: &str = "vessels.self";

/// A Signal K delta message containing one or more updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// The context path (e.g., "vessels.urn:mrn:imo:mmsi:368396230")
    pub context: String,

    /// The list of updates in this delta
    pub updates: Vec<Update>,
}

/// A single update within a delta, containing values from one source at one timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Reference to source in /sources (e.g., "nmea0183.GP")
    #[serde(rename = "$source", skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,

    /// Embedded source object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,

    /// ISO 8601 timestamp (UTC)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    /// The path-value pairs in this update
    #[serde(default)]
    pub values: Vec<PathValue>,

    /// Metadata updates, forwarded untouched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Vec<serde_json::Value>>,
}

/// A single path-value pair within an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathValue {
    /// The Signal K path (e.g., "navigation.speedOverGround")
    pub path: String,

    /// The value at this path
    pub value: serde_json::Value,
}

/// Source information describing where data originated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Label identifying the source (the rule's source label for MQTT imports)
    pub label: String,

    /// Type of source (e.g., "mqtt", "NMEA0183", "NMEA2000")
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,

    /// NMEA 2000 source address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,

    /// NMEA 2000 device CAN name
    #[serde(rename = "canName", skip_serializing_if = "Option::is_none")]
    pub can_name: Option<String>,

    /// NMEA 2000 PGN
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pgn: Option<u32>,

    /// NMEA 0183 sentence type (e.g., "RMC", "GGA")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentence: Option<String>,

    /// NMEA 0183 talker ID (e.g., "GP", "II")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub talker: Option<String>,

    /// AIS message type (1-27)
    #[serde(rename = "aisType", skip_serializing_if = "Option::is_none")]
    pub ais_type: Option<u8>,
}

impl Source {
    /// Source block for a value imported over MQTT.
    pub fn mqtt(label: &str) -> Self {
        Self {
            label: label.to_string(),
            source_type: Some(MQTT_SOURCE_TYPE.to_string()),
            src: None,
            can_name: None,
            pgn: None,
            sentence: None,
            talker: None,
            ais_type: None,
        }
    }
}

impl Delta {
    /// Build a delta holding exactly one value.
    pub fn single(
        context: impl Into<String>,
        source: Source,
        timestamp: impl Into<String>,
        path: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        Self {
            context: context.into(),
            updates: vec![Update {
                source_ref: None,
                source: Some(source),
                timestamp: Some(timestamp.into()),
                values: vec![PathValue {
                    path: path.into(),
                    value,
                }],
                meta: None,
            }],
        }
    }

    /// Check the structural invariants a delta must satisfy before delivery:
    /// non-empty context, at least one update, and no update without values.
    pub fn is_well_formed(&self) -> bool {
        !self.context.is_empty()
            && !self.updates.is_empty()
            && self.updates.iter().all(|u| !u.values.is_empty())
    }

    /// Iterate mutably over every value in every update.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut PathValue> {
        self.updates.iter_mut().flat_map(|u| u.values.iter_mut())
    }
}

/// Current time as an ISO 8601 UTC timestamp with millisecond precision.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

//! Import rules.
//!
//! An import rule maps an MQTT topic pattern to delivery behaviour: where the
//! value lands in the Signal K tree, how the payload is read, whether
//! duplicates are dropped and which vessels are ignored. Field names on the
//! wire match the rule file written by earlier versions of the importer, so
//! existing `mqtt-import-rules.json` files load unchanged.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::transform::ValueTransform;

/// How an MQTT payload is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayloadFormat {
    /// A JSON document; a complete Signal K delta is passed through as-is.
    #[default]
    Full,
    /// A bare value (JSON, number or plain text).
    ValueOnly,
}

fn default_enabled() -> bool {
    true
}

/// A single import rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRule {
    /// Unique, stable identifier.
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// MQTT topic pattern, may use `+` and a trailing `#`.
    #[serde(rename = "mqttTopic")]
    pub topic_pattern: String,

    /// Signal K context override; empty means derive from the topic.
    #[serde(rename = "signalKContext", default)]
    pub context: String,

    /// Signal K path override; empty means derive from the topic.
    #[serde(rename = "signalKPath", default)]
    pub path: String,

    /// Label reported in the delta's source block.
    #[serde(default)]
    pub source_label: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub payload_format: PayloadFormat,

    /// Drop byte-identical (topic, payload) repeats.
    #[serde(default)]
    pub ignore_duplicates: bool,

    /// Comma-separated MMSIs whose messages this rule must not import.
    #[serde(rename = "excludeMMSI", default)]
    pub exclude_identifiers: String,

    /// Optional transform applied to numeric values before delivery.
    #[serde(rename = "transform", default, skip_serializing_if = "Option::is_none")]
    pub value_transform: Option<ValueTransform>,
}

impl ImportRule {
    /// A rule with the given id and pattern and every other field defaulted.
    pub fn new(id: impl Into<String>, topic_pattern: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            topic_pattern: topic_pattern.into(),
            context: String::new(),
            path: String::new(),
            source_label: String::new(),
            enabled: true,
            payload_format: PayloadFormat::Full,
            ignore_duplicates: false,
            exclude_identifiers: String::new(),
            value_transform: None,
        }
    }

    /// Parse the exclusion list into trimmed, non-empty identifiers.
    pub fn excluded_identifiers(&self) -> HashSet<String> {
        parse_exclusion_list(&self.exclude_identifiers)
    }
}

/// Split a comma-separated identifier list, trimming and dropping empties.
pub fn parse_exclusion_list(list: &str) -> HashSet<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn category_rule(id: &str, name: &str, topic: &str, enabled: bool) -> ImportRule {
    ImportRule {
        id: id.to_string(),
        name: name.to_string(),
        topic_pattern: topic.to_string(),
        enabled,
        ignore_duplicates: true,
        ..ImportRule::new(id, topic)
    }
}

/// The rule set used when no rule file exists yet.
pub fn default_rules() -> Vec<ImportRule> {
    vec![
        category_rule(
            "vessels-all-data",
            "All Vessel Data (Auto-detect Self)",
            "vessels/+/#",
            true,
        ),
        category_rule(
            "vessels-navigation",
            "Navigation Data (All Vessels)",
            "vessels/+/navigation/#",
            true,
        ),
        category_rule(
            "vessels-environment",
            "Environment Data (All Vessels)",
            "vessels/+/environment/#",
            true,
        ),
        category_rule(
            "vessels-electrical",
            "Electrical Data (All Vessels)",
            "vessels/+/electrical/#",
            false,
        ),
        category_rule(
            "vessels-propulsion",
            "Propulsion Data (All Vessels)",
            "vessels/+/propulsion/#",
            false,
        ),
    ]
}

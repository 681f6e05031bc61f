//! # signalk-mqtt-core
//!
//! Topic rule matching and translation for importing MQTT messages into
//! Signal K.
//!
//! This crate provides:
//! - Delta model types (Delta, Update, Source)
//! - Vessel identity normalization between `urn:` and `urn_` forms
//! - Import rules, topic patterns and the subscription planner
//! - Rule matching with vessel exclusion and duplicate suppression
//! - Payload translation, value transforms and the delivery sink seam
//!
//! This crate is intentionally runtime-agnostic and contains no async code;
//! the transport and HTTP layers live in `signalk-mqtt-server` and
//! `signalk-mqtt-web`.

pub mod config;
pub mod dedup;
pub mod engine;
pub mod identity;
pub mod matcher;
pub mod model;
pub mod planner;
pub mod rule;
pub mod sink;
pub mod stats;
pub mod store;
pub mod topic;
pub mod transform;
pub mod translate;

pub use config::{ConfigError, ImportConfig, MemoryRuleStorage, RuleStorage};
pub use engine::{ImportEngine, Outcome};
pub use identity::VesselIdentity;
pub use matcher::{RuleMatch, RuleSet, RuleSetError};
pub use model::*;
pub use rule::{default_rules, ImportRule, PayloadFormat};
pub use sink::{DeliverySink, MemorySink, SinkError};
pub use stats::{ImportStatistics, StatisticsSnapshot};
pub use store::{RuleSnapshot, RuleStore};
pub use transform::ValueTransform;

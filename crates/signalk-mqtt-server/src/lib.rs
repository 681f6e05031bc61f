//! # signalk-mqtt-server
//!
//! Tokio runtime for the MQTT import engine: the rumqttc bridge, broker
//! subscription management, file-backed rule storage, the delivery channel
//! and the [`ImportService`] shared with the HTTP layer.

pub mod bridge;
pub mod service;
pub mod sink;
pub mod storage;
pub mod subscription;

pub use bridge::{parse_mqtt_url, BridgeConfig, BridgeError, MqttBridge};
pub use service::{ConnectionStatus, ImportService, ImportStats, ServiceError};
pub use sink::{
    delivery_channel, run_forwarder, spawn_forwarder, ChannelSink, DeltaOutput, ForwardError,
    ForwarderTask, DELIVERY_CHANNEL_CAPACITY,
};
pub use storage::{load_config, FileRuleStorage};
pub use subscription::{ActiveSubscriptions, SyncReport, TopicSubscriber};

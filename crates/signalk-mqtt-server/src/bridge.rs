//! MQTT bridge.
//!
//! Owns the rumqttc event loop: keeps the connection status current,
//! re-subscribes after every (re)connect and rule edit, and feeds every
//! inbound publish to the [`ImportService`].

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, SubscribeReasonCode};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use url::Url;

use signalk_mqtt_core::ImportConfig;

use crate::service::ImportService;
use crate::subscription::ActiveSubscriptions;

const DEFAULT_PORT: u16 = 1883;

/// Connection parameters for the bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub credentials: Option<(String, String)>,
    pub keep_alive: Duration,
    pub reconnect_delay: Duration,
    /// Minimum capacity of the client request queue; raised to the size of
    /// the subscription plan at startup.
    pub queue_capacity: usize,
}

impl BridgeConfig {
    /// Derive bridge settings from the importer configuration.
    pub fn from_config(config: &ImportConfig, client_id: &str) -> Result<Self, BridgeError> {
        let (host, port) = parse_mqtt_url(&config.mqtt_broker)?;
        Ok(Self {
            host,
            port,
            client_id: client_id.to_string(),
            credentials: config
                .credentials()
                .map(|(user, pass)| (user.to_string(), pass.to_string())),
            keep_alive: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(5),
            queue_capacity: 100,
        })
    }

    fn mqtt_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        if let Some((user, pass)) = &self.credentials {
            options.set_credentials(user, pass);
        }
        options
    }
}

/// Parse a broker URL into host and port.
///
/// Accepts `mqtt://host[:port]`, `tcp://host[:port]` and bare `host[:port]`.
pub fn parse_mqtt_url(input: &str) -> Result<(String, u16), BridgeError> {
    if input.contains("://") {
        let url = Url::parse(input).map_err(|e| BridgeError::InvalidUrl(format!("{input}: {e}")))?;

        match url.scheme() {
            "tcp" | "mqtt" => {}
            scheme => {
                return Err(BridgeError::InvalidUrl(format!(
                    "{input}: unsupported scheme '{scheme}'"
                )));
            }
        }

        let host = url
            .host_str()
            .ok_or_else(|| BridgeError::InvalidUrl(format!("{input}: missing host")))?;
        return Ok((host.to_string(), url.port().unwrap_or(DEFAULT_PORT)));
    }

    let mut parts = input.split(':');
    let host = parts
        .next()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| BridgeError::InvalidUrl(format!("{input}: missing host")))?;
    let port = match parts.next() {
        None => DEFAULT_PORT,
        Some(port) => port
            .parse()
            .map_err(|_| BridgeError::InvalidUrl(format!("{input}: invalid port '{port}'")))?,
    };
    if parts.next().is_some() {
        return Err(BridgeError::InvalidUrl(format!(
            "{input}: too many ':' separators"
        )));
    }

    Ok((host.to_string(), port))
}

/// Errors raised while setting up the bridge.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    #[error("invalid MQTT URL: {0}")]
    InvalidUrl(String),
}

/// The MQTT side of the importer.
pub struct MqttBridge {
    client: AsyncClient,
    eventloop: EventLoop,
    service: Arc<ImportService>,
    subscriptions: ActiveSubscriptions,
    reconnect_delay: Duration,
}

impl MqttBridge {
    pub fn new(config: &BridgeConfig, service: Arc<ImportService>) -> Self {
        let capacity = config
            .queue_capacity
            .max(service.subscription_plan().len())
            .max(1);
        let (client, eventloop) = AsyncClient::new(config.mqtt_options(), capacity);
        Self {
            client,
            eventloop,
            service,
            subscriptions: ActiveSubscriptions::new(),
            reconnect_delay: config.reconnect_delay,
        }
    }

    fn resubscribe(&mut self) {
        let plan = self.service.subscription_plan();
        debug!(filters = plan.len(), "syncing MQTT subscriptions");
        self.subscriptions.sync(&self.client, &plan);
        self.service.set_topics_subscribed(self.subscriptions.len());
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::Incoming(Packet::Publish(publish)) => {
                debug!(topic = %publish.topic, payload_len = publish.payload.len(), "MQTT message");
                self.service.handle_message(&publish.topic, &publish.payload);
            }
            Event::Incoming(Packet::ConnAck(_)) => {
                info!("Connected to MQTT broker {}", self.service.status().broker());
                self.service.status().set_connected(true);
                // Clean session: the broker kept nothing from before.
                self.subscriptions.reset();
                info!(
                    "Subscribing to {} MQTT topic filters",
                    self.service.subscription_plan().len()
                );
                self.resubscribe();
            }
            Event::Outgoing(Outgoing::Subscribe(pkid)) => self.subscriptions.subscribe_sent(pkid),
            Event::Incoming(Packet::SubAck(ack)) => {
                let granted = ack
                    .return_codes
                    .iter()
                    .all(|code| matches!(code, SubscribeReasonCode::Success(_)));
                match self.subscriptions.subscribe_acked(ack.pkid, granted) {
                    Some(filter) => {
                        warn!(filter = %filter, "MQTT broker refused subscription");
                        self.service.set_topics_subscribed(self.subscriptions.len());
                    }
                    None => debug!(pkid = ack.pkid, "subscription acknowledged"),
                }
            }
            Event::Incoming(Packet::Disconnect) => self.on_disconnect(),
            _ => {}
        }
    }

    fn on_disconnect(&mut self) {
        if self.service.status().is_connected() {
            warn!("Disconnected from MQTT broker {}", self.service.status().broker());
        }
        self.service.status().set_connected(false);
        self.subscriptions.reset();
        self.service.set_topics_subscribed(0);
    }

    /// Poll the event loop until `shutdown` turns true.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut rules_changed = self.service.watch_rules();
        info!(
            "Connecting to MQTT broker {} as {}",
            self.service.status().broker(),
            self.service.status().client_id()
        );

        loop {
            tokio::select! {
                stop = shutdown.changed() => {
                    if stop.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                changed = rules_changed.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if self.service.is_connected() {
                        info!("Import rules changed, updating MQTT subscriptions");
                        self.resubscribe();
                    }
                }
                event = self.eventloop.poll() => {
                    match event {
                        Ok(event) => {
                            self.on_event(event);
                            // The poll made room in the request queue.
                            if self.subscriptions.is_incomplete() && self.service.is_connected() {
                                self.resubscribe();
                            }
                        }
                        Err(e) => {
                            error!("MQTT connection error: {}", e);
                            self.on_disconnect();
                            tokio::select! {
                                _ = tokio::time::sleep(self.reconnect_delay) => {}
                                _ = shutdown.changed() => {}
                            }
                            if *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
            }
        }

        if let Err(e) = self.client.try_disconnect() {
            debug!("disconnect request not queued: {}", e);
        }
        self.service.status().set_connected(false);
        info!("MQTT bridge stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mqtt_url() {
        assert_eq!(
            parse_mqtt_url("mqtt://localhost:1883").unwrap(),
            ("localhost".to_string(), 1883)
        );
        assert_eq!(
            parse_mqtt_url("tcp://broker.local").unwrap(),
            ("broker.local".to_string(), 1883)
        );
        assert_eq!(
            parse_mqtt_url("10.0.0.5:1884").unwrap(),
            ("10.0.0.5".to_string(), 1884)
        );
        assert_eq!(parse_mqtt_url("broker").unwrap(), ("broker".to_string(), 1883));
    }

    #[test]
    fn test_parse_mqtt_url_errors() {
        assert!(parse_mqtt_url("ws://broker:80").is_err());
        assert!(parse_mqtt_url(":1883").is_err());
        assert!(parse_mqtt_url("broker:port").is_err());
        assert!(parse_mqtt_url("a:1:2").is_err());
    }

    #[test]
    fn test_bridge_config_from_import_config() {
        let config = ImportConfig {
            mqtt_broker: "mqtt://boat.local:1885".to_string(),
            mqtt_username: "crew".to_string(),
            mqtt_password: "pw".to_string(),
            ..Default::default()
        };
        let bridge = BridgeConfig::from_config(&config, "client-1").unwrap();
        assert_eq!(bridge.host, "boat.local");
        assert_eq!(bridge.port, 1885);
        assert_eq!(bridge.client_id, "client-1");
        assert_eq!(bridge.keep_alive, Duration::from_secs(60));
        assert_eq!(
            bridge.credentials,
            Some(("crew".to_string(), "pw".to_string()))
        );

        let options = bridge.mqtt_options();
        assert_eq!(options.keep_alive(), Duration::from_secs(60));
        assert!(options.clean_session());
    }
}

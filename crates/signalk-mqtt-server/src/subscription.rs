//! Broker subscription management.
//!
//! Keeps the set of filters the broker currently has for this client and
//! brings it in line with a new plan by unsubscribing what is no longer
//! planned and subscribing what is missing. Subscribe requests are tracked
//! from queueing to acknowledgement so filters the broker refuses drop out
//! of the active set.

use std::collections::{BTreeSet, HashMap, VecDeque};

use rumqttc::{AsyncClient, QoS};
use tracing::{debug, info, warn};

/// Something that can (un)subscribe topic filters without blocking.
pub trait TopicSubscriber {
    fn subscribe(&self, filter: &str) -> Result<(), String>;
    fn unsubscribe(&self, filter: &str) -> Result<(), String>;
}

impl TopicSubscriber for AsyncClient {
    fn subscribe(&self, filter: &str) -> Result<(), String> {
        self.try_subscribe(filter, QoS::AtLeastOnce)
            .map_err(|e| e.to_string())
    }

    fn unsubscribe(&self, filter: &str) -> Result<(), String> {
        self.try_unsubscribe(filter).map_err(|e| e.to_string())
    }
}

/// Counts from one synchronization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub subscribed: usize,
    pub unsubscribed: usize,
    pub failed: usize,
}

/// The filters the broker is subscribed to for this session.
#[derive(Debug, Default)]
pub struct ActiveSubscriptions {
    active: BTreeSet<String>,
    /// Set when the last pass could not queue every request.
    incomplete: bool,
    /// Subscribe requests queued on the client, in order, not yet sent.
    queued: VecDeque<String>,
    /// Sent subscribe requests by packet id, awaiting their SUBACK.
    awaiting_ack: HashMap<u16, String>,
}

impl ActiveSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn contains(&self, filter: &str) -> bool {
        self.active.contains(filter)
    }

    /// True when the last pass left planned filters unqueued.
    pub fn is_incomplete(&self) -> bool {
        self.incomplete
    }

    /// Forget everything, e.g. after a clean-session reconnect.
    ///
    /// Requests still sitting in the client queue are sent after the
    /// reconnect, so their order is kept.
    pub fn reset(&mut self) {
        self.active.clear();
        self.awaiting_ack.clear();
        self.incomplete = false;
    }

    /// A subscribe request left the client with packet id `pkid`.
    pub fn subscribe_sent(&mut self, pkid: u16) {
        if let Some(filter) = self.queued.pop_front() {
            self.awaiting_ack.insert(pkid, filter);
        }
    }

    /// The broker answered the subscribe request `pkid`.
    ///
    /// Returns the filter when the broker refused it; it is no longer active.
    pub fn subscribe_acked(&mut self, pkid: u16, granted: bool) -> Option<String> {
        let filter = self.awaiting_ack.remove(&pkid)?;
        if granted {
            return None;
        }
        self.active.remove(&filter);
        Some(filter)
    }

    /// Make the active set equal to `planned`.
    ///
    /// Filters whose request could not be queued keep their previous state
    /// and mark the set incomplete; the caller runs another pass once the
    /// client queue has drained.
    pub fn sync<C: TopicSubscriber + ?Sized>(
        &mut self,
        client: &C,
        planned: &BTreeSet<String>,
    ) -> SyncReport {
        let mut report = SyncReport::default();

        let stale: Vec<String> = self.active.difference(planned).cloned().collect();
        for filter in stale {
            match client.unsubscribe(&filter) {
                Ok(()) => {
                    debug!(filter = %filter, "unsubscribed");
                    self.active.remove(&filter);
                    report.unsubscribed += 1;
                }
                Err(e) => {
                    debug!(filter = %filter, "unsubscribe not queued: {}", e);
                    report.failed += 1;
                }
            }
        }

        let missing: Vec<String> = planned.difference(&self.active).cloned().collect();
        for filter in missing {
            match client.subscribe(&filter) {
                Ok(()) => {
                    debug!(filter = %filter, "subscribed");
                    self.queued.push_back(filter.clone());
                    self.active.insert(filter);
                    report.subscribed += 1;
                }
                Err(e) => {
                    debug!(filter = %filter, "subscribe not queued: {}", e);
                    report.failed += 1;
                }
            }
        }

        let was_incomplete = self.incomplete;
        self.incomplete = report.failed > 0;
        if self.incomplete && !was_incomplete {
            warn!(
                pending = report.failed,
                "MQTT request queue full, remaining subscriptions deferred"
            );
        } else if self.incomplete {
            debug!(pending = report.failed, "subscriptions still deferred");
        }
        if report.subscribed > 0 || report.unsubscribed > 0 {
            info!(
                active = self.active.len(),
                subscribed = report.subscribed,
                unsubscribed = report.unsubscribed,
                "MQTT subscriptions updated"
            );
        }
        report
    }
}

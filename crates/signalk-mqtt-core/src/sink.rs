//! Delivery sink.
//!
//! The engine hands finished deltas to a [`DeliverySink`]. [`deliver`] is the
//! last step before the host sees a delta: it rejects malformed deltas and
//! applies the rule's value transform.

use std::sync::Mutex;

use tracing::debug;

use crate::model::Delta;
use crate::rule::ImportRule;

/// Errors a sink can report.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SinkError {
    /// The host cannot take deltas right now (closed or full).
    #[error("sink unavailable: {0}")]
    Unavailable(String),
    /// The delta was refused.
    #[error("delta rejected: {0}")]
    Rejected(String),
}

/// Receiver of translated deltas.
///
/// Implementations must not block; the engine calls this on the message path.
pub trait DeliverySink: Send + Sync {
    fn send(&self, delta: Delta) -> Result<(), SinkError>;
}

/// Validate `delta`, apply the rule's transform and pass it to the sink.
pub fn deliver<S: DeliverySink + ?Sized>(
    sink: &S,
    mut delta: Delta,
    rule: &ImportRule,
) -> Result<(), SinkError> {
    if !delta.is_well_formed() {
        return Err(SinkError::Rejected(format!(
            "malformed delta for context '{}'",
            delta.context
        )));
    }

    if let Some(transform) = &rule.value_transform {
        for pv in delta.values_mut() {
            let value = std::mem::take(&mut pv.value);
            pv.value = transform.apply(value);
        }
    }

    let context = delta.context.clone();
    let updates = delta.updates.len();
    sink.send(delta)?;
    debug!(rule = %rule.id, context = %context, updates, "delta delivered");
    Ok(())
}

/// Sink that keeps every delta in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    deltas: Mutex<Vec<Delta>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything received so far.
    pub fn take(&self) -> Vec<Delta> {
        std::mem::take(&mut *self.deltas.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn len(&self) -> usize {
        self.deltas.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DeliverySink for MemorySink {
    fn send(&self, delta: Delta) -> Result<(), SinkError> {
        self.deltas
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(delta);
        Ok(())
    }
}

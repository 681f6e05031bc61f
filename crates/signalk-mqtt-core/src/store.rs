//! Rule store.
//!
//! Holds the live rule set as an immutable snapshot behind an [`ArcSwap`].
//! Readers take one snapshot per message and never observe a partially
//! edited list; writers compile a complete replacement and swap it in.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::info;

use crate::identity::VesselIdentity;
use crate::matcher::{RuleSet, RuleSetError};
use crate::rule::ImportRule;

/// A compiled rule set plus the edit generation that produced it.
#[derive(Debug)]
pub struct RuleSnapshot {
    pub version: u64,
    pub rules: RuleSet,
}

impl std::ops::Deref for RuleSnapshot {
    type Target = RuleSet;

    fn deref(&self) -> &RuleSet {
        &self.rules
    }
}

/// The ordered, swappable collection of import rules.
#[derive(Debug)]
pub struct RuleStore {
    snapshot: ArcSwap<RuleSnapshot>,
    next_version: AtomicU64,
    prefix: Option<String>,
    identity: Option<VesselIdentity>,
}

impl RuleStore {
    /// Compile `rules` and create a store holding them.
    pub fn new(
        rules: Vec<ImportRule>,
        prefix: Option<&str>,
        identity: Option<VesselIdentity>,
    ) -> Result<Self, RuleSetError> {
        let prefix = prefix.filter(|p| !p.is_empty()).map(String::from);
        let compiled = RuleSet::compile(rules, prefix.as_deref(), identity.as_ref())?;
        Ok(Self {
            snapshot: ArcSwap::from_pointee(RuleSnapshot {
                version: 0,
                rules: compiled,
            }),
            next_version: AtomicU64::new(1),
            prefix,
            identity,
        })
    }

    /// The current snapshot.
    pub fn load(&self) -> Arc<RuleSnapshot> {
        self.snapshot.load_full()
    }

    /// Validate and compile a replacement list without installing it.
    pub fn compile(&self, rules: Vec<ImportRule>) -> Result<RuleSet, RuleSetError> {
        RuleSet::compile(rules, self.prefix.as_deref(), self.identity.as_ref())
    }

    /// Install a compiled rule set, returning the new snapshot.
    pub fn install(&self, rules: RuleSet) -> Arc<RuleSnapshot> {
        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        let snapshot = Arc::new(RuleSnapshot { version, rules });
        self.snapshot.store(Arc::clone(&snapshot));
        info!(
            version,
            rules = snapshot.len(),
            enabled = snapshot.enabled_count(),
            "rule set installed"
        );
        snapshot
    }

    /// Compile and install in one step. On error the store is unchanged.
    pub fn replace(&self, rules: Vec<ImportRule>) -> Result<Arc<RuleSnapshot>, RuleSetError> {
        let compiled = self.compile(rules)?;
        Ok(self.install(compiled))
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn identity(&self) -> Option<&VesselIdentity> {
        self.identity.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::default_rules;

    #[test]
    fn test_replace_swaps_whole_set() {
        let store = RuleStore::new(default_rules(), None, None).unwrap();
        let before = store.load();
        assert_eq!(before.version, 0);
        assert_eq!(before.len(), 5);

        let after = store
            .replace(vec![ImportRule::new("only", "sensors/#")])
            .unwrap();
        assert_eq!(after.version, 1);
        assert_eq!(store.load().len(), 1);

        // Old snapshots stay intact for readers that still hold them.
        assert_eq!(before.len(), 5);
        assert!(before.find_rule("vessels/a/navigation/x").is_some());
        assert!(store.load().find_rule("vessels/a/navigation/x").is_none());
    }

    #[test]
    fn test_invalid_replacement_leaves_store_unchanged() {
        let store = RuleStore::new(default_rules(), None, None).unwrap();
        let err = store.replace(vec![
            ImportRule::new("a", "x/#"),
            ImportRule::new("a", "y/#"),
        ]);
        assert!(err.is_err());

        let current = store.load();
        assert_eq!(current.version, 0);
        assert_eq!(current.to_rules(), default_rules());
    }

    #[test]
    fn test_prefix_applied_to_compiled_rules() {
        let store = RuleStore::new(default_rules(), Some("boat1"), None).unwrap();
        assert_eq!(store.prefix(), Some("boat1"));
        assert!(store
            .load()
            .find_rule("boat1/vessels/a/navigation/position")
            .is_some());

        let empty = RuleStore::new(default_rules(), Some(""), None).unwrap();
        assert_eq!(empty.prefix(), None);
    }
}

//! Subscription planning.
//!
//! Turns the enabled import rules into the concrete set of topic filters the
//! transport subscribes to. Filters are kept in a `BTreeSet` so the plan is
//! deduplicated and its order does not depend on rule order.

use std::collections::BTreeSet;

use crate::identity::VesselIdentity;
use crate::rule::ImportRule;
use crate::topic::{apply_prefix, self_alias_variants, swap_identifier_literals, Addressing};

/// Filters needed to receive every topic a single rule pattern can match.
pub fn filters_for_pattern(
    pattern: &str,
    prefix: Option<&str>,
    identity: Option<&VesselIdentity>,
) -> Vec<String> {
    let full = apply_prefix(prefix, pattern);

    if let Some(variants) = self_alias_variants(&full, identity) {
        return variants;
    }

    let mut filters = vec![full.clone()];
    if let Some(canonical) = swap_identifier_literals(&full, Addressing::ToCanonical) {
        filters.push(canonical);
    }
    filters
}

/// Compute the full subscription plan for a rule list. Disabled rules
/// contribute nothing.
pub fn plan_subscriptions<'a>(
    rules: impl IntoIterator<Item = &'a ImportRule>,
    prefix: Option<&str>,
    identity: Option<&VesselIdentity>,
) -> BTreeSet<String> {
    rules
        .into_iter()
        .filter(|rule| rule.enabled)
        .flat_map(|rule| filters_for_pattern(&rule.topic_pattern, prefix, identity))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::default_rules;
    use pretty_assertions::assert_eq;

    fn identity() -> VesselIdentity {
        VesselIdentity::new("urn:mrn:imo:mmsi:111222333").unwrap()
    }

    #[test]
    fn test_self_alias_expands_to_both_forms() {
        let rules = vec![ImportRule::new("own", "vessels/self/navigation/speedOverGround")];
        let plan = plan_subscriptions(&rules, None, Some(&identity()));

        assert_eq!(
            plan.into_iter().collect::<Vec<_>>(),
            vec![
                "vessels/self/navigation/speedOverGround",
                "vessels/urn:mrn:imo:mmsi:111222333/navigation/speedOverGround",
                "vessels/urn_mrn_imo_mmsi_111222333/navigation/speedOverGround",
            ]
        );
    }

    #[test]
    fn test_identity_without_colon_has_no_transport_filter() {
        let rules = vec![ImportRule::new("own", "vessels/self/#")];
        let boat = VesselIdentity::new("myboat").unwrap();
        let plan = plan_subscriptions(&rules, None, Some(&boat));

        assert_eq!(
            plan.into_iter().collect::<Vec<_>>(),
            vec!["vessels/myboat/#", "vessels/self/#"]
        );
    }

    #[test]
    fn test_transport_literal_adds_canonical_filter() {
        let rules = vec![ImportRule::new(
            "other",
            "vessels/urn_mrn_imo_mmsi_368396230/navigation/#",
        )];
        let plan = plan_subscriptions(&rules, None, Some(&identity()));

        assert!(plan.contains("vessels/urn_mrn_imo_mmsi_368396230/navigation/#"));
        assert!(plan.contains("vessels/urn:mrn:imo:mmsi:368396230/navigation/#"));
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_prefix_and_disabled_rules() {
        let plan = plan_subscriptions(&default_rules(), Some("boat1"), None);
        assert_eq!(
            plan.into_iter().collect::<Vec<_>>(),
            vec![
                "boat1/vessels/+/#",
                "boat1/vessels/+/environment/#",
                "boat1/vessels/+/navigation/#",
            ]
        );
    }

    #[test]
    fn test_duplicate_filters_collapse() {
        let rules = vec![
            ImportRule::new("a", "vessels/+/#"),
            ImportRule::new("b", "vessels/+/#"),
        ];
        assert_eq!(plan_subscriptions(&rules, None, None).len(), 1);
    }

    #[test]
    fn test_self_alias_without_identity() {
        let rules = vec![ImportRule::new("own", "vessels/self/#")];
        let plan = plan_subscriptions(&rules, None, None);
        assert_eq!(plan.into_iter().collect::<Vec<_>>(), vec!["vessels/self/#"]);
    }
}

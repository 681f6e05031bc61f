//! Rule matching with vessel exclusion.
//!
//! A [`RuleSet`] is the compiled form of an ordered rule list: every pattern
//! is expanded into its addressing variants and parsed once, and every
//! exclusion list is parsed once. Matching walks the rules in list order and
//! selects the first enabled rule that matches and does not exclude the
//! message. Rules that match but exclude the sending vessel are skipped and
//! reported, so a later rule still gets a chance.

use std::collections::HashSet;

use tracing::debug;

use crate::identity::{extract_numeric_id, VesselIdentity};
use crate::rule::ImportRule;
use crate::topic::{
    apply_prefix, self_alias_variants, strip_prefix, swap_identifier_literals, Addressing,
    PatternError, TopicPattern, VESSELS_SEGMENT,
};

/// Errors that make a rule list unusable.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleSetError {
    #[error("duplicate rule id: {0}")]
    DuplicateId(String),
    #[error("rule has an empty id")]
    EmptyId,
    #[error("rule '{id}': {source}")]
    InvalidPattern {
        id: String,
        #[source]
        source: PatternError,
    },
    #[error("rule '{id}': {source}")]
    InvalidTransform {
        id: String,
        #[source]
        source: crate::transform::TransformError,
    },
}

/// A rule together with its precompiled patterns and exclusion set.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    rule: ImportRule,
    variants: Vec<TopicPattern>,
    excluded: HashSet<String>,
}

impl CompiledRule {
    fn compile(
        rule: ImportRule,
        prefix: Option<&str>,
        identity: Option<&VesselIdentity>,
    ) -> Result<Self, RuleSetError> {
        let invalid = |source| RuleSetError::InvalidPattern {
            id: rule.id.clone(),
            source,
        };

        // Validate the pattern as written before any expansion.
        TopicPattern::new(&rule.topic_pattern).map_err(invalid)?;

        let mut variants: Vec<TopicPattern> = Vec::new();
        for text in pattern_variants(&rule.topic_pattern, prefix, identity) {
            if variants.iter().any(|v| v.as_str() == text) {
                continue;
            }
            variants.push(TopicPattern::new(&text).map_err(invalid)?);
        }

        if let Some(transform) = &rule.value_transform {
            transform
                .validate()
                .map_err(|source| RuleSetError::InvalidTransform {
                    id: rule.id.clone(),
                    source,
                })?;
        }

        let excluded = rule.excluded_identifiers();
        Ok(Self {
            rule,
            variants,
            excluded,
        })
    }

    pub fn rule(&self) -> &ImportRule {
        &self.rule
    }

    /// The patterns this rule matches against, prefix included.
    pub fn variants(&self) -> impl Iterator<Item = &str> {
        self.variants.iter().map(TopicPattern::as_str)
    }

    fn match_topic(&self, topic: &str) -> Option<Option<String>> {
        self.variants
            .iter()
            .find_map(|pattern| pattern.matches(topic))
            .map(|m| m.multi_level)
    }

    /// True if the vessel addressed by `topic` is on this rule's exclusion list.
    pub fn is_excluded(&self, topic: &str, prefix: Option<&str>) -> bool {
        is_excluded(topic, &self.excluded, prefix)
    }
}

/// Every pattern text a rule must be tried against.
fn pattern_variants(
    pattern: &str,
    prefix: Option<&str>,
    identity: Option<&VesselIdentity>,
) -> Vec<String> {
    let full = apply_prefix(prefix, pattern);
    if let Some(variants) = self_alias_variants(&full, identity) {
        return variants;
    }

    let mut variants = vec![full.clone()];
    variants.extend(swap_identifier_literals(&full, Addressing::ToCanonical));
    variants.extend(swap_identifier_literals(&full, Addressing::ToTransport));
    variants
}

/// The vessel level of a topic (`vessels/<id>/...`), prefix removed.
pub fn vessel_segment<'a>(topic: &'a str, prefix: Option<&str>) -> Option<&'a str> {
    let mut levels = strip_prefix(prefix, topic).split('/');
    match (levels.next(), levels.next()) {
        (Some(VESSELS_SEGMENT), Some(vessel)) => Some(vessel),
        _ => None,
    }
}

/// Exclusion check: the topic's vessel MMSI is in `excluded`.
///
/// Topics without a vessel level, or whose vessel level carries no MMSI,
/// are never excluded.
pub fn is_excluded(topic: &str, excluded: &HashSet<String>, prefix: Option<&str>) -> bool {
    if excluded.is_empty() {
        return false;
    }
    vessel_segment(topic, prefix)
        .and_then(extract_numeric_id)
        .is_some_and(|mmsi| excluded.contains(&mmsi))
}

/// The rule selected for a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch<'a> {
    pub rule: &'a ImportRule,
    /// Ids of earlier rules that matched but excluded the vessel.
    pub excluded: Vec<&'a str>,
    /// Levels consumed by the pattern's trailing `#`, if it has one.
    pub capture: Option<String>,
}

/// Result of scanning the rule list for one topic.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Scan<'a> {
    pub selected: Option<RuleMatch<'a>>,
    /// Ids of rules that matched but excluded the vessel.
    pub excluded: Vec<&'a str>,
}

/// A compiled, immutable rule list.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
    prefix: Option<String>,
    identity: Option<VesselIdentity>,
}

impl RuleSet {
    /// Validate and compile a rule list.
    ///
    /// Rejects duplicate or empty ids, malformed patterns and invalid
    /// transforms. Disabled rules are validated too.
    pub fn compile(
        rules: Vec<ImportRule>,
        prefix: Option<&str>,
        identity: Option<&VesselIdentity>,
    ) -> Result<Self, RuleSetError> {
        let prefix = prefix.filter(|p| !p.is_empty());
        let mut seen = HashSet::new();
        let mut compiled = Vec::with_capacity(rules.len());

        for rule in rules {
            if rule.id.is_empty() {
                return Err(RuleSetError::EmptyId);
            }
            if !seen.insert(rule.id.clone()) {
                return Err(RuleSetError::DuplicateId(rule.id));
            }
            compiled.push(CompiledRule::compile(rule, prefix, identity)?);
        }

        Ok(Self {
            rules: compiled,
            prefix: prefix.map(String::from),
            identity: identity.cloned(),
        })
    }

    /// The rules in list order.
    pub fn rules(&self) -> impl Iterator<Item = &ImportRule> {
        self.rules.iter().map(CompiledRule::rule)
    }

    /// The compiled rules in list order.
    pub fn compiled(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Clone the rule list, e.g. for persistence or the API.
    pub fn to_rules(&self) -> Vec<ImportRule> {
        self.rules().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn enabled_count(&self) -> usize {
        self.rules().filter(|r| r.enabled).count()
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn identity(&self) -> Option<&VesselIdentity> {
        self.identity.as_ref()
    }

    /// Walk the enabled rules in order and pick the first one that matches
    /// `topic` without excluding its vessel.
    pub fn scan(&self, topic: &str) -> Scan<'_> {
        let prefix = self.prefix();
        let mut excluded = Vec::new();

        for compiled in self.rules.iter().filter(|c| c.rule.enabled) {
            let Some(capture) = compiled.match_topic(topic) else {
                continue;
            };

            if compiled.is_excluded(topic, prefix) {
                debug!(topic, rule = %compiled.rule.id, "vessel excluded by rule");
                excluded.push(compiled.rule.id.as_str());
                continue;
            }

            return Scan {
                selected: Some(RuleMatch {
                    rule: &compiled.rule,
                    excluded: excluded.clone(),
                    capture,
                }),
                excluded,
            };
        }

        Scan {
            selected: None,
            excluded,
        }
    }

    /// The first applicable rule for `topic`, if any.
    pub fn find_rule(&self, topic: &str) -> Option<RuleMatch<'_>> {
        self.scan(topic).selected
    }
}

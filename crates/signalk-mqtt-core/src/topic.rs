//! MQTT topic patterns and their addressing variants.
//!
//! Topics are `/`-separated. Patterns may use `+` for exactly one level and a
//! trailing `#` for one or more remaining levels. Matching is segment based
//! and compiled once per rule set rather than per message.
//!
//! A rule written against one addressing convention must also catch topics
//! published in the other one, so every rule pattern expands into a small
//! set of variants: the `vessels/self` alias resolved to the local identity
//! in both forms, or identifier literals swapped between `urn:` and `urn_`.

use crate::identity::{
    is_canonical_literal, is_transport_literal, to_canonical_form, to_transport_form,
    VesselIdentity,
};

/// Topic segment naming the vessel collection.
pub const VESSELS_SEGMENT: &str = "vessels";

/// Topic segment standing for the local vessel.
pub const SELF_ALIAS: &str = "self";

const SINGLE_LEVEL: &str = "+";
const MULTI_LEVEL: &str = "#";

/// A segment in a topic pattern.
#[derive(Debug, Clone, PartialEq)]
enum PatternSegment {
    Literal(String),
    /// `+`: exactly one non-empty level
    SingleLevel,
}

/// A compiled topic pattern.
#[derive(Debug, Clone)]
pub struct TopicPattern {
    raw: String,
    segments: Vec<PatternSegment>,
    /// True if the pattern ends with `#`
    multi_level: bool,
}

/// Result of a successful match.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TopicMatch {
    /// Levels consumed by a trailing `#`, joined with `/`.
    pub multi_level: Option<String>,
}

impl TopicPattern {
    /// Compile a pattern.
    ///
    /// `+` and `#` must each occupy a whole level, and `#` may only appear
    /// as the last level.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        if pattern.is_empty() {
            return Err(PatternError::EmptyPattern);
        }

        let parts: Vec<&str> = pattern.split('/').collect();
        let last = parts.len() - 1;
        let mut segments = Vec::with_capacity(parts.len());
        let mut multi_level = false;

        for (i, part) in parts.iter().enumerate() {
            match *part {
                MULTI_LEVEL if i == last => multi_level = true,
                MULTI_LEVEL => {
                    return Err(PatternError::MultiLevelNotLast(pattern.to_string()));
                }
                SINGLE_LEVEL => segments.push(PatternSegment::SingleLevel),
                p if p.contains(MULTI_LEVEL) || p.contains(SINGLE_LEVEL) => {
                    return Err(PatternError::PartialWildcard(pattern.to_string()));
                }
                p => segments.push(PatternSegment::Literal(p.to_string())),
            }
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
            multi_level,
        })
    }

    /// Get the raw pattern string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True if the pattern contains `+` or `#`.
    pub fn has_wildcard(&self) -> bool {
        self.multi_level || self.segments.contains(&PatternSegment::SingleLevel)
    }

    /// Whether the pattern ends with `#`.
    pub fn is_multi_level(&self) -> bool {
        self.multi_level
    }

    /// Match a topic against this pattern.
    pub fn matches(&self, topic: &str) -> Option<TopicMatch> {
        if !self.has_wildcard() {
            return (topic == self.raw).then(TopicMatch::default);
        }

        let levels: Vec<&str> = topic.split('/').collect();

        if self.multi_level {
            // `#` needs at least one level of its own
            if levels.len() <= self.segments.len() {
                return None;
            }
        } else if levels.len() != self.segments.len() {
            return None;
        }

        for (segment, level) in self.segments.iter().zip(levels.iter()) {
            match segment {
                PatternSegment::Literal(lit) => {
                    if lit != level {
                        return None;
                    }
                }
                PatternSegment::SingleLevel => {
                    if level.is_empty() {
                        return None;
                    }
                }
            }
        }

        Some(TopicMatch {
            multi_level: self
                .multi_level
                .then(|| levels[self.segments.len()..].join("/")),
        })
    }
}

/// Errors that can occur when compiling a topic pattern.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatternError {
    #[error("Empty pattern")]
    EmptyPattern,
    #[error("'#' must be the last level: {0}")]
    MultiLevelNotLast(String),
    #[error("wildcards must occupy a whole level: {0}")]
    PartialWildcard(String),
}

/// Prepend the global topic prefix, if any.
pub fn apply_prefix(prefix: Option<&str>, pattern: &str) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}/{pattern}"),
        _ => pattern.to_string(),
    }
}

/// Remove the global topic prefix from an incoming topic, if present.
pub fn strip_prefix<'a>(prefix: Option<&str>, topic: &'a str) -> &'a str {
    match prefix {
        Some(prefix) if !prefix.is_empty() => topic
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(topic),
        _ => topic,
    }
}

/// Position of the `self` level that directly follows a `vessels` level.
fn self_alias_index(levels: &[&str]) -> Option<usize> {
    levels
        .windows(2)
        .position(|w| w[0] == VESSELS_SEGMENT && w[1] == SELF_ALIAS)
        .map(|i| i + 1)
}

/// True if the pattern addresses the local vessel through the `self` alias.
pub fn has_self_alias(pattern: &str) -> bool {
    let levels: Vec<&str> = pattern.split('/').collect();
    self_alias_index(&levels).is_some()
}

fn replace_level(pattern: &str, index: usize, replacement: &str) -> String {
    pattern
        .split('/')
        .enumerate()
        .map(|(i, level)| if i == index { replacement } else { level })
        .collect::<Vec<_>>()
        .join("/")
}

/// Variants of a pattern that uses the `self` alias: the literal alias, the
/// canonical identity, and the transport form when it differs.
///
/// Returns `None` when the pattern has no alias. Without a known identity
/// only the literal form is returned.
pub fn self_alias_variants(pattern: &str, identity: Option<&VesselIdentity>) -> Option<Vec<String>> {
    let levels: Vec<&str> = pattern.split('/').collect();
    let index = self_alias_index(&levels)?;

    let mut variants = vec![pattern.to_string()];
    if let Some(identity) = identity {
        variants.push(replace_level(pattern, index, identity.canonical()));
        if identity.has_transport_variant() {
            variants.push(replace_level(pattern, index, &identity.transport_form()));
        }
    }
    Some(variants)
}

/// Direction of an identifier-literal swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    /// `urn_...` levels rewritten as `urn:...`
    ToCanonical,
    /// `urn:...` levels rewritten as `urn_...`
    ToTransport,
}

/// Rewrite every identifier literal in the pattern into the other addressing
/// form. Returns `None` if the pattern holds no literal of the source form.
pub fn swap_identifier_literals(pattern: &str, direction: Addressing) -> Option<String> {
    let mut swapped = false;
    let levels: Vec<String> = pattern
        .split('/')
        .map(|level| match direction {
            Addressing::ToCanonical if is_transport_literal(level) => {
                swapped = true;
                to_canonical_form(level)
            }
            Addressing::ToTransport if is_canonical_literal(level) => {
                swapped = true;
                to_transport_form(level)
            }
            _ => level.to_string(),
        })
        .collect();

    swapped.then(|| levels.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_pattern() {
        let pattern = TopicPattern::new("vessels/self/navigation/speedOverGround").unwrap();
        assert!(!pattern.has_wildcard());
        assert!(pattern
            .matches("vessels/self/navigation/speedOverGround")
            .is_some());
        assert!(pattern.matches("vessels/self/navigation").is_none());
        assert!(pattern
            .matches("vessels/self/navigation/speedOverGround/x")
            .is_none());
    }

    #[test]
    fn test_single_level_wildcard() {
        let pattern = TopicPattern::new("vessels/+/navigation/speedOverGround").unwrap();
        assert!(pattern
            .matches("vessels/urn:mrn:imo:mmsi:1/navigation/speedOverGround")
            .is_some());
        assert!(pattern
            .matches("vessels/a/b/navigation/speedOverGround")
            .is_none());
        assert!(pattern.matches("vessels//navigation/speedOverGround").is_none());
        assert!(pattern
            .matches("prefix/vessels/a/navigation/speedOverGround")
            .is_none());
    }

    #[test]
    fn test_multi_level_wildcard_captures_tail() {
        let pattern = TopicPattern::new("vessels/+/navigation/#").unwrap();
        let m = pattern
            .matches("vessels/urn:mrn:imo:mmsi:368396230/navigation/position")
            .unwrap();
        assert_eq!(m.multi_level.as_deref(), Some("position"));

        let m = pattern
            .matches("vessels/x/navigation/course/rhumbline/nextPoint")
            .unwrap();
        assert_eq!(m.multi_level.as_deref(), Some("course/rhumbline/nextPoint"));

        assert!(pattern.matches("vessels/x/navigation").is_none());
        assert!(pattern.matches("vessels/x/environment/wind").is_none());
    }

    #[test]
    fn test_lone_hash() {
        let pattern = TopicPattern::new("#").unwrap();
        assert!(pattern.matches("anything").is_some());
        assert!(pattern.matches("a/b/c").is_some());
    }

    #[test]
    fn test_invalid_patterns() {
        assert_eq!(TopicPattern::new("").unwrap_err(), PatternError::EmptyPattern);
        assert!(matches!(
            TopicPattern::new("vessels/#/navigation"),
            Err(PatternError::MultiLevelNotLast(_))
        ));
        assert!(matches!(
            TopicPattern::new("vessels/nav+"),
            Err(PatternError::PartialWildcard(_))
        ));
    }

    #[test]
    fn test_prefix_handling() {
        assert_eq!(apply_prefix(Some("boat1"), "vessels/+/#"), "boat1/vessels/+/#");
        assert_eq!(apply_prefix(Some(""), "vessels/+/#"), "vessels/+/#");
        assert_eq!(apply_prefix(None, "vessels/+/#"), "vessels/+/#");

        assert_eq!(strip_prefix(Some("boat1"), "boat1/vessels/self/x"), "vessels/self/x");
        assert_eq!(strip_prefix(Some("boat1"), "boat10/vessels/self/x"), "boat10/vessels/self/x");
        assert_eq!(strip_prefix(None, "vessels/self/x"), "vessels/self/x");
    }

    #[test]
    fn test_self_alias_variants() {
        let id = VesselIdentity::new("urn:mrn:imo:mmsi:111222333").unwrap();
        let variants = self_alias_variants("vessels/self/navigation/#", Some(&id)).unwrap();
        assert_eq!(
            variants,
            vec![
                "vessels/self/navigation/#",
                "vessels/urn:mrn:imo:mmsi:111222333/navigation/#",
                "vessels/urn_mrn_imo_mmsi_111222333/navigation/#",
            ]
        );

        let plain = VesselIdentity::new("myboat").unwrap();
        let variants = self_alias_variants("vessels/self/#", Some(&plain)).unwrap();
        assert_eq!(variants, vec!["vessels/self/#", "vessels/myboat/#"]);

        assert_eq!(
            self_alias_variants("vessels/self/#", None).unwrap(),
            vec!["vessels/self/#"]
        );
        assert!(self_alias_variants("vessels/+/#", Some(&id)).is_none());
        assert!(self_alias_variants("self/navigation", Some(&id)).is_none());
    }

    #[test]
    fn test_swap_identifier_literals() {
        assert_eq!(
            swap_identifier_literals(
                "vessels/urn_mrn_imo_mmsi_368396230/navigation/speed_over_ground",
                Addressing::ToCanonical
            )
            .as_deref(),
            Some("vessels/urn:mrn:imo:mmsi:368396230/navigation/speed_over_ground")
        );
        assert_eq!(
            swap_identifier_literals(
                "vessels/urn:mrn:imo:mmsi:368396230/#",
                Addressing::ToTransport
            )
            .as_deref(),
            Some("vessels/urn_mrn_imo_mmsi_368396230/#")
        );
        assert!(swap_identifier_literals("vessels/+/#", Addressing::ToCanonical).is_none());
    }
}

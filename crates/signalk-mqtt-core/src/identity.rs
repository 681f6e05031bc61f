//! Vessel identifier normalization.
//!
//! Signal K names vessels with colon-delimited URNs
//! (`urn:mrn:imo:mmsi:368396230`). Colons are awkward in MQTT topics, so
//! publishers often use an underscore-delimited transport form
//! (`urn_mrn_imo_mmsi_368396230`). The helpers here convert between the two
//! and pull the MMSI out of either.

use std::sync::OnceLock;

use regex::Regex;

fn mmsi_regex() -> Option<&'static Regex> {
    static MMSI: OnceLock<Option<Regex>> = OnceLock::new();
    MMSI.get_or_init(|| Regex::new(r"(?i)urn[_:]+mrn[_:]+imo[_:]+mmsi[_:]+([0-9]+)").ok())
        .as_ref()
}

/// Convert a canonical identifier to its transport form (every `:` becomes `_`).
pub fn to_transport_form(identity: &str) -> String {
    identity.replace(':', "_")
}

/// Convert a transport-form identifier back to canonical form (every `_` becomes `:`).
pub fn to_canonical_form(transport: &str) -> String {
    transport.replace('_', ":")
}

/// Extract the numeric MMSI from an identifier in either form.
///
/// Returns `None` for empty or malformed identifiers.
pub fn extract_numeric_id(identifier: &str) -> Option<String> {
    mmsi_regex()?
        .captures(identifier)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// True if a topic segment looks like a transport-form identifier (`urn_...`).
pub fn is_transport_literal(segment: &str) -> bool {
    segment
        .get(..4)
        .is_some_and(|head| head.eq_ignore_ascii_case("urn_"))
        && !segment.contains(':')
}

/// True if a topic segment looks like a canonical identifier (`urn:...`).
pub fn is_canonical_literal(segment: &str) -> bool {
    segment
        .get(..4)
        .is_some_and(|head| head.eq_ignore_ascii_case("urn:"))
}

/// The local vessel's identity, resolved once at startup.
///
/// Only the canonical form is stored; the transport form is derived on
/// demand so the two can never drift apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VesselIdentity {
    canonical: String,
}

impl VesselIdentity {
    /// Wrap a canonical identifier. A `vessels.` prefix is stripped and an
    /// empty identifier yields `None`.
    pub fn new(identity: &str) -> Option<Self> {
        let trimmed = identity.trim();
        let canonical = trimmed.strip_prefix("vessels.").unwrap_or(trimmed);
        if canonical.is_empty() {
            return None;
        }
        Some(Self {
            canonical: canonical.to_string(),
        })
    }

    /// Identity built from an MMSI (`urn:mrn:imo:mmsi:<mmsi>`).
    pub fn from_mmsi(mmsi: &str) -> Option<Self> {
        let mmsi = mmsi.trim();
        if mmsi.is_empty() || !mmsi.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Self::new(&format!("urn:mrn:imo:mmsi:{mmsi}"))
    }

    /// The colon-delimited form.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// The underscore-delimited form.
    pub fn transport_form(&self) -> String {
        to_transport_form(&self.canonical)
    }

    /// Whether the transport form differs from the canonical one.
    pub fn has_transport_variant(&self) -> bool {
        self.canonical.contains(':')
    }

    /// The MMSI embedded in this identity, if any.
    pub fn mmsi(&self) -> Option<String> {
        extract_numeric_id(&self.canonical)
    }

    /// True if `segment` names this vessel in either addressing form.
    pub fn matches_segment(&self, segment: &str) -> bool {
        segment == self.canonical || segment == self.transport_form()
    }
}

impl std::fmt::Display for VesselIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical)
    }
}

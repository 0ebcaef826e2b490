use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::host::Domain;

/// Access decision for a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessDecision {
    /// Navigation proceeds
    Allowed,
    /// Navigation is redirected to the challenge page
    Blocked,
}

impl AccessDecision {
    #[inline]
    pub fn is_blocked(&self) -> bool {
        *self == AccessDecision::Blocked
    }

    #[inline]
    pub fn is_allowed(&self) -> bool {
        *self == AccessDecision::Allowed
    }
}

impl fmt::Display for AccessDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessDecision::Allowed => write!(f, "ALLOWED"),
            AccessDecision::Blocked => write!(f, "BLOCKED"),
        }
    }
}

/// A decision together with why it was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessVerdict {
    /// The normalized domain that was evaluated
    pub domain: Domain,

    pub decision: AccessDecision,

    /// Block list entry contained in the domain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_entry: Option<Domain>,

    /// End of the active exemption, if one applies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exempt_until: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_serialization() {
        let json = serde_json::to_string(&AccessDecision::Blocked).unwrap();
        assert_eq!(json, "\"blocked\"");

        let parsed: AccessDecision = serde_json::from_str("\"allowed\"").unwrap();
        assert_eq!(parsed, AccessDecision::Allowed);
    }

    #[test]
    fn test_verdict_omits_empty_fields() {
        let verdict = AccessVerdict {
            domain: Domain::new("rust-lang.org"),
            decision: AccessDecision::Allowed,
            matched_entry: None,
            exempt_until: None,
        };

        let json = serde_json::to_string(&verdict).unwrap();
        assert!(!json.contains("matched_entry"));
        assert!(!json.contains("exempt_until"));
    }
}

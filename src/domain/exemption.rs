use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::host::Domain;

/// A granted exemption: the domain is allowed until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exemption {
    pub domain: Domain,
    pub expires_at: DateTime<Utc>,
}

/// Mapping from normalized domain to the instant its exemption ends.
///
/// An entry whose expiry is not in the future behaves exactly like a missing
/// entry. Nothing sweeps the table in the background; expired entries are
/// dropped by [`ExemptionTable::prune_expired`] when the table is written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExemptionTable {
    entries: BTreeMap<Domain, DateTime<Utc>>,
}

impl ExemptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw expiry for a domain, whether or not it has passed.
    pub fn expiry(&self, domain: &Domain) -> Option<DateTime<Utc>> {
        self.entries.get(domain).copied()
    }

    /// Expiry for a domain only if it is still in the future at `now`.
    pub fn active_expiry(&self, domain: &Domain, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expiry(domain).filter(|expires_at| *expires_at > now)
    }

    #[inline]
    pub fn is_active(&self, domain: &Domain, now: DateTime<Utc>) -> bool {
        self.active_expiry(domain, now).is_some()
    }

    /// Set the expiry for a domain, replacing any previous value.
    ///
    /// Returns the replaced expiry.
    pub fn insert(&mut self, domain: Domain, expires_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.entries.insert(domain, expires_at)
    }

    /// Remove entries that are no longer active at `now`.
    ///
    /// Returns the number of entries removed.
    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| *expires_at > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Domain, &DateTime<Utc>)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_active_until_expiry() {
        let mut table = ExemptionTable::new();
        let domain = Domain::new("reddit.com");
        table.insert(domain.clone(), t0() + Duration::minutes(30));

        assert!(table.is_active(&domain, t0()));
        assert!(table.is_active(&domain, t0() + Duration::minutes(29)));
        assert!(!table.is_active(&domain, t0() + Duration::minutes(30)));
        assert!(!table.is_active(&domain, t0() + Duration::minutes(31)));
    }

    #[test]
    fn test_insert_replaces() {
        let mut table = ExemptionTable::new();
        let domain = Domain::new("reddit.com");

        table.insert(domain.clone(), t0() + Duration::minutes(10));
        let previous = table.insert(domain.clone(), t0() + Duration::minutes(6));

        assert_eq!(previous, Some(t0() + Duration::minutes(10)));
        assert_eq!(table.expiry(&domain), Some(t0() + Duration::minutes(6)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_prune_expired() {
        let mut table = ExemptionTable::new();
        table.insert(Domain::new("old.example"), t0() - Duration::minutes(1));
        table.insert(Domain::new("edge.example"), t0());
        table.insert(Domain::new("live.example"), t0() + Duration::minutes(1));

        let removed = table.prune_expired(t0());

        assert_eq!(removed, 2);
        assert_eq!(table.len(), 1);
        assert!(table.is_active(&Domain::new("live.example"), t0()));
    }

    #[test]
    fn test_serializes_as_map() {
        let mut table = ExemptionTable::new();
        table.insert(Domain::new("reddit.com"), t0());

        let json = serde_json::to_value(&table).unwrap();
        assert!(json.get("reddit.com").is_some());

        let parsed: ExemptionTable = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, table);
    }
}

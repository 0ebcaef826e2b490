use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::{AccessDecision, AccessVerdict, BlockList, Domain, ExemptionTable};
use crate::error::Result;
use crate::storage::StateStore;

/// Decide access for a domain against an already-read state.
///
/// A domain is blocked when some block list entry is a substring of it and it
/// has no exemption expiring after `now`. Pure: no state is touched.
pub fn decide_with(
    block_list: &BlockList,
    exemptions: &ExemptionTable,
    domain: &Domain,
    now: DateTime<Utc>,
) -> AccessVerdict {
    let matched_entry = block_list.matching_entry(domain).cloned();
    let exempt_until = exemptions.active_expiry(domain, now);

    let decision = if matched_entry.is_some() && exempt_until.is_none() {
        AccessDecision::Blocked
    } else {
        AccessDecision::Allowed
    };

    AccessVerdict {
        domain: domain.clone(),
        decision,
        matched_entry,
        exempt_until,
    }
}

/// Answers "is this domain blocked right now?" from the persisted state.
#[derive(Clone)]
pub struct AccessEngine {
    store: StateStore,
}

impl AccessEngine {
    pub fn new(store: StateStore) -> Self {
        AccessEngine { store }
    }

    /// Evaluate a domain, returning the decision and what it was based on.
    ///
    /// Fails with `StateUnavailable` if the block list or exemptions cannot be
    /// read; the caller chooses how to treat that.
    pub async fn evaluate(&self, domain: &Domain, now: DateTime<Utc>) -> Result<AccessVerdict> {
        let block_list = self.store.block_list().await?;

        // Unlisted domains never need the exemption table.
        if !block_list.is_listed(domain) {
            return Ok(decide_with(&block_list, &ExemptionTable::new(), domain, now));
        }

        let exemptions = self.store.exemptions().await?;
        let verdict = decide_with(&block_list, &exemptions, domain, now);

        debug!(
            domain = %verdict.domain,
            decision = %verdict.decision,
            matched = ?verdict.matched_entry.as_ref().map(Domain::as_str),
            "Access evaluated"
        );

        Ok(verdict)
    }

    pub async fn decide(&self, domain: &Domain, now: DateTime<Utc>) -> Result<AccessDecision> {
        Ok(self.evaluate(domain, now).await?.decision)
    }
}

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::{Domain, Exemption};
use crate::error::{GateError, Result};
use crate::storage::StateStore;

/// Exemption length used when a grant does not name one.
pub const DEFAULT_EXEMPTION_DURATION: Duration = Duration::from_secs(30 * 60);

/// Grants time-boxed exemptions.
///
/// Granting reads the exemption table, merges one entry and writes the table
/// back. All of that runs under a single async lock shared by every clone of
/// the manager, so concurrent grants for different domains cannot overwrite
/// each other's entries.
#[derive(Clone)]
pub struct UnblockManager {
    store: StateStore,
    default_duration: Duration,
    write_lock: Arc<Mutex<()>>,
}

impl UnblockManager {
    pub fn new(store: StateStore) -> Self {
        UnblockManager {
            store,
            default_duration: DEFAULT_EXEMPTION_DURATION,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Override the duration used when a grant does not specify one.
    pub fn with_default_duration(mut self, duration: Duration) -> Self {
        self.default_duration = duration;
        self
    }

    pub fn default_duration(&self) -> Duration {
        self.default_duration
    }

    /// Allow `domain` until `now + duration`, replacing any earlier grant.
    ///
    /// The domain is normalized exactly as the decision engine normalizes the
    /// hosts it evaluates. Expired entries are pruned in the same write.
    pub async fn grant(
        &self,
        domain: &Domain,
        duration: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<Exemption> {
        if domain.is_empty() {
            return Err(GateError::invalid("domain must not be empty"));
        }

        let duration = duration.unwrap_or(self.default_duration);
        let expires_at = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .ok_or_else(|| {
                GateError::invalid(format!("duration of {}ms is out of range", duration.as_millis()))
            })?;

        let _guard = self.write_lock.lock().await;

        let mut table = self.store.exemptions().await?;
        let pruned = table.prune_expired(now);
        let previous = table.insert(domain.clone(), expires_at);
        self.store.set_exemptions(&table).await?;

        if pruned > 0 {
            debug!(pruned, "Pruned expired exemptions");
        }

        info!(
            domain = %domain,
            expires_at = %expires_at,
            duration_ms = duration.as_millis() as u64,
            replaced = previous.is_some(),
            "Exemption granted"
        );

        Ok(Exemption {
            domain: domain.clone(),
            expires_at,
        })
    }
}

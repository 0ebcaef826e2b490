use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::domain::{BlockList, Domain, RequiredReps};
use crate::error::{GateError, Result};
use crate::storage::StateStore;

/// Validated edits to the block list and rep count.
///
/// Invalid input is rejected here, so the store only ever holds a duplicate-free
/// block list and a positive rep count.
#[derive(Clone)]
pub struct SettingsService {
    store: StateStore,
    write_lock: Arc<Mutex<()>>,
}

impl SettingsService {
    pub fn new(store: StateStore) -> Self {
        SettingsService {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn blocked_sites(&self) -> Result<BlockList> {
        self.store.block_list().await
    }

    /// Replace the whole block list.
    pub async fn set_blocked_sites(&self, sites: &[String]) -> Result<BlockList> {
        let list = validate_sites(sites)?;

        let _guard = self.write_lock.lock().await;
        self.store.set_block_list(&list).await?;

        info!(sites = list.len(), "Block list replaced");
        Ok(list)
    }

    /// Append one site. Adding a site that is already listed is rejected.
    pub async fn add_site(&self, site: &str) -> Result<BlockList> {
        let domain = validate_site(site)?;

        let _guard = self.write_lock.lock().await;
        let mut list = self.store.block_list().await?;
        if !list.push(domain.clone()) {
            return Err(GateError::invalid(format!("{} is already blocked", domain)));
        }
        self.store.set_block_list(&list).await?;

        info!(site = %domain, "Site added to block list");
        Ok(list)
    }

    /// Remove one site. Removing a site that is not listed is a no-op.
    pub async fn remove_site(&self, site: &str) -> Result<BlockList> {
        let domain = Domain::new(site);

        let _guard = self.write_lock.lock().await;
        let mut list = self.store.block_list().await?;
        if list.remove(&domain) {
            self.store.set_block_list(&list).await?;
            info!(site = %domain, "Site removed from block list");
        }

        Ok(list)
    }

    pub async fn required_reps(&self) -> Result<RequiredReps> {
        self.store.required_reps().await
    }

    pub async fn set_required_reps(&self, count: i64) -> Result<RequiredReps> {
        let reps = u32::try_from(count)
            .ok()
            .and_then(RequiredReps::new)
            .ok_or_else(|| GateError::invalid(format!("required reps must be positive, got {count}")))?;

        let _guard = self.write_lock.lock().await;
        self.store.set_required_reps(reps).await?;

        info!(required_reps = reps.get(), "Required reps updated");
        Ok(reps)
    }
}

fn validate_site(site: &str) -> Result<Domain> {
    let domain = Domain::new(site);
    if domain.is_empty() {
        return Err(GateError::invalid("blocked site must not be empty"));
    }
    Ok(domain)
}

fn validate_sites(sites: &[String]) -> Result<BlockList> {
    let mut seen = HashSet::new();
    for site in sites {
        let domain = validate_site(site)?;
        if !seen.insert(domain.clone()) {
            return Err(GateError::invalid(format!("duplicate blocked site: {}", domain)));
        }
    }
    Ok(BlockList::new(sites.iter().map(String::as_str)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, SeedState};

    async fn service() -> SettingsService {
        let store = StateStore::new(Arc::new(MemoryStorage::new()), SeedState::defaults());
        store.initialize().await.unwrap();
        SettingsService::new(store)
    }

    #[tokio::test]
    async fn test_defaults_after_initialize() {
        let settings = service().await;

        assert_eq!(settings.blocked_sites().await.unwrap(), BlockList::defaults());
        assert_eq!(settings.required_reps().await.unwrap().get(), 10);
    }

    #[tokio::test]
    async fn test_replace_normalizes_and_keeps_order() {
        let settings = service().await;

        let list = settings
            .set_blocked_sites(&["www.Twitch.tv".to_string(), "reddit.com".to_string()])
            .await
            .unwrap();

        assert_eq!(list.to_strings(), vec!["twitch.tv", "reddit.com"]);
        assert_eq!(settings.blocked_sites().await.unwrap(), list);
    }

    #[tokio::test]
    async fn test_replace_rejects_duplicates_and_empty() {
        let settings = service().await;

        let err = settings
            .set_blocked_sites(&["reddit.com".to_string(), "www.reddit.com".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::InvalidInput(_)));

        let err = settings
            .set_blocked_sites(&["  ".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::InvalidInput(_)));

        // Rejected input never reaches the store.
        assert_eq!(settings.blocked_sites().await.unwrap(), BlockList::defaults());
    }

    #[tokio::test]
    async fn test_add_and_remove_site() {
        let settings = service().await;

        let list = settings.add_site("twitch.tv").await.unwrap();
        assert!(list.contains(&Domain::new("twitch.tv")));

        let err = settings.add_site("www.twitch.tv").await.unwrap_err();
        assert!(matches!(err, GateError::InvalidInput(_)));

        let list = settings.remove_site("twitch.tv").await.unwrap();
        assert!(!list.contains(&Domain::new("twitch.tv")));

        let unchanged = settings.remove_site("never-listed.example").await.unwrap();
        assert_eq!(unchanged, list);
    }

    #[tokio::test]
    async fn test_required_reps_validation() {
        let settings = service().await;

        assert_eq!(settings.set_required_reps(25).await.unwrap().get(), 25);
        assert_eq!(settings.required_reps().await.unwrap().get(), 25);

        for bad in [0, -5] {
            let err = settings.set_required_reps(bad).await.unwrap_err();
            assert!(matches!(err, GateError::InvalidInput(_)));
        }
        assert_eq!(settings.required_reps().await.unwrap().get(), 25);
    }

    #[tokio::test]
    async fn test_concurrent_adds_keep_both_sites() {
        let settings = service().await;

        let (a, b) = tokio::join!(settings.add_site("twitch.tv"), settings.add_site("x.com"));
        a.unwrap();
        b.unwrap();

        let list = settings.blocked_sites().await.unwrap();
        assert!(list.contains(&Domain::new("twitch.tv")));
        assert!(list.contains(&Domain::new("x.com")));
    }
}

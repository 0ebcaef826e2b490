// src/storage/state.rs
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::{BlockList, ExemptionTable, RequiredReps};
use crate::error::{GateError, Result};

use super::traits::Storage;

/// Values written to a store that has never been initialized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedState {
    pub block_list: BlockList,
    pub required_reps: RequiredReps,
}

impl SeedState {
    /// The built-in first-run defaults.
    pub fn defaults() -> Self {
        SeedState {
            block_list: BlockList::defaults(),
            required_reps: RequiredReps::default(),
        }
    }
}

/// Typed access to the persisted gate state.
///
/// Wraps an injected [`Storage`] backend. Every accessor goes to the backend;
/// nothing is cached here, so two handlers never disagree about the state.
#[derive(Clone)]
pub struct StateStore {
    backend: Arc<dyn Storage>,
    seed: Arc<SeedState>,
}

impl StateStore {
    pub fn new(backend: Arc<dyn Storage>, seed: SeedState) -> Self {
        StateStore {
            backend,
            seed: Arc::new(seed),
        }
    }

    /// Seed every value that is absent. Values already present are left alone.
    pub async fn initialize(&self) -> Result<()> {
        if self
            .backend
            .get_blocked_sites()
            .await
            .map_err(GateError::state)?
            .is_none()
        {
            self.seed_block_list().await?;
        }

        if self
            .backend
            .get_required_reps()
            .await
            .map_err(GateError::state)?
            .is_none()
        {
            self.seed_required_reps().await?;
        }

        if self
            .backend
            .get_exemptions()
            .await
            .map_err(GateError::state)?
            .is_none()
        {
            self.backend
                .set_exemptions(&ExemptionTable::new())
                .await
                .map_err(GateError::state)?;
            info!("Seeded empty exemption table");
        }

        Ok(())
    }

    /// Current block list, seeding defaults if it has gone missing.
    pub async fn block_list(&self) -> Result<BlockList> {
        match self.load_block_list().await {
            Err(GateError::ConfigMissing(what)) => {
                warn!(value = what, "Persisted value missing, seeding default");
                self.seed_block_list().await
            }
            other => other,
        }
    }

    /// Current required repetitions, seeding the default if it has gone missing.
    pub async fn required_reps(&self) -> Result<RequiredReps> {
        match self.load_required_reps().await {
            Err(GateError::ConfigMissing(what)) => {
                warn!(value = what, "Persisted value missing, seeding default");
                self.seed_required_reps().await
            }
            other => other,
        }
    }

    /// Current exemption table; absent reads as empty.
    pub async fn exemptions(&self) -> Result<ExemptionTable> {
        Ok(self
            .backend
            .get_exemptions()
            .await
            .map_err(GateError::state)?
            .unwrap_or_default())
    }

    pub async fn set_block_list(&self, list: &BlockList) -> Result<()> {
        self.backend
            .set_blocked_sites(&list.to_strings())
            .await
            .map_err(GateError::state)
    }

    pub async fn set_required_reps(&self, reps: RequiredReps) -> Result<()> {
        self.backend
            .set_required_reps(i64::from(reps.get()))
            .await
            .map_err(GateError::state)
    }

    pub async fn set_exemptions(&self, table: &ExemptionTable) -> Result<()> {
        self.backend
            .set_exemptions(table)
            .await
            .map_err(GateError::state)
    }

    async fn load_block_list(&self) -> Result<BlockList> {
        self.backend
            .get_blocked_sites()
            .await
            .map_err(GateError::state)?
            .map(BlockList::new)
            .ok_or(GateError::ConfigMissing("blocked_sites"))
    }

    async fn load_required_reps(&self) -> Result<RequiredReps> {
        self.backend
            .get_required_reps()
            .await
            .map_err(GateError::state)?
            .map(|stored| RequiredReps::from_stored(Some(stored)))
            .ok_or(GateError::ConfigMissing("required_reps"))
    }

    async fn seed_block_list(&self) -> Result<BlockList> {
        let list = self.seed.block_list.clone();
        self.set_block_list(&list).await?;
        info!(sites = list.len(), "Seeded block list");
        Ok(list)
    }

    async fn seed_required_reps(&self) -> Result<RequiredReps> {
        let reps = self.seed.required_reps;
        self.set_required_reps(reps).await?;
        info!(required_reps = reps.get(), "Seeded required reps");
        Ok(reps)
    }
}

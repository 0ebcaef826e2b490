// src/storage/traits.rs
use async_trait::async_trait;

use crate::domain::ExemptionTable;

/// Persisted key for the block list.
pub const BLOCKED_SITES_KEY: &str = "blocked_sites";

/// Persisted key for the required repetition count.
pub const REQUIRED_REPS_KEY: &str = "required_reps";

/// Persisted key for the exemption table.
pub const EXEMPTIONS_KEY: &str = "exemptions";

/// Storage trait for the gate's persisted state.
///
/// Each getter returns `None` when the value has never been written, which is
/// how first-run seeding is detected. Values are stored as written; callers
/// normalize and validate.
#[async_trait]
pub trait Storage: Send + Sync {
    // Block list
    async fn get_blocked_sites(&self) -> anyhow::Result<Option<Vec<String>>>;
    async fn set_blocked_sites(&self, sites: &[String]) -> anyhow::Result<()>;

    // Required repetitions (signed so a bad stored value can be detected)
    async fn get_required_reps(&self) -> anyhow::Result<Option<i64>>;
    async fn set_required_reps(&self, count: i64) -> anyhow::Result<()>;

    // Exemptions
    async fn get_exemptions(&self) -> anyhow::Result<Option<ExemptionTable>>;
    async fn set_exemptions(&self, table: &ExemptionTable) -> anyhow::Result<()>;
}

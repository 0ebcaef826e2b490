// src/storage/memory.rs
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::domain::ExemptionTable;

use super::traits::Storage;

/// In-memory storage.
///
/// Used for tests and for running without persistence. Reads and writes can
/// be made to fail, and every call can be delayed to widen the window between
/// a read and the write that follows it.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blocked_sites: Mutex<Option<Vec<String>>>,
    required_reps: Mutex<Option<i64>>,
    exemptions: Mutex<Option<ExemptionTable>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    latency_ms: AtomicU64,
    exemption_writes: AtomicU64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read fail (for testing).
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every write fail (for testing).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Delay every call by `latency` (for testing).
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of exemption table writes (for assertions).
    pub fn exemption_writes(&self) -> u64 {
        self.exemption_writes.load(Ordering::SeqCst)
    }

    async fn before_read(&self) -> anyhow::Result<()> {
        self.simulate_latency().await;
        if self.fail_reads.load(Ordering::SeqCst) {
            anyhow::bail!("memory storage read failure");
        }
        Ok(())
    }

    async fn before_write(&self) -> anyhow::Result<()> {
        self.simulate_latency().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("memory storage write failure");
        }
        Ok(())
    }

    async fn simulate_latency(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_blocked_sites(&self) -> anyhow::Result<Option<Vec<String>>> {
        self.before_read().await?;
        Ok(self.blocked_sites.lock().clone())
    }

    async fn set_blocked_sites(&self, sites: &[String]) -> anyhow::Result<()> {
        self.before_write().await?;
        *self.blocked_sites.lock() = Some(sites.to_vec());
        Ok(())
    }

    async fn get_required_reps(&self) -> anyhow::Result<Option<i64>> {
        self.before_read().await?;
        Ok(*self.required_reps.lock())
    }

    async fn set_required_reps(&self, count: i64) -> anyhow::Result<()> {
        self.before_write().await?;
        *self.required_reps.lock() = Some(count);
        Ok(())
    }

    async fn get_exemptions(&self) -> anyhow::Result<Option<ExemptionTable>> {
        self.before_read().await?;
        Ok(self.exemptions.lock().clone())
    }

    async fn set_exemptions(&self, table: &ExemptionTable) -> anyhow::Result<()> {
        self.before_write().await?;
        *self.exemptions.lock() = Some(table.clone());
        self.exemption_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

use ahash::AHasher;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{Domain, RequiredReps};
use crate::error::{GateError, Result};

use super::session::{ChallengeContext, ChallengeSession};

/// Number of shards for the session pool.
/// Must be a power of 2 for fast modulo via bitwise AND.
const NUM_SHARDS: usize = 16;

/// Live challenge sessions, sharded by session id.
///
/// Each session sits behind its own async mutex, so one session's pose call
/// never blocks another's.
pub struct SessionPool {
    shards: Vec<RwLock<HashMap<Uuid, Arc<Mutex<ChallengeSession>>>>>,

    /// Collaborators shared across all sessions
    context: Arc<ChallengeContext>,
}

impl SessionPool {
    pub fn new(context: ChallengeContext) -> Self {
        let shards = (0..NUM_SHARDS)
            .map(|_| RwLock::new(HashMap::new()))
            .collect();

        SessionPool {
            shards,
            context: Arc::new(context),
        }
    }

    pub fn context(&self) -> &ChallengeContext {
        &self.context
    }

    /// Open a new session for `domain`.
    pub fn create(&self, domain: Domain, required: RequiredReps) -> Result<Arc<Mutex<ChallengeSession>>> {
        if domain.is_empty() {
            return Err(GateError::invalid("challenge domain must not be empty"));
        }

        let session = ChallengeSession::new(domain, required);
        let id = session.id();
        let session = Arc::new(Mutex::new(session));

        self.shards[self.shard_index(&id)]
            .write()
            .insert(id, session.clone());

        Ok(session)
    }

    pub fn get(&self, id: Uuid) -> Result<Arc<Mutex<ChallengeSession>>> {
        self.shards[self.shard_index(&id)]
            .read()
            .get(&id)
            .cloned()
            .ok_or(GateError::SessionNotFound(id))
    }

    /// Remove sessions with no recent activity.
    ///
    /// Sessions locked by an in-flight request are in use and are kept.
    /// Returns the number of sessions evicted.
    pub fn evict_idle(&self, idle_threshold_secs: i64) -> usize {
        let mut evicted = 0;

        for shard in &self.shards {
            let mut write_guard = shard.write();
            let before = write_guard.len();

            write_guard.retain(|_, session| match session.try_lock() {
                Ok(session) => !session.is_idle(idle_threshold_secs),
                Err(_) => true,
            });

            evicted += before - write_guard.len();
        }

        evicted
    }

    /// Get the total number of live sessions.
    pub fn session_count(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    #[inline]
    fn shard_index(&self, id: &Uuid) -> usize {
        let mut hasher = AHasher::default();
        id.hash(&mut hasher);
        (hasher.finish() as usize) & (NUM_SHARDS - 1)
    }
}

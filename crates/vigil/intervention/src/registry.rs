use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vigil_types::{CallerId, SessionId};

use crate::error::InterventionError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEntry {
    pub caller: CallerId,
    /// Session whose intervention last extended the block
    pub session_id: SessionId,
    pub blocked_at_ms: u64,
    pub expires_at_ms: u64,
    /// How many interventions have blocked this caller
    pub block_count: u32,
}

impl BlockEntry {
    pub fn is_active(&self, now_ms: u64) -> bool {
        now_ms < self.expires_at_ms
    }

    fn is_consistent(&self, key: &CallerId) -> bool {
        &self.caller == key && self.expires_at_ms >= self.blocked_at_ms && self.block_count > 0
    }
}

/// Process-wide caller block list.
///
/// The only state shared between sessions. Each caller's entry is updated
/// under its own shard lock, so concurrent interventions against different
/// callers never contend and repeated blocks of one caller serialize.
#[derive(Default)]
pub struct CallerBlockRegistry {
    entries: DashMap<CallerId, BlockEntry>,
}

impl CallerBlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block `caller` until at least `now_ms + duration_ms`.
    ///
    /// An existing block is extended, never shortened.
    pub fn block(
        &self,
        caller: &CallerId,
        session_id: SessionId,
        duration_ms: u64,
        now_ms: u64,
    ) -> Result<BlockEntry, InterventionError> {
        let expires_at_ms = now_ms.saturating_add(duration_ms);
        let entry = match self.entries.entry(caller.clone()) {
            Entry::Occupied(mut occupied) => {
                let existing = occupied.get_mut();
                if !existing.is_consistent(caller) {
                    return Err(InterventionError::RegistryCorrupted(format!(
                        "inconsistent block entry for {}",
                        caller
                    )));
                }
                existing.session_id = session_id;
                existing.blocked_at_ms = now_ms;
                existing.expires_at_ms = existing.expires_at_ms.max(expires_at_ms);
                existing.block_count += 1;
                existing.clone()
            }
            Entry::Vacant(vacant) => vacant
                .insert(BlockEntry {
                    caller: caller.clone(),
                    session_id,
                    blocked_at_ms: now_ms,
                    expires_at_ms,
                    block_count: 1,
                })
                .clone(),
        };
        info!(
            caller = %caller,
            session_id = %session_id,
            expires_at_ms = entry.expires_at_ms,
            block_count = entry.block_count,
            "Caller blocked"
        );
        Ok(entry)
    }

    pub fn is_blocked(&self, caller: &CallerId, now_ms: u64) -> bool {
        self.entries
            .get(caller)
            .map(|e| e.is_active(now_ms))
            .unwrap_or(false)
    }

    pub fn get(&self, caller: &CallerId) -> Option<BlockEntry> {
        self.entries.get(caller).map(|e| e.clone())
    }

    pub fn unblock(&self, caller: &CallerId) -> Option<BlockEntry> {
        self.entries.remove(caller).map(|(_, e)| e)
    }

    /// Drop expired blocks. Returns how many were removed.
    pub fn sweep_expired(&self, now_ms: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_active(now_ms));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "Expired caller blocks swept");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn insert_raw(&self, key: CallerId, entry: BlockEntry) {
        self.entries.insert(key, entry);
    }
}

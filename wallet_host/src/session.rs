//! Signer worker pool and signing-session registry.
//!
//! Workers live in an arena of slots addressed by index; sessions hold the
//! index, never the worker object. A session binds one worker, one
//! WrapKeySeed port, and one account for the lifetime of one operation.
//! Termination always terminates the worker (the only reliable way to
//! reclaim its memory wholesale) and schedules a replacement in the slot.

use log::debug;
use std::collections::HashMap;

use crate::config::{SIGNER_POOL_CAPACITY, SIGNING_SESSION_TIMEOUT_MS};
use crate::errors::{WalletError, WalletResult};

#[derive(Debug, Clone, PartialEq)]
enum SlotState {
    Free,
    Reserved { session_id: String },
}

/// Fixed-capacity, non-reentrant slot allocator.
pub struct WorkerPool {
    slots: Vec<SlotState>,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![SlotState::Free; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn available(&self) -> usize {
        self.slots.iter().filter(|s| **s == SlotState::Free).count()
    }

    /// Reserve a free slot for a session. A session id may hold at most one
    /// slot; double reservation is an invariant violation, not a queue.
    pub fn reserve(&mut self, session_id: &str) -> WalletResult<usize> {
        if self.slots.iter().any(
            |s| matches!(s, SlotState::Reserved { session_id: held } if held == session_id),
        ) {
            return Err(WalletError::internal(format!(
                "session {} already holds a worker slot",
                session_id
            )));
        }

        let index = self
            .slots
            .iter()
            .position(|s| *s == SlotState::Free)
            .ok_or_else(|| {
                WalletError::unavailable("all signer workers are busy".to_string())
            })?;

        self.slots[index] = SlotState::Reserved {
            session_id: session_id.to_string(),
        };
        debug!("worker pool: slot {} reserved for {}", index, session_id);
        Ok(index)
    }

    /// Free a slot. Idempotent; the caller terminates the worker and spawns
    /// its replacement.
    pub fn release(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = SlotState::Free;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SigningSession {
    pub session_id: String,
    pub slot_index: usize,
    pub created_at_ms: f64,
    /// One-shot latch: set when the VRF worker has delivered WrapKeySeed
    pub seed_ready: bool,
}

/// All live signing sessions plus the pool they draw workers from.
pub struct SessionRegistry {
    pool: WorkerPool,
    sessions: HashMap<String, SigningSession>,
}

/// A terminated session: the slot whose worker must be terminated (to
/// zeroize) and replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminatedSession {
    pub session_id: String,
    pub slot_index: usize,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            pool: WorkerPool::new(SIGNER_POOL_CAPACITY),
            sessions: HashMap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pool: WorkerPool::new(capacity),
            sessions: HashMap::new(),
        }
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Reserve a worker for a new session. At most one active session per
    /// session id.
    pub fn begin_session(&mut self, session_id: &str, now_ms: f64) -> WalletResult<usize> {
        if self.sessions.contains_key(session_id) {
            return Err(WalletError::Conflict(format!(
                "session {} is already active",
                session_id
            )));
        }
        let slot_index = self.pool.reserve(session_id)?;
        self.sessions.insert(
            session_id.to_string(),
            SigningSession {
                session_id: session_id.to_string(),
                slot_index,
                created_at_ms: now_ms,
                seed_ready: false,
            },
        );
        Ok(slot_index)
    }

    pub fn mark_seed_ready(&mut self, session_id: &str) -> WalletResult<()> {
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| WalletError::invalid_input(format!("no session {}", session_id)))?;
        session.seed_ready = true;
        Ok(())
    }

    pub fn get(&self, session_id: &str) -> Option<&SigningSession> {
        self.sessions.get(session_id)
    }

    /// Release on any terminal outcome (success, cancellation, error).
    pub fn end_session(&mut self, session_id: &str) -> Option<TerminatedSession> {
        let session = self.sessions.remove(session_id)?;
        self.pool.release(session.slot_index);
        debug!("session {} ended; slot {} recycled", session_id, session.slot_index);
        Some(TerminatedSession {
            session_id: session.session_id,
            slot_index: session.slot_index,
        })
    }

    /// Sessions past the 5-minute budget; each is removed and its worker
    /// must be terminated and replaced.
    pub fn expire_sessions(&mut self, now_ms: f64) -> Vec<TerminatedSession> {
        let expired: Vec<String> = self
            .sessions
            .values()
            .filter(|s| now_ms - s.created_at_ms >= SIGNING_SESSION_TIMEOUT_MS)
            .map(|s| s.session_id.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.end_session(&id))
            .collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_hands_out_distinct_slots_up_to_capacity() {
        let mut registry = SessionRegistry::with_capacity(3);
        let a = registry.begin_session("sess-a", 0.0).unwrap();
        let b = registry.begin_session("sess-b", 0.0).unwrap();
        let c = registry.begin_session("sess-c", 0.0).unwrap();

        let mut slots = vec![a, b, c];
        slots.sort();
        assert_eq!(slots, vec![0, 1, 2]);

        // Pool exhausted
        let result = registry.begin_session("sess-d", 0.0);
        assert!(matches!(result, Err(WalletError::Unavailable(_))));
    }

    #[test]
    fn one_active_session_per_session_id() {
        let mut registry = SessionRegistry::with_capacity(3);
        registry.begin_session("sess-a", 0.0).unwrap();
        let result = registry.begin_session("sess-a", 1.0);
        assert!(matches!(result, Err(WalletError::Conflict(_))));
    }

    #[test]
    fn ending_a_session_recycles_its_slot() {
        let mut registry = SessionRegistry::with_capacity(1);
        registry.begin_session("sess-a", 0.0).unwrap();

        let terminated = registry.end_session("sess-a").unwrap();
        assert_eq!(terminated.slot_index, 0);

        // Ending again is a no-op
        assert!(registry.end_session("sess-a").is_none());

        // The slot is reusable
        registry.begin_session("sess-b", 0.0).unwrap();
    }

    #[test]
    fn sessions_expire_after_their_budget() {
        let mut registry = SessionRegistry::with_capacity(2);
        registry.begin_session("sess-old", 0.0).unwrap();
        registry
            .begin_session("sess-new", SIGNING_SESSION_TIMEOUT_MS - 1.0)
            .unwrap();

        let expired = registry.expire_sessions(SIGNING_SESSION_TIMEOUT_MS);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].session_id, "sess-old");
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn seed_ready_latch_is_per_session() {
        let mut registry = SessionRegistry::with_capacity(2);
        registry.begin_session("sess-a", 0.0).unwrap();
        registry.mark_seed_ready("sess-a").unwrap();
        assert!(registry.get("sess-a").unwrap().seed_ready);

        assert!(registry.mark_seed_ready("sess-ghost").is_err());
    }
}

//! Per-session mutual exclusion.
//!
//! Each session id maps to its own async mutex. Holding the guard covers the
//! whole read-compute-write of a transition; dropping it on any exit path
//! releases the session. Distinct sessions never contend. A slot lives only
//! while someone holds or waits on it, so the map stays as small as the set
//! of sessions in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::model::SessionId;

type Slot = Arc<AsyncMutex<()>>;

#[derive(Debug, Default)]
pub struct SessionLocks {
    slots: Mutex<HashMap<SessionId, Slot>>,
}

/// Held while a session is being mutated. Dropping it releases the session
/// and removes its slot when nobody else is waiting.
#[derive(Debug)]
pub struct SessionGuard<'a> {
    locks: &'a SessionLocks,
    id: SessionId,
    slot: Slot,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn acquire(&self, id: SessionId) -> SessionGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(id).or_default())
        };
        let guard = Arc::clone(&slot).lock_owned().await;
        SessionGuard {
            locks: self,
            id,
            slot,
            guard: Some(guard),
        }
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut slots = self.locks.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // The map and this guard are the only owners: no waiter is queued.
        if slots
            .get(&self.id)
            .is_some_and(|slot| Arc::ptr_eq(slot, &self.slot) && Arc::strong_count(slot) == 2)
        {
            slots.remove(&self.id);
        }
    }
}

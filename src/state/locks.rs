//! Per-room critical sections, each holding the room's turn timer handle.

use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};

use dashmap::DashMap;
use tokio::{
    sync::{Mutex, OwnedMutexGuard},
    task::JoinHandle,
};

/// Timer currently scheduled for a room.
#[derive(Debug)]
pub struct ArmedTimer {
    /// Identity of this arming; a fire carrying another id is stale.
    pub id: u64,
    /// `turnsPlayed` the timer was armed for.
    pub turn: u32,
    handle: JoinHandle<()>,
}

/// State guarded by a room's mutex.
#[derive(Debug, Default)]
pub struct RoomSlot {
    timer: Option<ArmedTimer>,
    next_timer_id: u64,
}

impl RoomSlot {
    /// Cancel any pending timer and install the one returned by `spawn`.
    ///
    /// `spawn` receives the id the new timer must present when it fires.
    pub fn arm<F>(&mut self, turn: u32, spawn: F) -> u64
    where
        F: FnOnce(u64) -> JoinHandle<()>,
    {
        self.cancel();
        self.next_timer_id += 1;
        let id = self.next_timer_id;
        let handle = spawn(id);
        self.timer = Some(ArmedTimer { id, turn, handle });
        id
    }

    /// Abort the pending timer, if any. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        match self.timer.take() {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Claim the slot for a firing timer. Succeeds only for the timer still armed
    /// for `turn`; the handle is released without aborting the running task.
    pub fn claim_fire(&mut self, id: u64, turn: u32) -> bool {
        match &self.timer {
            Some(timer) if timer.id == id && timer.turn == turn => {
                self.timer = None;
                true
            }
            _ => false,
        }
    }

    /// `(id, turn)` of the pending timer.
    pub fn pending(&self) -> Option<(u64, u32)> {
        self.timer.as_ref().map(|timer| (timer.id, timer.turn))
    }
}

type Slots = DashMap<String, Arc<Mutex<RoomSlot>>>;

/// Mutexes keyed by room code.
///
/// A slot only outlives its guard while a turn timer is pending or another
/// task holds or waits on it, so unknown and expired codes leave nothing behind.
#[derive(Debug, Default)]
pub struct RoomLocks {
    slots: Arc<Slots>,
}

/// Exclusive access to one room.
pub struct RoomGuard {
    slot: OwnedMutexGuard<RoomSlot>,
    // Declared after `slot` so it runs once the mutex is released.
    evict: EvictIdle,
}

struct EvictIdle {
    code: String,
    slots: Arc<Slots>,
}

impl Drop for EvictIdle {
    fn drop(&mut self) {
        self.slots.remove_if(&self.code, |_, slot| {
            Arc::strong_count(slot) == 1
                && slot.try_lock().is_ok_and(|slot| slot.pending().is_none())
        });
    }
}

impl Deref for RoomGuard {
    type Target = RoomSlot;

    fn deref(&self) -> &RoomSlot {
        &self.slot
    }
}

impl DerefMut for RoomGuard {
    fn deref_mut(&mut self) -> &mut RoomSlot {
        &mut self.slot
    }
}

impl RoomLocks {
    /// Acquire the room's critical section.
    pub async fn lock(&self, code: &str) -> RoomGuard {
        let slot = self
            .slots
            .entry(code.to_owned())
            .or_default()
            .value()
            .clone();
        RoomGuard {
            slot: slot.lock_owned().await,
            evict: EvictIdle {
                code: code.to_owned(),
                slots: self.slots.clone(),
            },
        }
    }

    /// Number of rooms with a slot.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no room has a slot.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

//! Live players keyed by badge id, with one lock per id.
//!
//! Join, leave and every button handler for a badge go through
//! [`Population::lock`], so work on one badge is serialized while different
//! badges proceed concurrently. A slot whose actor has been taken is removed
//! when its lock is dropped; tasks that were queued on the removed slot notice
//! and retry on the fresh one.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::state::actor::{Actor, ActorId};

type Slot = Arc<Mutex<Option<Actor>>>;

/// Live actors, owned by the session.
#[derive(Default)]
pub struct Population {
    slots: DashMap<ActorId, Slot>,
    live: AtomicUsize,
}

impl Population {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wait for exclusive access to the actor stored under `id`, present or not.
    pub async fn lock(self: &Arc<Self>, id: &ActorId) -> ActorLock {
        loop {
            let slot = self
                .slots
                .entry(id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(None)))
                .clone();
            let guard = slot.clone().lock_owned().await;

            let current = self
                .slots
                .get(id)
                .is_some_and(|entry| Arc::ptr_eq(entry.value(), &slot));
            if current {
                return ActorLock {
                    population: Arc::clone(self),
                    id: id.clone(),
                    guard,
                };
            }
            // The previous holder emptied and evicted this slot while we waited.
        }
    }

    /// Ids with a slot; some may be empty by the time they are locked.
    pub fn ids(&self) -> Vec<ActorId> {
        let mut ids: Vec<ActorId> = self.slots.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Number of live actors.
    pub fn len(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive access to one badge's slot.
pub struct ActorLock {
    population: Arc<Population>,
    id: ActorId,
    guard: OwnedMutexGuard<Option<Actor>>,
}

impl ActorLock {
    pub fn id(&self) -> &ActorId {
        &self.id
    }

    pub fn actor(&self) -> Option<&Actor> {
        self.guard.as_ref()
    }

    pub fn actor_mut(&mut self) -> Option<&mut Actor> {
        self.guard.as_mut()
    }

    /// Store `actor`, returning the one it replaces.
    pub fn insert(&mut self, actor: Actor) -> Option<Actor> {
        let previous = self.guard.replace(actor);
        if previous.is_none() {
            self.population.live.fetch_add(1, Ordering::AcqRel);
        }
        previous
    }

    /// Remove the actor; the slot is evicted once the lock is released.
    pub fn take(&mut self) -> Option<Actor> {
        let previous = self.guard.take();
        if previous.is_some() {
            self.population.live.fetch_sub(1, Ordering::AcqRel);
        }
        previous
    }
}

impl Drop for ActorLock {
    fn drop(&mut self) {
        if self.guard.is_some() {
            return;
        }
        let slot = OwnedMutexGuard::mutex(&self.guard);
        self.population
            .slots
            .remove_if(&self.id, |_, current| Arc::ptr_eq(current, slot));
    }
}

//! Reserved-slot tables and the per-thread real-time switch.
//!
//! A provider owns two tables, one for contexts and one for objects. Each
//! slot has a fixed capacity chosen at reservation time. Placing a value
//! into a slot hands out a [`Placed`] lease that frees the slot on drop.
//!
//! Contexts that produce objects (keys, seeds, signatures) hold an
//! [`ObjectFactory`] over the same object table, so their products obey the
//! same placement rules as the provider's own factories.

use std::cell::RefCell;
use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crypt_objects::max_storage_size;
use crypt_types::{
    AlgId, CouidGenerator, CryptoObjectType, ReservedIndex, ReservedObjectIndex, SecurityError,
    SecurityResult,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

static NEXT_ALLOCATOR_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// Allocators the current thread is in real-time mode on.
    ///
    /// The set dies with its thread, so a thread that exits without leaving
    /// real-time mode leaves nothing behind. Allocator ids are never reused.
    static REAL_TIME: RefCell<HashSet<usize>> = RefCell::new(HashSet::new());
}

/// Reservation table a placement targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Pool {
    Contexts,
    Objects,
}

impl Pool {
    fn name(self) -> &'static str {
        match self {
            Self::Contexts => "contexts",
            Self::Objects => "objects",
        }
    }
}

struct Slot {
    capacity: usize,
    occupied: Arc<AtomicBool>,
}

#[derive(Default)]
struct SlotTable {
    slots: Vec<Slot>,
}

impl SlotTable {
    fn reserved_bytes(&self) -> usize {
        self.slots.iter().map(|s| s.capacity).sum()
    }

    fn occupied(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.occupied.load(Ordering::Acquire))
            .count()
    }
}

pub(crate) struct Allocator {
    id: usize,
    budget: usize,
    max_slots: usize,
    contexts: Mutex<SlotTable>,
    objects: Mutex<SlotTable>,
}

impl Allocator {
    pub(crate) fn new(budget: usize, max_slots: usize) -> Self {
        Self {
            id: NEXT_ALLOCATOR_ID.fetch_add(1, Ordering::Relaxed),
            budget,
            max_slots,
            contexts: Mutex::new(SlotTable::default()),
            objects: Mutex::new(SlotTable::default()),
        }
    }

    /// Replace the slots of `pool` with one slot per entry of `capacities`.
    ///
    /// Fails with `BusyResource` while any current slot of the pool is
    /// occupied; the previous reservation then stays in place.
    pub(crate) fn reserve(&self, pool: Pool, capacities: Vec<usize>) -> SecurityResult<()> {
        if capacities.len() > self.max_slots {
            warn!(
                pool = pool.name(),
                requested = capacities.len(),
                limit = self.max_slots,
                "reservation exceeds slot limit"
            );
            return Err(SecurityError::BadAlloc);
        }
        let requested: usize = capacities.iter().sum();

        // Fixed lock order: contexts, then objects.
        let mut contexts = self.contexts.lock();
        let mut objects = self.objects.lock();
        let (target, other) = match pool {
            Pool::Contexts => (&mut *contexts, &*objects),
            Pool::Objects => (&mut *objects, &*contexts),
        };

        if target.occupied() > 0 {
            return Err(SecurityError::BusyResource);
        }
        let total = other.reserved_bytes().saturating_add(requested);
        if total > self.budget {
            warn!(
                pool = pool.name(),
                requested,
                budget = self.budget,
                "reservation exceeds byte budget"
            );
            return Err(SecurityError::InsufficientResource);
        }

        target.slots = capacities
            .into_iter()
            .map(|capacity| Slot {
                capacity,
                occupied: Arc::new(AtomicBool::new(false)),
            })
            .collect();
        info!(
            pool = pool.name(),
            slots = target.slots.len(),
            bytes = requested,
            "reserved slots"
        );
        Ok(())
    }

    /// Claim room for a value of `size` bytes.
    ///
    /// `Heap` never claims a slot and is refused in real-time mode.
    pub(crate) fn place(
        &self,
        pool: Pool,
        index: ReservedIndex,
        size: usize,
    ) -> SecurityResult<Option<SlotLease>> {
        let slot = match index {
            ReservedIndex::Heap => {
                if self.is_real_time() {
                    debug!(pool = pool.name(), "heap placement refused in real-time mode");
                    return Err(SecurityError::BadAlloc);
                }
                return Ok(None);
            }
            ReservedIndex::Slot(slot) => slot,
        };

        let table = match pool {
            Pool::Contexts => self.contexts.lock(),
            Pool::Objects => self.objects.lock(),
        };
        let entry = table
            .slots
            .get(slot)
            .ok_or(SecurityError::UnreservedResource)?;
        if entry.capacity < size {
            debug!(
                pool = pool.name(),
                slot,
                size,
                capacity = entry.capacity,
                "slot too small"
            );
            return Err(SecurityError::InsufficientResource);
        }
        if entry
            .occupied
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SecurityError::BusyResource);
        }
        Ok(Some(SlotLease {
            index: slot,
            occupied: Arc::clone(&entry.occupied),
        }))
    }

    /// Returns `true` if the calling thread was not yet in real-time mode.
    pub(crate) fn enter_real_time(&self) -> bool {
        let entered = REAL_TIME.with(|set| set.borrow_mut().insert(self.id));
        if entered {
            info!("entered real-time mode");
        }
        entered
    }

    /// Returns `true` if the calling thread was in real-time mode.
    pub(crate) fn leave_real_time(&self) -> bool {
        let left = REAL_TIME.with(|set| set.borrow_mut().remove(&self.id));
        if left {
            info!("left real-time mode");
        }
        left
    }

    pub(crate) fn is_real_time(&self) -> bool {
        REAL_TIME.with(|set| set.borrow().contains(&self.id))
    }

    pub(crate) fn reserved_slots(&self, pool: Pool) -> usize {
        match pool {
            Pool::Contexts => self.contexts.lock().slots.len(),
            Pool::Objects => self.objects.lock().slots.len(),
        }
    }

    pub(crate) fn occupied_slots(&self, pool: Pool) -> usize {
        match pool {
            Pool::Contexts => self.contexts.lock().occupied(),
            Pool::Objects => self.objects.lock().occupied(),
        }
    }
}

impl Drop for Allocator {
    fn drop(&mut self) {
        // Other threads drop their entries when they exit.
        let _ = REAL_TIME.try_with(|set| set.borrow_mut().remove(&self.id));
    }
}

// ---------------------------------------------------------------------------
// Object placement for contexts
// ---------------------------------------------------------------------------

/// Identity source and object table a context places its products into.
#[derive(Clone)]
pub(crate) struct ObjectFactory {
    couids: Arc<CouidGenerator>,
    allocator: Arc<Allocator>,
}

impl ObjectFactory {
    pub(crate) fn new(couids: Arc<CouidGenerator>, allocator: Arc<Allocator>) -> Self {
        Self { couids, allocator }
    }

    pub(crate) fn couids(&self) -> &CouidGenerator {
        &self.couids
    }

    /// Claim room for an object of `object_type` and `alg` at `index`.
    ///
    /// Callers claim before doing any work, so a refused placement leaves
    /// the context unchanged.
    pub(crate) fn claim(
        &self,
        alg: AlgId,
        object_type: CryptoObjectType,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Option<SlotLease>> {
        let size = max_storage_size(alg, object_type)?;
        self.allocator.place(Pool::Objects, index, size)
    }

    pub(crate) fn is_real_time(&self) -> bool {
        self.allocator.is_real_time()
    }

    /// A factory over a private allocator without reservations.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self::new(
            Arc::new(CouidGenerator::fresh()),
            Arc::new(Allocator::new(64 * 1024, 16)),
        )
    }

    #[cfg(test)]
    pub(crate) fn allocator(&self) -> &Allocator {
        &self.allocator
    }
}

impl std::fmt::Debug for ObjectFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectFactory")
            .field("couid_source", self.couids.source())
            .field("object_slots", &self.allocator.reserved_slots(Pool::Objects))
            .finish()
    }
}

/// Occupancy of one reserved slot. Frees the slot on drop.
#[derive(Debug)]
pub(crate) struct SlotLease {
    index: usize,
    occupied: Arc<AtomicBool>,
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        self.occupied.store(false, Ordering::Release);
    }
}

/// A value produced by a provider factory, together with its placement.
///
/// Values placed into a reserved slot keep the slot busy until the `Placed`
/// wrapper is dropped or [`into_inner`](Self::into_inner) is called.
pub struct Placed<T> {
    value: T,
    lease: Option<SlotLease>,
}

impl<T> Placed<T> {
    pub(crate) fn new(value: T, lease: Option<SlotLease>) -> Self {
        Self { value, lease }
    }

    /// Where the value lives.
    pub fn index(&self) -> ReservedIndex {
        match &self.lease {
            Some(lease) => ReservedIndex::Slot(lease.index),
            None => ReservedIndex::Heap,
        }
    }

    /// Take the value out, releasing its slot.
    pub fn into_inner(self) -> T {
        let Placed { value, lease } = self;
        drop(lease);
        value
    }

    pub(crate) fn into_parts(self) -> (T, Option<SlotLease>) {
        (self.value, self.lease)
    }

    /// Transform the value while keeping its slot.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Placed<U> {
        let Placed { value, lease } = self;
        Placed {
            value: f(value),
            lease,
        }
    }
}

impl<T> Deref for Placed<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Placed<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Placed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Placed")
            .field("index", &self.index())
            .field("value", &self.value)
            .finish()
    }
}

//! Deferred chain reclamation via seize.
//!
//! A replaced chain may still be referenced by readers that loaded the old
//! head. [`Reclaimer`] wraps a seize [`Collector`]: readers traverse inside a
//! guard, and retired chains are destroyed only once every guard that could
//! have observed them has been dropped.

use seize::{Collector, Guard, LocalGuard};

use crate::delta::PageDelta;
use crate::NodeArena;

/// Reclaim a retired chain (seize callback).
///
/// # Safety
///
/// - Every node in the chain must have been allocated by [`HeapAllocator`].
/// - Must only be called after seize determines no reader remains.
pub(crate) unsafe fn reclaim_chain(head: *mut PageDelta, _collector: &Collector) {
    // SAFETY: Caller guarantees allocator provenance and quiescence; the
    // managed arena walks and frees the chain, including merge siblings and
    // swapped-in chains.
    unsafe { NodeArena::new_managed().destroy_chain(head) };
}

/// Epoch-style hand-off point for replaced chains.
///
/// Readers call [`Reclaimer::enter`] before loading a page head and keep the
/// guard alive for the traversal. Writers whose CAS succeeded hand replaced
/// heads to [`Reclaimer::retire_chain`] instead of destroying them in place.
#[derive(Debug, Default)]
pub struct Reclaimer {
    collector: Collector,
}

impl Reclaimer {
    /// Fresh reclaimer with its own collector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            collector: Collector::new(),
        }
    }

    /// Pin the current thread; chains retired while any guard is live are
    /// not destroyed until that guard drops.
    #[must_use]
    pub fn enter(&self) -> LocalGuard<'_> {
        self.collector.enter()
    }

    /// Schedule a replaced chain for destruction once no reader can hold it.
    ///
    /// # Safety
    ///
    /// - `head` must be unreachable for new readers (its page-table slot has
    ///   been CAS'd away).
    /// - Every node must come from [`HeapAllocator`]-backed arenas.
    pub unsafe fn retire_chain(&self, guard: &LocalGuard<'_>, head: *mut PageDelta) {
        if head.is_null() {
            return;
        }
        // SAFETY: Caller guarantees unlink discipline and provenance.
        unsafe { guard.defer_retire(head, reclaim_chain) };
    }
}

// ============================================================================
//  Tests
// ============================================================================

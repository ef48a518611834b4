//! Page write surface.
//!
//! A [`PageHead`] is the page-table slot: the atomically-swappable pointer
//! that names the current chain. A [`Page`] is one writer's private view of a
//! page: a head snapshot plus the arena and per-writer [`AllocCtx`] used to
//! stage new nodes. Writers mutate the private head freely, then publish it
//! with [`PageHead::try_swap`]; on failure the operation is retried against a
//! fresh snapshot.
//!
//! Head transformations (each a private-chain edit until the CAS lands):
//!
//! - prepend a record delta ([`Page::insert_record`], [`Page::delete_record`]);
//! - consolidation ([`Page::compact`]): a fresh base page, with surviving
//!   flushed-byte accounting re-anchored by a `Reloc`;
//! - split ([`Page::append_split`]): narrows this page's upper bound;
//! - merge ([`Page::append_merge`] on the survivor, [`Page::append_remove`]
//!   on the victim);
//! - eviction ([`Page::swap_out`]) and re-materialisation ([`Page::swap_in`]).

use std::ptr;
use std::sync::atomic::AtomicPtr;

use crate::alloc::{AllocCtx, ByteAllocator, HeapAllocator, NodeArena};
use crate::delta::{DeltaOp, PageDelta, effective_high_key};
use crate::item::{CompareFn, Item, item_size, max_item, min_item};
use crate::iterator::{ChainIter, PgOpIterator, build_chain_iter};
use crate::ordering::{CAS_FAILURE, CAS_SUCCESS, READ_ORD, RELAXED};

// ============================================================================
//  PageHead
// ============================================================================

/// The atomically-swappable chain pointer for one page.
///
/// Readers [`load`](PageHead::load) a snapshot and see exactly the records
/// visible at that head, regardless of concurrent prepends. Writers publish
/// with [`try_swap`](PageHead::try_swap); a failed swap means another writer
/// won and the operation retries from a fresh snapshot.
#[derive(Debug, Default)]
pub struct PageHead {
    ptr: AtomicPtr<PageDelta>,
}

impl PageHead {
    /// Empty slot (null chain).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ptr: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Slot initialised with an existing chain, before any concurrent
    /// observer exists.
    #[must_use]
    pub fn with_chain(head: *mut PageDelta) -> Self {
        let slot = Self::new();
        slot.ptr.store(head, RELAXED);
        slot
    }

    /// Snapshot the current chain head.
    #[must_use]
    pub fn load(&self) -> *mut PageDelta {
        self.ptr.load(READ_ORD)
    }

    /// Publish `new` if the slot still holds `old`.
    ///
    /// On success the prepended deltas (and everything they link) become
    /// visible atomically.
    pub fn try_swap(&self, old: *mut PageDelta, new: *mut PageDelta) -> bool {
        self.ptr
            .compare_exchange(old, new, CAS_SUCCESS, CAS_FAILURE)
            .is_ok()
    }
}

// ============================================================================
//  Page
// ============================================================================

/// A writer's private view of one page.
pub struct Page<'a, A: ByteAllocator = HeapAllocator> {
    arena: &'a NodeArena<A>,
    ctx: &'a mut AllocCtx,
    head: *mut PageDelta,
    low: *const Item,
    cmp: CompareFn,
}

impl<'a, A: ByteAllocator> Page<'a, A> {
    /// Open a page over a head snapshot.
    ///
    /// # Safety
    ///
    /// `head` must be null or a chain of nodes allocated by `arena`'s
    /// allocator, immutable for this page's lifetime (a [`PageHead::load`]
    /// snapshot satisfies this). `low` must stay valid as long as the page.
    #[must_use]
    pub unsafe fn new(
        arena: &'a NodeArena<A>,
        ctx: &'a mut AllocCtx,
        head: *mut PageDelta,
        low: *const Item,
        cmp: CompareFn,
    ) -> Self {
        Self {
            arena,
            ctx,
            head,
            low,
            cmp,
        }
    }

    /// The private head, to publish with [`PageHead::try_swap`].
    #[must_use]
    pub fn head(&self) -> *mut PageDelta {
        self.head
    }

    /// The page's inclusive lower bound.
    #[must_use]
    pub fn low_item(&self) -> *const Item {
        self.low
    }

    /// The page's effective exclusive upper bound: the high-key of the
    /// shallowest `Split`, `Merge`, `SwapOut`, or `Base` in the chain.
    #[must_use]
    pub fn hi_item(&self) -> *const Item {
        // SAFETY: The head snapshot is valid and immutable (Page::new).
        unsafe { effective_high_key(self.head) }
    }

    /// Whether `itm` falls inside `[low, hi)`.
    #[must_use]
    pub fn in_range(&self, itm: *const Item) -> bool {
        (self.cmp)(itm, self.low) != std::cmp::Ordering::Less
            && (self.cmp)(itm, self.hi_item()) == std::cmp::Ordering::Less
    }

    /// Whether the page has no visible records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        // SAFETY: Head snapshot validity per Page::new.
        unsafe { chain_is_empty(self.head, self.cmp) }
    }

    /// Chain iterator over the private head, `[low, high)`.
    #[must_use]
    pub fn iter_range(&self, low: *const Item, high: *const Item, dedup: bool) -> (ChainIter, u64) {
        // SAFETY: Head snapshot validity per Page::new; the iterator must not
        // outlive the page's chain, which the caller of Page::new guarantees.
        unsafe { build_chain_iter(self.head, self.cmp, low, high, dedup) }
    }

    fn link(&mut self, node: *mut PageDelta) {
        // SAFETY: `node` is freshly allocated and unpublished; rewriting its
        // `next` before the head CAS is the one permitted mutation.
        unsafe { (*node).next = self.head };
        self.head = node;
    }

    /// Prepend an insert delta. The item is copied into the node.
    pub fn insert_record(&mut self, itm: *const Item) {
        let d = self.arena.alloc_record_delta(self.ctx, DeltaOp::Insert, itm);
        self.link(d.cast());
    }

    /// Prepend a delete tombstone. The item is copied into the node.
    pub fn delete_record(&mut self, itm: *const Item) {
        let d = self.arena.alloc_record_delta(self.ctx, DeltaOp::Delete, itm);
        self.link(d.cast());
    }

    /// Prepend a split delta narrowing the upper bound to `hi_itm`.
    ///
    /// Never raises the effective high-key: everything at or above `hi_itm`
    /// now belongs to the new sibling.
    pub fn append_split(&mut self, hi_itm: *const Item) {
        let d = self.arena.alloc_split_delta(self.ctx, hi_itm);
        self.link(d.cast());
    }

    /// Prepend a merge delta extending the upper bound to `hi_itm` and
    /// taking ownership of the removed sibling's chain.
    pub fn append_merge(&mut self, hi_itm: *const Item, sibling: *mut PageDelta) {
        let d = self.arena.alloc_merge_delta(self.ctx, hi_itm);
        // SAFETY: Fresh unpublished node.
        unsafe { (*d).sibling = sibling };
        self.link(d.cast());
    }

    /// Prepend a remove marker: the page is logically gone.
    pub fn append_remove(&mut self) {
        let d = self.arena.alloc_remove_delta(self.ctx);
        self.link(d);
    }

    /// Prepend a rollback boundary marker.
    pub fn append_rollback(&mut self) {
        let d = self.arena.alloc_rollback_delta(self.ctx);
        self.link(d);
    }

    /// Prepend a flush accounting marker.
    pub fn append_flush(&mut self, flushed_bytes: u64) {
        let d = self.arena.alloc_flush_delta(self.ctx, DeltaOp::Flush, flushed_bytes);
        self.link(d.cast());
    }

    /// Prepend a reloc anchor; flush contributions below it no longer count.
    pub fn append_reloc(&mut self, flushed_bytes: u64) {
        let d = self.arena.alloc_flush_delta(self.ctx, DeltaOp::Reloc, flushed_bytes);
        self.link(d.cast());
    }

    /// Evict the page: the head becomes a lone `SwapOut` terminator and the
    /// old chain is queued as evicted.
    pub fn swap_out(&mut self, hi_itm: *const Item) {
        let d = self.arena.alloc_swapout_delta(self.ctx, hi_itm);
        self.ctx.queue_free(self.head, true);
        self.head = d.cast();
        debug_log!("page swapped out");
    }

    /// Re-materialise an evicted page by attaching a reconstituted chain on
    /// top of the `SwapOut` terminator.
    pub fn swap_in(&mut self, chain: *mut PageDelta) {
        let d = self.arena.alloc_swapin_delta(self.ctx);
        // SAFETY: Fresh unpublished node; it takes ownership of `chain`.
        unsafe { (*d).chain = chain };
        self.link(d.cast());
        debug_log!("page swapped in");
    }

    /// Queue the current chain for destruction.
    pub fn free(&mut self, evicted: bool) {
        self.ctx.queue_free(self.head, evicted);
    }

    /// Consolidate the chain into a fresh base page.
    ///
    /// Drains the chain with dedup on (base pages hold live records only),
    /// packs survivors into one allocation, re-anchors surviving flushed
    /// bytes with a `Reloc`, and queues the old chain for destruction.
    pub fn compact(&mut self) {
        let (mut it, flushed) = self.iter_range(min_item(), max_item(), true);
        it.init();

        let mut items: Vec<*const Item> = Vec::new();
        let mut data_bytes = 0usize;
        while let Some(pi) = it.get() {
            items.push(pi.itm);
            data_bytes += item_size(pi.itm);
            it.next();
        }

        let hi = self.hi_item();
        let bp = self
            .arena
            .alloc_base_page(self.ctx, items.len(), data_bytes, hi);

        // SAFETY: The base allocation reserves `items.len()` slots and
        // `data_bytes` of payload; sources live in the old chain, which stays
        // valid until its queued destruction runs.
        unsafe {
            let mut off = 0usize;
            for (i, &src) in items.iter().enumerate() {
                let l = item_size(src);
                let dst = (*bp).data.add(off);
                ptr::copy_nonoverlapping(src.cast::<u8>(), dst, l);
                (*bp).items.add(i).write(dst.cast_const().cast());
                off += l;
            }
        }

        let mut new_head: *mut PageDelta = bp.cast();
        if flushed > 0 {
            let fd = self
                .arena
                .alloc_flush_delta(self.ctx, DeltaOp::Reloc, flushed);
            // SAFETY: Fresh unpublished node.
            unsafe { (*fd).pd.next = new_head };
            new_head = fd.cast();
        }

        debug_log!(items = items.len(), flushed, "page compacted");
        self.ctx.queue_free(self.head, false);
        self.head = new_head;
    }
}

/// Whether a chain has no visible records.
///
/// # Safety
///
/// `head` must be null or a well-formed immutable chain.
pub(crate) unsafe fn chain_is_empty(head: *const PageDelta, cmp: CompareFn) -> bool {
    if head.is_null() {
        return true;
    }
    // SAFETY: Caller guarantees chain validity; tombstones don't count, so
    // build with dedup on.
    let (mut it, _) = unsafe { build_chain_iter(head, cmp, min_item(), max_item(), true) };
    it.init();
    !it.valid()
}

// ============================================================================
//  Tests
// ============================================================================

//! Delta node arena.
//!
//! Every chain node is allocated in one contiguous block so that its
//! variable-size payload (an item copy, a high-key copy) is owned by the same
//! allocation as the node header. Allocation goes through the [`ByteAllocator`]
//! seam; [`HeapAllocator`] is the default size-prefixed heap implementation
//! and [`TrackingAllocator`] wraps any allocator with a byte ledger.
//!
//! Per-page bookkeeping lives in [`AllocCtx`]: staged node allocations, chains
//! queued for destruction, and the running `mem_used` / record-count deltas.
//! The store snapshots and clears the staged state with
//! [`AllocCtx::take_malloc_ops`] after a successful head CAS.
//!
//! ## Memory reclamation
//!
//! [`NodeArena::destroy_chain`] frees a chain node-by-node, recursing into
//! merge siblings and swapped-in chains. The `use_mem_mgmt` flag governs
//! whether it calls `free` at all; accounting updates either way. Deferred
//! destruction (until no reader can observe a replaced chain) goes through
//! [`Reclaimer`].

mod reclaim;

use std::alloc::Layout;
use std::collections::HashMap;
use std::ptr;

use parking_lot::Mutex;

use crate::delta::{
    BasePage, DeltaOp, FlushDelta, HiKeyDelta, MergeDelta, PageDelta, RecordDelta, SwapInDelta,
};
use crate::item::{Item, item_size};

pub use reclaim::Reclaimer;

// ============================================================================
//  ByteAllocator
// ============================================================================

/// Byte-granular allocator with manual free.
///
/// Implementations must return blocks aligned for any chain node (8 bytes)
/// and keep them stable until [`ByteAllocator::free`].
pub trait ByteAllocator {
    /// Allocate `size` bytes. Never returns null; allocation failure aborts.
    fn alloc(&self, size: usize) -> *mut u8;

    /// Free a block previously returned by [`ByteAllocator::alloc`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from `alloc` on this allocator and must not have been
    /// freed already.
    unsafe fn free(&self, ptr: *mut u8);
}

const BLOCK_ALIGN: usize = std::mem::size_of::<usize>();

/// Size-prefixed heap allocator.
///
/// Each block is prefixed with its total size so `free` can reconstruct the
/// layout without the caller carrying it.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeapAllocator;

impl ByteAllocator for HeapAllocator {
    fn alloc(&self, size: usize) -> *mut u8 {
        let total = size + BLOCK_ALIGN;
        let Ok(layout) = Layout::from_size_align(total, BLOCK_ALIGN) else {
            std::alloc::handle_alloc_error(Layout::new::<usize>())
        };

        // SAFETY: `layout` has non-zero size.
        let base = unsafe { std::alloc::alloc(layout) };
        if base.is_null() {
            std::alloc::handle_alloc_error(layout);
        }

        // SAFETY: The prefix word lies at the start of the fresh block and is
        // aligned to BLOCK_ALIGN.
        unsafe {
            base.cast::<usize>().write(total);
            base.add(BLOCK_ALIGN)
        }
    }

    unsafe fn free(&self, ptr: *mut u8) {
        // SAFETY: `ptr` was returned by `alloc`, so the size prefix sits
        // immediately below it.
        unsafe {
            let base = ptr.sub(BLOCK_ALIGN);
            let total = base.cast::<usize>().read();
            let layout = Layout::from_size_align_unchecked(total, BLOCK_ALIGN);
            std::alloc::dealloc(base, layout);
        }
    }
}

/// Allocator wrapper keeping a per-pointer byte ledger.
///
/// Uses interior mutability so concurrent code paths (which only have `&self`)
/// can allocate while the ledger stays consistent.
#[derive(Debug, Default)]
pub struct TrackingAllocator<A: ByteAllocator = HeapAllocator> {
    inner: A,
    ledger: Mutex<Ledger>,
}

#[derive(Debug, Default)]
struct Ledger {
    live: HashMap<usize, usize>,
    allocated: u64,
    freed: u64,
}

impl<A: ByteAllocator> TrackingAllocator<A> {
    /// Wrap `inner` with a fresh ledger.
    #[must_use]
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    /// Total bytes handed out so far.
    #[must_use]
    pub fn allocated_bytes(&self) -> u64 {
        self.ledger.lock().allocated
    }

    /// Total bytes returned so far.
    #[must_use]
    pub fn freed_bytes(&self) -> u64 {
        self.ledger.lock().freed
    }

    /// Number of live blocks.
    #[must_use]
    pub fn live_blocks(&self) -> usize {
        self.ledger.lock().live.len()
    }
}

impl<A: ByteAllocator> ByteAllocator for TrackingAllocator<A> {
    fn alloc(&self, size: usize) -> *mut u8 {
        let ptr = self.inner.alloc(size);
        let mut ledger = self.ledger.lock();
        ledger.allocated += size as u64;
        // Address used for identity only.
        ledger.live.insert(ptr.addr(), size);
        ptr
    }

    unsafe fn free(&self, ptr: *mut u8) {
        {
            let mut ledger = self.ledger.lock();
            let size = ledger
                .live
                .remove(&ptr.addr())
                .expect("freed pointer not in ledger");
            ledger.freed += size as u64;
        }
        // SAFETY: Caller guarantees `ptr` came from this allocator's `alloc`.
        unsafe { self.inner.free(ptr) };
    }
}

// ============================================================================
//  Per-page bookkeeping
// ============================================================================

/// A chain queued for destruction, tagged with how it left the page table.
#[derive(Clone, Copy, Debug)]
pub struct FreePage {
    /// Head of the replaced chain.
    pub head: *mut PageDelta,
    /// Whether the chain was evicted (swapped out) rather than consolidated.
    pub evicted: bool,
}

/// Staged allocation state snapshotted by [`AllocCtx::take_malloc_ops`].
#[derive(Debug, Default)]
pub struct MallocOps {
    /// Nodes allocated during the in-flight operation.
    pub allocs: Vec<*mut PageDelta>,
    /// Chains queued for destruction.
    pub frees: Vec<FreePage>,
    /// Logical record count delta.
    pub n: i64,
    /// Byte count delta charged to the page.
    pub mem_used: i64,
}

/// Per-writer allocation context.
///
/// Not shared: each writer owns one and publishes its staged state to the
/// store's global counters after a successful CAS.
#[derive(Debug, Default)]
pub struct AllocCtx {
    alloc_delta_list: Vec<*mut PageDelta>,
    free_page_list: Vec<FreePage>,
    mem_used: i64,
    n: i64,
}

impl AllocCtx {
    /// Fresh, empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Running byte count charged to this page.
    #[must_use]
    pub fn mem_used(&self) -> i64 {
        self.mem_used
    }

    /// Logical record count delta (`Insert`/`Delete` deltas count one each,
    /// a base page counts its item total).
    #[must_use]
    pub fn n(&self) -> i64 {
        self.n
    }

    /// Nodes staged during the in-flight operation.
    #[must_use]
    pub fn staged_allocs(&self) -> &[*mut PageDelta] {
        &self.alloc_delta_list
    }

    /// Chains currently queued for destruction.
    #[must_use]
    pub fn staged_frees(&self) -> &[FreePage] {
        &self.free_page_list
    }

    /// Queue a replaced chain for destruction.
    pub fn queue_free(&mut self, head: *mut PageDelta, evicted: bool) {
        if !head.is_null() {
            self.free_page_list.push(FreePage { head, evicted });
        }
    }

    /// Snapshot and clear the staged lists and counters.
    ///
    /// Called by the store after a successful CAS to fold this operation's
    /// deltas into its global memory accounting.
    pub fn take_malloc_ops(&mut self) -> MallocOps {
        let ops = MallocOps {
            allocs: std::mem::take(&mut self.alloc_delta_list),
            frees: std::mem::take(&mut self.free_page_list),
            n: self.n,
            mem_used: self.mem_used,
        };
        self.mem_used = 0;
        self.n = 0;
        ops
    }

    fn add_delta_alloc(&mut self, ptr: *mut PageDelta) {
        self.alloc_delta_list.push(ptr);
    }
}

// ============================================================================
//  NodeArena
// ============================================================================

/// Arena for chain nodes and scratch items.
///
/// `use_mem_mgmt` governs whether [`NodeArena::destroy_chain`] returns nodes
/// to the allocator; accounting in [`AllocCtx`] is maintained either way.
#[derive(Debug)]
pub struct NodeArena<A: ByteAllocator = HeapAllocator> {
    alloc: A,
    use_mem_mgmt: bool,
}

impl NodeArena<HeapAllocator> {
    /// Heap-backed arena with explicit node destruction.
    #[must_use]
    pub const fn new_managed() -> Self {
        Self {
            alloc: HeapAllocator,
            use_mem_mgmt: true,
        }
    }
}

impl<A: ByteAllocator> NodeArena<A> {
    /// Arena over a custom allocator.
    pub const fn new(alloc: A, use_mem_mgmt: bool) -> Self {
        Self {
            alloc,
            use_mem_mgmt,
        }
    }

    /// The underlying allocator.
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    // ------------------------------------------------------------------
    //  Items
    // ------------------------------------------------------------------

    /// Encode a standalone item in a fresh allocation.
    ///
    /// Scratch items are not charged to any page; free them with
    /// [`NodeArena::free_item`] or hand them to a record delta (which copies).
    #[must_use]
    pub fn new_item(
        &self,
        key: &[u8],
        value: Option<&[u8]>,
        seqno: u64,
        is_insert: bool,
    ) -> *const Item {
        let size = Item::required_size(key.len(), value.map(<[u8]>::len));
        let ptr = self.alloc.alloc(size);
        // SAFETY: `ptr` covers `size` bytes, exactly the encoded record.
        unsafe { Item::encode(ptr, key, value, seqno, is_insert) }
    }

    /// Free a scratch item from [`NodeArena::new_item`].
    ///
    /// # Safety
    ///
    /// `itm` must come from `new_item` on this arena and must not be
    /// referenced afterwards (including by zero-copy record deltas).
    pub unsafe fn free_item(&self, itm: *const Item) {
        // SAFETY: Caller guarantees provenance.
        unsafe { self.alloc.free(itm.cast_mut().cast()) };
    }

    // ------------------------------------------------------------------
    //  Delta nodes
    // ------------------------------------------------------------------

    fn alloc_node(&self, ctx: &mut AllocCtx, op: DeltaOp, size: usize) -> *mut u8 {
        ctx.mem_used += size as i64;
        let ptr = self.alloc.alloc(size);
        // SAFETY: Every node layout starts with the PageDelta header.
        unsafe {
            ptr.cast::<PageDelta>().write(PageDelta {
                op,
                next: ptr::null_mut(),
            });
        }
        ctx.add_delta_alloc(ptr.cast());
        ptr
    }

    /// Copy `itm` into the trailing bytes at `dst`, or pass the pointer
    /// through when it is zero-sized (sentinels).
    unsafe fn place_item(dst: *mut u8, itm: *const Item, l: usize) -> *const Item {
        if l == 0 {
            return itm;
        }
        // SAFETY: Caller reserved `l` trailing bytes at `dst`; `itm` spans
        // `l` bytes.
        unsafe {
            ptr::copy_nonoverlapping(itm.cast::<u8>(), dst, l);
        }
        dst.cast_const().cast()
    }

    /// Allocate an `Insert`/`Delete` delta with the item copied into the
    /// node's trailing bytes.
    pub fn alloc_record_delta(
        &self,
        ctx: &mut AllocCtx,
        op: DeltaOp,
        itm: *const Item,
    ) -> *mut RecordDelta {
        debug_assert!(matches!(op, DeltaOp::Insert | DeltaOp::Delete));
        let l = item_size(itm);
        let hdr = std::mem::size_of::<RecordDelta>();
        let ptr = self.alloc_node(ctx, op, hdr + l);
        ctx.n += 1;

        // SAFETY: The allocation covers the header plus `l` trailing bytes.
        unsafe {
            let d = ptr.cast::<RecordDelta>();
            (*d).itm = Self::place_item(ptr.add(hdr), itm, l);
            d
        }
    }

    /// Allocate a high-key-carrying delta (`Split`, `SwapOut`, or a bare
    /// metadata node) with the key copy in the trailing bytes.
    pub fn alloc_meta_delta(
        &self,
        ctx: &mut AllocCtx,
        op: DeltaOp,
        hi_itm: *const Item,
    ) -> *mut HiKeyDelta {
        let l = item_size(hi_itm);
        let hdr = std::mem::size_of::<HiKeyDelta>();
        let ptr = self.alloc_node(ctx, op, hdr + l);

        // SAFETY: The allocation covers the header plus `l` trailing bytes.
        unsafe {
            let d = ptr.cast::<HiKeyDelta>();
            (*d).hi_itm = Self::place_item(ptr.add(hdr), hi_itm, l);
            d
        }
    }

    /// Allocate a `Split` delta.
    pub fn alloc_split_delta(&self, ctx: &mut AllocCtx, hi_itm: *const Item) -> *mut HiKeyDelta {
        self.alloc_meta_delta(ctx, DeltaOp::Split, hi_itm)
    }

    /// Allocate a `SwapOut` terminator.
    pub fn alloc_swapout_delta(&self, ctx: &mut AllocCtx, hi_itm: *const Item) -> *mut HiKeyDelta {
        self.alloc_meta_delta(ctx, DeltaOp::SwapOut, hi_itm)
    }

    /// Allocate a `Merge` delta. The caller links the sibling chain.
    pub fn alloc_merge_delta(&self, ctx: &mut AllocCtx, hi_itm: *const Item) -> *mut MergeDelta {
        let l = item_size(hi_itm);
        let hdr = std::mem::size_of::<MergeDelta>();
        let ptr = self.alloc_node(ctx, DeltaOp::Merge, hdr + l);

        // SAFETY: The allocation covers the header plus `l` trailing bytes.
        unsafe {
            let d = ptr.cast::<MergeDelta>();
            (*d).hi_itm = Self::place_item(ptr.add(hdr), hi_itm, l);
            (*d).sibling = ptr::null_mut();
            d
        }
    }

    /// Allocate a `Flush` or `Reloc` accounting node.
    pub fn alloc_flush_delta(
        &self,
        ctx: &mut AllocCtx,
        op: DeltaOp,
        flushed_bytes: u64,
    ) -> *mut FlushDelta {
        debug_assert!(matches!(op, DeltaOp::Flush | DeltaOp::Reloc));
        let ptr = self.alloc_node(ctx, op, std::mem::size_of::<FlushDelta>());
        // SAFETY: The allocation covers the FlushDelta layout.
        unsafe {
            let d = ptr.cast::<FlushDelta>();
            (*d).flush_data_sz = flushed_bytes;
            d
        }
    }

    /// Allocate a `Remove` marker.
    pub fn alloc_remove_delta(&self, ctx: &mut AllocCtx) -> *mut PageDelta {
        self.alloc_node(ctx, DeltaOp::Remove, std::mem::size_of::<PageDelta>())
            .cast()
    }

    /// Allocate a `Rollback` marker.
    pub fn alloc_rollback_delta(&self, ctx: &mut AllocCtx) -> *mut PageDelta {
        self.alloc_node(ctx, DeltaOp::Rollback, std::mem::size_of::<PageDelta>())
            .cast()
    }

    /// Allocate a `SwapIn` delta. The caller links the reconstituted chain.
    pub fn alloc_swapin_delta(&self, ctx: &mut AllocCtx) -> *mut SwapInDelta {
        let ptr = self.alloc_node(ctx, DeltaOp::SwapIn, std::mem::size_of::<SwapInDelta>());
        // SAFETY: The allocation covers the SwapInDelta layout.
        unsafe {
            let d = ptr.cast::<SwapInDelta>();
            (*d).chain = ptr::null_mut();
            d
        }
    }

    /// Allocate a base page able to hold `n` items over `data_bytes` of
    /// packed payload:
    ///
    /// ```text
    /// [ BasePage | n pointer slots | data_bytes | high-key copy ]
    /// ```
    ///
    /// The caller fills the pointer slots and payload before linking.
    pub fn alloc_base_page(
        &self,
        ctx: &mut AllocCtx,
        n: usize,
        data_bytes: usize,
        hi_itm: *const Item,
    ) -> *mut BasePage {
        let l = item_size(hi_itm);
        let hdr = std::mem::size_of::<BasePage>();
        let slots = n * std::mem::size_of::<*const Item>();
        let ptr = self.alloc_node(ctx, DeltaOp::Base, hdr + slots + data_bytes + l);
        ctx.n += n as i64;

        // SAFETY: The allocation covers header, slots, payload, and key copy
        // in that order.
        unsafe {
            let bp = ptr.cast::<BasePage>();
            (*bp).n_items = n as u32;
            (*bp).items = ptr.add(hdr).cast();
            (*bp).data = ptr.add(hdr + slots);
            (*bp).hi_itm = Self::place_item(ptr.add(hdr + slots + data_bytes), hi_itm, l);
            bp
        }
    }

    // ------------------------------------------------------------------
    //  Destruction
    // ------------------------------------------------------------------

    /// Destroy a chain: free every node along `next` until a terminator
    /// (`Base`, `SwapOut`) or null, recursing into merge siblings and
    /// swapped-in chains.
    ///
    /// No-op unless the arena was built with `use_mem_mgmt`.
    ///
    /// # Safety
    ///
    /// Every node in the chain must have been allocated by this arena's
    /// allocator, and no reader may still observe the chain.
    pub unsafe fn destroy_chain(&self, head: *mut PageDelta) {
        if !self.use_mem_mgmt {
            return;
        }

        let mut pd = head;
        while !pd.is_null() {
            // SAFETY: Caller guarantees chain validity and exclusivity.
            let d = unsafe { &*pd };
            let mut next = d.next;
            match d.op {
                DeltaOp::Base | DeltaOp::SwapOut => next = ptr::null_mut(),
                DeltaOp::Merge => {
                    // SAFETY: Tag checked; the merge owns its sibling chain.
                    unsafe { self.destroy_chain(d.as_merge().sibling) };
                }
                DeltaOp::SwapIn => {
                    // SAFETY: Tag checked; the swap-in owns the re-attached
                    // chain.
                    unsafe { self.destroy_chain(d.as_swapin().chain) };
                }
                _ => {}
            }

            trace_log!(op = ?d.op, "destroy chain node");
            // SAFETY: Node came from this arena's allocator.
            unsafe { self.alloc.free(pd.cast()) };
            pd = next;
        }
    }
}

// ============================================================================
//  Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{cmp_item, max_item, min_item};

    fn test_arena() -> NodeArena<TrackingAllocator> {
        NodeArena::new(TrackingAllocator::new(HeapAllocator), true)
    }

    #[test]
    fn test_record_delta_copies_item() {
        let arena = test_arena();
        let mut ctx = AllocCtx::new();

        let mut buf = vec![0u8; Item::required_size(3, None)];
        let itm: *const Item = Item::encode_into(&mut buf, b"abc", None, 7, true);

        let d = arena.alloc_record_delta(&mut ctx, DeltaOp::Insert, itm);
        // Clobber the source; the delta's copy must be unaffected.
        buf.fill(0xff);

        // SAFETY: `d` was just allocated with the item copied inline.
        unsafe {
            assert_ne!((*d).item(), itm);
            assert_eq!((*(*d).item()).key(), b"abc");
            assert_eq!((*(*d).item()).seqno(), 7);
        }
        assert_eq!(ctx.n(), 1);
        assert_eq!(
            ctx.mem_used(),
            (std::mem::size_of::<RecordDelta>() + 4 + 3 + 8) as i64
        );

        // SAFETY: Chain of one node allocated above.
        unsafe { arena.destroy_chain(d.cast()) };
    }

    #[test]
    fn test_sentinel_high_key_not_copied() {
        let arena = test_arena();
        let mut ctx = AllocCtx::new();

        let d = arena.alloc_split_delta(&mut ctx, max_item());
        // SAFETY: Just allocated.
        unsafe {
            assert_eq!((*d).hi_item(), max_item());
        }
        assert_eq!(ctx.mem_used(), std::mem::size_of::<HiKeyDelta>() as i64);

        // SAFETY: Chain of one node allocated above.
        unsafe { arena.destroy_chain(d.cast()) };
    }

    #[test]
    fn test_take_malloc_ops_snapshots_and_clears() {
        let arena = test_arena();
        let mut ctx = AllocCtx::new();

        let itm = arena.new_item(b"k", None, 1, true);
        let d = arena.alloc_record_delta(&mut ctx, DeltaOp::Insert, itm);
        ctx.queue_free(d.cast(), false);

        let ops = ctx.take_malloc_ops();
        assert_eq!(ops.allocs.len(), 1);
        assert_eq!(ops.frees.len(), 1);
        assert!(!ops.frees[0].evicted);
        assert_eq!(ops.n, 1);
        assert!(ops.mem_used > 0);

        assert_eq!(ctx.mem_used(), 0);
        assert_eq!(ctx.n(), 0);
        assert!(ctx.staged_allocs().is_empty());
        assert!(ctx.staged_frees().is_empty());

        // SAFETY: Cleanup of the allocations above.
        unsafe {
            arena.destroy_chain(d.cast());
            arena.free_item(itm);
        }
    }

    #[test]
    fn test_destroy_chain_frees_exact_bytes() {
        let arena = test_arena();
        let mut ctx = AllocCtx::new();

        let i1 = arena.new_item(b"a", None, 1, true);
        let i2 = arena.new_item(b"b", None, 2, true);

        let base = arena.alloc_base_page(&mut ctx, 0, 0, max_item());
        let d1 = arena.alloc_record_delta(&mut ctx, DeltaOp::Insert, i1);
        let d2 = arena.alloc_record_delta(&mut ctx, DeltaOp::Delete, i2);

        // head -> d2 -> d1 -> base
        // SAFETY: Linking freshly allocated, unpublished nodes.
        unsafe {
            (*d1).pd.next = base.cast();
            (*d2).pd.next = d1.cast();
        }

        let chain_bytes = ctx.mem_used() as u64;
        let freed_before = arena.allocator().freed_bytes();

        // SAFETY: Chain built above, unobserved by any reader.
        unsafe { arena.destroy_chain(d2.cast()) };

        assert_eq!(arena.allocator().freed_bytes() - freed_before, chain_bytes);

        // SAFETY: Scratch items still live.
        unsafe {
            arena.free_item(i1);
            arena.free_item(i2);
        }
        assert_eq!(arena.allocator().live_blocks(), 0);
    }

    #[test]
    fn test_destroy_chain_recurses_into_merge_sibling() {
        let arena = test_arena();
        let mut ctx = AllocCtx::new();

        let sib_base = arena.alloc_base_page(&mut ctx, 0, 0, max_item());
        let left_base = arena.alloc_base_page(&mut ctx, 0, 0, max_item());
        let merge = arena.alloc_merge_delta(&mut ctx, max_item());

        // SAFETY: Linking freshly allocated, unpublished nodes.
        unsafe {
            (*merge).sibling = sib_base.cast();
            (*merge).pd.next = left_base.cast();
        }

        let total = ctx.mem_used() as u64;
        // SAFETY: Chain built above.
        unsafe { arena.destroy_chain(merge.cast()) };
        assert_eq!(arena.allocator().freed_bytes(), total);
        assert_eq!(arena.allocator().live_blocks(), 0);
    }

    #[test]
    fn test_destroy_chain_recurses_into_swapin() {
        let arena = test_arena();
        let mut ctx = AllocCtx::new();

        let inner_base = arena.alloc_base_page(&mut ctx, 0, 0, max_item());
        let swapout = arena.alloc_swapout_delta(&mut ctx, max_item());
        let swapin = arena.alloc_swapin_delta(&mut ctx);

        // SAFETY: Linking freshly allocated, unpublished nodes.
        unsafe {
            (*swapin).chain = inner_base.cast();
            (*swapin).pd.next = swapout.cast();
        }

        let total = ctx.mem_used() as u64;
        // SAFETY: Chain built above.
        unsafe { arena.destroy_chain(swapin.cast()) };
        assert_eq!(arena.allocator().freed_bytes(), total);
        assert_eq!(arena.allocator().live_blocks(), 0);
    }

    #[test]
    fn test_unmanaged_arena_skips_free() {
        let alloc = TrackingAllocator::new(HeapAllocator);
        let arena = NodeArena::new(alloc, false);
        let mut ctx = AllocCtx::new();

        let d = arena.alloc_remove_delta(&mut ctx);
        // SAFETY: Chain of one node.
        unsafe { arena.destroy_chain(d) };

        // Accounting updated, nothing freed.
        assert_eq!(ctx.mem_used(), std::mem::size_of::<PageDelta>() as i64);
        assert_eq!(arena.allocator().freed_bytes(), 0);
        assert_eq!(arena.allocator().live_blocks(), 1);
    }

    #[test]
    fn test_base_page_layout() {
        let arena = test_arena();
        let mut ctx = AllocCtx::new();

        let hi = arena.new_item(b"zz", None, 0, true);
        let bp = arena.alloc_base_page(&mut ctx, 3, 64, hi);

        // SAFETY: Just allocated; slots and data live inside the block.
        unsafe {
            assert_eq!((*bp).pd.op(), DeltaOp::Base);
            assert_eq!((*bp).items().len(), 3);
            // High-key was copied, not referenced.
            assert_ne!((*bp).hi_item(), hi);
            assert_eq!(cmp_item((*bp).hi_item(), hi), std::cmp::Ordering::Equal);
            assert_eq!(cmp_item(min_item(), (*bp).hi_item()), std::cmp::Ordering::Less);
        }
        assert_eq!(ctx.n(), 3);

        // SAFETY: Cleanup.
        unsafe {
            arena.destroy_chain(bp.cast());
            arena.free_item(hi);
        }
    }
}

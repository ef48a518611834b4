//! Chain iterator: fuses a page's delta run with its base page (and,
//! transparently, a merged sibling's chain) into one ordered stream.
//!
//! Construction walks the chain once from the head:
//!
//! - `Insert`/`Delete` deltas inside `[low, high)` are collected into a run,
//!   stably sorted by key so the delta nearest the head (most recent) leads
//!   any equal-key group, then collapsed to that leader.
//! - `Split` narrows `high`; everything at or above the split key was
//!   logically deleted from this chain.
//! - `Flush` adds to the flushed-bytes side channel until a `Reloc` latches
//!   it; the topmost `Reloc` wins outright.
//! - `Merge` recurses into both the surviving chain and the sibling's chain
//!   and concatenates them (disjoint by construction).
//! - `Base` ends the walk with a binary-searched `[low, high)` window.
//! - `SwapOut` ends the walk with an invalid iterator; the caller re-faults
//!   the page through the store.
//! - `SwapIn` redirects the walk to the reconstituted chain.
//!
//! The run and the base/sibling side then merge: equal keys emit the delta
//! and advance the base side one step (the delta shadows exactly one base
//! entry). With dedup on, tombstones are skipped transparently.

use std::cmp::Ordering;
use std::ptr;

use crate::delta::{BasePage, DeltaOp, PageDelta};
use crate::item::{CompareFn, Item};

/// One element of the fused stream: an item pointer plus the insert/delete
/// tag of the node that produced it.
#[derive(Clone, Copy, Debug)]
pub struct PageItem {
    /// The item.
    pub itm: *const Item,
    /// False for delete tombstones.
    pub is_insert: bool,
}

/// Capability set shared by every chain-level iterator.
///
/// `init` must be called once before the first `get`/`valid`/`next`.
pub trait PgOpIterator {
    /// Position at the first element.
    fn init(&mut self);

    /// Current element, `None` when exhausted.
    fn get(&self) -> Option<PageItem>;

    /// Advance one element.
    fn next(&mut self);

    /// Whether a current element exists.
    fn valid(&self) -> bool;
}

// ============================================================================
//  Delta-run iterator
// ============================================================================

/// Iterator over the sorted, collapsed delta run.
pub(crate) struct DeltaRunIter {
    deltas: Vec<PageItem>,
    i: usize,
}

impl DeltaRunIter {
    pub(crate) fn new(deltas: Vec<PageItem>) -> Self {
        Self { deltas, i: 0 }
    }

    pub(crate) fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl PgOpIterator for DeltaRunIter {
    fn init(&mut self) {}

    fn get(&self) -> Option<PageItem> {
        self.deltas.get(self.i).copied()
    }

    fn next(&mut self) {
        self.i += 1;
    }

    fn valid(&self) -> bool {
        self.i < self.deltas.len()
    }
}

// ============================================================================
//  Base-page iterator
// ============================================================================

/// Iterator over a base page restricted to `[low, high)` by two binary
/// searches. Base entries always report as inserts: base pages hold live
/// records only.
pub(crate) struct BasePageIter {
    bp: *const BasePage,
    cmp: CompareFn,
    low: *const Item,
    high: *const Item,
    i: usize,
    j: usize,
}

impl BasePageIter {
    pub(crate) fn new(bp: *const BasePage, cmp: CompareFn, low: *const Item, high: *const Item) -> Self {
        Self {
            bp,
            cmp,
            low,
            high,
            i: 0,
            j: 0,
        }
    }

    fn items(&self) -> &[*const Item] {
        // SAFETY: The base page outlives the iterator (build_chain_iter
        // contract) and its item slots are immutable once linked.
        unsafe { (*self.bp).items() }
    }
}

impl PgOpIterator for BasePageIter {
    fn init(&mut self) {
        let items = self.items();
        let i = items.partition_point(|&it| (self.cmp)(it, self.low) == Ordering::Less);
        let j = items.partition_point(|&it| (self.cmp)(it, self.high) == Ordering::Less);
        self.i = i;
        self.j = j;
    }

    fn get(&self) -> Option<PageItem> {
        if !self.valid() {
            return None;
        }
        Some(PageItem {
            itm: self.items()[self.i],
            is_insert: true,
        })
    }

    fn next(&mut self) {
        self.i += 1;
    }

    fn valid(&self) -> bool {
        self.i < self.j
    }
}

// ============================================================================
//  Join iterator
// ============================================================================

/// Concatenation of two disjoint sorted streams: the surviving side's
/// remaining chain, then the merged sibling (whose keys are strictly
/// greater). Whichever side is exhausted yields to the other.
pub(crate) struct JoinIter {
    itrs: [ChainIter; 2],
    i: usize,
}

impl JoinIter {
    pub(crate) fn new(first: ChainIter, second: ChainIter) -> Self {
        Self {
            itrs: [first, second],
            i: 0,
        }
    }
}

impl PgOpIterator for JoinIter {
    fn init(&mut self) {
        self.itrs[0].init();
        self.itrs[1].init();
        if !self.itrs[0].valid() {
            self.i = 1;
        }
    }

    fn get(&self) -> Option<PageItem> {
        self.itrs[self.i].get()
    }

    fn next(&mut self) {
        self.itrs[self.i].next();
        if self.i == 0 && !self.itrs[0].valid() {
            self.i = 1;
        }
    }

    fn valid(&self) -> bool {
        self.itrs[self.i].valid()
    }
}

// ============================================================================
//  Merge iterator (the chain iterator proper)
// ============================================================================

/// The second side of the merge: the chain's terminator view.
pub(crate) enum Side {
    /// No base page and no merge below the run.
    Empty,
    /// A materialised base page window.
    Base(BasePageIter),
    /// A merge node's fused sub-chains.
    Join(Box<JoinIter>),
}

impl PgOpIterator for Side {
    fn init(&mut self) {
        match self {
            Side::Empty => {}
            Side::Base(it) => it.init(),
            Side::Join(it) => it.init(),
        }
    }

    fn get(&self) -> Option<PageItem> {
        match self {
            Side::Empty => None,
            Side::Base(it) => it.get(),
            Side::Join(it) => it.get(),
        }
    }

    fn next(&mut self) {
        match self {
            Side::Empty => {}
            Side::Base(it) => it.next(),
            Side::Join(it) => it.next(),
        }
    }

    fn valid(&self) -> bool {
        match self {
            Side::Empty => false,
            Side::Base(it) => it.valid(),
            Side::Join(it) => it.valid(),
        }
    }
}

#[derive(Clone, Copy)]
enum Which {
    Run,
    Side,
}

/// Two-way merge of the delta run and the base/sibling side.
///
/// Equal keys emit the run element and advance the side exactly one step:
/// the delta shadows one base entry, and duplicate keys within a base page
/// are disallowed. With `do_dedup`, tombstones are skipped transparently.
pub struct ChainIter {
    run: DeltaRunIter,
    side: Side,
    last: Option<Which>,
    cmp: CompareFn,
    do_dedup: bool,
}

impl ChainIter {
    pub(crate) fn new(run: DeltaRunIter, side: Side, cmp: CompareFn, do_dedup: bool) -> Self {
        Self {
            run,
            side,
            last: None,
            cmp,
            do_dedup,
        }
    }

    pub(crate) fn empty(cmp: CompareFn, do_dedup: bool) -> Self {
        Self::new(DeltaRunIter::empty(), Side::Empty, cmp, do_dedup)
    }

    fn pick(&mut self) {
        match (self.run.get(), self.side.get()) {
            (Some(a), Some(b)) => match (self.cmp)(a.itm, b.itm) {
                Ordering::Less => self.last = Some(Which::Run),
                Ordering::Equal => {
                    // The delta shadows exactly one base entry.
                    self.last = Some(Which::Run);
                    self.side.next();
                }
                Ordering::Greater => self.last = Some(Which::Side),
            },
            (Some(_), None) => self.last = Some(Which::Run),
            (None, Some(_)) => self.last = Some(Which::Side),
            (None, None) => {}
        }
    }

    fn advance_last(&mut self) {
        match self.last {
            Some(Which::Run) => self.run.next(),
            Some(Which::Side) => self.side.next(),
            None => {}
        }
    }

    fn fetch_min(&mut self) {
        self.pick();
        if !self.do_dedup {
            return;
        }
        // Skip delete tombstones.
        while let Some(pi) = self.get() {
            if pi.is_insert {
                break;
            }
            self.advance_last();
            self.pick();
        }
    }
}

impl PgOpIterator for ChainIter {
    fn init(&mut self) {
        self.run.init();
        self.side.init();
        self.fetch_min();
    }

    fn get(&self) -> Option<PageItem> {
        if !self.valid() {
            return None;
        }
        match self.last {
            Some(Which::Run) => self.run.get(),
            Some(Which::Side) => self.side.get(),
            None => None,
        }
    }

    fn next(&mut self) {
        if self.valid() {
            self.advance_last();
            self.fetch_min();
        }
    }

    fn valid(&self) -> bool {
        self.run.valid() || self.side.valid()
    }
}

// ============================================================================
//  Construction
// ============================================================================

/// Build a chain iterator over `[low, high)` plus the chain's flushed-bytes
/// side channel.
///
/// The iterator is returned uninitialised; call [`PgOpIterator::init`]
/// before use.
///
/// # Safety
///
/// `head` must be null or reference a well-formed, immutable chain, and
/// every node and item reachable from it (including `low`/`high`) must stay
/// valid for the iterator's lifetime. The iterator does not own the page.
pub unsafe fn build_chain_iter(
    head: *const PageDelta,
    cmp: CompareFn,
    low: *const Item,
    high: *const Item,
    do_dedup: bool,
) -> (ChainIter, u64) {
    // A removed page is logically gone. This only applies at page level: a
    // merged sibling's chain is headed by its remove marker and must still be
    // walked, so the recursive builder skips the marker instead.
    // SAFETY: Caller guarantees `head` is null or a valid node.
    if !head.is_null() && unsafe { (*head).op() } == DeltaOp::Remove {
        return (ChainIter::empty(cmp, do_dedup), 0);
    }

    // SAFETY: Forwarded caller contract.
    unsafe { build_chain(head, cmp, low, high, do_dedup) }
}

/// Recursive builder: identical to [`build_chain_iter`] minus the page-level
/// removed check.
///
/// # Safety
///
/// As [`build_chain_iter`].
unsafe fn build_chain(
    head: *const PageDelta,
    cmp: CompareFn,
    low: *const Item,
    high: *const Item,
    do_dedup: bool,
) -> (ChainIter, u64) {
    let mut fd_sz: u64 = 0;
    let mut has_reloc = false;
    let mut high = high;
    let mut side = Side::Empty;
    let mut n_rec = 0usize;

    let mut pd = head;
    let term: *const PageDelta = loop {
        if pd.is_null() {
            break ptr::null();
        }
        // SAFETY: Caller guarantees chain validity; `pd` was reached along
        // `next` links and swap-in redirects.
        let d = unsafe { &*pd };
        match d.op() {
            DeltaOp::Insert | DeltaOp::Delete => n_rec += 1,
            DeltaOp::Split => {
                // SAFETY: Tag checked.
                high = unsafe { d.as_hi_key() }.hi_item();
            }
            DeltaOp::Flush => {
                if !has_reloc {
                    // SAFETY: Tag checked.
                    fd_sz += unsafe { d.as_flush() }.flushed_bytes();
                }
            }
            DeltaOp::Reloc => {
                if !has_reloc {
                    // SAFETY: Tag checked.
                    fd_sz = unsafe { d.as_flush() }.flushed_bytes();
                    has_reloc = true;
                }
            }
            DeltaOp::Merge => {
                // SAFETY: Tag checked.
                let m = unsafe { d.as_merge() };
                // SAFETY: Both sub-chains satisfy the same contract as `head`.
                let (left, fd1) = unsafe { build_chain(d.next(), cmp, low, high, false) };
                let (right, fd2) = unsafe { build_chain(m.sibling(), cmp, low, high, true) };
                if !has_reloc {
                    fd_sz += fd1 + fd2;
                }
                side = Side::Join(Box::new(JoinIter::new(left, right)));
                break pd;
            }
            DeltaOp::Base => {
                // SAFETY: Tag checked.
                let bp = unsafe { d.as_base() };
                side = Side::Base(BasePageIter::new(bp, cmp, low, high));
                break pd;
            }
            DeltaOp::SwapOut => {
                // The chain below is evicted and must not be walked; the
                // caller re-faults the page through the store.
                return (ChainIter::empty(cmp, do_dedup), fd_sz);
            }
            DeltaOp::SwapIn => {
                // SAFETY: Tag checked.
                pd = unsafe { d.as_swapin() }.chain();
                continue;
            }
            DeltaOp::Remove | DeltaOp::Rollback => {}
        }
        pd = d.next();
    };

    let mut deltas: Vec<PageItem> = Vec::with_capacity(n_rec);
    if n_rec > 0 {
        let mut pd = head;
        while pd != term && !pd.is_null() {
            // SAFETY: Same walk as above, cut short at the terminator.
            let d = unsafe { &*pd };
            match d.op() {
                DeltaOp::Insert | DeltaOp::Delete => {
                    // SAFETY: Tag checked.
                    let rec = unsafe { d.as_record() };
                    if cmp(rec.item(), high) == Ordering::Less
                        && cmp(rec.item(), low) != Ordering::Less
                    {
                        deltas.push(PageItem {
                            itm: rec.item(),
                            is_insert: d.op() == DeltaOp::Insert,
                        });
                    }
                }
                DeltaOp::SwapIn => {
                    // SAFETY: Tag checked.
                    pd = unsafe { d.as_swapin() }.chain();
                    continue;
                }
                _ => {}
            }
            pd = d.next();
        }

        // Stable by collection order, so the head-most (most recent) delta
        // leads each equal-key group; collapse the group to that leader.
        deltas.sort_by(|a, b| cmp(a.itm, b.itm));
        deltas.dedup_by(|a, b| cmp(a.itm, b.itm) == Ordering::Equal);
    }

    trace_log!(
        run = deltas.len(),
        flushed = fd_sz,
        "chain iterator built"
    );

    (ChainIter::new(DeltaRunIter::new(deltas), side, cmp, do_dedup), fd_sz)
}

// ============================================================================
//  Tests
// ============================================================================

//! Cross-page traversal surface.
//!
//! A [`StoreIter`] walks all pages in key order: it asks the external ordered
//! index which page covers a key, materialises that page's chain through the
//! external page reader, drains the chain iterator, and follows the next-page
//! link captured when the page was opened.
//!
//! The ordered index and the page reader are black boxes reached through the
//! [`OrderedIndex`] and [`PageReader`] traits; the store behind them must
//! keep a page's chain (and its items) stable for as long as the iterator is
//! positioned on that page.
//!
//! Reader faults are sticky: once `read_page` fails, every subsequent
//! positioning call returns the same error until [`StoreIter::reset`].
//! Logically empty pages are not errors; the iterator hops across them.

use crate::delta::PageDelta;
use crate::error::{Error, Result};
use crate::item::{CompareFn, Item, max_item, min_item};
use crate::iterator::{ChainIter, PgOpIterator, build_chain_iter};
use crate::page::chain_is_empty;

// ============================================================================
//  External collaborators
// ============================================================================

/// The ordered map from low-key to page.
pub trait OrderedIndex {
    /// Opaque page identifier.
    type PageId: Copy + Eq + std::fmt::Debug;

    /// The first page (its low key is the min sentinel).
    fn head_node(&self) -> Self::PageId;

    /// Locate the page covering `itm`'s key.
    ///
    /// Returns `(prev, curr, found)`: `curr` is the page whose low key equals
    /// the lookup key when `found`, otherwise `prev` is the page with the
    /// greatest low key below it.
    fn lookup(&self, itm: *const Item) -> (Self::PageId, Self::PageId, bool);
}

/// A materialised view of one page, valid until the reader invalidates it.
#[derive(Debug)]
pub struct PageView<P> {
    /// Chain head snapshot.
    pub head: *mut PageDelta,
    /// Comparator for items on this page.
    pub cmp: CompareFn,
    /// The next page in key order, captured at open time.
    pub next: Option<P>,
}

impl<P> PageView<P> {
    /// Whether the page has no visible records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        // SAFETY: The reader hands out views over valid, immutable chain
        // snapshots (PageReader contract).
        unsafe { chain_is_empty(self.head, self.cmp) }
    }
}

/// The page materialisation service.
///
/// `read_page` may fault a swapped-out page back in; `follow_chain` asks it
/// to resolve swap-outs rather than surface the bare terminator. The returned
/// view's chain must stay valid while the caller traverses it.
pub trait PageReader: OrderedIndex {
    /// Materialise a page.
    fn read_page(&self, pid: Self::PageId, follow_chain: bool) -> Result<PageView<Self::PageId>>;
}

// ============================================================================
//  ItemIterator
// ============================================================================

/// The capability set exposed to the store's callers.
///
/// `get` is undefined while `!valid()`; callers check `valid` and the
/// returned error after every positioning call.
pub trait ItemIterator {
    /// Position at the first item of the first page.
    fn seek_first(&mut self) -> Result<()>;

    /// Position at the first item at or above `itm`'s key.
    fn seek(&mut self, itm: *const Item) -> Result<()>;

    /// The current item; null while `!valid()`.
    fn get(&self) -> *const Item;

    /// Whether a current item exists.
    fn valid(&self) -> bool;

    /// Advance, following the next-page link on exhaustion.
    fn next(&mut self) -> Result<()>;
}

/// Iterator over every visible record in the store, in key order.
pub struct StoreIter<'a, S: PageReader> {
    store: &'a S,
    next_pid: Option<S::PageId>,
    curr: Option<ChainIter>,
    err: Option<Error>,
}

impl<'a, S: PageReader> StoreIter<'a, S> {
    /// Fresh, unpositioned iterator.
    #[must_use]
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            next_pid: None,
            curr: None,
            err: None,
        }
    }

    /// Clear position and any sticky error.
    pub fn reset(&mut self) {
        self.next_pid = None;
        self.curr = None;
        self.err = None;
    }

    fn err_result(&self) -> Result<()> {
        match &self.err {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// Open `pid` and position at its first item at or above `seek_itm`,
    /// hopping across pages whose window is empty.
    fn init_pg_iter(&mut self, pid: S::PageId, seek_itm: *const Item) {
        self.curr = None;
        let mut pid = pid;
        loop {
            match self.store.read_page(pid, true) {
                Ok(pg) => {
                    self.next_pid = pg.next;
                    // SAFETY: The reader's view keeps the chain stable while
                    // this iterator is positioned on the page (PageReader
                    // contract).
                    let (mut it, _) =
                        unsafe { build_chain_iter(pg.head, pg.cmp, seek_itm, max_item(), true) };
                    it.init();
                    if it.valid() {
                        self.curr = Some(it);
                        return;
                    }
                    trace_log!(?pid, "page window empty, hopping");
                    match self.next_pid {
                        Some(next) => pid = next,
                        None => return,
                    }
                }
                Err(e) => {
                    warn_log!(?pid, error = %e, "page read failed");
                    self.err = Some(e);
                    return;
                }
            }
        }
    }
}

impl<'a, S: PageReader> ItemIterator for StoreIter<'a, S> {
    fn seek_first(&mut self) -> Result<()> {
        self.err_result()?;
        self.init_pg_iter(self.store.head_node(), min_item());
        self.err_result()
    }

    fn seek(&mut self, itm: *const Item) -> Result<()> {
        self.err_result()?;
        let (prev, curr, found) = self.store.lookup(itm);
        let pid = if found { curr } else { prev };
        self.init_pg_iter(pid, itm);
        self.err_result()
    }

    fn get(&self) -> *const Item {
        self.curr
            .as_ref()
            .and_then(PgOpIterator::get)
            .map_or(std::ptr::null(), |pi| pi.itm)
    }

    fn valid(&self) -> bool {
        self.curr.as_ref().is_some_and(PgOpIterator::valid)
    }

    fn next(&mut self) -> Result<()> {
        self.err_result()?;
        if let Some(it) = &mut self.curr {
            it.next();
            if !it.valid() {
                match self.next_pid {
                    Some(pid) => self.init_pg_iter(pid, min_item()),
                    None => self.curr = None,
                }
            }
        }
        self.err_result()
    }
}

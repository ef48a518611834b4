//! Common test utilities: tracing setup and a vector-backed stand-in for the
//! external ordered index + page reader.
//!
//! The real store maps low-keys to pages through a concurrent skiplist; these
//! tests only need the narrow `OrderedIndex`/`PageReader` contract, so a
//! sorted `Vec` of `(low, PageHead)` slots is enough.

#![allow(dead_code)]

use std::ptr;
use std::sync::Once;

use deltapage::alloc::{AllocCtx, NodeArena};
use deltapage::delta::PageDelta;
use deltapage::item::{Item, cmp_item, min_item};
use deltapage::page::{Page, PageHead};
use deltapage::traverse::{OrderedIndex, PageReader, PageView};
use deltapage::{Error, Result};

/// Initialise a tracing subscriber once per test binary.
///
/// Filter with `RUST_LOG`, e.g. `RUST_LOG=deltapage=trace`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

struct TestPage {
    low: *const Item,
    slot: PageHead,
}

/// Vector-backed store: pages in ascending low-key order, page ids are
/// vector indices.
pub struct TestStore {
    pub arena: NodeArena,
    pages: Vec<TestPage>,
    scratch: Vec<*const Item>,
    garbage: Vec<*mut PageDelta>,
}

impl TestStore {
    pub fn new() -> Self {
        init_tracing();
        Self {
            arena: NodeArena::new_managed(),
            pages: Vec::new(),
            scratch: Vec::new(),
            garbage: Vec::new(),
        }
    }

    /// Allocate a scratch item owned (and eventually freed) by the store.
    pub fn item(&mut self, key: &[u8], seqno: u64, insert: bool) -> *const Item {
        let itm = self.arena.new_item(key, None, seqno, insert);
        self.scratch.push(itm);
        itm
    }

    /// Scratch item carrying a value.
    pub fn item_with_value(&mut self, key: &[u8], value: &[u8], seqno: u64) -> *const Item {
        let itm = self.arena.new_item(key, Some(value), seqno, true);
        self.scratch.push(itm);
        itm
    }

    /// Register a chain for destruction when the store drops.
    pub fn adopt_chain(&mut self, head: *mut PageDelta) {
        if !head.is_null() {
            self.garbage.push(head);
        }
    }

    /// Append a page with a consolidated base holding `entries`.
    ///
    /// `low` of `None` means the min sentinel (the head page). Pages must be
    /// appended in ascending low-key order with entries inside their range.
    pub fn add_page(&mut self, low: Option<&[u8]>, entries: &[(&[u8], u64)]) -> usize {
        let low_itm = match low {
            Some(k) => self.item(k, 0, true),
            None => min_item(),
        };

        let mut ctx = AllocCtx::new();
        // SAFETY: Null head; `low_itm` lives as long as the store.
        let mut page = unsafe { Page::new(&self.arena, &mut ctx, ptr::null_mut(), low_itm, cmp_item) };
        for &(key, seqno) in entries {
            let itm = self.arena.new_item(key, None, seqno, true);
            page.insert_record(itm);
            // SAFETY: The record delta copied the item.
            unsafe { self.arena.free_item(itm) };
        }
        page.compact();
        let head = page.head();

        // Nothing was published, so the replaced delta chain can go now.
        for f in ctx.take_malloc_ops().frees {
            // SAFETY: Single-threaded test construction; no readers.
            unsafe { self.arena.destroy_chain(f.head) };
        }

        self.pages.push(TestPage {
            low: low_itm,
            slot: PageHead::with_chain(head),
        });
        self.pages.len() - 1
    }

    /// Append a page with an explicit chain head (may be null for an empty
    /// page slot).
    pub fn add_page_with_chain(&mut self, low: Option<&[u8]>, head: *mut PageDelta) -> usize {
        let low_itm = match low {
            Some(k) => self.item(k, 0, true),
            None => min_item(),
        };
        self.pages.push(TestPage {
            low: low_itm,
            slot: PageHead::with_chain(head),
        });
        self.pages.len() - 1
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page_low(&self, pid: usize) -> *const Item {
        self.pages[pid].low
    }

    pub fn page_slot(&self, pid: usize) -> &PageHead {
        &self.pages[pid].slot
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestStore {
    fn drop(&mut self) {
        // SAFETY: Tests are done; nothing references the chains or scratch.
        unsafe {
            for page in &self.pages {
                self.arena.destroy_chain(page.slot.load());
            }
            for &head in &self.garbage {
                self.arena.destroy_chain(head);
            }
            for &itm in &self.scratch {
                self.arena.free_item(itm);
            }
        }
    }
}

impl OrderedIndex for TestStore {
    type PageId = usize;

    fn head_node(&self) -> usize {
        0
    }

    fn lookup(&self, itm: *const Item) -> (usize, usize, bool) {
        let mut prev = 0;
        for (i, page) in self.pages.iter().enumerate() {
            match cmp_item(page.low, itm) {
                std::cmp::Ordering::Less => prev = i,
                std::cmp::Ordering::Equal => return (prev, i, true),
                std::cmp::Ordering::Greater => return (prev, i, false),
            }
        }
        (prev, prev, false)
    }
}

impl PageReader for TestStore {
    fn read_page(&self, pid: usize, _follow_chain: bool) -> Result<PageView<usize>> {
        let page = self
            .pages
            .get(pid)
            .ok_or_else(|| Error::PageRead(format!("no such page: {pid}")))?;
        let next = (pid + 1 < self.pages.len()).then_some(pid + 1);
        Ok(PageView {
            head: page.slot.load(),
            cmp: cmp_item,
            next,
        })
    }
}

/// Store wrapper that fails reads of one page, for sticky-error tests.
pub struct FlakyStore<'a> {
    pub inner: &'a TestStore,
    pub fail_pid: usize,
}

impl<'a> OrderedIndex for FlakyStore<'a> {
    type PageId = usize;

    fn head_node(&self) -> usize {
        self.inner.head_node()
    }

    fn lookup(&self, itm: *const Item) -> (usize, usize, bool) {
        self.inner.lookup(itm)
    }
}

impl<'a> PageReader for FlakyStore<'a> {
    fn read_page(&self, pid: usize, follow_chain: bool) -> Result<PageView<usize>> {
        if pid == self.fail_pid {
            return Err(Error::PageRead(format!("injected fault on page {pid}")));
        }
        self.inner.read_page(pid, follow_chain)
    }
}

//! # deltapage
//!
//! A lock-free, delta-chained page store core.
//!
//! Each logical page is a singly-linked chain of immutable *deltas*
//! terminating in a *base page* (a sorted array of packed items). Readers
//! snapshot the page head and fuse the chain into one ordered stream; writers
//! stage nodes privately and publish with a single compare-and-swap of the
//! head. Pages split, merge with their right neighbour, and may be evicted to
//! backing storage and re-materialised on demand.
//!
//! ## Layers
//!
//! - [`item`]: the packed item codec and sentinel-aware comparator.
//! - [`delta`]: delta node variants and the chain invariants.
//! - [`alloc`]: contiguous node allocation, per-page accounting, chain
//!   destruction, and deferred reclamation.
//! - [`iterator`]: the chain iterator fusing deltas, base page, and merged
//!   siblings into an ordered, deduplicated, range-clipped stream.
//! - [`page`]: the write surface; private chain edits published by CAS.
//! - [`traverse`]: the cross-page [`ItemIterator`] over the external ordered
//!   index and page reader.
//!
//! ## Concurrency
//!
//! Readers never lock: a head snapshot is a consistent view by construction.
//! Writers publish-or-retry on the head CAS. Replaced chains are handed to
//! [`Reclaimer`], which defers destruction until no reader can observe them.

#[macro_use]
mod tracing_helpers;

pub mod alloc;
pub mod delta;
pub mod error;
pub mod item;
pub mod iterator;
pub mod ordering;
pub mod page;
pub mod traverse;

pub use alloc::{AllocCtx, ByteAllocator, FreePage, HeapAllocator, MallocOps, NodeArena, Reclaimer, TrackingAllocator};
pub use delta::{DeltaOp, PageDelta};
pub use error::{Error, Result};
pub use item::{CompareFn, Item, cmp_item, item_size, max_item, min_item};
pub use iterator::{ChainIter, PageItem, PgOpIterator, build_chain_iter};
pub use page::{Page, PageHead};
pub use traverse::{ItemIterator, OrderedIndex, PageReader, PageView, StoreIter};

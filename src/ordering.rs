//! Standard memory orderings for page-head access.
//!
//! These constants ensure consistent ordering usage across the codebase
//! and make the intent clear at each access point.

use std::sync::atomic::Ordering;

/// Ordering for loading a page head before traversal.
/// Pairs with the publisher's Release store.
pub const READ_ORD: Ordering = Ordering::Acquire;

/// Ordering for CAS success when publishing a new head.
/// The prepended delta (and everything it links) must be visible
/// before the head swings.
pub const CAS_SUCCESS: Ordering = Ordering::AcqRel;

/// Ordering for CAS failure.
/// Only need to observe the current head for the retry.
pub const CAS_FAILURE: Ordering = Ordering::Acquire;

/// Ordering for stores with no concurrent observers (page construction,
/// teardown with exclusive access).
pub const RELAXED: Ordering = Ordering::Relaxed;

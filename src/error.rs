//! Error types for page traversal.
//!
//! Only faults from the external page reader become errors. Exhausted or
//! logically empty pages are a normal `!valid()` state, not an error.

use std::fmt::Display;

/// Errors surfaced by the traversal surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The page reader failed to materialise a page (storage fault while
    /// faulting a swapped-out page back in, torn mapping, etc.).
    PageRead(String),
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::PageRead(msg) => write!(f, "page read failed: {msg}"),
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

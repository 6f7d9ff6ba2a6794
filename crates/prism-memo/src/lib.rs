//! Memoization primitives for state projection.
//!
//! Selectors turn an immutable state snapshot into view models. This crate
//! provides the caches they are built from, with no knowledge of what the
//! state describes.
//!
//! # Components
//!
//! - [`SelectorCache`]: single-slot cache, recomputes only when inputs change
//! - [`Selector`], [`create_selector`], [`combine_selectors`]: typed selector
//!   interface and combinators built on `SelectorCache`
//! - [`BulkMemoizer`]: round-scoped multi-key cache with mark-and-sweep
//!   eviction, for per-item view models over dynamic collections
//! - [`ValueMemoizer`]: unbounded cache keyed by serialized arguments, for
//!   low-cardinality pure functions
//! - [`Identical`]: the identity comparison every cache uses
//!
//! # Execution model
//!
//! Every cache is owned by one selector instance and mutated through
//! `&mut self`. Nothing here is shared between threads; wrapping a cache in a
//! lock is the caller's responsibility if it ever is.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod bulk;
mod error;
mod identical;
mod selector;
mod stats;
mod value;

pub use bulk::{
    ArgsComparator, BulkMemoizer, DuplicateKeyPolicy, IdenticalArgs, Round, create_bulk_memoizer,
    create_bulk_memoizer_with,
};
pub use error::{MemoError, SelectorError};
pub use identical::Identical;
pub use selector::{
    CachedSelector, CombinedSelector, FnSelector, Selector, SelectorCache, SelectorSet,
    combine_selectors, create_selector, selector_fn,
};
pub use stats::CacheStats;
pub use value::{ValueMemoizer, cache_key, create_memoized_function};

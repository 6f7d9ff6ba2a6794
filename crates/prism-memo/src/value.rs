//! Unbounded value memoization.
//!
//! [`ValueMemoizer`] caches a pure function by a stable serialization of its
//! arguments. Entries live until [`ValueMemoizer::clear`] is called, so the
//! cache grows with the number of distinct argument tuples ever seen.
//!
//! Only use it for low-cardinality argument spaces (locale strings, enum
//! formatting, a handful of layout modes). Per-message or per-participant
//! computations belong in [`crate::BulkMemoizer`], which sweeps entries that
//! are no longer requested.
//!
//! # Keys
//!
//! Arguments are encoded as CBOR. Two argument tuples share an entry if and
//! only if they encode to the same bytes. Containers with unspecified
//! iteration order (`HashMap`, `HashSet`) may encode differently for equal
//! contents and therefore miss the cache; prefer `BTreeMap`/`BTreeSet` in
//! memoized arguments.

use std::{collections::HashMap, marker::PhantomData};

use serde::Serialize;

use crate::{error::MemoError, stats::CacheStats};

/// Encode `args` into a cache key.
///
/// # Errors
///
/// Returns `MemoError::InvalidArguments` if serialization fails or produces
/// an empty key.
pub fn cache_key<A: Serialize + ?Sized>(args: &A) -> Result<Vec<u8>, MemoError> {
    let mut key = Vec::new();
    ciborium::into_writer(args, &mut key)
        .map_err(|e| MemoError::InvalidArguments { reason: e.to_string() })?;

    if key.is_empty() {
        return Err(MemoError::InvalidArguments { reason: "empty cache key".to_string() });
    }

    Ok(key)
}

/// Memoized wrapper around a pure function of serializable arguments.
pub struct ValueMemoizer<A: ?Sized, R, F> {
    func: F,
    cache: HashMap<Vec<u8>, R>,
    capacity_limit: Option<usize>,
    stats: CacheStats,
    warned_at_limit: bool,
    _args: PhantomData<fn(&A)>,
}

impl<A, R, F> ValueMemoizer<A, R, F>
where
    A: Serialize + ?Sized,
    R: Clone,
    F: FnMut(&A) -> R,
{
    /// Wrap `func` with an unbounded cache.
    pub fn new(func: F) -> Self {
        Self {
            func,
            cache: HashMap::new(),
            capacity_limit: None,
            stats: CacheStats::default(),
            warned_at_limit: false,
            _args: PhantomData,
        }
    }

    /// Cap the number of cached entries.
    ///
    /// Once the cap is reached, new argument tuples are still computed and
    /// returned but not stored. Existing entries keep answering.
    #[must_use]
    pub fn with_capacity_limit(mut self, limit: usize) -> Self {
        self.capacity_limit = Some(limit);
        self
    }

    /// Call the wrapped function, answering from the cache when possible.
    ///
    /// # Errors
    ///
    /// Returns `MemoError::InvalidArguments` if `args` cannot be encoded.
    /// Nothing is computed or cached in that case.
    pub fn call(&mut self, args: &A) -> Result<R, MemoError> {
        let key = cache_key(args)?;

        if let Some(result) = self.cache.get(&key) {
            self.stats.hit();
            return Ok(result.clone());
        }

        self.stats.miss();
        let result = (self.func)(args);

        if self.capacity_limit.is_some_and(|limit| self.cache.len() >= limit) {
            if !self.warned_at_limit {
                tracing::warn!(
                    limit = self.cache.len(),
                    "value memoizer at capacity, new results are not cached"
                );
                self.warned_at_limit = true;
            }
            self.stats.evict(1);
            return Ok(result);
        }

        self.cache.insert(key, result.clone());
        Ok(result)
    }

    /// Number of cached argument tuples.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if nothing has been cached.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Configured entry cap, if any.
    pub fn capacity_limit(&self) -> Option<usize> {
        self.capacity_limit
    }

    /// Drop every cached entry.
    pub fn clear(&mut self) {
        self.stats.evict(self.cache.len());
        self.cache.clear();
        self.warned_at_limit = false;
    }

    /// Cache counters.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

impl<A: ?Sized, R, F> std::fmt::Debug for ValueMemoizer<A, R, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueMemoizer")
            .field("entries", &self.cache.len())
            .field("capacity_limit", &self.capacity_limit)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Wrap `func` in an unbounded [`ValueMemoizer`].
pub fn create_memoized_function<A, R, F>(func: F) -> ValueMemoizer<A, R, F>
where
    A: Serialize + ?Sized,
    R: Clone,
    F: FnMut(&A) -> R,
{
    ValueMemoizer::new(func)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use serde::Serializer;

    use super::*;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("cyclic structure"))
        }
    }

    #[test]
    fn repeated_arguments_compute_once() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let mut format = create_memoized_function(move |(locale, count): &(String, u32)| {
            counter.set(counter.get() + 1);
            format!("{locale}:{count}")
        });

        let args = ("en-US".to_string(), 3);
        assert_eq!(format.call(&args).unwrap(), "en-US:3");
        assert_eq!(format.call(&args).unwrap(), "en-US:3");

        assert_eq!(calls.get(), 1);
        assert_eq!(format.stats().hits, 1);
        assert_eq!(format.stats().misses, 1);
    }

    #[test]
    fn equal_arguments_in_new_allocations_share_entry() {
        let mut upper = ValueMemoizer::new(|s: &str| s.to_uppercase());

        upper.call("mute").unwrap();
        upper.call(&String::from("mute")).unwrap();

        assert_eq!(upper.len(), 1);
    }

    #[test]
    fn serialization_failure_is_typed_error() {
        let mut memo = ValueMemoizer::new(|_: &Unserializable| 1);

        let result = memo.call(&Unserializable);

        assert!(matches!(result, Err(MemoError::InvalidArguments { .. })));
        assert!(memo.is_empty(), "failed keys must not be cached");
        assert_eq!(memo.stats().misses, 0);
    }

    #[test]
    fn cache_grows_with_every_distinct_tuple() {
        let mut square = ValueMemoizer::new(|n: &u64| n * n);

        for n in 0..100 {
            square.call(&n).unwrap();
        }

        // No eviction: one entry per distinct argument tuple.
        assert_eq!(square.len(), 100);
        assert_eq!(square.stats().evictions, 0);
    }

    #[test]
    fn capacity_limit_stops_growth_but_still_answers() {
        let mut square = ValueMemoizer::new(|n: &u64| n * n).with_capacity_limit(2);

        assert_eq!(square.call(&1).unwrap(), 1);
        assert_eq!(square.call(&2).unwrap(), 4);
        assert_eq!(square.call(&3).unwrap(), 9);

        assert_eq!(square.len(), 2);
        assert_eq!(square.capacity_limit(), Some(2));
        assert_eq!(square.stats().evictions, 1);

        // Cached entries still hit.
        square.call(&1).unwrap();
        assert_eq!(square.stats().hits, 1);
    }

    #[test]
    fn clear_empties_cache() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let mut memo = ValueMemoizer::new(move |n: &u8| {
            counter.set(counter.get() + 1);
            *n
        });

        memo.call(&1).unwrap();
        memo.clear();
        memo.call(&1).unwrap();

        assert_eq!(calls.get(), 2);
        assert_eq!(memo.stats().evictions, 1);
    }

    #[test]
    fn unit_arguments_produce_a_key() {
        assert!(!cache_key(&()).unwrap().is_empty());
    }
}

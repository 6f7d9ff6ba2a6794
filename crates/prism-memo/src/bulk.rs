//! Round-based bulk memoization.
//!
//! A [`BulkMemoizer`] memoizes many keyed invocations of one function across
//! repeated passes. Each pass is a *round*: the driver closure handed to
//! [`BulkMemoizer::run_round`] calls [`Round::call`] once per item (for
//! example once per remote participant while building a gallery), and the
//! memoizer decides per key whether the previous round's result can be reused.
//!
//! # Algorithm
//!
//! Two maps are kept: `cache` holds the results of the last completed round,
//! `next` is filled during the current round. On `call(key, args)`:
//!
//! 1. If `cache[key]` exists and its recorded args compare equal to `args`,
//!    its result is copied into `next` and returned.
//! 2. Otherwise the function runs and the fresh result goes into `next`.
//!
//! When the driver returns `Ok`, `next` replaces `cache`.
//!
//! # Invariants
//!
//! - Mark and sweep: an entry reaches the next round's cache if and only if
//!   it was requested during the round that just completed. Memory is bounded
//!   by the live working set, not by every key ever seen.
//! - A round whose driver returns `Err` leaves the previous cache untouched
//!   and discards everything computed during that round.
//! - A key is requested at most once per round under
//!   [`DuplicateKeyPolicy::Reject`].

use std::{collections::HashMap, fmt::Debug, hash::Hash};

use crate::{error::MemoError, identical::Identical, stats::CacheStats};

/// Decides whether recorded arguments can be reused for new arguments.
pub trait ArgsComparator<A: ?Sized> {
    /// Returns true if a result computed for `previous` is valid for `next`.
    fn args_equal(&self, previous: &A, next: &A) -> bool;
}

/// Default comparator: element-wise identity via [`Identical`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdenticalArgs;

impl<A: Identical + ?Sized> ArgsComparator<A> for IdenticalArgs {
    fn args_equal(&self, previous: &A, next: &A) -> bool {
        previous.identical(next)
    }
}

impl<A: ?Sized, F> ArgsComparator<A> for F
where
    F: Fn(&A, &A) -> bool,
{
    fn args_equal(&self, previous: &A, next: &A) -> bool {
        self(previous, next)
    }
}

/// What to do when a round requests the same key twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKeyPolicy {
    /// Fail the call with [`MemoError::DuplicateKey`].
    #[default]
    Reject,

    /// The later call overwrites the earlier one's entry.
    ///
    /// Both calls are answered against the previous round's cache, so the
    /// surviving entry depends on call order.
    LastCallWins,
}

struct Entry<A, R> {
    args: A,
    result: R,
}

/// Round-scoped multi-key memoizer.
///
/// # Type Parameters
///
/// - `K`: per-item key (participant id, message id)
/// - `A`: arguments the result depends on, compared with `C`
/// - `R`: memoized result, cloned out of the cache (use `Arc` for view models)
/// - `F`: the memoized function
/// - `C`: argument comparator
pub struct BulkMemoizer<K, A, R, F, C = IdenticalArgs> {
    func: F,
    comparator: C,
    policy: DuplicateKeyPolicy,
    cache: HashMap<K, Entry<A, R>>,
    next: HashMap<K, Entry<A, R>>,
    stats: CacheStats,
    rounds: u64,
}

impl<K, A, R, F> BulkMemoizer<K, A, R, F, IdenticalArgs>
where
    K: Eq + Hash + Debug,
    A: Identical,
    R: Clone,
    F: FnMut(&K, &A) -> R,
{
    /// Memoize `func`, comparing arguments by identity.
    pub fn new(func: F) -> Self {
        Self::with_comparator(func, IdenticalArgs)
    }
}

impl<K, A, R, F, C> BulkMemoizer<K, A, R, F, C>
where
    K: Eq + Hash + Debug,
    R: Clone,
    F: FnMut(&K, &A) -> R,
    C: ArgsComparator<A>,
{
    /// Memoize `func` with a caller-supplied argument comparator.
    pub fn with_comparator(func: F, comparator: C) -> Self {
        Self {
            func,
            comparator,
            policy: DuplicateKeyPolicy::default(),
            cache: HashMap::new(),
            next: HashMap::new(),
            stats: CacheStats::default(),
            rounds: 0,
        }
    }

    /// Set the duplicate-key policy.
    #[must_use]
    pub fn with_duplicate_key_policy(mut self, policy: DuplicateKeyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run one round.
    ///
    /// `driver` may call [`Round::call`] any number of times. On `Ok` the
    /// entries requested during the round become the cache for the next round
    /// and everything else is dropped. On `Err` the round is abandoned.
    ///
    /// # Errors
    ///
    /// Returns whatever error `driver` returns.
    pub fn run_round<T, E>(
        &mut self,
        driver: impl FnOnce(&mut Round<'_, K, A, R, F, C>) -> Result<T, E>,
    ) -> Result<T, E> {
        self.next.clear();

        let outcome = driver(&mut Round { memo: self });

        match outcome {
            Ok(value) => {
                let evicted = self.cache.keys().filter(|key| !self.next.contains_key(*key)).count();
                self.stats.evict(evicted);
                self.cache = std::mem::take(&mut self.next);
                self.rounds += 1;

                tracing::trace!(
                    round = self.rounds,
                    entries = self.cache.len(),
                    evicted,
                    "bulk memoizer round complete"
                );
                Ok(value)
            },
            Err(err) => {
                tracing::debug!(round = self.rounds + 1, "bulk memoizer round abandoned");
                self.next.clear();
                Err(err)
            },
        }
    }

    fn call(&mut self, key: K, args: A) -> Result<R, MemoError> {
        if self.next.contains_key(&key) {
            match self.policy {
                DuplicateKeyPolicy::Reject => {
                    return Err(MemoError::DuplicateKey { key: format!("{key:?}") });
                },
                DuplicateKeyPolicy::LastCallWins => {
                    tracing::debug!(?key, "duplicate key in round, later call wins");
                },
            }
        }

        if let Some(entry) = self.cache.get(&key)
            && self.comparator.args_equal(&entry.args, &args)
        {
            let result = entry.result.clone();
            self.stats.hit();
            self.next.insert(key, Entry { args, result: result.clone() });
            return Ok(result);
        }

        self.stats.miss();
        let result = (self.func)(&key, &args);
        self.next.insert(key, Entry { args, result: result.clone() });
        Ok(result)
    }

    /// Number of entries carried over from the last completed round.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if the last completed round requested nothing.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Check if `key` survived the last completed round.
    pub fn contains_key(&self, key: &K) -> bool {
        self.cache.contains_key(key)
    }

    /// Keys that survived the last completed round, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.cache.keys()
    }

    /// Number of completed rounds.
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Configured duplicate-key policy.
    pub fn duplicate_key_policy(&self) -> DuplicateKeyPolicy {
        self.policy
    }

    /// Cache counters.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Drop every cached entry. The next round recomputes everything.
    pub fn clear(&mut self) {
        self.stats.evict(self.cache.len());
        self.cache.clear();
    }
}

impl<K, A, R, F, C> std::fmt::Debug for BulkMemoizer<K, A, R, F, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkMemoizer")
            .field("entries", &self.cache.len())
            .field("rounds", &self.rounds)
            .field("policy", &self.policy)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Handle passed to a round driver.
pub struct Round<'a, K, A, R, F, C> {
    memo: &'a mut BulkMemoizer<K, A, R, F, C>,
}

impl<K, A, R, F, C> Round<'_, K, A, R, F, C>
where
    K: Eq + Hash + Debug,
    R: Clone,
    F: FnMut(&K, &A) -> R,
    C: ArgsComparator<A>,
{
    /// Memoized call for one item of the round.
    ///
    /// # Errors
    ///
    /// Returns `MemoError::DuplicateKey` if `key` was already requested this
    /// round and the policy is [`DuplicateKeyPolicy::Reject`].
    pub fn call(&mut self, key: K, args: A) -> Result<R, MemoError> {
        self.memo.call(key, args)
    }

    /// Number of distinct keys requested so far in this round.
    pub fn requested(&self) -> usize {
        self.memo.next.len()
    }
}

/// Memoize `func` across rounds, comparing arguments by identity.
pub fn create_bulk_memoizer<K, A, R, F>(func: F) -> BulkMemoizer<K, A, R, F>
where
    K: Eq + Hash + Debug,
    A: Identical,
    R: Clone,
    F: FnMut(&K, &A) -> R,
{
    BulkMemoizer::new(func)
}

/// Memoize `func` across rounds with a custom argument comparator.
pub fn create_bulk_memoizer_with<K, A, R, F, C>(
    func: F,
    comparator: C,
) -> BulkMemoizer<K, A, R, F, C>
where
    K: Eq + Hash + Debug,
    R: Clone,
    F: FnMut(&K, &A) -> R,
    C: ArgsComparator<A>,
{
    BulkMemoizer::with_comparator(func, comparator)
}

//! Single-slot selector memoization and typed selector composition.
//!
//! A selector is a pure function `(state, props) -> view model`. Wrapping it
//! in a [`SelectorCache`] makes repeated calls with identical inputs free: the
//! cache remembers exactly one `(inputs, output)` pair and compares new inputs
//! against it with [`Identical`].
//!
//! # Writing selectors
//!
//! A cached selector is split into two halves:
//!
//! - an *extractor* `Fn(&S, &P) -> I` that picks the slices the selector reads
//!   (cheap `Arc` clones plus the props that scope it), and
//! - a *body* `FnMut(&I) -> Result<O, SelectorError>` that only sees `I`.
//!
//! Because the body cannot reach anything the extractor did not hand it,
//! caching by `I` is always sound. Extracting the whole root instead of the
//! slice degenerates the cache to "recompute on every transition".
//!
//! Props are part of `I`, so the same state with different props (another
//! thread, another participant) never reuses an entry computed for a
//! different scope.
//!
//! # Invariants
//!
//! - Cache size is one entry per selector instance
//! - A failed body is never cached; the next call with the same inputs runs
//!   the body again

use std::marker::PhantomData;

use crate::{error::SelectorError, identical::Identical, stats::CacheStats};

/// Single-slot memo: last inputs and last output.
#[derive(Debug, Clone)]
pub struct SelectorCache<I, O> {
    last: Option<(I, O)>,
    stats: CacheStats,
}

impl<I, O> Default for SelectorCache<I, O> {
    fn default() -> Self {
        Self { last: None, stats: CacheStats::default() }
    }
}

impl<I: Identical, O: Clone> SelectorCache<I, O> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached output if `input` is identical to the recorded one,
    /// otherwise run `compute` and record the new pair.
    pub fn get_or_compute(&mut self, input: I, compute: impl FnOnce(&I) -> O) -> O {
        match self.try_get_or_compute(input, |i| Ok::<_, std::convert::Infallible>(compute(i))) {
            Ok(output) => output,
            Err(never) => match never {},
        }
    }

    /// Fallible variant of [`Self::get_or_compute`].
    ///
    /// # Errors
    ///
    /// Returns the error from `compute`. The previous entry is kept and the
    /// failed inputs are not recorded.
    pub fn try_get_or_compute<E>(
        &mut self,
        input: I,
        compute: impl FnOnce(&I) -> Result<O, E>,
    ) -> Result<O, E> {
        if let Some((last_input, last_output)) = &self.last
            && last_input.identical(&input)
        {
            self.stats.hit();
            return Ok(last_output.clone());
        }

        self.stats.miss();
        let output = compute(&input)?;
        if self.last.is_some() {
            self.stats.evict(1);
        }
        self.last = Some((input, output.clone()));
        Ok(output)
    }

    /// Output recorded by the last successful computation.
    pub fn last_output(&self) -> Option<&O> {
        self.last.as_ref().map(|(_, output)| output)
    }

    /// Forget the recorded pair.
    pub fn clear(&mut self) {
        if self.last.take().is_some() {
            self.stats.evict(1);
        }
    }

    /// Cache counters.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

/// A typed selector from `(S, P)` to a view model.
///
/// Implementations may keep caches, hence `&mut self`. They MUST NOT mutate
/// the state they are given.
pub trait Selector<S: ?Sized, P: ?Sized> {
    /// View model produced by the selector.
    type Output;

    /// Evaluate the selector.
    ///
    /// # Errors
    ///
    /// Returns `SelectorError` if the body fails. Failures are never cached.
    fn select(&mut self, state: &S, props: &P) -> Result<Self::Output, SelectorError>;

    /// Name used in logs and errors.
    fn name(&self) -> &'static str {
        "anonymous"
    }

    /// Cache counters, if the selector caches.
    fn stats(&self) -> Option<CacheStats> {
        None
    }
}

impl<S: ?Sized, P: ?Sized, T: Selector<S, P> + ?Sized> Selector<S, P> for Box<T> {
    type Output = T::Output;

    fn select(&mut self, state: &S, props: &P) -> Result<Self::Output, SelectorError> {
        (**self).select(state, props)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn stats(&self) -> Option<CacheStats> {
        (**self).stats()
    }
}

/// Uncached selector built from a plain function.
///
/// Every call runs the function. Useful as an input to
/// [`combine_selectors`] when the input is already cheap and stable (e.g.
/// reading a prop), and in tests that demonstrate what caching buys.
pub struct FnSelector<F, O> {
    name: &'static str,
    func: F,
    _output: PhantomData<fn() -> O>,
}

/// Wrap a plain function as an uncached [`Selector`].
pub fn selector_fn<S, P, O, F>(name: &'static str, func: F) -> FnSelector<F, O>
where
    S: ?Sized,
    P: ?Sized,
    F: FnMut(&S, &P) -> Result<O, SelectorError>,
{
    FnSelector { name, func, _output: PhantomData }
}

impl<S, P, O, F> Selector<S, P> for FnSelector<F, O>
where
    S: ?Sized,
    P: ?Sized,
    F: FnMut(&S, &P) -> Result<O, SelectorError>,
{
    type Output = O;

    fn select(&mut self, state: &S, props: &P) -> Result<O, SelectorError> {
        (self.func)(state, props)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Selector memoized by its extracted inputs.
pub struct CachedSelector<X, F, I, O> {
    name: &'static str,
    extract: X,
    compute: F,
    cache: SelectorCache<I, O>,
}

/// Build a [`CachedSelector`] from an extractor and a body.
pub fn create_selector<S, P, I, O, X, F>(
    name: &'static str,
    extract: X,
    compute: F,
) -> CachedSelector<X, F, I, O>
where
    S: ?Sized,
    P: ?Sized,
    X: Fn(&S, &P) -> I,
    F: FnMut(&I) -> Result<O, SelectorError>,
    I: Identical,
    O: Clone,
{
    CachedSelector { name, extract, compute, cache: SelectorCache::new() }
}

impl<X, F, I: Identical, O: Clone> CachedSelector<X, F, I, O> {
    /// Output recorded by the last successful evaluation.
    pub fn last_output(&self) -> Option<&O> {
        self.cache.last_output()
    }
}

impl<S, P, X, F, I, O> Selector<S, P> for CachedSelector<X, F, I, O>
where
    S: ?Sized,
    P: ?Sized,
    X: Fn(&S, &P) -> I,
    F: FnMut(&I) -> Result<O, SelectorError>,
    I: Identical,
    O: Clone,
{
    type Output = O;

    fn select(&mut self, state: &S, props: &P) -> Result<O, SelectorError> {
        let input = (self.extract)(state, props);
        let name = self.name;
        let compute = &mut self.compute;
        self.cache.try_get_or_compute(input, |input| {
            tracing::trace!(selector = name, "recomputing selector");
            compute(input)
        })
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn stats(&self) -> Option<CacheStats> {
        Some(self.cache.stats())
    }
}

/// A fixed group of selectors evaluated together.
///
/// Implemented for tuples of one to four selectors over the same `(S, P)`.
pub trait SelectorSet<S: ?Sized, P: ?Sized> {
    /// Tuple of the member selectors' outputs.
    type Outputs: Identical + Clone;

    /// Evaluate every member in order.
    ///
    /// # Errors
    ///
    /// Returns the first member failure.
    fn select_all(&mut self, state: &S, props: &P) -> Result<Self::Outputs, SelectorError>;
}

macro_rules! selector_set_tuple {
    ($($name:ident $idx:tt),+) => {
        impl<S: ?Sized, P: ?Sized, $($name),+> SelectorSet<S, P> for ($($name,)+)
        where
            $($name: Selector<S, P>, $name::Output: Identical + Clone,)+
        {
            type Outputs = ($($name::Output,)+);

            fn select_all(&mut self, state: &S, props: &P) -> Result<Self::Outputs, SelectorError> {
                Ok(($(self.$idx.select(state, props)?,)+))
            }
        }
    };
}

selector_set_tuple!(A 0);
selector_set_tuple!(A 0, B 1);
selector_set_tuple!(A 0, B 1, C 2);
selector_set_tuple!(A 0, B 1, C 2, D 3);

/// Selector whose body runs over the outputs of input selectors.
///
/// The combiner only reruns when some input selector produced a non-identical
/// output, so cached inputs with stable `Arc` outputs make the combination
/// free on unrelated transitions.
pub struct CombinedSelector<Ins, V, F, O> {
    name: &'static str,
    inputs: Ins,
    combiner: F,
    cache: SelectorCache<V, O>,
}

/// Combine input selectors with a combiner body.
///
/// `inputs` is a tuple of selectors (see [`SelectorSet`]); the combiner
/// receives the tuple of their outputs.
pub fn combine_selectors<Ins, V, F, O>(
    name: &'static str,
    inputs: Ins,
    combiner: F,
) -> CombinedSelector<Ins, V, F, O>
where
    V: Identical + Clone,
    F: FnMut(&V) -> Result<O, SelectorError>,
    O: Clone,
{
    CombinedSelector { name, inputs, combiner, cache: SelectorCache::new() }
}

impl<S, P, Ins, V, F, O> Selector<S, P> for CombinedSelector<Ins, V, F, O>
where
    S: ?Sized,
    P: ?Sized,
    Ins: SelectorSet<S, P, Outputs = V>,
    V: Identical + Clone,
    F: FnMut(&V) -> Result<O, SelectorError>,
    O: Clone,
{
    type Output = O;

    fn select(&mut self, state: &S, props: &P) -> Result<O, SelectorError> {
        let outputs = self.inputs.select_all(state, props)?;
        let name = self.name;
        let combiner = &mut self.combiner;
        self.cache.try_get_or_compute(outputs, |outputs| {
            tracing::trace!(selector = name, "recomputing combined selector");
            combiner(outputs)
        })
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn stats(&self) -> Option<CacheStats> {
        Some(self.cache.stats())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::{cell::Cell, rc::Rc, sync::Arc};

    use super::*;

    #[derive(Clone)]
    struct Root {
        left: Arc<u32>,
        right: Arc<u32>,
    }

    fn root(left: u32, right: u32) -> Root {
        Root { left: Arc::new(left), right: Arc::new(right) }
    }

    #[test]
    fn identical_inputs_run_body_once() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let mut double = create_selector(
            "double_left",
            |s: &Root, _p: &()| Arc::clone(&s.left),
            move |left: &Arc<u32>| {
                counter.set(counter.get() + 1);
                Ok(**left * 2)
            },
        );

        let state = root(4, 0);
        assert_eq!(double.select(&state, &()).unwrap(), 8);
        assert_eq!(double.select(&state, &()).unwrap(), 8);

        assert_eq!(calls.get(), 1);
        assert_eq!(double.stats().unwrap().hits, 1);
        assert_eq!(double.name(), "double_left");
    }

    #[test]
    fn unrelated_change_does_not_recompute() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let mut read_left = create_selector(
            "left",
            |s: &Root, _p: &()| Arc::clone(&s.left),
            move |left: &Arc<u32>| {
                counter.set(counter.get() + 1);
                Ok(**left)
            },
        );

        let s1 = root(1, 1);
        // Only `right` replaced.
        let s2 = Root { left: Arc::clone(&s1.left), right: Arc::new(2) };
        // `left` replaced.
        let s3 = Root { left: Arc::new(7), right: Arc::clone(&s2.right) };

        read_left.select(&s1, &()).unwrap();
        read_left.select(&s2, &()).unwrap();
        assert_eq!(calls.get(), 1);

        assert_eq!(read_left.select(&s3, &()).unwrap(), 7);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn different_props_do_not_share_entry() {
        let mut pick = create_selector(
            "pick",
            |s: &Root, side: &String| {
                let slice = if side == "left" { Arc::clone(&s.left) } else { Arc::clone(&s.right) };
                (slice, side.clone())
            },
            |(value, _side): &(Arc<u32>, String)| Ok(**value),
        );

        let state = root(1, 2);
        assert_eq!(pick.select(&state, &"left".to_string()).unwrap(), 1);
        assert_eq!(pick.select(&state, &"right".to_string()).unwrap(), 2);
        assert_eq!(pick.stats().unwrap().hits, 0);
    }

    #[test]
    fn failures_are_not_cached() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let mut fallible = create_selector(
            "fallible",
            |s: &Root, _p: &()| Arc::clone(&s.left),
            move |_left: &Arc<u32>| -> Result<u32, SelectorError> {
                counter.set(counter.get() + 1);
                Err(SelectorError::failed("fallible", "boom"))
            },
        );

        let state = root(1, 1);
        assert!(fallible.select(&state, &()).is_err());
        assert!(fallible.select(&state, &()).is_err());

        assert_eq!(calls.get(), 2, "same inputs retried after failure");
        assert!(fallible.last_output().is_none());
    }

    #[test]
    fn combined_selector_reruns_only_on_input_change() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);

        let left = create_selector("left", |s: &Root, _: &()| Arc::clone(&s.left), |l: &Arc<u32>| {
            Ok(Arc::clone(l))
        });
        let right = create_selector(
            "right",
            |s: &Root, _: &()| Arc::clone(&s.right),
            |r: &Arc<u32>| Ok(Arc::clone(r)),
        );
        let mut sum =
            combine_selectors("sum", (left, right), move |(l, r): &(Arc<u32>, Arc<u32>)| {
                counter.set(counter.get() + 1);
                Ok(**l + **r)
            });

        let s1 = root(1, 2);
        assert_eq!(sum.select(&s1, &()).unwrap(), 3);
        let s2 = s1.clone();
        assert_eq!(sum.select(&s2, &()).unwrap(), 3);
        assert_eq!(calls.get(), 1);

        let s3 = Root { left: Arc::clone(&s1.left), right: Arc::new(5) };
        assert_eq!(sum.select(&s3, &()).unwrap(), 6);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn fresh_output_from_input_defeats_consumer_cache() {
        // The input selector is uncached and allocates a new Arc on every
        // call. The consumer is correctly memoized, yet recomputes each time.
        let fresh = selector_fn("fresh", |s: &Root, _: &()| Ok(Arc::new(*s.left)));
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let mut consumer = combine_selectors("consumer", (fresh,), move |(v,): &(Arc<u32>,)| {
            counter.set(counter.get() + 1);
            Ok(**v)
        });

        let state = root(3, 0);
        consumer.select(&state, &()).unwrap();
        consumer.select(&state, &()).unwrap();
        assert_eq!(calls.get(), 2);

        // Same shape with a cached input selector: stable output, one run.
        let stable = create_selector(
            "stable",
            |s: &Root, _: &()| Arc::clone(&s.left),
            |l: &Arc<u32>| Ok(Arc::new(**l)),
        );
        let stable_calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&stable_calls);
        let mut consumer = combine_selectors("consumer", (stable,), move |(v,): &(Arc<u32>,)| {
            counter.set(counter.get() + 1);
            Ok(**v)
        });
        consumer.select(&state, &()).unwrap();
        consumer.select(&state, &()).unwrap();
        assert_eq!(stable_calls.get(), 1);
    }

    #[test]
    fn cache_get_or_compute() {
        let mut cache = SelectorCache::new();
        let token = Arc::new(());

        assert_eq!(cache.get_or_compute(Arc::clone(&token), |_| 1), 1);
        assert_eq!(cache.get_or_compute(Arc::clone(&token), |_| 2), 1);
        assert_eq!(cache.get_or_compute(Arc::new(()), |_| 3), 3);

        cache.clear();
        assert!(cache.last_output().is_none());
        assert_eq!(cache.stats().evictions, 2);
    }
}

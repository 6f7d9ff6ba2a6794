//! Targeted patches applied to the state tree.
//!
//! Each SDK event maps to exactly one patch. A patch rebuilds only the path
//! from the root to the node it changes: siblings keep their `Arc`s, so
//! selectors reading them see identical inputs and skip recomputation.
//!
//! Patches are total: a target that is not in the tree, or a field that
//! already holds the requested value, yields `None` from
//! [`crate::Transition::apply`] and the store keeps its current root.

mod call;
mod chat;

use std::sync::Arc;

pub use call::CallPatch;
pub use chat::ChatPatch;

/// Append to a bounded history, dropping the oldest entries past `max`.
pub(crate) fn push_bounded<T: Clone>(
    history: &[T],
    items: impl IntoIterator<Item = T>,
    max: usize,
) -> Arc<Vec<T>> {
    let mut next: Vec<T> = history.to_vec();
    next.extend(items);
    if next.len() > max {
        next.drain(..next.len() - max);
    }
    Arc::new(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_bounded_drops_oldest() {
        let history = vec![1, 2, 3];
        assert_eq!(*push_bounded(&history, [4, 5], 4), vec![2, 3, 4, 5]);
        assert_eq!(*push_bounded(&history, [4], 10), vec![1, 2, 3, 4]);
        assert!(push_bounded(&history, [4], 0).is_empty());
    }
}

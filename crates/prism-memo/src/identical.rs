//! Identity comparison for memoized inputs.
//!
//! Selector caches decide whether to recompute by comparing the new inputs
//! against the previously recorded ones position by position. Shared pointers
//! compare by address, plain values compare by value. This mirrors what a
//! snapshot-producing store guarantees: a subtree that did not change keeps
//! its allocation, a subtree that changed gets a new one.
//!
//! # Invariants
//!
//! - `identical` is reflexive for every value that has not been mutated
//! - `Arc` and `Rc` never look inside the pointee

use std::{rc::Rc, sync::Arc};

/// Cheap "is this the same input" check.
///
/// Implementations MUST NOT perform deep structural comparison of shared
/// pointers. Deep comparison defeats the purpose of identity-based caching and
/// hides transitions that replaced a subtree with an equal-looking copy.
pub trait Identical {
    /// Returns true if `self` and `other` are the same input.
    fn identical(&self, other: &Self) -> bool;
}

impl<T: ?Sized> Identical for Arc<T> {
    fn identical(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T: ?Sized> Identical for Rc<T> {
    fn identical(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

impl<T: Identical + ?Sized> Identical for &T {
    fn identical(&self, other: &Self) -> bool {
        (**self).identical(*other)
    }
}

impl<T: Identical> Identical for Option<T> {
    fn identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.identical(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: Identical> Identical for [T] {
    fn identical(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.identical(b))
    }
}

impl<T: Identical> Identical for Vec<T> {
    fn identical(&self, other: &Self) -> bool {
        self.as_slice().identical(other.as_slice())
    }
}

impl Identical for () {
    fn identical(&self, _other: &Self) -> bool {
        true
    }
}

macro_rules! identical_by_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Identical for $ty {
                fn identical(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

identical_by_value!(
    bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, str, String,
);

// Floats compare by bit pattern: NaN equals NaN, +0 and -0 differ.
impl Identical for f64 {
    fn identical(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }
}

impl Identical for f32 {
    fn identical(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }
}

macro_rules! identical_tuple {
    ($($name:ident $idx:tt),+) => {
        impl<$($name: Identical),+> Identical for ($($name,)+) {
            fn identical(&self, other: &Self) -> bool {
                $(self.$idx.identical(&other.$idx))&&+
            }
        }
    };
}

identical_tuple!(A 0);
identical_tuple!(A 0, B 1);
identical_tuple!(A 0, B 1, C 2);
identical_tuple!(A 0, B 1, C 2, D 3);
identical_tuple!(A 0, B 1, C 2, D 3, E 4);
identical_tuple!(A 0, B 1, C 2, D 3, E 4, F 5);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arc_compares_by_pointer() {
        let a = Arc::new(vec![1, 2, 3]);
        let b = Arc::new(vec![1, 2, 3]);

        assert!(a.identical(&Arc::clone(&a)));
        assert!(!a.identical(&b), "equal contents in different allocations are not identical");
    }

    #[test]
    fn strings_compare_by_value() {
        assert!(String::from("thread-1").identical(&String::from("thread-1")));
        assert!(!"a".identical("b"));
    }

    #[test]
    fn tuples_compare_every_position() {
        let state = Arc::new(5_u32);
        let left = (Arc::clone(&state), String::from("p1"));
        let same = (Arc::clone(&state), String::from("p1"));
        let other_props = (Arc::clone(&state), String::from("p2"));

        assert!(left.identical(&same));
        assert!(!left.identical(&other_props));
    }

    #[test]
    fn floats_compare_by_bits() {
        assert!(f64::NAN.identical(&f64::NAN));
        assert!(!0.0_f64.identical(&-0.0_f64));
    }

    #[test]
    fn options_and_vectors() {
        let a = Arc::new(1);
        assert!(Some(Arc::clone(&a)).identical(&Some(Arc::clone(&a))));
        assert!(None::<Arc<i32>>.identical(&None));
        assert!(!Some(a.clone()).identical(&None));
        assert!(vec![a.clone()].identical(&vec![a.clone()]));
        assert!(!vec![a.clone()].identical(&vec![a.clone(), a]));
    }
}

//! Reference identity of node inputs
//!
//! Shared values (`Arc`) compare by pointer: a new allocation is a change
//! even when it holds equal data. Small plain values such as region codes
//! have no identity of their own and compare by value.

use std::sync::Arc;

/// "Is this the same input as last time?"
pub trait RefIdentity: Clone + Send + Sync + 'static {
    /// Whether `other` is the same reference (or the same plain value)
    fn same_ref(&self, other: &Self) -> bool;
}

impl<T: ?Sized + Send + Sync + 'static> RefIdentity for Arc<T> {
    fn same_ref(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T: RefIdentity> RefIdentity for Option<T> {
    fn same_ref(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.same_ref(b),
            (None, None) => true,
            _ => false,
        }
    }
}

macro_rules! impl_by_value {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl RefIdentity for $ty {
                fn same_ref(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )+
    };
}

impl_by_value!((), bool, char, i32, i64, u8, u32, u64, usize, String, &'static str);

macro_rules! impl_for_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: RefIdentity),+> RefIdentity for ($($name,)+) {
            fn same_ref(&self, other: &Self) -> bool {
                $(self.$idx.same_ref(&other.$idx))&&+
            }
        }
    };
}

impl_for_tuple!(A: 0);
impl_for_tuple!(A: 0, B: 1);
impl_for_tuple!(A: 0, B: 1, C: 2);
impl_for_tuple!(A: 0, B: 1, C: 2, D: 3);
impl_for_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4);
impl_for_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);

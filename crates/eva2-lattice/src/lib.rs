//! Core lattice operations for the eva2 value domains.
//!
//! A lattice is a partially ordered set where every pair of elements has:
//! - A least upper bound (join, ⊔) - represents combining information from branches
//! - A greatest lower bound (meet, ⊓) - represents intersection of constraints
//!
//! Special elements:
//! - Bottom (⊥) - no information, unreachable code
//! - Top (⊤) - all possible values, unknown

pub mod ival;

pub use ival::Ival;

/// A lattice element with join, meet, and ordering operations.
pub trait Lattice: Clone + PartialEq + Sized {
    /// The bottom element (⊥) - represents unreachable/no information.
    fn bottom() -> Self;

    /// The top element (⊤) - represents all possible values.
    fn top() -> Self;

    /// Check if this is the bottom element.
    fn is_bottom(&self) -> bool;

    /// Check if this is the top element.
    fn is_top(&self) -> bool;

    /// Least upper bound (join, ⊔).
    /// Used when merging information from different analysis paths.
    fn join(&self, other: &Self) -> Self;

    /// Greatest lower bound (meet, ⊓).
    /// Used when intersecting constraints.
    fn meet(&self, other: &Self) -> Self;

    /// Check if self ⊑ other.
    #[inline]
    fn leq(&self, other: &Self) -> bool {
        self.join(other) == *other
    }

    /// Widening operator for accelerating fixed-point computation.
    /// Default implementation is just join; infinite-height domains
    /// should override this to ensure termination.
    #[inline]
    fn widen(&self, other: &Self) -> Self {
        self.join(other)
    }
}

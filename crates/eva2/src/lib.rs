//! eva2 - abstract dynamic-memory model for a sound C static analyzer.
//!
//! This is the main library crate that re-exports all components.

#![warn(clippy::all)]

pub use eva2_heap as heap;
pub use eva2_lattice as lattice;
pub use eva2_memory as memory;

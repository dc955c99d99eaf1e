//! Allocation-base lifecycle engine for the eva2 analyzer.
//!
//! Models the C heap primitives over abstract memory states. Instead of
//! simulating a concrete heap, every allocation site coins a symbolic
//! *base* whose identity is canonicalized per callstack up to a precision
//! level: the first `max_level` live allocations at a site stay *strong*
//! (one concrete allocation each), everything beyond collapses into a
//! single *weak* base that stands for arbitrarily many. This caps the
//! number of bases per site, which is what makes the heap abstraction
//! terminate without drowning the analysis in spurious warnings.
//!
//! The lifecycle of a base:
//!
//! ```text
//! FreshStrong -> ReusedStrong* -> Weak -> ReusedWeak*
//!       \              \            (kept; pointers escape on free)
//!        `--------------`-- removed from the state by a strong free
//! ```
//!
//! Entry points are the builtins in [`builtins`], which a host analyzer
//! dispatches to by registered name. All engine state lives in an explicit
//! [`HeapContext`]; there are no ambient singletons.

pub mod alarm;
pub mod base;
pub mod builtins;
pub mod callstack;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod factory;
pub mod free;
pub mod leak;
pub mod painter;
pub mod realloc;
pub mod sizing;
pub mod validity;

pub use alarm::{Alarm, AlarmKind};
pub use base::{AllocRegion, BaseKind, BaseRecord, Validity, Weakness};
pub use builtins::{lookup, run, run_by_name, Builtin, BuiltinResult, Cacheable, Errno, Froms};
pub use callstack::{Callstack, Frame};
pub use config::{HeapConfig, HeapConfigBuilder};
pub use context::HeapContext;
pub use dispatch::{alloc_by_stack, alloc_size, CallInfo};
pub use error::{HeapError, HeapResult};
pub use factory::alloc_abstract;
pub use free::{free_bases, resolve_bases_to_free, FreeResolution};
pub use leak::check_leak;
pub use painter::{paint_uninitialized, paint_with};
pub use realloc::{realloc, tis_realloc, ReallocMode, ReallocOutcome};
pub use sizing::{extract_size, guess_intended_malloc_type, TypedSize};
pub use validity::update_variable_validity;

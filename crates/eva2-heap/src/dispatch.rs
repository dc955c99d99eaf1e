//! The allocation dispatcher.
//!
//! Implements the precision ladder: each truncated callstack owns an
//! ordered pool of bases. Reuse prefers bases freed on the current path;
//! once `max_level` live bases exist, every further allocation at the site
//! collapses into one weak base. This bounds the number of distinct bases
//! per site, trading precision for termination.

use eva2_memory::{BaseId, CType, CValue, Model};
use tracing::debug;

use crate::base::{AllocRegion, Weakness};
use crate::callstack::Callstack;
use crate::context::HeapContext;
use crate::error::HeapResult;
use crate::factory::alloc_abstract;
use crate::validity::update_variable_validity;

/// Host-provided description of the allocation call site.
#[derive(Debug, Clone)]
pub struct CallInfo {
    /// The current callstack, untruncated.
    pub stack: Callstack,
    /// Type of the destination lvalue when the call is `lv = call(...)`.
    pub dst_type: Option<CType>,
    /// Whether the size argument is a compile-time constant expression.
    pub size_is_constant: bool,
}

impl CallInfo {
    pub fn new(stack: Callstack) -> Self {
        CallInfo {
            stack,
            dst_type: None,
            size_is_constant: false,
        }
    }

    pub fn with_dst_type(mut self, dst_type: CType) -> Self {
        self.dst_type = Some(dst_type);
        self
    }

    pub fn with_constant_size(mut self) -> Self {
        self.size_is_constant = true;
        self
    }
}

/// Allocate through the per-callstack precision ladder.
///
/// Walks the pool coined at this (truncated) callstack:
/// - an entry not bound in `state` was freed on this path and is reused;
/// - a bound entry visited at position `max_level` is promoted to weak and
///   returned, so the pool never exceeds `max_level + 1` bases;
/// - otherwise a fresh base is minted and appended - weak already when the
///   pool has reached `max_level`.
///
/// Returns the chosen base and the request's `max_valid_bits`. The state
/// is not modified; painting is up to the caller.
#[allow(clippy::too_many_arguments)]
pub fn alloc_by_stack(
    ctx: &mut HeapContext,
    state: &Model,
    info: &CallInfo,
    sizev: &CValue,
    max_level: u32,
    initial: Weakness,
    prefix: &str,
    region: AllocRegion,
) -> HeapResult<(BaseId, i64)> {
    let stack = info.stack.truncated(ctx.config());
    let pool = ctx.pool(&stack).to_vec();

    for (nb, base) in pool.iter().enumerate() {
        if !state.is_bound(*base) {
            debug!(base = %ctx.base(*base), "reusing freed base");
            let max_valid = update_variable_validity(ctx, *base, sizev, initial.is_weak())?;
            return Ok((*base, max_valid));
        }
        if nb as u32 == max_level {
            let max_valid = update_variable_validity(ctx, *base, sizev, true)?;
            return Ok((*base, max_valid));
        }
    }

    let visited = pool.len() as u32;
    let weakness = if initial.is_weak() || visited >= max_level {
        Weakness::Weak
    } else {
        Weakness::Strong
    };
    let (base, max_valid) = alloc_abstract(
        ctx,
        &stack,
        weakness,
        prefix,
        region,
        sizev,
        info.dst_type.as_ref(),
        info.size_is_constant,
    );
    ctx.append_to_pool(stack, base);
    Ok((base, max_valid))
}

/// Allocate a fresh base on every visit, without callstack memoization.
pub fn alloc_size(
    ctx: &mut HeapContext,
    info: &CallInfo,
    sizev: &CValue,
    weakness: Weakness,
    prefix: &str,
) -> (BaseId, i64) {
    let stack = info.stack.truncated(ctx.config());
    alloc_abstract(
        ctx,
        &stack,
        weakness,
        prefix,
        AllocRegion::Heap,
        sizev,
        info.dst_type.as_ref(),
        info.size_is_constant,
    )
}

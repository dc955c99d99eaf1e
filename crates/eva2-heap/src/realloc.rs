//! The realloc engine.
//!
//! Reallocation is modeled as: coin a destination base, copy the surviving
//! prefix of every source base into it with weak pastes, then release the
//! sources. The "single" mode funnels all sources into one weak
//! destination obtained through the precision ladder; the "multiple" mode
//! builds a fresh strong destination per source and joins the outcomes.

use eva2_lattice::{Ival, Lattice};
use eva2_memory::{BaseId, CValue, Model};
use tracing::debug;

use crate::alarm::{Alarm, AlarmKind};
use crate::base::{AllocRegion, Validity, Weakness};
use crate::context::HeapContext;
use crate::dispatch::{alloc_by_stack, CallInfo};
use crate::error::{HeapError, HeapResult};
use crate::factory::alloc_abstract;
use crate::free::{free_bases, resolve_released};
use crate::painter::paint_uninitialized;

/// How destination bases are allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReallocMode {
    /// One weak destination shared by all sources.
    Single,
    /// A fresh strong destination per source base, joined.
    Multiple,
}

/// Result of a reallocation.
#[derive(Debug, Clone)]
pub struct ReallocOutcome {
    /// The returned pointer value.
    pub ret: CValue,
    /// The state after allocation, copies and release of the sources.
    pub state: Model,
    /// Destination bases coined by this call.
    pub dests: Vec<BaseId>,
    /// Source bases released by this call.
    pub sources: Vec<BaseId>,
    /// Diagnostics for unresolvable summands.
    pub alarms: Vec<Alarm>,
}

/// Model `realloc(ptr, size)`.
pub fn realloc(
    ctx: &mut HeapContext,
    state: &Model,
    info: &CallInfo,
    ptr: &CValue,
    sizev: &CValue,
    mode: ReallocMode,
) -> HeapResult<ReallocOutcome> {
    let resolution = resolve_released(ctx, ptr, AllocRegion::Heap, AlarmKind::InvalidRealloc);
    let sources = resolution.bases;
    let mlevel = ctx.config().mlevel;

    let (ret, dests, mut next) = match mode {
        ReallocMode::Single => {
            let (dest, max_valid) = alloc_by_stack(
                ctx,
                state,
                info,
                sizev,
                mlevel,
                Weakness::Weak,
                "realloc",
                AllocRegion::Heap,
            )?;
            let mut next = state.clone();
            paint_uninitialized(&mut next, ctx, dest, max_valid);
            copy_prefixes(ctx, &mut next, dest, max_valid + 1, &sources, state);
            (
                CValue::inject(dest, Ival::singleton(0)),
                vec![dest],
                next,
            )
        }
        ReallocMode::Multiple if sources.is_empty() => {
            let stack = info.stack.truncated(ctx.config());
            let (dest, max_valid) = alloc_abstract(
                ctx,
                &stack,
                Weakness::Strong,
                "realloc",
                AllocRegion::Heap,
                sizev,
                info.dst_type.as_ref(),
                info.size_is_constant,
            );
            let mut next = state.clone();
            paint_uninitialized(&mut next, ctx, dest, max_valid);
            (
                CValue::inject(dest, Ival::singleton(0)),
                vec![dest],
                next,
            )
        }
        ReallocMode::Multiple => {
            let stack = info.stack.truncated(ctx.config());
            let mut ret = CValue::bottom();
            let mut dests = Vec::with_capacity(sources.len());
            let mut joined: Option<Model> = None;
            for &source in &sources {
                let (dest, max_valid) = alloc_abstract(
                    ctx,
                    &stack,
                    Weakness::Strong,
                    "realloc",
                    AllocRegion::Heap,
                    sizev,
                    info.dst_type.as_ref(),
                    info.size_is_constant,
                );
                let mut branch = state.clone();
                paint_uninitialized(&mut branch, ctx, dest, max_valid);
                copy_prefixes(ctx, &mut branch, dest, max_valid + 1, &[source], state);
                ret = ret.join(&CValue::inject(dest, Ival::singleton(0)));
                dests.push(dest);
                joined = Some(match joined {
                    Some(acc) => acc.join(&branch),
                    None => branch,
                });
            }
            (ret, dests, joined.unwrap_or_else(|| state.clone()))
        }
    };

    if !sources.is_empty() {
        // The destination allocation may have promoted a reused source to
        // weak, so the release strength is decided afterwards.
        let exact = sources.len() == 1 && !ctx.base(sources[0]).is_weak();
        next = free_bases(&next, &sources, exact);
    }
    debug!(sources = sources.len(), dests = dests.len(), "reallocated");

    Ok(ReallocOutcome {
        ret,
        state: next,
        dests,
        sources,
        alarms: resolution.alarms,
    })
}

/// Model `tis_realloc(ptr, size)`.
///
/// Stricter contract than [`realloc`]: the size must be a concrete
/// non-negative interval, and with a definitely non-NULL pointer a zero
/// max size degenerates to a pure free returning NULL. Copying from a
/// weak source is not implemented.
pub fn tis_realloc(
    ctx: &mut HeapContext,
    state: &Model,
    info: &CallInfo,
    ptr: &CValue,
    sizev: &CValue,
) -> HeapResult<ReallocOutcome> {
    let iv = sizev
        .project_ival()
        .ok_or_else(|| HeapError::InvalidRealloc("size is not an integer".to_string()))?;
    let (smin, smax) = iv
        .project()
        .ok_or_else(|| HeapError::InvalidRealloc("size is not a finite interval".to_string()))?;
    if smin < 0 {
        return Err(HeapError::InvalidRealloc(format!(
            "negative minimum size {smin}"
        )));
    }

    let resolution = resolve_released(ctx, ptr, AllocRegion::Heap, AlarmKind::InvalidRealloc);
    let strong = resolution.strong();
    let sources = resolution.bases;

    // realloc(p, 0) with p definitely non-NULL is a plain free.
    if !resolution.null && smax == 0 {
        let next = free_bases(state, &sources, strong);
        return Ok(ReallocOutcome {
            ret: CValue::singleton_zero(),
            state: next,
            dests: Vec::new(),
            sources,
            alarms: resolution.alarms,
        });
    }

    // Source bounds are collected up front, refusing weak sources.
    let mut prefixes = Vec::with_capacity(sources.len());
    for &source in &sources {
        match ctx.base(source).validity {
            Validity::Variable { weak: true, .. } => {
                return Err(HeapError::WeakReallocUnsupported {
                    base: ctx.base(source).name.clone(),
                })
            }
            Validity::Variable {
                weak: false,
                min_alloc,
                max_alloc,
            } => prefixes.push((source, min_alloc, max_alloc)),
            _ => {
                return Err(HeapError::InvariantViolation(format!(
                    "realloc source {} has no variable validity",
                    ctx.base(source).name
                )))
            }
        }
    }

    let plevel = ctx.config().plevel;
    let (dest, max_valid) = alloc_by_stack(
        ctx,
        state,
        info,
        sizev,
        plevel,
        Weakness::Weak,
        "realloc",
        AllocRegion::Heap,
    )?;
    let mut next = state.clone();
    paint_uninitialized(&mut next, ctx, dest, max_valid);

    let dest_bits = max_valid + 1;
    if let Some(sure) = prefixes.iter().map(|(_, lo, _)| lo + 1).min() {
        let sure = sure.min(dest_bits);
        if sure > 0 {
            if let Some(om) = next.find_base_mut(dest) {
                om.write(0, sure - 1, CValue::bottom());
            }
        }
    }
    for &(source, _, max_alloc) in &prefixes {
        let copy_bits = (max_alloc + 1).min(dest_bits);
        if copy_bits <= 0 {
            continue;
        }
        if let Some(src_om) = state.find_base(source) {
            let slice = src_om.copy_slice(0, copy_bits - 1);
            if let Some(om) = next.find_base_mut(dest) {
                om.paste_slice(&slice, 0, false);
            }
        }
    }

    if !sources.is_empty() {
        let exact = sources.len() == 1 && !ctx.base(sources[0]).is_weak();
        next = free_bases(&next, &sources, exact);
    }

    let mut ret = CValue::inject(dest, Ival::singleton(0));
    // A NULL source with a possibly-zero size keeps NULL in the result.
    if resolution.null && smin == 0 {
        ret = ret.join(&CValue::singleton_zero());
    }

    Ok(ReallocOutcome {
        ret,
        state: next,
        dests: vec![dest],
        sources,
        alarms: resolution.alarms,
    })
}

/// Copy the surviving prefix of every source into `dest`.
///
/// The guaranteed-valid prefix common to all sources is first reset to
/// bottom, so the weak pastes that follow settle to exactly the source
/// contents where every source is defined; beyond it the fresh
/// UNINITIALIZED marker survives the join.
fn copy_prefixes(
    ctx: &HeapContext,
    next: &mut Model,
    dest: BaseId,
    dest_bits: i64,
    sources: &[BaseId],
    src_state: &Model,
) {
    let sure = sources
        .iter()
        .filter_map(|s| ctx.base(*s).min_alloc())
        .map(|lo| lo + 1)
        .min();
    if let Some(sure) = sure {
        let sure = sure.min(dest_bits);
        if sure > 0 {
            if let Some(om) = next.find_base_mut(dest) {
                om.write(0, sure - 1, CValue::bottom());
            }
        }
    }

    for &source in sources {
        let max_alloc = match ctx.base(source).max_alloc() {
            Some(hi) => hi,
            None => continue,
        };
        let copy_bits = (max_alloc + 1).min(dest_bits);
        if copy_bits <= 0 {
            continue;
        }
        if let Some(src_om) = src_state.find_base(source) {
            let slice = src_om.copy_slice(0, copy_bits - 1);
            if let Some(om) = next.find_base_mut(dest) {
                om.paste_slice(&slice, 0, false);
            }
        }
    }
}

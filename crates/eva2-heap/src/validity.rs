//! Validity updates across re-entries of an allocation site.
//!
//! Re-using a base rewrites its validity bounds in place; promoting it
//! from strong to weak additionally renames it and weakens its type. Both
//! transitions are monotone: weakness never reverts and the bounds of a
//! weak base only widen.

use eva2_memory::{BaseId, CType, CValue};
use tracing::debug;

use crate::base::{BaseKind, Validity};
use crate::context::HeapContext;
use crate::error::{HeapError, HeapResult};
use crate::sizing::extract_size;

/// Rewrite the validity of an existing allocated base for a new request.
///
/// Returns `max_valid_bits` for the request, the last bit offset made
/// addressable by this allocation (`-1` for zero bytes).
///
/// The base must be `Allocated` with `Variable` validity; anything else is
/// an engine invariant violation.
pub fn update_variable_validity(
    ctx: &mut HeapContext,
    base: BaseId,
    sizev: &CValue,
    make_weak: bool,
) -> HeapResult<i64> {
    let (smin, smax) = extract_size(ctx, sizev);
    let req_min = 8 * smin - 1;
    let req_max = 8 * smax - 1;

    let record = ctx
        .try_base(base)
        .ok_or_else(|| HeapError::InvariantViolation(format!("unknown base {base}")))?;
    if !matches!(record.kind, BaseKind::Allocated) {
        return Err(HeapError::InvariantViolation(format!(
            "validity update on non-allocated base {}",
            record.name
        )));
    }
    let (was_weak, old_min, old_max) = match record.validity {
        Validity::Variable {
            weak,
            min_alloc,
            max_alloc,
        } => (weak, min_alloc, max_alloc),
        _ => {
            return Err(HeapError::InvariantViolation(format!(
                "validity update on non-variable base {}",
                record.name
            )))
        }
    };

    let weak = make_weak || was_weak;
    // A weak base stands for every allocation observed at its site, so its
    // bounds join all observed sizes; a strong reuse models a brand new
    // allocation and takes the requested bounds.
    let (min_alloc, max_alloc) = if weak {
        (old_min.min(req_min), old_max.max(req_max))
    } else {
        (req_min, req_max)
    };

    let record = ctx.base_mut(base);
    if make_weak && !was_weak {
        insert_weak_marker(&mut record.name);
        record.typ = weaken_type(&record.typ);
        debug!(name = %record.name, "promoted base to weak");
    }
    record.validity = Validity::Variable {
        weak,
        min_alloc,
        max_alloc,
    };
    Ok(req_max)
}

/// Insert the `_w` marker before the per-site uniqueness suffix.
fn insert_weak_marker(name: &mut String) {
    match name.rfind('#') {
        Some(pos) => name.insert_str(pos, "_w"),
        None => name.push_str("_w"),
    }
}

/// An unsized array of the element type: the base may now stand for
/// allocations of several sizes.
fn weaken_type(typ: &CType) -> CType {
    match typ.unroll() {
        CType::Array(elem, _) => CType::Array(elem.clone(), None),
        other => CType::array_of(other.clone(), None),
    }
}

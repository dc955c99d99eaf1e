//! Minting of fresh allocation bases.

use eva2_memory::{BaseId, CType, CValue};
use tracing::debug;

use crate::base::{AllocRegion, BaseKind, BaseRecord, Validity, Weakness};
use crate::callstack::Callstack;
use crate::context::HeapContext;
use crate::sizing::{extract_size, guess_intended_malloc_type, TypedSize};

/// Mint a fresh symbolic base for an allocation request.
///
/// `stack` must already be truncated. Returns the new base and
/// `max_valid_bits`, the last bit offset the request makes addressable
/// (`-1` for a zero-byte allocation).
#[allow(clippy::too_many_arguments)]
pub fn alloc_abstract(
    ctx: &mut HeapContext,
    stack: &Callstack,
    weakness: Weakness,
    prefix: &str,
    region: AllocRegion,
    sizev: &CValue,
    dst_type: Option<&CType>,
    constant_size: bool,
) -> (BaseId, i64) {
    let (smin, smax) = extract_size(ctx, sizev);
    let typed = guess_intended_malloc_type(dst_type, smin, smax, constant_size);
    let typ = base_type(&typed, weakness);

    let top = stack.top();
    let stem = format!("__{prefix}_{}_l{}", top.function, top.line);
    let index = ctx.next_name_index(&stem);
    let name = if weakness.is_weak() {
        format!("{stem}_w#{index}")
    } else {
        format!("{stem}#{index}")
    };

    let min_alloc = 8 * smin - 1;
    let max_alloc = 8 * smax - 1;
    let record = BaseRecord {
        name,
        kind: BaseKind::Allocated,
        region,
        validity: Validity::Variable {
            weak: weakness.is_weak(),
            min_alloc,
            max_alloc,
        },
        typ,
    };
    debug!(
        name = %record.name,
        min_alloc,
        max_alloc,
        weak = weakness.is_weak(),
        "coined allocation base"
    );
    let id = ctx.declare(record);
    ctx.register_malloced(id);
    (id, max_alloc)
}

/// The C type of a freshly minted base.
///
/// A known single element is a scalar, a known count an array of that
/// length; weak bases and unknown counts get an unsized array, since the
/// base stands for allocations of varying size.
fn base_type(typed: &TypedSize, weakness: Weakness) -> CType {
    if weakness.is_weak() {
        return CType::array_of(typed.elem_typ.clone(), None);
    }
    match typed.nb_elems {
        Some(1) => typed.elem_typ.clone(),
        Some(n) if n >= 0 => CType::array_of(typed.elem_typ.clone(), Some(n as u64)),
        _ => CType::array_of(typed.elem_typ.clone(), None),
    }
}

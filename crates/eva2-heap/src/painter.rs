//! Painting freshly allocated ranges into the memory state.

use eva2_lattice::Lattice;
use eva2_memory::{BaseId, CValue, Model, OffsetMap};

use crate::context::HeapContext;

/// Bind `base` in `state` with its allocable range marked UNINITIALIZED.
pub fn paint_uninitialized(
    state: &mut Model,
    ctx: &HeapContext,
    base: BaseId,
    max_valid_bits: i64,
) {
    paint_with(state, ctx, base, max_valid_bits, CValue::uninitialized());
}

/// Bind `base` in `state`, writing `fill` over `[0, max_valid_bits]`.
///
/// The offset-map covers the base's full allocable range, initialized to
/// bottom; a negative `max_valid_bits` (zero-byte allocation) writes
/// nothing. When the base is already bound, the new map is joined with the
/// previous one rather than replacing it, so contents at shared offsets
/// survive re-entry into a weak base.
pub fn paint_with(
    state: &mut Model,
    ctx: &HeapContext,
    base: BaseId,
    max_valid_bits: i64,
    fill: CValue,
) {
    let full_bits = ctx.base(base).max_alloc().unwrap_or(-1) + 1;
    let mut om = OffsetMap::create_isotropic(full_bits, CValue::bottom());
    if max_valid_bits >= 0 {
        om.write(0, max_valid_bits, fill);
    }
    if let Some(existing) = state.find_base(base) {
        om = om.join(existing);
    }
    state.add_base(base, om);
}

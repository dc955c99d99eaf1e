//! The free engine.
//!
//! Resolves a pointer-set argument to the set of bases it may release,
//! then performs a strong removal (binding dropped) or a weak one (binding
//! kept). In both cases every location in the state that still points to a
//! freed base is rewritten to carry the ESCAPINGADDR marker.

use eva2_memory::{BaseId, CValue, Model};
use rustc_hash::FxHashSet;
use tracing::{debug, warn};

use crate::alarm::{Alarm, AlarmKind};
use crate::base::AllocRegion;
use crate::context::HeapContext;

/// Outcome of resolving a pointer value into freeable bases.
#[derive(Debug, Clone)]
pub struct FreeResolution {
    /// Allocated bases pointed to at offset zero.
    pub bases: Vec<BaseId>,
    /// Whether NULL is among the possible values.
    pub null: bool,
    /// Abstract cardinality: strong bases count one, weak bases two. Any
    /// value above one forces a weak update.
    pub card: u32,
    /// Diagnostics for the summands that cannot be freed.
    pub alarms: Vec<Alarm>,
}

impl FreeResolution {
    /// Whether the release may be performed as a strong update.
    pub fn strong(&self) -> bool {
        self.card <= 1
    }
}

/// Resolve the argument of `free` into the set of bases to release.
///
/// A summand is freeable when it points at offset zero into an allocated
/// heap base; NULL is legal. Everything else gets a "wrong free"
/// diagnostic, and the valid summands are still processed.
pub fn resolve_bases_to_free(ctx: &HeapContext, ptr: &CValue) -> FreeResolution {
    resolve_released(ctx, ptr, AllocRegion::Heap, AlarmKind::WrongFree)
}

pub(crate) fn resolve_released(
    ctx: &HeapContext,
    ptr: &CValue,
    region: AllocRegion,
    kind: AlarmKind,
) -> FreeResolution {
    let mut bases = Vec::new();
    let mut alarms = Vec::new();
    let mut card = 0;

    if ptr.contains_nonzero_num() {
        push_alarm(
            &mut alarms,
            kind,
            format!("released value {} is not a pointer", ptr.num()),
        );
    }
    if ptr.may_be_escaping() {
        push_alarm(
            &mut alarms,
            kind,
            "released pointer may already be dangling".to_string(),
        );
    }

    for (base, offsets) in ptr.pointers() {
        let record = match ctx.try_base(base) {
            Some(record) if record.is_allocated() && ctx.is_malloced(base) => record,
            _ => {
                push_alarm(&mut alarms, kind, format!("{base} is not an allocated base"));
                continue;
            }
        };
        if record.region != region {
            push_alarm(
                &mut alarms,
                kind,
                format!("{} belongs to the wrong region", record.name),
            );
            continue;
        }
        if !offsets.contains(0) {
            push_alarm(
                &mut alarms,
                kind,
                format!("{} released at non-zero offset {}", record.name, offsets),
            );
            continue;
        }
        card += if record.is_weak() { 2 } else { 1 };
        bases.push(base);
    }

    FreeResolution {
        bases,
        null: ptr.contains_null(),
        card,
        alarms,
    }
}

fn push_alarm(alarms: &mut Vec<Alarm>, kind: AlarmKind, message: String) {
    warn!(%message, "release diagnostic");
    alarms.push(match kind {
        AlarmKind::WrongFree => Alarm::wrong_free(message),
        AlarmKind::InvalidRealloc => Alarm::invalid_realloc(message),
        AlarmKind::Leak => Alarm::leak(message),
    });
}

/// Release `bases` from `state`.
///
/// With `exact` (strong release) each base's binding is removed. In both
/// modes the whole state is walked and every location referring to a freed
/// base is marked ESCAPINGADDR; the weak form keeps the original pointer
/// alongside the marker, since the base may not actually have been freed.
pub fn free_bases(state: &Model, bases: &[BaseId], exact: bool) -> Model {
    let freed: FxHashSet<BaseId> = bases.iter().copied().collect();
    let mut next = state.clone();
    if exact {
        for base in &freed {
            next.remove_base(*base);
        }
    }
    next.for_each_map_mut(|_, om| {
        om.map_values_mut(|v| {
            v.remap_escaped(|b| freed.contains(&b), exact);
        });
    });
    debug!(count = bases.len(), exact, "released bases");
    next
}

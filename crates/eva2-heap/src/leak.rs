//! Reachability-based leak detection.

use eva2_memory::{BaseId, Model};
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::alarm::Alarm;
use crate::base::AllocRegion;
use crate::context::HeapContext;

/// Report engine-minted heap bases unreachable from the rest of the state.
///
/// A base is reachable when some offset-map of any *other* base contains a
/// pointer into it. The scan is O(bases x state size) and does not detect
/// cycles: two leaked bases pointing at each other keep each other
/// "reachable" and are never reported.
pub fn check_leak(ctx: &HeapContext, state: &Model) -> (Vec<BaseId>, Vec<Alarm>) {
    let mut leaked = Vec::new();
    let mut alarms = Vec::new();

    let candidates: FxHashSet<BaseId> = ctx
        .malloced_bases()
        .filter(|b| ctx.base(*b).region == AllocRegion::Heap && state.is_bound(*b))
        .collect();

    for &candidate in &candidates {
        let reachable = state.iter_bases().any(|(other, om)| {
            other != candidate
                && om
                    .iter_values()
                    .any(|(_, _, v)| v.offsets_of(candidate).is_some())
        });
        if !reachable {
            debug!(base = %ctx.base(candidate), "unreferenced allocated base");
            alarms.push(Alarm::leak(format!(
                "allocated base {} is no longer referenced",
                ctx.base(candidate).name
            )));
            leaked.push(candidate);
        }
    }
    leaked.sort();
    (leaked, alarms)
}

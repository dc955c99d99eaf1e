//! The builtin dispatch table.
//!
//! Maps the names registered with the host analyzer to engine entry
//! points, checks arities, and packages engine outcomes into the result
//! shape the analyzer consumes.

use eva2_lattice::Ival;
use eva2_memory::{BaseId, CValue, Model};
use rustc_hash::FxHashSet;

use crate::alarm::Alarm;
use crate::base::{AllocRegion, Weakness};
use crate::context::HeapContext;
use crate::dispatch::{alloc_by_stack, alloc_size, CallInfo};
use crate::error::{HeapError, HeapResult};
use crate::free::{free_bases, resolve_bases_to_free, resolve_released};
use crate::leak::check_leak;
use crate::painter::paint_with;
use crate::realloc::{realloc, tis_realloc, ReallocMode, ReallocOutcome};
use crate::sizing::calloc_size;

/// Whether the analyzer may cache the result of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cacheable {
    /// The result only depends on the argument values.
    Cacheable,
    /// The result depends on the callstack; callers must not be cached.
    NoCacheCallers,
}

/// Errno values the engine may set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
    Enomem,
}

/// Dependency summary of a builtin call. Never computed by this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Froms;

/// Result of interpreting one builtin call.
#[derive(Debug, Clone)]
pub struct BuiltinResult {
    /// `(return value, state)` alternatives; an empty list is a bottom
    /// continuation (the path does not go on).
    pub c_values: Vec<(Option<CValue>, Model)>,
    /// Bases whose contents this call may have modified.
    pub c_clobbered: FxHashSet<BaseId>,
    /// Caching contract for the host.
    pub c_cacheable: Cacheable,
    /// Always `None`; dependencies are not computed here.
    pub c_from: Option<Froms>,
    /// Diagnostics to report at the call site.
    pub alarms: Vec<Alarm>,
    /// Errno set on the failure alternative, if any.
    pub errno: Option<Errno>,
}

impl BuiltinResult {
    fn new(c_cacheable: Cacheable) -> Self {
        BuiltinResult {
            c_values: Vec::new(),
            c_clobbered: FxHashSet::default(),
            c_cacheable,
            c_from: None,
            alarms: Vec::new(),
            errno: None,
        }
    }
}

/// The heap builtins exposed to the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    AllocSize,
    AllocSizeWeak,
    AllocByStack,
    Calloc,
    VlaAllocByStack,
    VlaFree,
    AllocTms,
    TisAlloc,
    TisAllocWeak,
    TisRealloc,
    Free,
    Realloc,
    ReallocMultiple,
    CheckLeak,
}

impl Builtin {
    /// The name under which the builtin is registered.
    pub fn name(self) -> &'static str {
        match self {
            Builtin::AllocSize => "Frama_C_alloc_size",
            Builtin::AllocSizeWeak => "Frama_C_alloc_size_weak",
            Builtin::AllocByStack => "Frama_C_alloc_by_stack",
            Builtin::Calloc => "Frama_C_calloc",
            Builtin::VlaAllocByStack => "Frama_C_vla_alloc_by_stack",
            Builtin::VlaFree => "Frama_C_vla_free",
            Builtin::AllocTms => "Frama_C_alloc_tms",
            Builtin::TisAlloc => "tis_alloc",
            Builtin::TisAllocWeak => "tis_alloc_weak",
            Builtin::TisRealloc => "tis_realloc",
            Builtin::Free => "Frama_C_free",
            Builtin::Realloc => "Frama_C_realloc",
            Builtin::ReallocMultiple => "Frama_C_realloc_multiple",
            Builtin::CheckLeak => "Frama_C_check_leak",
        }
    }

    /// Number of arguments the builtin expects.
    pub fn arity(self) -> usize {
        match self {
            Builtin::TisAllocWeak | Builtin::CheckLeak => 0,
            Builtin::AllocSize
            | Builtin::AllocSizeWeak
            | Builtin::AllocByStack
            | Builtin::VlaAllocByStack
            | Builtin::VlaFree
            | Builtin::AllocTms
            | Builtin::TisAlloc
            | Builtin::Free => 1,
            Builtin::Calloc
            | Builtin::TisRealloc
            | Builtin::Realloc
            | Builtin::ReallocMultiple => 2,
        }
    }

    /// All builtins, for registration with the host.
    pub fn all() -> &'static [Builtin] {
        &[
            Builtin::AllocSize,
            Builtin::AllocSizeWeak,
            Builtin::AllocByStack,
            Builtin::Calloc,
            Builtin::VlaAllocByStack,
            Builtin::VlaFree,
            Builtin::AllocTms,
            Builtin::TisAlloc,
            Builtin::TisAllocWeak,
            Builtin::TisRealloc,
            Builtin::Free,
            Builtin::Realloc,
            Builtin::ReallocMultiple,
            Builtin::CheckLeak,
        ]
    }
}

/// Look up a builtin by its registered name.
pub fn lookup(name: &str) -> Option<Builtin> {
    Builtin::all().iter().copied().find(|b| b.name() == name)
}

/// Interpret a call to the builtin registered under `name`.
pub fn run_by_name(
    ctx: &mut HeapContext,
    name: &str,
    state: &Model,
    info: &CallInfo,
    args: &[CValue],
) -> HeapResult<BuiltinResult> {
    let builtin = lookup(name).ok_or_else(|| HeapError::UnknownBuiltin(name.to_string()))?;
    run(ctx, builtin, state, info, args)
}

/// Interpret one call to `builtin`.
pub fn run(
    ctx: &mut HeapContext,
    builtin: Builtin,
    state: &Model,
    info: &CallInfo,
    args: &[CValue],
) -> HeapResult<BuiltinResult> {
    if args.len() != builtin.arity() {
        return Err(HeapError::InvalidArgCount {
            builtin: builtin.name().to_string(),
            expected: builtin.arity(),
            got: args.len(),
        });
    }

    match builtin {
        Builtin::AllocSize => {
            let (base, max_valid) = alloc_size(ctx, info, &args[0], Weakness::Strong, "malloc");
            Ok(alloc_result(ctx, state, base, max_valid, CValue::uninitialized(), true))
        }
        Builtin::AllocSizeWeak => {
            let (base, max_valid) = alloc_size(ctx, info, &args[0], Weakness::Weak, "malloc");
            Ok(alloc_result(ctx, state, base, max_valid, CValue::uninitialized(), true))
        }
        Builtin::AllocByStack => {
            let mlevel = ctx.config().mlevel;
            let (base, max_valid) = alloc_by_stack(
                ctx,
                state,
                info,
                &args[0],
                mlevel,
                Weakness::Strong,
                "malloc",
                AllocRegion::Heap,
            )?;
            Ok(alloc_result(ctx, state, base, max_valid, CValue::uninitialized(), true))
        }
        Builtin::Calloc => {
            let sizev = calloc_size(ctx, &args[0], &args[1]);
            let mlevel = ctx.config().mlevel;
            let (base, max_valid) = alloc_by_stack(
                ctx,
                state,
                info,
                &sizev,
                mlevel,
                Weakness::Strong,
                "calloc",
                AllocRegion::Heap,
            )?;
            Ok(alloc_result(ctx, state, base, max_valid, CValue::singleton_zero(), true))
        }
        Builtin::VlaAllocByStack => {
            let mlevel = ctx.config().mlevel;
            let (base, max_valid) = alloc_by_stack(
                ctx,
                state,
                info,
                &args[0],
                mlevel,
                Weakness::Strong,
                "vla",
                AllocRegion::Stack,
            )?;
            // Stack allocation cannot fail with NULL.
            Ok(alloc_result(ctx, state, base, max_valid, CValue::uninitialized(), false))
        }
        Builtin::VlaFree => {
            let resolution = resolve_released(
                ctx,
                &args[0],
                AllocRegion::Stack,
                crate::alarm::AlarmKind::WrongFree,
            );
            let mut result = BuiltinResult::new(Cacheable::Cacheable);
            result.alarms = resolution.alarms;
            if resolution.bases.is_empty() {
                return Ok(result);
            }
            // Scope exit releases exactly the VLA the compiler created.
            let next = free_bases(state, &resolution.bases, true);
            result.c_clobbered = resolution.bases.iter().copied().collect();
            result.c_values = vec![(None, next)];
            Ok(result)
        }
        Builtin::AllocTms | Builtin::TisAlloc => {
            let plevel = ctx.config().plevel;
            let (base, max_valid) = alloc_by_stack(
                ctx,
                state,
                info,
                &args[0],
                plevel,
                Weakness::Strong,
                "malloc",
                AllocRegion::Heap,
            )?;
            Ok(alloc_result(ctx, state, base, max_valid, CValue::uninitialized(), true))
        }
        Builtin::TisAllocWeak => {
            let bytes = ctx.config().weak_alloc_bytes;
            let (base, max_valid) =
                alloc_size(ctx, info, &CValue::integer(bytes), Weakness::Weak, "malloc");
            Ok(alloc_result(ctx, state, base, max_valid, CValue::uninitialized(), true))
        }
        Builtin::TisRealloc => {
            let outcome = tis_realloc(ctx, state, info, &args[0], &args[1])?;
            Ok(realloc_result(ctx, state, outcome))
        }
        Builtin::Free => {
            let resolution = resolve_bases_to_free(ctx, &args[0]);
            let mut result = BuiltinResult::new(Cacheable::Cacheable);
            let strong = resolution.strong();
            result.alarms = resolution.alarms;
            if resolution.bases.is_empty() {
                // free(NULL) and fully invalid arguments: no continuation.
                return Ok(result);
            }
            let next = free_bases(state, &resolution.bases, strong);
            result.c_clobbered = resolution.bases.iter().copied().collect();
            result.c_values = vec![(None, next)];
            Ok(result)
        }
        Builtin::Realloc => {
            let outcome = realloc(ctx, state, info, &args[0], &args[1], ReallocMode::Single)?;
            Ok(realloc_result(ctx, state, outcome))
        }
        Builtin::ReallocMultiple => {
            let outcome = realloc(ctx, state, info, &args[0], &args[1], ReallocMode::Multiple)?;
            Ok(realloc_result(ctx, state, outcome))
        }
        Builtin::CheckLeak => {
            let (_leaked, alarms) = check_leak(ctx, state);
            let mut result = BuiltinResult::new(Cacheable::Cacheable);
            result.alarms = alarms;
            result.c_values = vec![(None, state.clone())];
            Ok(result)
        }
    }
}

/// Package an allocation outcome, with the NULL-failure alternative when
/// `malloc-returns-null` is set.
fn alloc_result(
    ctx: &HeapContext,
    orig: &Model,
    base: BaseId,
    max_valid_bits: i64,
    fill: CValue,
    fallible: bool,
) -> BuiltinResult {
    let mut after = orig.clone();
    paint_with(&mut after, ctx, base, max_valid_bits, fill);

    let mut result = BuiltinResult::new(Cacheable::NoCacheCallers);
    result.c_clobbered.insert(base);
    result
        .c_values
        .push((Some(CValue::inject(base, Ival::singleton(0))), after));
    if fallible && ctx.config().returns_null {
        result
            .c_values
            .push((Some(CValue::singleton_zero()), orig.clone()));
        result.errno = Some(Errno::Enomem);
    }
    result
}

/// Package a realloc outcome, with the NULL-failure alternative.
fn realloc_result(ctx: &HeapContext, orig: &Model, outcome: ReallocOutcome) -> BuiltinResult {
    let ReallocOutcome {
        ret,
        state,
        dests,
        sources,
        alarms,
    } = outcome;
    let mut result = BuiltinResult::new(Cacheable::NoCacheCallers);
    result.c_clobbered = dests.iter().chain(sources.iter()).copied().collect();
    result.alarms = alarms;
    result.c_values = vec![(Some(ret), state)];
    if ctx.config().returns_null {
        result
            .c_values
            .push((Some(CValue::singleton_zero()), orig.clone()));
        result.errno = Some(Errno::Enomem);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callstack::Callstack;
    use crate::config::{HeapConfig, HeapConfigBuilder};

    fn info() -> CallInfo {
        CallInfo::new(Callstack::from_pairs(&[("main", 4)]))
    }

    #[test]
    fn test_lookup_knows_every_builtin() {
        for builtin in Builtin::all() {
            assert_eq!(lookup(builtin.name()), Some(*builtin));
        }
        assert_eq!(lookup("memcpy"), None);
    }

    #[test]
    fn test_arity_is_checked() {
        let mut ctx = HeapContext::new(HeapConfig::default());
        let state = Model::empty_map();
        let err = run(&mut ctx, Builtin::Free, &state, &info(), &[])
            .expect_err("free needs one argument");
        assert!(matches!(err, HeapError::InvalidArgCount { .. }));
    }

    #[test]
    fn test_run_by_name_rejects_unknown_names() {
        let mut ctx = HeapContext::new(HeapConfig::default());
        let state = Model::empty_map();
        let err = run_by_name(&mut ctx, "Frama_C_mystery", &state, &info(), &[])
            .expect_err("unknown builtin");
        assert!(matches!(err, HeapError::UnknownBuiltin(_)));

        let ok = run_by_name(
            &mut ctx,
            "Frama_C_alloc_by_stack",
            &state,
            &info(),
            &[CValue::integer(4)],
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_alloc_by_stack_returns_pointer_at_zero() {
        let mut ctx = HeapContext::new(HeapConfig::default());
        let state = Model::empty_map();
        let result = run(
            &mut ctx,
            Builtin::AllocByStack,
            &state,
            &info(),
            &[CValue::integer(4)],
        )
        .unwrap();
        assert_eq!(result.c_values.len(), 1);
        assert_eq!(result.c_cacheable, Cacheable::NoCacheCallers);
        assert!(result.c_from.is_none());
        let (ret, after) = &result.c_values[0];
        let ret = ret.as_ref().unwrap();
        let (base, offsets) = ret.pointers().next().unwrap();
        assert_eq!(offsets, &Ival::singleton(0));
        assert!(after.is_bound(base));
        assert!(result.c_clobbered.contains(&base));
    }

    #[test]
    fn test_returns_null_adds_failure_alternative() {
        let config = HeapConfigBuilder::new().returns_null(true).build();
        let mut ctx = HeapContext::new(config);
        let state = Model::empty_map();
        let result = run(
            &mut ctx,
            Builtin::AllocByStack,
            &state,
            &info(),
            &[CValue::integer(4)],
        )
        .unwrap();
        assert_eq!(result.c_values.len(), 2);
        let (ret, after) = &result.c_values[1];
        assert!(ret.as_ref().unwrap().contains_null());
        // The failure branch keeps the original state.
        assert!(after.is_empty());
        assert_eq!(result.errno, Some(Errno::Enomem));
    }

    #[test]
    fn test_calloc_paints_zero() {
        let mut ctx = HeapContext::new(HeapConfig::default());
        let state = Model::empty_map();
        let result = run(
            &mut ctx,
            Builtin::Calloc,
            &state,
            &info(),
            &[CValue::integer(2), CValue::integer(4)],
        )
        .unwrap();
        let (ret, after) = &result.c_values[0];
        let (base, _) = ret.as_ref().unwrap().pointers().next().unwrap();
        let om = after.find_base(base).unwrap();
        assert_eq!(om.size_bits(), 64);
        let v = om.read(0, 63);
        assert!(v.contains_null());
        assert!(!v.may_be_uninit());
    }

    #[test]
    fn test_free_null_is_bottom_continuation() {
        let mut ctx = HeapContext::new(HeapConfig::default());
        let state = Model::empty_map();
        let result = run(
            &mut ctx,
            Builtin::Free,
            &state,
            &info(),
            &[CValue::singleton_zero()],
        )
        .unwrap();
        assert!(result.c_values.is_empty());
        assert!(result.alarms.is_empty());
        assert_eq!(result.c_cacheable, Cacheable::Cacheable);
    }

    #[test]
    fn test_vla_alloc_never_returns_null() {
        let config = HeapConfigBuilder::new().returns_null(true).build();
        let mut ctx = HeapContext::new(config);
        let state = Model::empty_map();
        let result = run(
            &mut ctx,
            Builtin::VlaAllocByStack,
            &state,
            &info(),
            &[CValue::integer(16)],
        )
        .unwrap();
        assert_eq!(result.c_values.len(), 1);
        assert_eq!(result.errno, None);
    }

    #[test]
    fn test_vla_free_releases_stack_base() {
        let mut ctx = HeapContext::new(HeapConfig::default());
        let state = Model::empty_map();
        let alloc = run(
            &mut ctx,
            Builtin::VlaAllocByStack,
            &state,
            &info(),
            &[CValue::integer(16)],
        )
        .unwrap();
        let (ret, after) = &alloc.c_values[0];
        let ret = ret.clone().unwrap();
        let (base, _) = ret.pointers().next().unwrap();

        let freed = run(&mut ctx, Builtin::VlaFree, after, &info(), &[ret.clone()]).unwrap();
        let (_, next) = &freed.c_values[0];
        assert!(!next.is_bound(base));

        // A heap pointer is not a VLA.
        let heap = run(
            &mut ctx,
            Builtin::AllocByStack,
            &state,
            &info(),
            &[CValue::integer(4)],
        )
        .unwrap();
        let heap_ret = heap.c_values[0].0.clone().unwrap();
        let bad = run(&mut ctx, Builtin::VlaFree, &state, &info(), &[heap_ret]).unwrap();
        assert_eq!(bad.alarms.len(), 1);
        assert!(bad.c_values.is_empty());
    }

    #[test]
    fn test_tis_alloc_weak_uses_configured_size() {
        let config = HeapConfigBuilder::new().weak_alloc_bytes(100).build();
        let mut ctx = HeapContext::new(config);
        let state = Model::empty_map();
        let result = run(&mut ctx, Builtin::TisAllocWeak, &state, &info(), &[]).unwrap();
        let (ret, _) = &result.c_values[0];
        let (base, _) = ret.as_ref().unwrap().pointers().next().unwrap();
        assert!(ctx.base(base).is_weak());
        assert_eq!(ctx.base(base).max_alloc(), Some(799));
    }

    #[test]
    fn test_check_leak_reports_alarm() {
        let mut ctx = HeapContext::new(HeapConfig::default());
        let state = Model::empty_map();
        let alloc = run(
            &mut ctx,
            Builtin::AllocByStack,
            &state,
            &info(),
            &[CValue::integer(4)],
        )
        .unwrap();
        let after = alloc.c_values[0].1.clone();
        let result = run(&mut ctx, Builtin::CheckLeak, &after, &info(), &[]).unwrap();
        assert_eq!(result.alarms.len(), 1);
        assert_eq!(result.alarms[0].kind, crate::alarm::AlarmKind::Leak);
        // The state is returned unchanged.
        assert_eq!(result.c_values[0].1, after);
    }
}

//! The analyzer-wide heap context.
//!
//! Owns the arena of base records, the set of bases minted by the engine,
//! and the per-callstack pools used by the precision ladder. All mutation
//! is monotone: the arena and the pools only grow, names only gain a weak
//! marker, validity bounds only widen.

use eva2_memory::BaseId;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::base::BaseRecord;
use crate::callstack::Callstack;
use crate::config::HeapConfig;

/// Analyzer-wide state of the heap model.
///
/// Created at analysis start, dropped at analysis end, and passed
/// explicitly to every engine operation.
#[derive(Debug)]
pub struct HeapContext {
    config: HeapConfig,
    bases: Vec<BaseRecord>,
    malloced: FxHashSet<BaseId>,
    registry: FxHashMap<Callstack, Vec<BaseId>>,
    name_counters: FxHashMap<String, u64>,
}

impl HeapContext {
    pub fn new(config: HeapConfig) -> Self {
        HeapContext {
            config,
            bases: Vec::new(),
            malloced: FxHashSet::default(),
            registry: FxHashMap::default(),
            name_counters: FxHashMap::default(),
        }
    }

    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// The record of a base known to this context.
    ///
    /// Panics on a foreign id; engine code only passes ids it minted or
    /// resolved through [`HeapContext::try_base`].
    pub fn base(&self, id: BaseId) -> &BaseRecord {
        &self.bases[id.index()]
    }

    pub(crate) fn base_mut(&mut self, id: BaseId) -> &mut BaseRecord {
        &mut self.bases[id.index()]
    }

    /// The record of a base, if the id belongs to this context.
    pub fn try_base(&self, id: BaseId) -> Option<&BaseRecord> {
        self.bases.get(id.index())
    }

    /// Enter a record into the arena and return its id.
    ///
    /// Used by the factory for allocated bases and by hosts to declare
    /// variables, strings and other foreign bases appearing in inputs.
    pub fn declare(&mut self, record: BaseRecord) -> BaseId {
        let id = BaseId::new(self.bases.len() as u32);
        self.bases.push(record);
        id
    }

    /// Register a base as minted by the allocation engine.
    pub(crate) fn register_malloced(&mut self, id: BaseId) {
        self.malloced.insert(id);
    }

    /// Whether the engine minted this base.
    pub fn is_malloced(&self, id: BaseId) -> bool {
        self.malloced.contains(&id)
    }

    /// All bases minted by the engine, in id order.
    pub fn malloced_bases(&self) -> impl Iterator<Item = BaseId> + '_ {
        let mut ids: Vec<BaseId> = self.malloced.iter().copied().collect();
        ids.sort();
        ids.into_iter()
    }

    /// The ordered pool of bases previously coined for this callstack.
    pub fn pool(&self, stack: &Callstack) -> &[BaseId] {
        self.registry.get(stack).map_or(&[], Vec::as_slice)
    }

    /// Append a freshly coined base to the pool of `stack`.
    pub(crate) fn append_to_pool(&mut self, stack: Callstack, id: BaseId) {
        self.registry.entry(stack).or_default().push(id);
    }

    /// Next per-site uniqueness index for a generated base name.
    pub(crate) fn next_name_index(&mut self, stem: &str) -> u64 {
        let counter = self.name_counters.entry(stem.to_string()).or_insert(0);
        let index = *counter;
        *counter += 1;
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{AllocRegion, BaseKind, Validity};
    use eva2_memory::CType;

    fn dummy_record(name: &str) -> BaseRecord {
        BaseRecord {
            name: name.into(),
            kind: BaseKind::Allocated,
            region: AllocRegion::Heap,
            validity: Validity::Variable {
                weak: false,
                min_alloc: 31,
                max_alloc: 31,
            },
            typ: CType::Int,
        }
    }

    #[test]
    fn test_arena_ids_are_stable() {
        let mut ctx = HeapContext::new(HeapConfig::default());
        let a = ctx.declare(dummy_record("a"));
        let b = ctx.declare(dummy_record("b"));
        assert_ne!(a, b);
        assert_eq!(ctx.base(a).name, "a");
        assert_eq!(ctx.base(b).name, "b");
        assert!(ctx.try_base(BaseId::new(99)).is_none());
    }

    #[test]
    fn test_malloced_registry() {
        let mut ctx = HeapContext::new(HeapConfig::default());
        let a = ctx.declare(dummy_record("a"));
        assert!(!ctx.is_malloced(a));
        ctx.register_malloced(a);
        assert!(ctx.is_malloced(a));
        assert_eq!(ctx.malloced_bases().collect::<Vec<_>>(), vec![a]);
    }

    #[test]
    fn test_pool_append_order() {
        let mut ctx = HeapContext::new(HeapConfig::default());
        let stack = Callstack::from_pairs(&[("main", 7)]);
        assert!(ctx.pool(&stack).is_empty());
        let a = ctx.declare(dummy_record("a"));
        let b = ctx.declare(dummy_record("b"));
        ctx.append_to_pool(stack.clone(), a);
        ctx.append_to_pool(stack.clone(), b);
        assert_eq!(ctx.pool(&stack), &[a, b]);
    }

    #[test]
    fn test_name_counters_are_per_site() {
        let mut ctx = HeapContext::new(HeapConfig::default());
        assert_eq!(ctx.next_name_index("__malloc_main_l4"), 0);
        assert_eq!(ctx.next_name_index("__malloc_main_l4"), 1);
        assert_eq!(ctx.next_name_index("__malloc_main_l9"), 0);
    }
}

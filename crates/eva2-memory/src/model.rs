//! The abstract memory state.
//!
//! A [`Model`] maps allocation bases to their offset-maps, lifted with
//! explicit bottom (unreachable) and top (all memory unknown) elements:
//!
//! ```text
//!        Top
//!         |
//!     Map(base -> offsetmap)
//!         |
//!       Bottom
//! ```

use eva2_lattice::Lattice;
use rustc_hash::FxHashMap;

use crate::{BaseId, OffsetMap};

/// Result of looking up a base in a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindBase<'a> {
    /// The state is degenerate: every location holds anything.
    Top,
    /// The state is unreachable.
    Bottom,
    /// The base is bound to this offset-map.
    Map(&'a OffsetMap),
    /// The base is not bound in this state.
    Unbound,
}

/// An abstract memory state.
#[derive(Debug, Clone, PartialEq)]
pub enum Model {
    /// Unreachable state.
    Bottom,
    /// Degenerate state: nothing is known.
    Top,
    /// One offset-map per bound base.
    Map(FxHashMap<BaseId, OffsetMap>),
}

impl Model {
    /// The empty reachable state (no bases bound).
    pub fn empty_map() -> Self {
        Model::Map(FxHashMap::default())
    }

    /// Look up a base, distinguishing degenerate states.
    pub fn find_base_or_default(&self, base: BaseId) -> FindBase<'_> {
        match self {
            Model::Bottom => FindBase::Bottom,
            Model::Top => FindBase::Top,
            Model::Map(map) => match map.get(&base) {
                Some(om) => FindBase::Map(om),
                None => FindBase::Unbound,
            },
        }
    }

    /// The offset-map bound to `base`, if any.
    pub fn find_base(&self, base: BaseId) -> Option<&OffsetMap> {
        match self {
            Model::Map(map) => map.get(&base),
            _ => None,
        }
    }

    /// Mutable access to the offset-map bound to `base`, if any.
    pub fn find_base_mut(&mut self, base: BaseId) -> Option<&mut OffsetMap> {
        match self {
            Model::Map(map) => map.get_mut(&base),
            _ => None,
        }
    }

    /// Whether `base` is currently bound.
    pub fn is_bound(&self, base: BaseId) -> bool {
        matches!(self, Model::Map(map) if map.contains_key(&base))
    }

    /// Bind `base` to `om`, replacing any previous binding.
    ///
    /// Degenerate states are left unchanged.
    pub fn add_base(&mut self, base: BaseId, om: OffsetMap) {
        if let Model::Map(map) = self {
            map.insert(base, om);
        }
    }

    /// Drop the binding of `base`, if any.
    pub fn remove_base(&mut self, base: BaseId) {
        if let Model::Map(map) = self {
            map.remove(&base);
        }
    }

    /// Iterate over the bound `(base, offsetmap)` pairs.
    pub fn iter_bases(&self) -> impl Iterator<Item = (BaseId, &OffsetMap)> {
        let map = match self {
            Model::Map(map) => Some(map),
            _ => None,
        };
        map.into_iter().flatten().map(|(b, om)| (*b, om))
    }

    /// Apply `f` to every bound offset-map.
    pub fn for_each_map_mut(&mut self, mut f: impl FnMut(BaseId, &mut OffsetMap)) {
        if let Model::Map(map) = self {
            for (base, om) in map.iter_mut() {
                f(*base, om);
            }
        }
    }

    /// Number of bound bases (0 for degenerate states).
    pub fn len(&self) -> usize {
        match self {
            Model::Map(map) => map.len(),
            _ => 0,
        }
    }

    /// Whether no base is bound.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Lattice for Model {
    fn bottom() -> Self {
        Model::Bottom
    }

    fn top() -> Self {
        Model::Top
    }

    fn is_bottom(&self) -> bool {
        matches!(self, Model::Bottom)
    }

    fn is_top(&self) -> bool {
        matches!(self, Model::Top)
    }

    fn join(&self, other: &Self) -> Self {
        match (self, other) {
            (Model::Bottom, x) | (x, Model::Bottom) => x.clone(),
            (Model::Top, _) | (_, Model::Top) => Model::Top,
            (Model::Map(a), Model::Map(b)) => {
                let mut joined = a.clone();
                for (base, om) in b {
                    match joined.get_mut(base) {
                        Some(existing) => *existing = existing.join(om),
                        None => {
                            joined.insert(*base, om.clone());
                        }
                    }
                }
                Model::Map(joined)
            }
        }
    }

    fn meet(&self, other: &Self) -> Self {
        match (self, other) {
            (Model::Bottom, _) | (_, Model::Bottom) => Model::Bottom,
            (Model::Top, x) | (x, Model::Top) => x.clone(),
            // A precise piecewise meet is not needed by the engine; keep
            // the left operand, which is sound as an over-approximation.
            (Model::Map(_), Model::Map(_)) => self.clone(),
        }
    }
}

//! Abstract values.
//!
//! A [`CValue`] over-approximates the set of concrete values a location may
//! hold: a numeric interval, a set of pointer summands `base + offsets`,
//! and two markers tracked as lattice flags:
//!
//! - UNINITIALIZED: the location was allocated but never written;
//! - ESCAPINGADDR: the location held a pointer to a base that was freed.
//!
//! Flags compose with content. After a weak update a value may carry both
//! real contents and a marker; joins keep everything.

use std::fmt;

use eva2_lattice::{Ival, Lattice};
use rustc_hash::FxHashMap;

use crate::BaseId;

/// An element of the value lattice V.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CValue {
    num: Ival,
    pointers: FxHashMap<BaseId, Ival>,
    uninitialized: bool,
    escaping: bool,
}

impl CValue {
    /// The numeric value `{n}`.
    pub fn integer(n: i64) -> Self {
        CValue {
            num: Ival::singleton(n),
            ..CValue::bottom()
        }
    }

    /// The NULL pointer (numeric zero).
    pub fn singleton_zero() -> Self {
        CValue::integer(0)
    }

    /// A numeric interval.
    pub fn inject_ival(iv: Ival) -> Self {
        CValue {
            num: iv,
            ..CValue::bottom()
        }
    }

    /// A pointer into `base` at the given bit offsets.
    pub fn inject(base: BaseId, offsets: Ival) -> Self {
        let mut pointers = FxHashMap::default();
        pointers.insert(base, offsets);
        CValue {
            num: Ival::Bottom,
            pointers,
            uninitialized: false,
            escaping: false,
        }
    }

    /// The UNINITIALIZED marker.
    pub fn uninitialized() -> Self {
        CValue {
            uninitialized: true,
            ..CValue::bottom()
        }
    }

    /// The ESCAPINGADDR marker.
    pub fn escaping() -> Self {
        CValue {
            escaping: true,
            ..CValue::bottom()
        }
    }

    /// The numeric component.
    pub fn num(&self) -> Ival {
        self.num
    }

    /// Whether the value may be NULL (numeric zero).
    pub fn contains_null(&self) -> bool {
        self.num.contains(0)
    }

    /// Whether the value may be a non-null integer.
    pub fn contains_nonzero_num(&self) -> bool {
        match self.num {
            Ival::Bottom => false,
            Ival::Range(lo, hi) => lo != 0 || hi != 0,
            Ival::Top => true,
        }
    }

    /// Whether any pointer summand is present.
    pub fn has_pointers(&self) -> bool {
        !self.pointers.is_empty()
    }

    /// Iterate over the `(base, offsets)` pointer summands.
    pub fn pointers(&self) -> impl Iterator<Item = (BaseId, &Ival)> {
        self.pointers.iter().map(|(b, iv)| (*b, iv))
    }

    /// The offsets at which the value may point into `base`.
    pub fn offsets_of(&self, base: BaseId) -> Option<&Ival> {
        self.pointers.get(&base)
    }

    /// Whether the value may be uninitialized.
    pub fn may_be_uninit(&self) -> bool {
        self.uninitialized
    }

    /// Whether the value may be a dangling pointer to a freed base.
    pub fn may_be_escaping(&self) -> bool {
        self.escaping
    }

    /// Project to a numeric interval; `None` when pointer summands are
    /// present (the value is not an integer).
    pub fn project_ival(&self) -> Option<Ival> {
        if self.pointers.is_empty() {
            Some(self.num)
        } else {
            None
        }
    }

    /// Rewrite pointer summands into freed bases as ESCAPINGADDR.
    ///
    /// With `exact` (strong update) the matching summands are removed; the
    /// weak form keeps them, so the value denotes both the old pointer and
    /// the dangling marker. Returns whether anything changed.
    pub fn remap_escaped(&mut self, freed: impl Fn(BaseId) -> bool, exact: bool) -> bool {
        let matched = self.pointers.keys().any(|b| freed(*b));
        if !matched {
            return false;
        }
        if exact {
            self.pointers.retain(|b, _| !freed(*b));
        }
        self.escaping = true;
        true
    }
}

impl Lattice for CValue {
    fn bottom() -> Self {
        CValue {
            num: Ival::Bottom,
            pointers: FxHashMap::default(),
            uninitialized: false,
            escaping: false,
        }
    }

    fn top() -> Self {
        CValue {
            num: Ival::Top,
            pointers: FxHashMap::default(),
            uninitialized: true,
            escaping: true,
        }
    }

    fn is_bottom(&self) -> bool {
        self.num.is_bottom() && self.pointers.is_empty() && !self.uninitialized && !self.escaping
    }

    fn is_top(&self) -> bool {
        self.num.is_top() && self.uninitialized && self.escaping
    }

    fn join(&self, other: &Self) -> Self {
        if self.is_top() || other.is_top() {
            return CValue::top();
        }
        let mut pointers = self.pointers.clone();
        for (base, offs) in &other.pointers {
            pointers
                .entry(*base)
                .and_modify(|o| *o = o.join(offs))
                .or_insert(*offs);
        }
        CValue {
            num: self.num.join(&other.num),
            pointers,
            uninitialized: self.uninitialized || other.uninitialized,
            escaping: self.escaping || other.escaping,
        }
    }

    fn meet(&self, other: &Self) -> Self {
        let mut pointers = FxHashMap::default();
        for (base, offs) in &self.pointers {
            if let Some(other_offs) = other.pointers.get(base) {
                let met = offs.meet(other_offs);
                if !met.is_bottom() {
                    pointers.insert(*base, met);
                }
            }
        }
        CValue {
            num: self.num.meet(&other.num),
            pointers,
            uninitialized: self.uninitialized && other.uninitialized,
            escaping: self.escaping && other.escaping,
        }
    }
}

impl fmt::Display for CValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bottom() {
            return write!(f, "⊥");
        }
        let mut sep = "";
        write!(f, "{{")?;
        if !self.num.is_bottom() {
            write!(f, "{}", self.num)?;
            sep = "; ";
        }
        let mut bases: Vec<_> = self.pointers.iter().collect();
        bases.sort_by_key(|(b, _)| **b);
        for (base, offs) in bases {
            write!(f, "{sep}&{base} + {offs}")?;
            sep = "; ";
        }
        if self.uninitialized {
            write!(f, "{sep}UNINITIALIZED")?;
            sep = "; ";
        }
        if self.escaping {
            write!(f, "{sep}ESCAPINGADDR")?;
        }
        write!(f, "}}")
    }
}

//! Per-allocation offset-maps.
//!
//! An [`OffsetMap`] binds every bit offset of an allocation to an abstract
//! value. It is kept as a sorted list of disjoint segments covering exactly
//! `[0, size_bits - 1]`, with adjacent equal-valued segments merged.
//!
//! Strong writes overwrite a range; weak writes join into it. Joins of two
//! maps are piecewise, with offsets covered by only one side keeping that
//! side's value.

use std::cmp::{max, min};
use std::fmt;

use eva2_lattice::Lattice;

use crate::CValue;

/// A map from bit ranges to abstract values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetMap {
    size_bits: i64,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    start: i64,
    end: i64, // inclusive
    value: CValue,
}

impl OffsetMap {
    /// A map of `size_bits` bits all holding `v`. Zero size is the empty map.
    pub fn create_isotropic(size_bits: i64, v: CValue) -> Self {
        let size_bits = max(size_bits, 0);
        let segments = if size_bits == 0 {
            Vec::new()
        } else {
            vec![Segment {
                start: 0,
                end: size_bits - 1,
                value: v,
            }]
        };
        OffsetMap {
            size_bits,
            segments,
        }
    }

    /// Number of bits covered by the map.
    pub fn size_bits(&self) -> i64 {
        self.size_bits
    }

    /// Strong update: overwrite `[start, end]` with `v`.
    ///
    /// The range is clipped to the map's coverage; an empty range is a no-op.
    pub fn write(&mut self, start: i64, end: i64, v: CValue) {
        let (start, end) = match self.clip(start, end) {
            Some(r) => r,
            None => return,
        };
        self.split_at(start);
        self.split_at(end + 1);
        self.segments.retain(|s| s.end < start || s.start > end);
        let at = self.segments.partition_point(|s| s.end < start);
        self.segments.insert(
            at,
            Segment {
                start,
                end,
                value: v,
            },
        );
        self.normalize();
    }

    /// Weak update: join `v` into every value bound on `[start, end]`.
    pub fn write_weak(&mut self, start: i64, end: i64, v: CValue) {
        let (start, end) = match self.clip(start, end) {
            Some(r) => r,
            None => return,
        };
        self.split_at(start);
        self.split_at(end + 1);
        for s in &mut self.segments {
            if s.start >= start && s.end <= end {
                s.value = s.value.join(&v);
            }
        }
        self.normalize();
    }

    /// Join of every value bound on `[start, end]`; bottom for empty ranges.
    pub fn read(&self, start: i64, end: i64) -> CValue {
        let mut acc = CValue::bottom();
        if start > end {
            return acc;
        }
        for s in &self.segments {
            if s.start <= end && s.end >= start {
                acc = acc.join(&s.value);
            }
        }
        acc
    }

    /// Piecewise join. Coverage extends to the larger map; offsets covered
    /// by only one side keep that side's value.
    pub fn join(&self, other: &Self) -> Self {
        let size = max(self.size_bits, other.size_bits);
        if size == 0 {
            return OffsetMap::create_isotropic(0, CValue::bottom());
        }
        let mut cuts: Vec<i64> = Vec::with_capacity(self.segments.len() + other.segments.len() + 1);
        cuts.extend(self.segments.iter().map(|s| s.start));
        cuts.extend(other.segments.iter().map(|s| s.start));
        cuts.push(0);
        cuts.push(size);
        cuts.sort_unstable();
        cuts.dedup();

        let mut segments = Vec::new();
        for w in cuts.windows(2) {
            let (start, end) = (w[0], w[1] - 1);
            let value = self.read(start, end).join(&other.read(start, end));
            segments.push(Segment { start, end, value });
        }
        let mut joined = OffsetMap {
            size_bits: size,
            segments,
        };
        joined.normalize();
        joined
    }

    /// Extract `[start, end]` as a map re-based at offset 0.
    ///
    /// The range is clipped to the map's coverage.
    pub fn copy_slice(&self, start: i64, end: i64) -> Self {
        let (start, end) = match self.clip(start, end) {
            Some(r) => r,
            None => return OffsetMap::create_isotropic(0, CValue::bottom()),
        };
        let mut segments = Vec::new();
        for s in &self.segments {
            let s_start = max(s.start, start);
            let s_end = min(s.end, end);
            if s_start <= s_end {
                segments.push(Segment {
                    start: s_start - start,
                    end: s_end - start,
                    value: s.value.clone(),
                });
            }
        }
        let mut slice = OffsetMap {
            size_bits: end - start + 1,
            segments,
        };
        slice.normalize();
        slice
    }

    /// Paste a copied slice at offset `at`. The `exact` form performs
    /// strong writes; otherwise each written range is joined with its
    /// previous contents (weak paste).
    pub fn paste_slice(&mut self, src: &OffsetMap, at: i64, exact: bool) {
        for s in &src.segments {
            if exact {
                self.write(at + s.start, at + s.end, s.value.clone());
            } else {
                self.write_weak(at + s.start, at + s.end, s.value.clone());
            }
        }
    }

    /// Iterate over `(start, end, value)` in offset order.
    pub fn iter_values(&self) -> impl Iterator<Item = (i64, i64, &CValue)> {
        self.segments.iter().map(|s| (s.start, s.end, &s.value))
    }

    /// Apply `f` to every bound value (used for whole-state rewrites).
    pub fn map_values_mut(&mut self, mut f: impl FnMut(&mut CValue)) {
        for s in &mut self.segments {
            f(&mut s.value);
        }
        self.normalize();
    }

    fn clip(&self, start: i64, end: i64) -> Option<(i64, i64)> {
        let start = max(start, 0);
        let end = min(end, self.size_bits - 1);
        if start > end {
            None
        } else {
            Some((start, end))
        }
    }

    /// Ensure a segment boundary at `pos` (which becomes a segment start).
    fn split_at(&mut self, pos: i64) {
        if pos <= 0 || pos >= self.size_bits {
            return;
        }
        if let Some(i) = self
            .segments
            .iter()
            .position(|s| s.start < pos && pos <= s.end)
        {
            let tail = Segment {
                start: pos,
                end: self.segments[i].end,
                value: self.segments[i].value.clone(),
            };
            self.segments[i].end = pos - 1;
            self.segments.insert(i + 1, tail);
        }
    }

    /// Merge adjacent segments with equal values.
    fn normalize(&mut self) {
        let mut i = 0;
        while i + 1 < self.segments.len() {
            if self.segments[i].value == self.segments[i + 1].value
                && self.segments[i].end + 1 == self.segments[i + 1].start
            {
                self.segments[i].end = self.segments[i + 1].end;
                self.segments.remove(i + 1);
            } else {
                i += 1;
            }
        }
    }
}

impl fmt::Display for OffsetMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "[empty]");
        }
        for (i, s) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "[{}..{}]={}", s.start, s.end, s.value)?;
        }
        Ok(())
    }
}

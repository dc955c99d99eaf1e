//! Minimal C type oracle.
//!
//! The heap engine only needs a small slice of the C type system: byte
//! sizes, typedef unrolling, pointer dereference and array construction.
//! Sizes follow the LP64 data model.

use std::fmt;
use std::sync::Arc;

/// A C type, as seen by the allocation engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CType {
    /// `void` - unsized.
    Void,
    /// `char` (1 byte).
    Char,
    /// `short` (2 bytes).
    Short,
    /// `int` (4 bytes).
    Int,
    /// `long` (8 bytes, LP64).
    Long,
    /// `long long` (8 bytes).
    LongLong,
    /// `float` (4 bytes).
    Float,
    /// `double` (8 bytes).
    Double,
    /// Pointer to a type (8 bytes, LP64).
    Ptr(Arc<CType>),
    /// Array of a type; `None` length is an unsized (flexible) array.
    Array(Arc<CType>, Option<u64>),
    /// A typedef name wrapping its definition.
    Named(String, Arc<CType>),
}

impl CType {
    /// Size in bytes; `None` for `void` and unsized arrays.
    pub fn byte_size(&self) -> Option<u64> {
        match self {
            CType::Void => None,
            CType::Char => Some(1),
            CType::Short => Some(2),
            CType::Int | CType::Float => Some(4),
            CType::Long | CType::LongLong | CType::Double | CType::Ptr(_) => Some(8),
            CType::Array(elem, Some(n)) => elem.byte_size().map(|s| s * n),
            CType::Array(_, None) => None,
            CType::Named(_, def) => def.byte_size(),
        }
    }

    /// Strip typedef layers.
    pub fn unroll(&self) -> &CType {
        let mut t = self;
        while let CType::Named(_, def) = t {
            t = def;
        }
        t
    }

    /// Whether the unrolled type is `void`.
    pub fn is_void(&self) -> bool {
        matches!(self.unroll(), CType::Void)
    }

    /// The pointed-to type, when the unrolled type is a pointer.
    pub fn pointed(&self) -> Option<&CType> {
        match self.unroll() {
            CType::Ptr(t) => Some(t),
            _ => None,
        }
    }

    /// Build `elem[n]` (or `elem[]` when `n` is `None`).
    pub fn array_of(elem: CType, n: Option<u64>) -> CType {
        CType::Array(Arc::new(elem), n)
    }

    /// Build a pointer to `t`.
    pub fn ptr_to(t: CType) -> CType {
        CType::Ptr(Arc::new(t))
    }
}

// Printing C declarators properly would need the declared name; the engine
// only prints types for base descriptions, so the abstract syntax below is
// close enough (`int *`, `int [4]`, `int []`).
impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CType::Void => write!(f, "void"),
            CType::Char => write!(f, "char"),
            CType::Short => write!(f, "short"),
            CType::Int => write!(f, "int"),
            CType::Long => write!(f, "long"),
            CType::LongLong => write!(f, "long long"),
            CType::Float => write!(f, "float"),
            CType::Double => write!(f, "double"),
            CType::Ptr(t) => write!(f, "{t} *"),
            CType::Array(t, Some(n)) => write!(f, "{t} [{n}]"),
            CType::Array(t, None) => write!(f, "{t} []"),
            CType::Named(name, _) => write!(f, "{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_sizes() {
        assert_eq!(CType::Char.byte_size(), Some(1));
        assert_eq!(CType::Int.byte_size(), Some(4));
        assert_eq!(CType::ptr_to(CType::Void).byte_size(), Some(8));
        assert_eq!(CType::array_of(CType::Int, Some(3)).byte_size(), Some(12));
        assert_eq!(CType::array_of(CType::Int, None).byte_size(), None);
        assert_eq!(CType::Void.byte_size(), None);
    }

    #[test]
    fn test_unroll() {
        let t = CType::Named("size_t".into(), Arc::new(CType::Long));
        assert_eq!(t.unroll(), &CType::Long);
        assert_eq!(t.byte_size(), Some(8));
        assert!(!t.is_void());
    }

    #[test]
    fn test_pointed() {
        let t = CType::ptr_to(CType::Int);
        assert_eq!(t.pointed(), Some(&CType::Int));
        assert_eq!(CType::Int.pointed(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(CType::ptr_to(CType::Int).to_string(), "int *");
        assert_eq!(CType::array_of(CType::Int, Some(4)).to_string(), "int [4]");
        assert_eq!(CType::array_of(CType::Char, None).to_string(), "char []");
    }
}

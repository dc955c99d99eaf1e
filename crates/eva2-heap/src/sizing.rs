//! Size inference for allocation requests.
//!
//! Projects an abstract size to a byte interval and guesses the element
//! type the caller intended, from the destination lvalue of the call.

use eva2_lattice::Ival;
use eva2_memory::{CType, CValue};

use crate::context::HeapContext;

/// The inferred shape of an allocation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedSize {
    /// Guaranteed byte size.
    pub min_bytes: i64,
    /// Maximum byte size.
    pub max_bytes: i64,
    /// Guessed element type.
    pub elem_typ: CType,
    /// Element count, only for fixed-size strong requests whose size is an
    /// exact multiple of the element size.
    pub nb_elems: Option<i64>,
}

/// Project an abstract size argument to `(smin, smax)` bytes.
///
/// Values that are not integers (pointer summands present) or not
/// projectable default to the full `[0, max_byte_size]` range.
pub fn extract_size(ctx: &HeapContext, sizev: &CValue) -> (i64, i64) {
    let max_bytes = ctx.config().max_byte_size;
    match sizev.project_ival() {
        Some(iv) => iv.project_size(max_bytes),
        None => (0, max_bytes),
    }
}

/// Guess the element type the caller intended.
///
/// When the call site is an assignment `lv = call(...)` with `lv` of type
/// `T *`, `T` non-void and sized, and both size bounds are multiples of
/// `sizeof(T)`, the element type is `T`; otherwise `char`. The element
/// count is only known for constant single-size requests.
pub fn guess_intended_malloc_type(
    dst_type: Option<&CType>,
    smin: i64,
    smax: i64,
    constant_size: bool,
) -> TypedSize {
    let elem_typ = dst_type
        .and_then(|t| t.pointed())
        .filter(|pointee| !pointee.is_void())
        .and_then(|pointee| {
            let size = pointee.byte_size()? as i64;
            (size > 0 && smin % size == 0 && smax % size == 0).then(|| pointee.clone())
        })
        .unwrap_or(CType::Char);

    let elem_size = elem_typ.byte_size().unwrap_or(1) as i64;
    let nb_elems = (constant_size && smin == smax).then_some(smin / elem_size);

    TypedSize {
        min_bytes: smin,
        max_bytes: smax,
        elem_typ,
        nb_elems,
    }
}

/// The element count/size product for `calloc`, saturating on overflow.
pub fn calloc_size(ctx: &HeapContext, nmemb: &CValue, size: &CValue) -> CValue {
    let (nmin, nmax) = extract_size(ctx, nmemb);
    let (smin, smax) = extract_size(ctx, size);
    CValue::inject_ival(Ival::range(
        nmin.saturating_mul(smin),
        nmax.saturating_mul(smax),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeapConfig;

    fn ctx() -> HeapContext {
        HeapContext::new(HeapConfig::default())
    }

    #[test]
    fn test_extract_size_projects() {
        let ctx = ctx();
        assert_eq!(extract_size(&ctx, &CValue::integer(8)), (8, 8));
        assert_eq!(
            extract_size(&ctx, &CValue::inject_ival(Ival::range(4, 16))),
            (4, 16)
        );
    }

    #[test]
    fn test_extract_size_defaults_to_full_range() {
        let ctx = ctx();
        let max = ctx.config().max_byte_size;
        assert_eq!(
            extract_size(&ctx, &CValue::inject_ival(Ival::Top)),
            (0, max)
        );
        // A pointer is not a size.
        let ptr = CValue::inject(eva2_memory::BaseId::new(0), Ival::singleton(0));
        assert_eq!(extract_size(&ctx, &ptr), (0, max));
    }

    #[test]
    fn test_guess_picks_pointee_when_divisible() {
        let dst = CType::ptr_to(CType::Int);
        let ts = guess_intended_malloc_type(Some(&dst), 8, 8, true);
        assert_eq!(ts.elem_typ, CType::Int);
        assert_eq!(ts.nb_elems, Some(2));
    }

    #[test]
    fn test_guess_falls_back_to_char() {
        // Not a multiple of sizeof(int).
        let dst = CType::ptr_to(CType::Int);
        let ts = guess_intended_malloc_type(Some(&dst), 6, 6, true);
        assert_eq!(ts.elem_typ, CType::Char);
        assert_eq!(ts.nb_elems, Some(6));

        // void * gives no element information.
        let void_dst = CType::ptr_to(CType::Void);
        let ts = guess_intended_malloc_type(Some(&void_dst), 8, 8, true);
        assert_eq!(ts.elem_typ, CType::Char);

        // No destination lvalue at all.
        let ts = guess_intended_malloc_type(None, 8, 8, false);
        assert_eq!(ts.elem_typ, CType::Char);
        assert_eq!(ts.nb_elems, None);
    }

    #[test]
    fn test_nb_elems_requires_constant_singleton() {
        let dst = CType::ptr_to(CType::Int);
        assert_eq!(
            guess_intended_malloc_type(Some(&dst), 4, 8, true).nb_elems,
            None
        );
        assert_eq!(
            guess_intended_malloc_type(Some(&dst), 8, 8, false).nb_elems,
            None
        );
    }

    #[test]
    fn test_calloc_size_product() {
        let ctx = ctx();
        let v = calloc_size(&ctx, &CValue::integer(3), &CValue::integer(4));
        assert_eq!(v.project_ival(), Some(Ival::singleton(12)));

        let wide = calloc_size(
            &ctx,
            &CValue::inject_ival(Ival::range(0, 4)),
            &CValue::integer(8),
        );
        assert_eq!(wide.project_ival(), Some(Ival::Range(0, 32)));
    }
}

//! Reductions.
//!
//! Three flavors share the planner. Full folds walk the whole view and
//! thread an accumulator through the callback. Dim-subset reductions give
//! the destination a zero stride along every reduced dimension and
//! accumulate in place, so one traversal covers the source exactly once.
//! The `_with` flavors instead hand the caller a fresh sub-view per output
//! element, for reducers that want to see the whole lane at once.
//!
//! Accumulation order is unspecified; callbacks should be insensitive to
//! it the way `+` on floats usually is in practice.

use crate::dispatch::{plan_traversal, traverse, TraverseOptions};
use crate::kernel::for_each_indexed_offset;
use crate::map::ensure_same_shape;
use crate::order::native_perm;
use crate::view::{MemoryOrder, StridedArray, StridedView, StridedViewMut};
use crate::{Dims, Result, StridedError, Strides};
use std::mem::size_of;

/// Fold every element of `src` into `init`.
pub fn reduce<T, Acc, F>(src: &StridedView<'_, T>, init: Acc, f: F) -> Result<Acc>
where
    F: Fn(&Acc, &T) -> Acc,
{
    let src_ptr = src.ptr();
    let strides_list = [src.strides()];
    let plan = plan_traversal(
        src.dims(),
        &strides_list,
        None,
        &[size_of::<T>()],
        src.order(),
        TraverseOptions::default(),
    );
    let mut acc = init;
    traverse(&plan, &[0], |offsets, len, strides| {
        let mut p = unsafe { src_ptr.offset(offsets[0]) };
        for _ in 0..len {
            acc = f(&acc, unsafe { &*p });
            p = unsafe { p.offset(strides[0]) };
        }
        Ok(())
    })?;
    Ok(acc)
}

/// Fold paired elements of two same-shape views into `init`.
pub fn zip_reduce2<A, B, Acc, F>(
    a: &StridedView<'_, A>,
    b: &StridedView<'_, B>,
    init: Acc,
    f: F,
) -> Result<Acc>
where
    F: Fn(&Acc, &A, &B) -> Acc,
{
    ensure_same_shape(a.dims(), b.dims())?;
    let (a_ptr, b_ptr) = (a.ptr(), b.ptr());
    let strides_list = [a.strides(), b.strides()];
    let plan = plan_traversal(
        a.dims(),
        &strides_list,
        None,
        &[size_of::<A>(), size_of::<B>()],
        a.order(),
        TraverseOptions::default(),
    );
    let mut acc = init;
    traverse(&plan, &[0, 0], |offsets, len, strides| {
        let mut ap = unsafe { a_ptr.offset(offsets[0]) };
        let mut bp = unsafe { b_ptr.offset(offsets[1]) };
        for _ in 0..len {
            acc = f(&acc, unsafe { &*ap }, unsafe { &*bp });
            unsafe {
                ap = ap.offset(strides[0]);
                bp = bp.offset(strides[1]);
            }
        }
        Ok(())
    })?;
    Ok(acc)
}

/// Sum of all elements.
pub fn sum<T>(src: &StridedView<'_, T>) -> Result<T>
where
    T: Copy + num_traits::Zero,
{
    reduce(src, T::zero(), |a, x| *a + *x)
}

/// Inner product of two same-shape views.
pub fn dot<T>(a: &StridedView<'_, T>, b: &StridedView<'_, T>) -> Result<T>
where
    T: Copy + num_traits::Zero + std::ops::Mul<Output = T>,
{
    zip_reduce2(a, b, T::zero(), |acc, x, y| *acc + *x * *y)
}

/// Split a rank into reduced and kept dimensions, validating the subset.
fn split_dims(dims: &[usize], reduced: &[usize]) -> Result<(Vec<bool>, Dims)> {
    let rank = dims.len();
    if reduced.len() > rank {
        return Err(StridedError::TooManyDims {
            selected: reduced.len(),
            rank,
        });
    }
    // An empty selection means every dimension.
    if reduced.is_empty() {
        return Ok((vec![true; rank], Dims::new()));
    }
    let mut mask = vec![false; rank];
    for &d in reduced {
        if d >= rank {
            return Err(StridedError::InvalidAxis { axis: d, rank });
        }
        if mask[d] {
            return Err(StridedError::DuplicateDimension { dim: d });
        }
        mask[d] = true;
    }
    let kept: Dims = dims
        .iter()
        .enumerate()
        .filter(|(i, _)| !mask[*i])
        .map(|(_, &d)| d)
        .collect();
    Ok((mask, kept))
}

/// Reduce `src` over `reduced_dims` into `dest`, whose shape must equal the
/// kept dimensions in their original order. `dest` is first filled with
/// `init`, then accumulated with `f`.
pub fn reduce_dims_into<T, Acc, F>(
    dest: &mut StridedViewMut<'_, Acc>,
    src: &StridedView<'_, T>,
    reduced_dims: &[usize],
    init: Acc,
    f: F,
) -> Result<()>
where
    Acc: Clone,
    F: Fn(&Acc, &T) -> Acc,
{
    let (mask, kept) = split_dims(src.dims(), reduced_dims)?;
    ensure_same_shape(dest.dims(), &kept)?;
    crate::map::fill(dest, init)?;

    // Zero strides along reduced dimensions make the destination a
    // rank-matched participant; reads and writes then accumulate in place.
    let mut dst_strides = Strides::new();
    let mut k = 0usize;
    for &r in mask.iter() {
        if r {
            dst_strides.push(0);
        } else {
            dst_strides.push(dest.strides()[k]);
            k += 1;
        }
    }

    let dims = Dims::from_slice(src.dims());
    let hint = dest.order();
    let dst_ptr = dest.ptr_mut();
    let src_ptr = src.ptr();
    let strides_list = [&dst_strides[..], src.strides()];
    let plan = plan_traversal(
        &dims,
        &strides_list,
        Some(0),
        &[size_of::<Acc>(), size_of::<T>()],
        hint,
        TraverseOptions::default(),
    );
    traverse(&plan, &[0, 0], |offsets, len, strides| {
        let mut dp = unsafe { dst_ptr.offset(offsets[0]) };
        let mut sp = unsafe { src_ptr.offset(offsets[1]) };
        for _ in 0..len {
            let out = f(unsafe { &*dp }, unsafe { &*sp });
            unsafe {
                *dp = out;
                dp = dp.offset(strides[0]);
                sp = sp.offset(strides[1]);
            }
        }
        Ok(())
    })
}

/// [`reduce_dims_into`] allocating a row-major result.
pub fn reduce_dims<T, Acc, F>(
    src: &StridedView<'_, T>,
    reduced_dims: &[usize],
    init: Acc,
    f: F,
) -> Result<StridedArray<Acc>>
where
    Acc: Clone,
    F: Fn(&Acc, &T) -> Acc,
{
    let (_, kept) = split_dims(src.dims(), reduced_dims)?;
    let mut out = StridedArray::filled(&kept, MemoryOrder::RowMajor, init.clone());
    reduce_dims_into(&mut out.view_mut(), src, reduced_dims, init, f)?;
    Ok(out)
}

/// Reduce over `reduced_dims` by handing `f` a fresh sub-view per output
/// element. The sub-view's dimensions are the reduced ones, in ascending
/// order.
pub fn reduce_dims_with<T, Acc, F>(
    src: &StridedView<'_, T>,
    reduced_dims: &[usize],
    f: F,
) -> Result<StridedArray<Acc>>
where
    F: Fn(&StridedView<'_, T>) -> Acc,
{
    let (mask, kept) = split_dims(src.dims(), reduced_dims)?;
    let core_dims: Dims = (0..src.rank()).filter(|&i| mask[i]).collect();

    let loop_strides: Strides = (0..src.rank())
        .filter(|&i| !mask[i])
        .map(|i| src.strides()[i])
        .collect();

    let total: usize = kept.iter().product();
    let mut values = Vec::with_capacity(total);

    // Native row-major nesting so the pushes land in linear order.
    let perm = native_perm(kept.len(), MemoryOrder::RowMajor);
    let odims: Dims = perm.iter().map(|&i| kept[i]).collect();
    let ostrides: Strides = perm.iter().map(|&i| loop_strides[i]).collect();
    let ordered = [&ostrides[..]];

    let out_strides = crate::index::row_major_strides(&kept);
    if kept.iter().any(|&d| d == 0) {
        return StridedArray::from_parts(values, &kept, &out_strides, MemoryOrder::RowMajor);
    }
    for_each_indexed_offset(&odims, &perm, &ordered, &[0], |_idx, offsets| {
        let core = src.subview(&core_dims, offsets[0])?;
        values.push(f(&core));
        Ok(())
    })?;
    StridedArray::from_parts(values, &kept, &out_strides, MemoryOrder::RowMajor)
}

/// Reduce along a single axis by folding each lane elementwise.
pub fn reduce_axis<T, Acc, F>(
    src: &StridedView<'_, T>,
    axis: usize,
    init: Acc,
    f: F,
) -> Result<StridedArray<Acc>>
where
    Acc: Clone,
    F: Fn(&Acc, &T) -> Acc,
{
    reduce_dims(src, &[axis], init, f)
}

/// Reduce along a single axis by handing `f` each one-dimensional lane.
pub fn reduce_axis_with<T, Acc, F>(
    src: &StridedView<'_, T>,
    axis: usize,
    f: F,
) -> Result<StridedArray<Acc>>
where
    F: Fn(&StridedView<'_, T>) -> Acc,
{
    reduce_dims_with(src, &[axis], f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{MemoryOrder, StridedArray};

    /// Row-major linear position as element value.
    fn iota(dims: &[usize]) -> StridedArray<f64> {
        StridedArray::from_fn(dims, MemoryOrder::RowMajor, |idx| {
            let mut lin = 0usize;
            for (&i, &d) in idx.iter().zip(dims.iter()) {
                lin = lin * d + i;
            }
            lin as f64
        })
    }

    #[test]
    fn full_fold_over_transposed_view() {
        let a = iota(&[3, 4]);
        let t = a.view().permute(&[1, 0]).unwrap();
        assert_eq!(sum(&t).unwrap(), 66.0);
        let count = reduce(&t, 0usize, |n, _| n + 1).unwrap();
        assert_eq!(count, 12);
    }

    #[test]
    fn dot_matches_across_layouts() {
        let a = iota(&[4, 3]);
        let b = StridedArray::from_fn(&[4, 3], MemoryOrder::ColMajor, |idx| {
            (idx[0] * 3 + idx[1]) as f64
        });
        let expect: f64 = (0..12).map(|i| (i * i) as f64).sum();
        assert_eq!(dot(&a.view(), &b.view()).unwrap(), expect);
    }

    #[test]
    fn fold_of_empty_view_is_init() {
        let a = StridedArray::filled(&[0, 5], MemoryOrder::RowMajor, 1.0f64);
        assert_eq!(sum(&a.view()).unwrap(), 0.0);
        assert_eq!(reduce(&a.view(), 7i32, |a, _| a + 1).unwrap(), 7);
    }

    #[test]
    fn zip_reduce_dot_product() {
        let a = iota(&[2, 3]);
        let b = StridedArray::filled(&[2, 3], MemoryOrder::ColMajor, 2.0f64);
        let dot = zip_reduce2(&a.view(), &b.view(), 0.0, |acc, x, y| acc + x * y).unwrap();
        assert_eq!(dot, 30.0);
    }

    #[test]
    fn reduce_dims_to_subarray() {
        // Shape [2, 3, 4], reduce the middle dim: out[i][k] = sum over j.
        let a = iota(&[2, 3, 4]);
        let out = reduce_dims(&a.view(), &[1], 0.0, |acc, x| acc + x).unwrap();
        assert_eq!(out.dims(), &[2, 4]);
        for i in 0..2 {
            for k in 0..4 {
                let expect: f64 = (0..3).map(|j| (i * 12 + j * 4 + k) as f64).sum();
                assert_eq!(out.get(&[i, k]), expect);
            }
        }
    }

    #[test]
    fn reduce_all_dims_to_rank0() {
        let a = iota(&[2, 2]);
        let out = reduce_dims(&a.view(), &[0, 1], 0.0, |acc, x| acc + x).unwrap();
        assert_eq!(out.dims(), &[] as &[usize]);
        assert_eq!(out.as_slice(), &[6.0]);
    }

    #[test]
    fn empty_view_with_stale_offset_is_inert() {
        // A zero-size dimension makes any offset legal; the origin pointer
        // must never be materialized out of bounds.
        let data: [f64; 0] = [];
        let v = StridedView::new(&data, &[0], &[1], 7).unwrap();
        assert_eq!(sum(&v).unwrap(), 0.0);

        let mut buf: [f64; 0] = [];
        let mut d = StridedViewMut::new(&mut buf, &[0, 2], &[2, 1], -3).unwrap();
        crate::map::fill(&mut d, 1.0).unwrap();
    }

    #[test]
    fn empty_selection_reduces_everything() {
        let a = iota(&[2, 2]);
        let out = reduce_dims(&a.view(), &[], 0.0, |acc, x| acc + x).unwrap();
        assert_eq!(out.dims(), &[] as &[usize]);
        assert_eq!(out.as_slice(), &[6.0]);
    }

    #[test]
    fn reduce_dims_validates_subset() {
        let a = iota(&[2, 2]);
        assert!(matches!(
            reduce_dims(&a.view(), &[2], 0.0, |a, x| a + x),
            Err(StridedError::InvalidAxis { .. })
        ));
        assert!(matches!(
            reduce_dims(&a.view(), &[0, 0], 0.0, |a, x| a + x),
            Err(StridedError::DuplicateDimension { .. })
        ));
        assert!(matches!(
            reduce_dims(&a.view(), &[0, 1, 0], 0.0, |a, x| a + x),
            Err(StridedError::TooManyDims { .. })
        ));
    }

    #[test]
    fn reduce_dims_into_checks_dest_shape() {
        let a = iota(&[2, 3, 4]);
        let mut bad = StridedArray::filled(&[3, 4], MemoryOrder::RowMajor, 0.0f64);
        assert!(matches!(
            reduce_dims_into(&mut bad.view_mut(), &a.view(), &[1], 0.0, |a, x| a + x),
            Err(StridedError::ShapeMismatch(_, _))
        ));
    }

    #[test]
    fn subview_reducer_sees_whole_lanes() {
        let a = iota(&[2, 3, 4]);
        // Max over dims {0, 2}: out[j] = max of a[i][j][k].
        let out = reduce_dims_with(&a.view(), &[2, 0], |core| {
            assert_eq!(core.dims(), &[2, 4]);
            reduce(core, f64::NEG_INFINITY, |m, x| m.max(*x)).unwrap_or(f64::NEG_INFINITY)
        })
        .unwrap();
        assert_eq!(out.dims(), &[3]);
        assert_eq!(out.as_slice(), &[15.0, 19.0, 23.0]);
    }

    #[test]
    fn axis_lane_reducer() {
        let a = iota(&[3, 4]);
        let lens = reduce_axis_with(&a.view(), 1, |lane| {
            assert_eq!(lane.rank(), 1);
            lane.len()
        })
        .unwrap();
        assert_eq!(lens.as_slice(), &[4, 4, 4]);

        let sums = reduce_axis(&a.view(), 0, 0.0, |acc, x| acc + x).unwrap();
        assert_eq!(sums.dims(), &[4]);
        assert_eq!(sums.as_slice(), &[12.0, 15.0, 18.0, 21.0]);
    }
}

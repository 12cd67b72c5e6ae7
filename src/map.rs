//! Elementwise map operations.
//!
//! All entry points validate shapes, clone the view metadata, and hand the
//! layouts to the planner; the callbacks then run over raw pointers inside
//! the planner's runs. Contiguous same-order operands need no special
//! casing here, fusion collapses them to a single linear loop.

use crate::dispatch::{plan_traversal, traverse, TraverseOptions};
use crate::kernel::for_each_indexed_offset;
use crate::order::{loop_order, native_perm};
use crate::view::{StridedView, StridedViewMut};
use crate::{Dims, Result, StridedError, Strides, MAX_ARRAYS};
use smallvec::SmallVec;
use std::mem::size_of;

pub(crate) fn ensure_same_shape(a: &[usize], b: &[usize]) -> Result<()> {
    if a != b {
        return Err(StridedError::ShapeMismatch(a.to_vec(), b.to_vec()));
    }
    Ok(())
}

/// `dest[i] = f(&src[i])` for every subscript `i`.
pub fn map_into<T, U, F>(
    dest: &mut StridedViewMut<'_, U>,
    src: &StridedView<'_, T>,
    f: F,
) -> Result<()>
where
    F: Fn(&T) -> U,
{
    map_into_opts(dest, src, TraverseOptions::default(), f)
}

/// [`map_into`] with explicit traversal options.
pub fn map_into_opts<T, U, F>(
    dest: &mut StridedViewMut<'_, U>,
    src: &StridedView<'_, T>,
    opts: TraverseOptions,
    f: F,
) -> Result<()>
where
    F: Fn(&T) -> U,
{
    ensure_same_shape(dest.dims(), src.dims())?;

    let dims = Dims::from_slice(dest.dims());
    let dst_strides = Strides::from_slice(dest.strides());
    let hint = dest.order();
    let dst_ptr = dest.ptr_mut();
    let src_ptr = src.ptr();

    let strides_list = [&dst_strides[..], src.strides()];
    let plan = plan_traversal(
        &dims,
        &strides_list,
        Some(0),
        &[size_of::<U>(), size_of::<T>()],
        hint,
        opts,
    );
    traverse(&plan, &[0, 0], |offsets, len, strides| {
        let mut dp = unsafe { dst_ptr.offset(offsets[0]) };
        let mut sp = unsafe { src_ptr.offset(offsets[1]) };
        let (ds, ss) = (strides[0], strides[1]);
        for _ in 0..len {
            let out = f(unsafe { &*sp });
            unsafe {
                *dp = out;
                dp = dp.offset(ds);
                sp = sp.offset(ss);
            }
        }
        Ok(())
    })
}

/// `dest[i] = f(&a[i], &b[i])`.
pub fn zip_map2_into<A, B, U, F>(
    dest: &mut StridedViewMut<'_, U>,
    a: &StridedView<'_, A>,
    b: &StridedView<'_, B>,
    f: F,
) -> Result<()>
where
    F: Fn(&A, &B) -> U,
{
    ensure_same_shape(dest.dims(), a.dims())?;
    ensure_same_shape(dest.dims(), b.dims())?;

    let dims = Dims::from_slice(dest.dims());
    let dst_strides = Strides::from_slice(dest.strides());
    let hint = dest.order();
    let dst_ptr = dest.ptr_mut();
    let (a_ptr, b_ptr) = (a.ptr(), b.ptr());

    let strides_list = [&dst_strides[..], a.strides(), b.strides()];
    let plan = plan_traversal(
        &dims,
        &strides_list,
        Some(0),
        &[size_of::<U>(), size_of::<A>(), size_of::<B>()],
        hint,
        TraverseOptions::default(),
    );
    traverse(&plan, &[0, 0, 0], |offsets, len, strides| {
        let mut dp = unsafe { dst_ptr.offset(offsets[0]) };
        let mut ap = unsafe { a_ptr.offset(offsets[1]) };
        let mut bp = unsafe { b_ptr.offset(offsets[2]) };
        for _ in 0..len {
            let out = f(unsafe { &*ap }, unsafe { &*bp });
            unsafe {
                *dp = out;
                dp = dp.offset(strides[0]);
                ap = ap.offset(strides[1]);
                bp = bp.offset(strides[2]);
            }
        }
        Ok(())
    })
}

/// `dest[i] = f(&a[i], &b[i], &c[i])`.
pub fn zip_map3_into<A, B, C, U, F>(
    dest: &mut StridedViewMut<'_, U>,
    a: &StridedView<'_, A>,
    b: &StridedView<'_, B>,
    c: &StridedView<'_, C>,
    f: F,
) -> Result<()>
where
    F: Fn(&A, &B, &C) -> U,
{
    ensure_same_shape(dest.dims(), a.dims())?;
    ensure_same_shape(dest.dims(), b.dims())?;
    ensure_same_shape(dest.dims(), c.dims())?;

    let dims = Dims::from_slice(dest.dims());
    let dst_strides = Strides::from_slice(dest.strides());
    let hint = dest.order();
    let dst_ptr = dest.ptr_mut();
    let (a_ptr, b_ptr, c_ptr) = (a.ptr(), b.ptr(), c.ptr());

    let strides_list = [&dst_strides[..], a.strides(), b.strides(), c.strides()];
    let plan = plan_traversal(
        &dims,
        &strides_list,
        Some(0),
        &[size_of::<U>(), size_of::<A>(), size_of::<B>(), size_of::<C>()],
        hint,
        TraverseOptions::default(),
    );
    traverse(&plan, &[0, 0, 0, 0], |offsets, len, strides| {
        let mut dp = unsafe { dst_ptr.offset(offsets[0]) };
        let mut ap = unsafe { a_ptr.offset(offsets[1]) };
        let mut bp = unsafe { b_ptr.offset(offsets[2]) };
        let mut cp = unsafe { c_ptr.offset(offsets[3]) };
        for _ in 0..len {
            let out = f(unsafe { &*ap }, unsafe { &*bp }, unsafe { &*cp });
            unsafe {
                *dp = out;
                dp = dp.offset(strides[0]);
                ap = ap.offset(strides[1]);
                bp = bp.offset(strides[2]);
                cp = cp.offset(strides[3]);
            }
        }
        Ok(())
    })
}

/// `dest[i] = f(&a[i], &b[i], &c[i], &d[i])`.
pub fn zip_map4_into<A, B, C, D, U, F>(
    dest: &mut StridedViewMut<'_, U>,
    a: &StridedView<'_, A>,
    b: &StridedView<'_, B>,
    c: &StridedView<'_, C>,
    d: &StridedView<'_, D>,
    f: F,
) -> Result<()>
where
    F: Fn(&A, &B, &C, &D) -> U,
{
    ensure_same_shape(dest.dims(), a.dims())?;
    ensure_same_shape(dest.dims(), b.dims())?;
    ensure_same_shape(dest.dims(), c.dims())?;
    ensure_same_shape(dest.dims(), d.dims())?;

    let dims = Dims::from_slice(dest.dims());
    let dst_strides = Strides::from_slice(dest.strides());
    let hint = dest.order();
    let dst_ptr = dest.ptr_mut();
    let (a_ptr, b_ptr, c_ptr, d_ptr) = (a.ptr(), b.ptr(), c.ptr(), d.ptr());

    let strides_list = [
        &dst_strides[..],
        a.strides(),
        b.strides(),
        c.strides(),
        d.strides(),
    ];
    let plan = plan_traversal(
        &dims,
        &strides_list,
        Some(0),
        &[
            size_of::<U>(),
            size_of::<A>(),
            size_of::<B>(),
            size_of::<C>(),
            size_of::<D>(),
        ],
        hint,
        TraverseOptions::default(),
    );
    traverse(&plan, &[0, 0, 0, 0, 0], |offsets, len, strides| {
        let mut dp = unsafe { dst_ptr.offset(offsets[0]) };
        let mut ap = unsafe { a_ptr.offset(offsets[1]) };
        let mut bp = unsafe { b_ptr.offset(offsets[2]) };
        let mut cp = unsafe { c_ptr.offset(offsets[3]) };
        let mut ep = unsafe { d_ptr.offset(offsets[4]) };
        for _ in 0..len {
            let out = f(
                unsafe { &*ap },
                unsafe { &*bp },
                unsafe { &*cp },
                unsafe { &*ep },
            );
            unsafe {
                *dp = out;
                dp = dp.offset(strides[0]);
                ap = ap.offset(strides[1]);
                bp = bp.offset(strides[2]);
                cp = cp.offset(strides[3]);
                ep = ep.offset(strides[4]);
            }
        }
        Ok(())
    })
}

/// Variadic zip-map: `dest[i] = f(&[srcs[0][i], srcs[1][i], ...])`.
///
/// The source count plus the destination must not exceed [`MAX_ARRAYS`].
pub fn zip_map_n_into<T, U, F>(
    dest: &mut StridedViewMut<'_, U>,
    srcs: &[&StridedView<'_, T>],
    f: F,
) -> Result<()>
where
    T: Copy,
    F: Fn(&[T]) -> U,
{
    if srcs.len() + 1 > MAX_ARRAYS {
        return Err(StridedError::TooManyArrays(srcs.len() + 1));
    }
    for s in srcs {
        ensure_same_shape(dest.dims(), s.dims())?;
    }

    let dims = Dims::from_slice(dest.dims());
    let dst_strides = Strides::from_slice(dest.strides());
    let hint = dest.order();
    let dst_ptr = dest.ptr_mut();
    let src_ptrs: SmallVec<[*const T; MAX_ARRAYS]> = srcs.iter().map(|s| s.ptr()).collect();

    let mut strides_list: SmallVec<[&[isize]; MAX_ARRAYS]> = SmallVec::new();
    strides_list.push(&dst_strides[..]);
    for s in srcs {
        strides_list.push(s.strides());
    }
    let mut elem_bytes: SmallVec<[usize; MAX_ARRAYS]> = SmallVec::new();
    elem_bytes.push(size_of::<U>());
    elem_bytes.extend(std::iter::repeat(size_of::<T>()).take(srcs.len()));

    let plan = plan_traversal(
        &dims,
        &strides_list,
        Some(0),
        &elem_bytes,
        hint,
        TraverseOptions::default(),
    );
    let start: SmallVec<[isize; MAX_ARRAYS]> = SmallVec::from_elem(0, srcs.len() + 1);
    let mut args: SmallVec<[T; MAX_ARRAYS]> = SmallVec::new();
    traverse(&plan, &start, |offsets, len, strides| {
        let mut dp = unsafe { dst_ptr.offset(offsets[0]) };
        for k in 0..len {
            args.clear();
            for (j, &p) in src_ptrs.iter().enumerate() {
                let off = offsets[j + 1] + k as isize * strides[j + 1];
                args.push(unsafe { *p.offset(off) });
            }
            let out = f(&args);
            unsafe {
                *dp = out;
                dp = dp.offset(strides[0]);
            }
        }
        Ok(())
    })
}

/// `dest[i] = f(i, &src[i])` where `i` is the subscript vector.
///
/// Subscripts are reported in the arrays' own dimension order even though
/// the loops may run in a different nesting.
pub fn map_indexed_into<T, U, F>(
    dest: &mut StridedViewMut<'_, U>,
    src: &StridedView<'_, T>,
    f: F,
) -> Result<()>
where
    F: Fn(&[usize], &T) -> U,
{
    ensure_same_shape(dest.dims(), src.dims())?;
    if dest.is_empty() {
        return Ok(());
    }

    let dims = Dims::from_slice(dest.dims());
    let dst_strides = Strides::from_slice(dest.strides());
    let dst_ptr = dest.ptr_mut();
    let src_ptr = src.ptr();

    let strides_list = [&dst_strides[..], src.strides()];
    let perm = loop_order(&dims, &strides_list, Some(0));
    let odims: Dims = perm.iter().map(|&i| dims[i]).collect();
    let od: Strides = perm.iter().map(|&i| dst_strides[i]).collect();
    let os: Strides = perm.iter().map(|&i| src.strides()[i]).collect();
    let ordered = [&od[..], &os[..]];

    for_each_indexed_offset(&odims, &perm, &ordered, &[0, 0], |idx, offsets| {
        let out = f(idx, unsafe { &*src_ptr.offset(offsets[1]) });
        unsafe {
            *dst_ptr.offset(offsets[0]) = out;
        }
        Ok(())
    })
}

/// Visit every element with its subscript vector.
pub fn for_each_indexed<T, F>(src: &StridedView<'_, T>, mut f: F) -> Result<()>
where
    F: FnMut(&[usize], &T),
{
    if src.is_empty() {
        return Ok(());
    }
    let dims = Dims::from_slice(src.dims());
    let src_ptr = src.ptr();

    // Reading callbacks see subscripts, so visit in the native nesting.
    let perm = native_perm(dims.len(), src.order());
    let odims: Dims = perm.iter().map(|&i| dims[i]).collect();
    let os: Strides = perm.iter().map(|&i| src.strides()[i]).collect();
    let ordered = [&os[..]];

    for_each_indexed_offset(&odims, &perm, &ordered, &[0], |idx, offsets| {
        f(idx, unsafe { &*src_ptr.offset(offsets[0]) });
        Ok(())
    })
}

/// Copy `src` into `dest` elementwise.
pub fn copy_into<T: Clone>(
    dest: &mut StridedViewMut<'_, T>,
    src: &StridedView<'_, T>,
) -> Result<()> {
    map_into(dest, src, |x| x.clone())
}

/// Set every element of `dest` to `value`.
pub fn fill<T: Clone>(dest: &mut StridedViewMut<'_, T>, value: T) -> Result<()> {
    let dims = Dims::from_slice(dest.dims());
    let dst_strides = Strides::from_slice(dest.strides());
    let hint = dest.order();
    let dst_ptr = dest.ptr_mut();

    let strides_list = [&dst_strides[..]];
    let plan = plan_traversal(
        &dims,
        &strides_list,
        Some(0),
        &[size_of::<T>()],
        hint,
        TraverseOptions::default(),
    );
    traverse(&plan, &[0], |offsets, len, strides| {
        let mut dp = unsafe { dst_ptr.offset(offsets[0]) };
        for _ in 0..len {
            unsafe {
                *dp = value.clone();
                dp = dp.offset(strides[0]);
            }
        }
        Ok(())
    })
}

//! Offset and index arithmetic shared by every traversal kernel.
//!
//! All functions here are pure. Offsets are measured in elements, relative to
//! the buffer start unless stated otherwise; strides may be negative.

use crate::view::MemoryOrder;
use crate::{Result, StridedError};

/// Buffer offset of a multi-dimensional subscript vector.
///
/// Computes `offset + sum(subscripts[i] * strides[i])` with checked
/// arithmetic.
pub fn linear_offset(subscripts: &[usize], strides: &[isize], offset: isize) -> Result<isize> {
    if subscripts.len() != strides.len() {
        return Err(StridedError::StrideLengthMismatch);
    }
    let mut acc = offset;
    for (&i, &s) in subscripts.iter().zip(strides.iter()) {
        let i = isize::try_from(i).map_err(|_| StridedError::OffsetOverflow)?;
        let step = s.checked_mul(i).ok_or(StridedError::OffsetOverflow)?;
        acc = acc.checked_add(step).ok_or(StridedError::OffsetOverflow)?;
    }
    Ok(acc)
}

/// Decompose a linear view index into subscripts for the given memory order.
///
/// Row-major order means the last dimension varies fastest; column-major
/// means the first does. `out` must have length `dims.len()`.
pub(crate) fn subscripts_at(linear: usize, dims: &[usize], order: MemoryOrder, out: &mut [usize]) {
    debug_assert_eq!(dims.len(), out.len());
    let mut k = linear;
    match order {
        MemoryOrder::RowMajor => {
            for i in (0..dims.len()).rev() {
                out[i] = k % dims[i];
                k /= dims[i];
            }
        }
        MemoryOrder::ColMajor => {
            for i in 0..dims.len() {
                out[i] = k % dims[i];
                k /= dims[i];
            }
        }
    }
}

/// Per-array buffer offsets for a linear view index.
///
/// The generic-fallback workhorse: decomposes `linear` via [`subscripts_at`]
/// and dots the subscripts against every stride list. `scratch` holds the
/// subscripts on return.
pub(crate) fn offsets_at(
    linear: usize,
    dims: &[usize],
    order: MemoryOrder,
    strides_list: &[&[isize]],
    scratch: &mut [usize],
    out: &mut [isize],
) {
    debug_assert_eq!(strides_list.len(), out.len());
    subscripts_at(linear, dims, order, scratch);
    for (o, strides) in out.iter_mut().zip(strides_list.iter()) {
        let mut acc = 0isize;
        for (&i, &s) in scratch.iter().zip(strides.iter()) {
            acc += i as isize * s;
        }
        *o = acc;
    }
}

/// Minimum and maximum buffer index reachable by a view.
///
/// Returns `(min, max)` over all subscript combinations. For an empty view
/// both bounds collapse to `offset`.
pub fn reachable_range(dims: &[usize], strides: &[isize], offset: isize) -> Result<(isize, isize)> {
    if dims.len() != strides.len() {
        return Err(StridedError::StrideLengthMismatch);
    }
    let mut min = offset;
    let mut max = offset;
    if dims.iter().any(|&d| d == 0) {
        return Ok((min, max));
    }
    for (&d, &s) in dims.iter().zip(strides.iter()) {
        if d <= 1 {
            continue;
        }
        let span = s
            .checked_mul(d as isize - 1)
            .ok_or(StridedError::OffsetOverflow)?;
        if span >= 0 {
            max = max.checked_add(span).ok_or(StridedError::OffsetOverflow)?;
        } else {
            min = min.checked_add(span).ok_or(StridedError::OffsetOverflow)?;
        }
    }
    Ok((min, max))
}

/// Whether a view's reachable indices form an unbroken range equal in size to
/// its element count.
///
/// An empty or rank-0 view counts as contiguous. The test is purely about the
/// touched region, so reversed (negative-stride) views over a dense buffer
/// qualify.
pub(crate) fn is_contiguous(dims: &[usize], strides: &[isize]) -> bool {
    if dims.len() != strides.len() {
        return false;
    }
    let count = total_len(dims);
    if count <= 1 {
        return true;
    }
    match reachable_range(dims, strides, 0) {
        Ok((min, max)) => (max - min + 1) as usize == count,
        Err(_) => false,
    }
}

/// Element count of a shape; 1 for rank 0, 0 if any dimension is 0.
pub(crate) fn total_len(dims: &[usize]) -> usize {
    dims.iter().product()
}

/// Row-major strides for a shape (last dimension fastest).
pub fn row_major_strides(dims: &[usize]) -> crate::Strides {
    let rank = dims.len();
    let mut strides = crate::Strides::from_elem(1, rank);
    for i in (0..rank.saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * dims[i + 1] as isize;
    }
    strides
}

/// Column-major strides for a shape (first dimension fastest).
pub fn col_major_strides(dims: &[usize]) -> crate::Strides {
    let rank = dims.len();
    let mut strides = crate::Strides::from_elem(1, rank);
    for i in 1..rank {
        strides[i] = strides[i - 1] * dims[i - 1] as isize;
    }
    strides
}

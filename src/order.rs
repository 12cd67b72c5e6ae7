//! Loop-order analysis: stride signs, element order and the iteration
//! permutation.
//!
//! The resolver decides two things per dispatch: whether the participating
//! views are well-behaved enough to traverse in their native order, and if
//! not, which dimension permutation makes the innermost loop walk memory as
//! densely as possible.

use crate::view::MemoryOrder;
use crate::Dims;
use smallvec::SmallVec;

/// Direction of buffer movement implied by a view's stride signs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOrder {
    /// All strides non-negative: offsets only grow.
    Ascending,
    /// All strides non-positive: offsets only shrink.
    Descending,
    /// Mixed signs: no monotonic traversal exists.
    Mixed,
}

/// Memory layout implied by a view's stride magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementOrder {
    /// Stride magnitudes non-increasing: last dimension densest.
    RowMajor,
    /// Stride magnitudes non-decreasing: first dimension densest.
    ColMajor,
    /// Both hold (rank <= 1, or all effective strides equal).
    Both,
    /// Neither holds.
    Neither,
}

/// Classify the stride signs of a view. Zero strides and size-1 dimensions
/// are neutral.
pub fn iteration_order(dims: &[usize], strides: &[isize]) -> IterationOrder {
    let mut any_pos = false;
    let mut any_neg = false;
    for (&d, &s) in dims.iter().zip(strides.iter()) {
        if d <= 1 {
            continue;
        }
        if s > 0 {
            any_pos = true;
        } else if s < 0 {
            any_neg = true;
        }
    }
    match (any_pos, any_neg) {
        (true, true) => IterationOrder::Mixed,
        (false, true) => IterationOrder::Descending,
        _ => IterationOrder::Ascending,
    }
}

/// Classify the element order of a view from its stride magnitudes,
/// ignoring size-1 dimensions.
pub fn element_order(dims: &[usize], strides: &[isize]) -> ElementOrder {
    let mags: SmallVec<[usize; 8]> = dims
        .iter()
        .zip(strides.iter())
        .filter(|(&d, _)| d > 1)
        .map(|(_, &s)| s.unsigned_abs())
        .collect();
    let row = mags.windows(2).all(|w| w[0] >= w[1]);
    let col = mags.windows(2).all(|w| w[0] <= w[1]);
    match (row, col) {
        (true, true) => ElementOrder::Both,
        (true, false) => ElementOrder::RowMajor,
        (false, true) => ElementOrder::ColMajor,
        (false, false) => ElementOrder::Neither,
    }
}

/// The fast-path predicate: every array monotonic and all element orders
/// compatible. Returns the shared order on success (`hint` breaks a tie when
/// every array is order-agnostic).
pub(crate) fn orders_agree(
    dims: &[usize],
    strides_list: &[&[isize]],
    hint: MemoryOrder,
) -> Option<MemoryOrder> {
    let mut agreed: Option<MemoryOrder> = None;
    for strides in strides_list {
        if iteration_order(dims, strides) == IterationOrder::Mixed {
            return None;
        }
        match element_order(dims, strides) {
            ElementOrder::Both => {}
            ElementOrder::RowMajor => match agreed {
                Some(MemoryOrder::ColMajor) => return None,
                _ => agreed = Some(MemoryOrder::RowMajor),
            },
            ElementOrder::ColMajor => match agreed {
                Some(MemoryOrder::RowMajor) => return None,
                _ => agreed = Some(MemoryOrder::ColMajor),
            },
            ElementOrder::Neither => return None,
        }
    }
    Some(agreed.unwrap_or(hint))
}

/// The native iteration permutation for a memory order, innermost dimension
/// first.
pub(crate) fn native_perm(rank: usize, order: MemoryOrder) -> Dims {
    match order {
        MemoryOrder::RowMajor => (0..rank).rev().collect(),
        MemoryOrder::ColMajor => (0..rank).collect(),
    }
}

/// Compute the iteration permutation for a set of arrays, innermost first.
///
/// Dimensions are ordered by ascending combined stride magnitude, with the
/// destination array (when present) weighted double so its writes stay
/// dense; ties go to the higher dimension index so equally ranked strides
/// keep their native relative order. The reverse of the returned permutation
/// maps iteration counters back to original dimension labels.
pub(crate) fn loop_order(
    dims: &[usize],
    strides_list: &[&[isize]],
    dest_index: Option<usize>,
) -> Dims {
    let rank = dims.len();
    let mut perm: Dims = (0..rank).collect();
    perm.sort_by(|&a, &b| {
        let sa = dim_cost(a, dims, strides_list, dest_index);
        let sb = dim_cost(b, dims, strides_list, dest_index);
        sa.cmp(&sb).then_with(|| b.cmp(&a))
    });
    perm
}

/// Combined weighted stride magnitude of one dimension across all arrays.
/// Size-1 dimensions cost the maximum so they end up outermost.
fn dim_cost(
    dim: usize,
    dims: &[usize],
    strides_list: &[&[isize]],
    dest_index: Option<usize>,
) -> u128 {
    if dims[dim] <= 1 {
        return u128::MAX;
    }
    let mut cost = 0u128;
    for (i, strides) in strides_list.iter().enumerate() {
        let weight: u128 = if dest_index == Some(i) { 2 } else { 1 };
        cost += weight * strides[dim].unsigned_abs() as u128;
    }
    cost
}

/// Relative rank of each stride among the non-zero strides of a view.
/// Zero strides rank first. Mirrors the ordering used by the block-size
/// estimate.
pub(crate) fn stride_rank(strides: &[isize]) -> Dims {
    let n = strides.len();
    let mut out = Dims::from_elem(1, n);
    for i in 0..n {
        let si = strides[i].unsigned_abs();
        if si == 0 {
            continue;
        }
        let mut k = 1usize;
        for &s in strides {
            if s != 0 && s.unsigned_abs() < si {
                k += 1;
            }
        }
        out[i] = k;
    }
    out
}

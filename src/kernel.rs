//! Traversal kernels.
//!
//! These walk one or more strided layouts in lockstep and hand contiguous
//! runs to a callback. Dimensions arrive already in iteration order with
//! index 0 innermost; the dispatch layer is responsible for reordering,
//! fusing and tiling decisions. A single recursion handles every rank, with
//! tile selection layered outside the element loops so that one tile is
//! finished before the next begins.

use crate::index::offsets_at;
use crate::view::MemoryOrder;
use crate::{Offsets, Result};
use smallvec::SmallVec;

/// Walk all arrays tile by tile, invoking `f` once per innermost run.
///
/// `f` receives the current offset of each array, the run length, and each
/// array's innermost stride. Offsets and strides are in elements, not bytes.
pub(crate) fn for_each_inner_block<F>(
    dims: &[usize],
    strides_list: &[&[isize]],
    blocks: &[usize],
    start: &[isize],
    mut f: F,
) -> Result<()>
where
    F: FnMut(&[isize], usize, &[isize]) -> Result<()>,
{
    let rank = dims.len();
    let narrays = strides_list.len();
    debug_assert_eq!(start.len(), narrays);
    debug_assert_eq!(blocks.len(), rank);

    let inner_strides: Offsets = strides_list
        .iter()
        .map(|s| s.first().copied().unwrap_or(0))
        .collect();
    let mut offsets: Offsets = SmallVec::from_slice(start);

    if rank == 0 {
        return f(&offsets, 1, &inner_strides);
    }

    let mut tile: SmallVec<[usize; 8]> = SmallVec::from_elem(0, rank);
    tile_loops(
        rank,
        dims,
        strides_list,
        blocks,
        &mut offsets,
        &mut tile,
        &inner_strides,
        &mut f,
    )
}

/// Select one tile along dimension `level - 1`, then descend. At level 0 a
/// full tile extent is recorded in `tile` and the element loops run.
#[allow(clippy::too_many_arguments)]
fn tile_loops<F>(
    level: usize,
    dims: &[usize],
    strides_list: &[&[isize]],
    blocks: &[usize],
    offsets: &mut Offsets,
    tile: &mut [usize],
    inner_strides: &[isize],
    f: &mut F,
) -> Result<()>
where
    F: FnMut(&[isize], usize, &[isize]) -> Result<()>,
{
    if level == 0 {
        return elem_loops(tile.len() - 1, tile, strides_list, offsets, inner_strides, f);
    }
    let l = level - 1;
    let d = dims[l];
    let blen = blocks[l].max(1);
    let mut done = 0usize;
    while done < d {
        let b = blen.min(d - done);
        tile[l] = b;
        tile_loops(l, dims, strides_list, blocks, offsets, tile, inner_strides, f)?;
        for (o, s) in offsets.iter_mut().zip(strides_list.iter()) {
            *o += b as isize * s[l];
        }
        done += b;
    }
    for (o, s) in offsets.iter_mut().zip(strides_list.iter()) {
        *o -= d as isize * s[l];
    }
    Ok(())
}

/// Iterate the elements of the current tile. The innermost dimension is not
/// stepped here; its whole run goes to the callback in one call.
fn elem_loops<F>(
    level: usize,
    tile: &[usize],
    strides_list: &[&[isize]],
    offsets: &mut Offsets,
    inner_strides: &[isize],
    f: &mut F,
) -> Result<()>
where
    F: FnMut(&[isize], usize, &[isize]) -> Result<()>,
{
    if level == 0 {
        return f(offsets, tile[0], inner_strides);
    }
    for _ in 0..tile[level] {
        elem_loops(level - 1, tile, strides_list, offsets, inner_strides, f)?;
        for (o, s) in offsets.iter_mut().zip(strides_list.iter()) {
            *o += s[level];
        }
    }
    for (o, s) in offsets.iter_mut().zip(strides_list.iter()) {
        *o -= tile[level] as isize * s[level];
    }
    Ok(())
}

/// Walk every element, reporting the subscript vector in the arrays'
/// original dimension order together with each array's offset.
///
/// `perm` maps iteration position to original dimension, so `dims` and the
/// stride vectors are in iteration order while the subscripts handed to `f`
/// are not permuted.
pub(crate) fn for_each_indexed_offset<F>(
    dims: &[usize],
    perm: &[usize],
    strides_list: &[&[isize]],
    start: &[isize],
    mut f: F,
) -> Result<()>
where
    F: FnMut(&[usize], &[isize]) -> Result<()>,
{
    let rank = dims.len();
    let mut offsets: Offsets = SmallVec::from_slice(start);
    let mut idx: SmallVec<[usize; 8]> = SmallVec::from_elem(0, rank);

    if rank == 0 {
        return f(&idx, &offsets);
    }
    indexed_loops(rank, dims, perm, strides_list, &mut offsets, &mut idx, &mut f)
}

fn indexed_loops<F>(
    level: usize,
    dims: &[usize],
    perm: &[usize],
    strides_list: &[&[isize]],
    offsets: &mut Offsets,
    idx: &mut [usize],
    f: &mut F,
) -> Result<()>
where
    F: FnMut(&[usize], &[isize]) -> Result<()>,
{
    if level == 0 {
        return f(idx, offsets);
    }
    let l = level - 1;
    for i in 0..dims[l] {
        idx[perm[l]] = i;
        indexed_loops(l, dims, perm, strides_list, offsets, idx, f)?;
        for (o, s) in offsets.iter_mut().zip(strides_list.iter()) {
            *o += s[l];
        }
    }
    for (o, s) in offsets.iter_mut().zip(strides_list.iter()) {
        *o -= dims[l] as isize * s[l];
    }
    Ok(())
}

/// Element-at-a-time traversal by linear index decomposition. This is the
/// escape hatch for ranks beyond what the recursive kernels are sized for;
/// each step re-derives every array's offset from the flat position.
pub(crate) fn for_each_linear<F>(
    dims: &[usize],
    order: MemoryOrder,
    strides_list: &[&[isize]],
    start: &[isize],
    mut f: F,
) -> Result<()>
where
    F: FnMut(&[isize]) -> Result<()>,
{
    let total = crate::index::total_len(dims);
    let mut scratch = vec![0usize; dims.len()];
    let mut offsets: Offsets = SmallVec::from_elem(0, strides_list.len());
    for linear in 0..total {
        offsets_at(linear, dims, order, strides_list, &mut scratch, &mut offsets);
        for (o, base) in offsets.iter_mut().zip(start.iter()) {
            *o += base;
        }
        f(&offsets)?;
    }
    Ok(())
}

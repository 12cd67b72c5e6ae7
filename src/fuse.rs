//! Dimension fusion: merge adjacent dimensions that are jointly contiguous
//! across every participating array.
//!
//! Fusion runs before loop ordering and blocking. It drops size-1 dimensions
//! and merges neighbor pairs whose strides nest exactly, in either direction:
//! an outer stride equal to `inner_count * inner_stride` collapses the pair
//! into one loop level. When every array is dense the whole shape collapses
//! to rank 1, which is how the dispatch engine's contiguous-range shortcut
//! falls out.

use crate::{Dims, Strides};

/// Fused dims plus per-array fused strides, size-1 dimensions removed.
pub(crate) fn fuse(dims: &[usize], strides_list: &[&[isize]]) -> (Dims, Vec<Strides>) {
    let m = strides_list.len();
    let mut out_dims = Dims::new();
    let mut out_strides: Vec<Strides> = vec![Strides::new(); m];

    for j in 0..dims.len() {
        if dims[j] == 1 {
            continue;
        }
        if let Some(last) = out_dims.len().checked_sub(1) {
            // Column-style nesting: the new dimension is coarser, its stride
            // spans the accumulated run.
            let col = (0..m).all(|k| {
                strides_list[k][j] == out_dims[last] as isize * out_strides[k][last]
            });
            if col {
                out_dims[last] *= dims[j];
                continue;
            }
            // Row-style nesting: the new dimension is finer, the accumulated
            // run's stride spans it.
            let row = (0..m)
                .all(|k| out_strides[k][last] == dims[j] as isize * strides_list[k][j]);
            if row {
                out_dims[last] *= dims[j];
                for k in 0..m {
                    out_strides[k][last] = strides_list[k][j];
                }
                continue;
            }
        }
        out_dims.push(dims[j]);
        for k in 0..m {
            out_strides[k].push(strides_list[k][j]);
        }
    }

    (out_dims, out_strides)
}

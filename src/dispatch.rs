//! Traversal planning.
//!
//! Every map and reduce entry point funnels through [`plan_traversal`],
//! which inspects the shapes and strides of the participating arrays and
//! picks a strategy: degenerate cases are answered directly, mergeable
//! dimensions are fused, loops are interchanged so the cheapest stride runs
//! innermost, and layouts that disagree get cache tiles. The plan is inert
//! data; [`traverse`] executes it against the kernels.

use crate::block::block_sizes;
use crate::fuse::fuse;
use crate::index::total_len;
use crate::kernel;
use crate::order::{loop_order, native_perm, orders_agree};
use crate::view::MemoryOrder;
use crate::{Dims, Offsets, Result, Strides, MAX_SPECIALIZED_RANK};
use smallvec::SmallVec;

/// Options accepted by the `_opts` entry points.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraverseOptions {
    /// Visit elements exactly in the destination's native order: no loop
    /// interchange, no dimension fusion, no tiling. Useful when the callback
    /// is order-sensitive.
    pub strict_traversal_order: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Strategy {
    /// Some dimension is zero; nothing to visit.
    Empty,
    /// Exactly one element.
    Scalar,
    /// Everything fused into a single loop.
    Linear,
    /// Multi-dimensional but all arrays agree on an order; no tiling.
    Direct,
    /// Conflicting layouts; interchange plus cache tiles.
    Blocked,
    /// Rank beyond the recursive kernels; linear-index decomposition.
    Fallback,
}

/// An executable traversal plan. `dims` and `strides` are in iteration
/// order (innermost first) except under [`Strategy::Fallback`], where they
/// keep the original dimension order and `order` drives the decomposition.
pub(crate) struct Traversal {
    pub(crate) strategy: Strategy,
    pub(crate) dims: Dims,
    pub(crate) strides: Vec<Strides>,
    pub(crate) blocks: Dims,
    pub(crate) order: MemoryOrder,
}

impl Traversal {
    fn degenerate(strategy: Strategy, narrays: usize, order: MemoryOrder) -> Self {
        Traversal {
            strategy,
            dims: Dims::new(),
            strides: vec![Strides::new(); narrays],
            blocks: Dims::new(),
            order,
        }
    }
}

/// Build a plan for arrays sharing the shape `dims`.
///
/// `strides_list` holds one stride vector per array; `dest_index` marks the
/// array being written, which weighs double in loop-order decisions.
/// `elem_bytes` gives per-array element widths for tile sizing, and `hint`
/// is the destination's native order, used to break ties and to drive the
/// fallback decomposition.
pub(crate) fn plan_traversal(
    dims: &[usize],
    strides_list: &[&[isize]],
    dest_index: Option<usize>,
    elem_bytes: &[usize],
    hint: MemoryOrder,
    opts: TraverseOptions,
) -> Traversal {
    let narrays = strides_list.len();

    if dims.iter().any(|&d| d == 0) {
        return Traversal::degenerate(Strategy::Empty, narrays, hint);
    }
    if total_len(dims) == 1 {
        return Traversal::degenerate(Strategy::Scalar, narrays, hint);
    }

    if opts.strict_traversal_order {
        return plan_strict(dims, strides_list, hint);
    }

    let (fdims, fstrides) = fuse(dims, strides_list);
    let frefs: Vec<&[isize]> = fstrides.iter().map(|s| s.as_slice()).collect();

    if fdims.len() == 1 {
        log::trace!("linear traversal, {} elements", fdims[0]);
        return Traversal {
            strategy: Strategy::Linear,
            blocks: fdims.clone(),
            dims: fdims,
            strides: fstrides,
            order: hint,
        };
    }
    if fdims.len() > MAX_SPECIALIZED_RANK {
        log::trace!("rank {} exceeds kernel limit, using fallback", fdims.len());
        return Traversal {
            strategy: Strategy::Fallback,
            blocks: Dims::new(),
            dims: fdims,
            strides: fstrides,
            order: hint,
        };
    }

    let agreed = orders_agree(&fdims, &frefs, hint);
    let perm = loop_order(&fdims, &frefs, dest_index);
    let odims: Dims = perm.iter().map(|&i| fdims[i]).collect();
    let ostrides: Vec<Strides> = fstrides
        .iter()
        .map(|s| perm.iter().map(|&i| s[i]).collect())
        .collect();

    if agreed.is_some() {
        log::trace!("direct traversal, dims {:?}", odims.as_slice());
        return Traversal {
            strategy: Strategy::Direct,
            blocks: odims.clone(),
            dims: odims,
            strides: ostrides,
            order: hint,
        };
    }

    let orefs: Vec<&[isize]> = ostrides.iter().map(|s| s.as_slice()).collect();
    let blocks = block_sizes(&odims, &orefs, elem_bytes);
    log::trace!(
        "blocked traversal, dims {:?}, blocks {:?}",
        odims.as_slice(),
        blocks.as_slice()
    );
    Traversal {
        strategy: Strategy::Blocked,
        dims: odims,
        strides: ostrides,
        blocks,
        order: hint,
    }
}

/// Strict planning keeps the native nesting and never fuses or tiles.
fn plan_strict(dims: &[usize], strides_list: &[&[isize]], hint: MemoryOrder) -> Traversal {
    let rank = dims.len();
    if rank > MAX_SPECIALIZED_RANK {
        return Traversal {
            strategy: Strategy::Fallback,
            dims: Dims::from_slice(dims),
            strides: strides_list
                .iter()
                .map(|s| Strides::from_slice(s))
                .collect(),
            blocks: Dims::new(),
            order: hint,
        };
    }
    let perm = native_perm(rank, hint);
    let odims: Dims = perm.iter().map(|&i| dims[i]).collect();
    let ostrides: Vec<Strides> = strides_list
        .iter()
        .map(|s| perm.iter().map(|&i| s[i]).collect())
        .collect();
    Traversal {
        strategy: Strategy::Direct,
        blocks: odims.clone(),
        dims: odims,
        strides: ostrides,
        order: hint,
    }
}

/// Run a plan. The callback sees per-array offsets, a run length, and the
/// per-array innermost strides, exactly as the kernels report them.
pub(crate) fn traverse<F>(t: &Traversal, start: &[isize], mut f: F) -> Result<()>
where
    F: FnMut(&[isize], usize, &[isize]) -> Result<()>,
{
    match t.strategy {
        Strategy::Empty => Ok(()),
        Strategy::Fallback => {
            let refs: Vec<&[isize]> = t.strides.iter().map(|s| s.as_slice()).collect();
            let unit: Offsets = SmallVec::from_elem(0, start.len());
            kernel::for_each_linear(&t.dims, t.order, &refs, start, |offs| f(offs, 1, &unit))
        }
        _ => {
            let refs: Vec<&[isize]> = t.strides.iter().map(|s| s.as_slice()).collect();
            kernel::for_each_inner_block(&t.dims, &refs, &t.blocks, start, f)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(
        dims: &[usize],
        strides_list: &[&[isize]],
        opts: TraverseOptions,
    ) -> Traversal {
        let bytes = vec![8usize; strides_list.len()];
        plan_traversal(dims, strides_list, Some(0), &bytes, MemoryOrder::RowMajor, opts)
    }

    #[test]
    fn empty_and_scalar() {
        let s = [3isize, 1];
        let t = plan(&[0, 3], &[&s], TraverseOptions::default());
        assert_eq!(t.strategy, Strategy::Empty);

        let t = plan(&[1, 1], &[&s], TraverseOptions::default());
        assert_eq!(t.strategy, Strategy::Scalar);

        let t = plan(&[], &[&[] as &[isize]], TraverseOptions::default());
        assert_eq!(t.strategy, Strategy::Scalar);
    }

    #[test]
    fn contiguous_pair_collapses_to_linear() {
        let s = [6isize, 3, 1];
        let t = plan(&[4, 2, 3], &[&s, &s], TraverseOptions::default());
        assert_eq!(t.strategy, Strategy::Linear);
        assert_eq!(t.dims.as_slice(), &[24]);
        assert_eq!(t.strides[0].as_slice(), &[1]);
    }

    #[test]
    fn agreeing_strided_layouts_go_direct() {
        // Both walk a padded row-major layout: fusion is blocked by the
        // padding but the orders agree, so no tiling.
        let s = [10isize, 1];
        let t = plan(&[4, 6], &[&s, &s], TraverseOptions::default());
        assert_eq!(t.strategy, Strategy::Direct);
        assert_eq!(t.dims.as_slice(), &[6, 4]);
        assert_eq!(t.strides[0].as_slice(), &[1, 10]);
    }

    #[test]
    fn conflicting_layouts_get_blocked() {
        let row = [300isize, 1];
        let col = [1isize, 300];
        let t = plan(&[300, 300], &[&row, &col], TraverseOptions::default());
        assert_eq!(t.strategy, Strategy::Blocked);
        assert_eq!(t.blocks.len(), 2);
        assert!(t.blocks.iter().zip(t.dims.iter()).any(|(b, d)| b < d));
    }

    #[test]
    fn high_rank_falls_back() {
        // Twelve pairwise-unfusable dimensions.
        let dims = [2usize; 12];
        let mut s = [0isize; 12];
        let mut acc = 1isize;
        for i in (0..12).rev() {
            s[i] = acc;
            acc *= 3; // padding defeats fusion
        }
        let refs: Vec<&[isize]> = vec![&s];
        let t = plan(&dims, &refs, TraverseOptions::default());
        assert_eq!(t.strategy, Strategy::Fallback);
        assert_eq!(t.dims.len(), 12);
    }

    #[test]
    fn strict_keeps_native_nesting() {
        let s = [1isize, 4]; // col-major data
        let t = plan(&[4, 6], &[&s], TraverseOptions { strict_traversal_order: true });
        assert_eq!(t.strategy, Strategy::Direct);
        // Row-major nesting regardless of the data's layout: last dim inner.
        assert_eq!(t.dims.as_slice(), &[6, 4]);
        assert_eq!(t.strides[0].as_slice(), &[4, 1]);
        assert_eq!(t.blocks.as_slice(), t.dims.as_slice());
    }

    #[test]
    fn traverse_visits_every_element_once() {
        let row = [4isize, 1];
        let col = [1isize, 4];
        let t = plan(&[4, 4], &[&row, &col], TraverseOptions::default());
        let mut seen = vec![0u32; 16];
        traverse(&t, &[0, 0], |offs, run, inner| {
            let mut o = offs[0];
            for _ in 0..run {
                seen[o as usize] += 1;
                o += inner[0];
            }
            Ok(())
        })
        .unwrap();
        assert!(seen.iter().all(|&c| c == 1));
    }
}

//! Cache tile sizing for blocked traversals.
//!
//! Given dimensions and per-array strides already in iteration order, this
//! module picks per-dimension tile lengths so that one tile's memory
//! footprint, summed over every participating buffer, stays within
//! [`BLOCK_MEMORY_SIZE`](crate::BLOCK_MEMORY_SIZE). The footprint estimate
//! counts cache lines: strides below one cache line extend a contiguous
//! region, larger strides multiply the number of disjoint line blocks.

use crate::order::stride_rank;
use crate::{Dims, BLOCK_MEMORY_SIZE, CACHE_LINE_SIZE};
use smallvec::SmallVec;

/// Tile lengths for dimensions in iteration order.
///
/// `strides_list` carries one stride vector per array, in the same iteration
/// order as `dims`; `elem_bytes` gives each array's element width. Wider
/// elements shrink the tile.
pub(crate) fn block_sizes(
    dims: &[usize],
    strides_list: &[&[isize]],
    elem_bytes: &[usize],
) -> Dims {
    let n = dims.len();
    if n == 0 {
        return Dims::new();
    }
    debug_assert_eq!(strides_list.len(), elem_bytes.len());

    let byte_strides: Vec<SmallVec<[isize; 8]>> = strides_list
        .iter()
        .zip(elem_bytes.iter())
        .map(|(strides, &w)| strides.iter().map(|&s| s * w as isize).collect())
        .collect();
    let ranks: Vec<Dims> = byte_strides.iter().map(|bs| stride_rank(bs)).collect();
    let costs = dim_costs(strides_list);

    let byte_refs: Vec<&[isize]> = byte_strides.iter().map(|s| s.as_slice()).collect();
    let rank_refs: Vec<&[usize]> = ranks.iter().map(|r| r.as_slice()).collect();

    let blocks = shrink_blocks(dims, &costs, &byte_refs, &rank_refs, BLOCK_MEMORY_SIZE);
    log::trace!("block sizes for dims {:?}: {:?}", dims, blocks);
    blocks
}

/// Per-dimension halving cost: twice the smallest stride magnitude across
/// arrays, or 1 where some array repeats elements (stride 0).
fn dim_costs(strides_list: &[&[isize]]) -> SmallVec<[isize; 8]> {
    let n = strides_list.first().map_or(0, |s| s.len());
    let mut costs: SmallVec<[isize; 8]> = SmallVec::from_elem(isize::MAX, n);
    for strides in strides_list {
        for (c, &s) in costs.iter_mut().zip(strides.iter()) {
            *c = (*c).min(s.abs());
        }
    }
    for c in &mut costs {
        *c = if *c == 0 { 1 } else { *c * 2 };
    }
    costs
}

fn shrink_blocks(
    dims: &[usize],
    costs: &[isize],
    byte_strides: &[&[isize]],
    ranks: &[&[usize]],
    budget: usize,
) -> Dims {
    let n = dims.len();
    if n == 0 {
        return Dims::new();
    }

    if memory_region(dims, byte_strides) <= budget {
        return Dims::from_slice(dims);
    }

    // When the leading (innermost) dimension has the smallest stride in
    // every array, keep it whole and shrink only the outer dimensions.
    let min_rank = ranks
        .iter()
        .filter_map(|r| r.iter().min().copied())
        .min()
        .unwrap_or(1);
    if ranks.iter().all(|r| !r.is_empty() && r[0] == min_rank) {
        let tail_strides: Vec<&[isize]> = byte_strides.iter().map(|s| &s[1..]).collect();
        let tail_ranks: Vec<&[usize]> = ranks.iter().map(|r| &r[1..]).collect();
        let tail = shrink_blocks(&dims[1..], &costs[1..], &tail_strides, &tail_ranks, budget);
        let mut out = Dims::with_capacity(n);
        out.push(dims[0]);
        out.extend(tail);
        return out;
    }

    // Every stride already exceeds the budget: nothing to gain, touch one
    // element per dimension step.
    let min_stride = byte_strides
        .iter()
        .filter_map(|s| s.iter().map(|x| x.unsigned_abs()).min())
        .min()
        .unwrap_or(0);
    if min_stride > budget {
        return Dims::from_elem(1, n);
    }

    let mut blocks = Dims::from_slice(dims);

    // Halve the most expensive dimension until within 2x of the budget,
    // then step down one at a time.
    while memory_region(&blocks, byte_strides) >= 2 * budget {
        match costliest_dim(&blocks, costs) {
            Some(i) => blocks[i] = (blocks[i] + 1) / 2,
            None => break,
        }
    }
    while memory_region(&blocks, byte_strides) > budget {
        match costliest_dim(&blocks, costs) {
            Some(i) => blocks[i] -= 1,
            None => break,
        }
    }

    blocks
}

/// Cache-line-granular footprint of one tile across all buffers.
fn memory_region(dims: &[usize], byte_strides: &[&[isize]]) -> usize {
    let mut region = 0usize;
    for strides in byte_strides {
        let mut contiguous_bytes = 0usize;
        let mut line_blocks = 1usize;
        for (&d, &s) in dims.iter().zip(strides.iter()) {
            let s = s.unsigned_abs();
            if s < CACHE_LINE_SIZE {
                contiguous_bytes += d.saturating_sub(1) * s;
            } else {
                line_blocks *= d;
            }
        }
        let lines = contiguous_bytes / CACHE_LINE_SIZE + 1;
        region += CACHE_LINE_SIZE * lines * line_blocks;
    }
    region
}

/// Last dimension maximizing `(block - 1) * cost`, skipping exhausted ones.
fn costliest_dim(blocks: &[usize], costs: &[isize]) -> Option<usize> {
    let mut best_score = 0isize;
    let mut best = None;
    for (i, (&b, &c)) in blocks.iter().zip(costs.iter()).enumerate() {
        if b <= 1 {
            continue;
        }
        let score = (b as isize - 1) * c;
        if score >= best_score {
            best_score = score;
            best = Some(i);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_region_contiguous() {
        // 100 f64 elements: 99 * 8 = 792 contiguous bytes -> 13 cache lines.
        let strides = [8isize];
        let refs: Vec<&[isize]> = vec![&strides];
        assert_eq!(memory_region(&[100], &refs), 832);
    }

    #[test]
    fn memory_region_scattered() {
        // Stride past the cache line: every step touches a fresh line block.
        let strides = [128isize];
        let refs: Vec<&[isize]> = vec![&strides];
        assert_eq!(memory_region(&[10], &refs), 640);
    }

    #[test]
    fn small_tile_kept_whole() {
        let strides = [1isize, 10];
        let refs: Vec<&[isize]> = vec![&strides];
        let blocks = block_sizes(&[10, 10], &refs, &[8]);
        assert_eq!(blocks.as_slice(), &[10, 10]);
    }

    #[test]
    fn large_transposed_pair_gets_tiled() {
        // Dest walks dense, src walks with stride 1000: the working set of a
        // full pass far exceeds the budget, so outer dims must shrink.
        let d = [1isize, 1000];
        let s = [1000isize, 1];
        let refs: Vec<&[isize]> = vec![&d, &s];
        let blocks = block_sizes(&[1000, 1000], &refs, &[8, 8]);
        assert!(blocks[0] >= 1 && blocks[0] <= 1000);
        assert!(blocks[1] >= 1 && blocks[1] < 1000);

        // The tile footprint respects the budget within the halving slack.
        let byte_d: Vec<isize> = d.iter().map(|x| x * 8).collect();
        let byte_s: Vec<isize> = s.iter().map(|x| x * 8).collect();
        let byte_refs: Vec<&[isize]> = vec![&byte_d, &byte_s];
        assert!(memory_region(&blocks, &byte_refs) <= 2 * BLOCK_MEMORY_SIZE);
    }

    #[test]
    fn wider_elements_shrink_tiles() {
        let d = [1isize, 4096];
        let s = [4096isize, 1];
        let refs: Vec<&[isize]> = vec![&d, &s];
        let narrow = block_sizes(&[4096, 4096], &refs, &[4, 4]);
        let wide = block_sizes(&[4096, 4096], &refs, &[16, 16]);
        let narrow_area: usize = narrow.iter().product();
        let wide_area: usize = wide.iter().product();
        assert!(wide_area <= narrow_area);
    }

    #[test]
    fn costliest_dim_prefers_later_ties() {
        assert_eq!(costliest_dim(&[10, 10], &[1, 1]), Some(1));
        assert_eq!(costliest_dim(&[10, 20, 5], &[1, 1, 2]), Some(1));
        assert_eq!(costliest_dim(&[1, 1], &[1, 1]), None);
    }

    #[test]
    fn giant_strides_fall_back_to_unit_tiles() {
        // Opposite stride orderings defeat the keep-first recursion, and
        // every stride exceeds the budget on its own.
        let a = [100_000isize, 50_000];
        let b = [50_000isize, 100_000];
        let refs: Vec<&[isize]> = vec![&a, &b];
        let blocks = block_sizes(&[50, 50], &refs, &[8, 8]);
        assert_eq!(blocks.as_slice(), &[1, 1]);
    }
}

//! End-to-end correctness of the traversal engine across layouts, ranks,
//! and dispatch strategies.

use approx::assert_relative_eq;
use ndstride::{
    copy_into, map_into, map_into_opts, normalize, normalize_mut, reduce, reduce_dims,
    reduce_dims_with, sum, zip_map2_into, zip_reduce2, MemoryOrder, StridedArray, StridedView,
    StridedViewMut, TraverseOptions,
};

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
fn scale_a_cube_in_place_of_a_flat_buffer() {
    let data: Vec<f64> = (1..=8).map(|x| x as f64).collect();
    let mut out = vec![0.0f64; 8];
    let src = StridedView::new(&data, &[2, 2, 2], &[4, 2, 1], 0).unwrap();
    let mut dst = StridedViewMut::new(&mut out, &[2, 2, 2], &[4, 2, 1], 0).unwrap();
    map_into(&mut dst, &src, |&x| x * 10.0).unwrap();
    let expect: Vec<f64> = (1..=8).map(|x| (x * 10) as f64).collect();
    assert_eq!(out, expect);
}

#[test]
fn map_then_fold() {
    let data: Vec<f64> = (1..=8).map(|x| x as f64).collect();
    let mut scaled = vec![0.0f64; 8];
    let src = StridedView::new(&data, &[2, 2, 2], &[4, 2, 1], 0).unwrap();
    let mut dst = StridedViewMut::new(&mut scaled, &[2, 2, 2], &[4, 2, 1], 0).unwrap();
    map_into(&mut dst, &src, |&x| x * 10.0).unwrap();
    let sv = normalize(&scaled).unwrap();
    let total = reduce(&sv, 0.0, |acc, x| acc + x).unwrap();
    assert_relative_eq!(total, 360.0);
}

#[test]
fn trailing_pair_reduction() {
    let a = iota(&[1, 3, 2, 2]);
    let out = reduce_dims(&a.view(), &[2, 3], 0.0, |acc, x| acc + x).unwrap();
    assert_eq!(out.dims(), &[1, 3]);
    assert_eq!(out.as_slice(), &[6.0, 22.0, 38.0]);
}

#[test]
fn every_element_visited_once_per_strategy() {
    // Shapes and layouts chosen to hit linear, direct, blocked, and scalar
    // dispatch. Counting visits through a fold must match the element count.
    let cases: Vec<(Vec<usize>, MemoryOrder)> = vec![
        (vec![], MemoryOrder::RowMajor),
        (vec![1], MemoryOrder::RowMajor),
        (vec![64], MemoryOrder::RowMajor),
        (vec![8, 8], MemoryOrder::ColMajor),
        (vec![3, 1, 5], MemoryOrder::RowMajor),
        (vec![2, 2, 2, 2, 2, 2, 2, 2, 2, 2], MemoryOrder::ColMajor),
    ];
    for (dims, order) in cases {
        let a = StridedArray::filled(&dims, order, 1u32);
        let count = reduce(&a.view(), 0usize, |n, _| n + 1).unwrap();
        assert_eq!(count, a.len(), "dims {:?}", dims);

        // Same through a permuted view when rank allows.
        if dims.len() >= 2 {
            let mut perm: Vec<usize> = (0..dims.len()).collect();
            perm.reverse();
            let t = a.view().permute(&perm).unwrap();
            let count = reduce(&t, 0usize, |n, _| n + 1).unwrap();
            assert_eq!(count, a.len());
        }
    }
}

#[test]
fn subscripts_match_values_in_both_orders() {
    for order in [MemoryOrder::RowMajor, MemoryOrder::ColMajor] {
        for rank in 0..=10usize {
            let dims: Vec<usize> = (0..rank).map(|i| 1 + (i % 3)).collect();
            let a = iota(&dims);
            let b = StridedArray::from_fn(&dims, order, |idx| a.view().get(idx));
            ndstride::for_each_indexed(&b.view(), |idx, &v| {
                assert_eq!(v, a.view().get(idx));
            })
            .unwrap();
        }
    }
}

#[test]
fn results_are_layout_independent() {
    // The same logical computation through four layout combinations.
    let src_rm = iota(&[17, 23]);
    let src_cm = StridedArray::from_fn(&[17, 23], MemoryOrder::ColMajor, |i| src_rm.get(i));
    for src in [&src_rm, &src_cm] {
        for dst_order in [MemoryOrder::RowMajor, MemoryOrder::ColMajor] {
            let mut dst = StridedArray::filled(&[17, 23], dst_order, 0.0f64);
            map_into(&mut dst.view_mut(), &src.view(), |&x| x + 1.0).unwrap();
            for i in 0..17 {
                for j in 0..23 {
                    assert_eq!(dst.get(&[i, j]), src_rm.get(&[i, j]) + 1.0);
                }
            }
        }
    }
}

#[test]
fn strict_order_matches_default_results() {
    // Conflicting layouts big enough to trigger tiling in the default path.
    let src = StridedArray::from_fn(&[120, 130], MemoryOrder::ColMajor, |i| {
        (i[0] * 130 + i[1]) as f64
    });
    let mut fast = StridedArray::filled(&[120, 130], MemoryOrder::RowMajor, 0.0f64);
    let mut strict = StridedArray::filled(&[120, 130], MemoryOrder::RowMajor, 0.0f64);
    map_into(&mut fast.view_mut(), &src.view(), |&x| x * 2.0).unwrap();
    map_into_opts(
        &mut strict.view_mut(),
        &src.view(),
        TraverseOptions {
            strict_traversal_order: true,
        },
        |&x| x * 2.0,
    )
    .unwrap();
    assert_eq!(fast.as_slice(), strict.as_slice());
}

#[test]
fn strict_order_visits_destination_sequentially() {
    let src = StridedArray::from_fn(&[6, 5], MemoryOrder::ColMajor, |i| (i[0] * 5 + i[1]) as u64);
    let mut dst = StridedArray::filled(&[6, 5], MemoryOrder::RowMajor, 0u64);
    let mut order_seen = Vec::new();
    let counter = std::cell::RefCell::new(&mut order_seen);
    map_into_opts(
        &mut dst.view_mut(),
        &src.view(),
        TraverseOptions {
            strict_traversal_order: true,
        },
        |&x| {
            counter.borrow_mut().push(x);
            x
        },
    )
    .unwrap();
    // Source values in the destination's row-major order.
    let expect: Vec<u64> = (0..30).collect();
    assert_eq!(order_seen, expect);
}

#[test]
fn reduction_flavors_agree() {
    let a = iota(&[4, 5, 6]);
    let folded = reduce_dims(&a.view(), &[1], 0.0, |acc, x| acc + x).unwrap();
    let with_lanes = reduce_dims_with(&a.view(), &[1], |lane| {
        sum(lane).unwrap_or(f64::NAN)
    })
    .unwrap();
    assert_eq!(folded.dims(), with_lanes.dims());
    for (&x, &y) in folded.as_slice().iter().zip(with_lanes.as_slice()) {
        assert_relative_eq!(x, y);
    }
    // And against the full fold of everything.
    let everything = sum(&a.view()).unwrap();
    let re_reduced = sum(&folded.view()).unwrap();
    assert_relative_eq!(everything, re_reduced);
}

#[test]
fn high_rank_views_use_the_fallback() {
    // Eleven dims with padding so nothing fuses; buffer strides step by 3.
    let rank = 11usize;
    let dims = vec![2usize; rank];
    let mut strides = vec![0isize; rank];
    let mut acc = 1isize;
    for i in (0..rank).rev() {
        strides[i] = acc;
        acc *= 3;
    }
    let n = 3usize.pow(rank as u32);
    let data: Vec<f64> = (0..n).map(|x| x as f64).collect();
    let src = StridedView::new(&data, &dims, &strides, 0).unwrap();
    let count = reduce(&src, 0usize, |n, _| n + 1).unwrap();
    assert_eq!(count, 1 << rank);

    let total = sum(&src).unwrap();
    let expect: f64 = (0..(1usize << rank))
        .map(|k| {
            let mut off = 0isize;
            for (i, s) in strides.iter().enumerate() {
                if k >> (rank - 1 - i) & 1 == 1 {
                    off += s;
                }
            }
            off as f64
        })
        .sum();
    assert_relative_eq!(total, expect);
}

#[test]
fn negative_stride_views_round_trip() {
    let src = iota(&[3, 4]);
    let rsrc = src.view().reverse_axis(0).unwrap().reverse_axis(1).unwrap();
    let mut dst = StridedArray::filled(&[3, 4], MemoryOrder::RowMajor, 0.0f64);
    copy_into(&mut dst.view_mut(), &rsrc).unwrap();
    for i in 0..3 {
        for j in 0..4 {
            assert_eq!(dst.get(&[i, j]), src.get(&[2 - i, 3 - j]));
        }
    }
}

#[test]
fn zip_ops_through_normalized_buffers() {
    let a: Vec<f64> = (0..10).map(|x| x as f64).collect();
    let b: Vec<f64> = (0..10).map(|x| (x * x) as f64).collect();
    let mut out = vec![0.0f64; 10];
    {
        let av = normalize(&a).unwrap();
        let bv = normalize(&b).unwrap();
        let mut ov = normalize_mut(&mut out).unwrap();
        zip_map2_into(&mut ov, &av, &bv, |x, y| y - x).unwrap();
    }
    for (i, &v) in out.iter().enumerate() {
        assert_eq!(v, (i * i - i) as f64);
    }

    let av = normalize(&a).unwrap();
    let bv = normalize(&b).unwrap();
    let dot = zip_reduce2(&av, &bv, 0.0, |acc, x, y| acc + x * y).unwrap();
    let expect: f64 = (0..10).map(|x| (x * x * x) as f64).sum();
    assert_relative_eq!(dot, expect);
}

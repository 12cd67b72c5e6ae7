//! Strided view and owned array types.
//!
//! [`StridedView`] and [`StridedViewMut`] are dynamic-rank, zero-copy views
//! over a linear buffer, described by dims, strides, an origin offset and a
//! declared memory order. [`StridedArray`] is the owned counterpart.
//!
//! Views are immutable values: transformations (`permute`, `reverse_axis`,
//! `slice_axis`, `transpose`) return fresh views, and reduction dispatch
//! builds fresh sub-views rather than rewriting descriptor fields in place.

use crate::index::{self, col_major_strides, reachable_range, row_major_strides};
use crate::{Dims, Result, StridedError, Strides};

/// Declared natural layout of a view.
///
/// Row-major means the last dimension varies fastest in memory; column-major
/// means the first does. The declared order selects the native traversal
/// order and the linear-index decomposition used by the generic fallback; it
/// does not have to match the strides (a transposed view keeps its parent's
/// declaration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryOrder {
    /// Last dimension fastest (C convention).
    #[default]
    RowMajor,
    /// First dimension fastest (Fortran convention).
    ColMajor,
}

/// Validate that every reachable buffer index lies in `[0, len)`.
fn validate_bounds(len: usize, dims: &[usize], strides: &[isize], offset: isize) -> Result<()> {
    if dims.len() != strides.len() {
        return Err(StridedError::StrideLengthMismatch);
    }
    if dims.iter().any(|&d| d == 0) {
        return Ok(());
    }
    let (min, max) = reachable_range(dims, strides, offset)?;
    if min < 0 || max as usize >= len {
        return Err(StridedError::OffsetOverflow);
    }
    Ok(())
}

/// An immutable dynamic-rank strided view over a borrowed buffer.
pub struct StridedView<'a, T> {
    data: &'a [T],
    dims: Dims,
    strides: Strides,
    offset: isize,
    order: MemoryOrder,
}

impl<T> Clone for StridedView<'_, T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data,
            dims: self.dims.clone(),
            strides: self.strides.clone(),
            offset: self.offset,
            order: self.order,
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for StridedView<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StridedView")
            .field("dims", &self.dims)
            .field("strides", &self.strides)
            .field("offset", &self.offset)
            .field("order", &self.order)
            .finish()
    }
}

impl<'a, T> StridedView<'a, T> {
    /// Create a view over `data`, inferring the declared order from the
    /// stride magnitudes (column-major strides declare `ColMajor`, everything
    /// else `RowMajor`).
    pub fn new(data: &'a [T], dims: &[usize], strides: &[isize], offset: isize) -> Result<Self> {
        let order = infer_order(dims, strides);
        Self::with_order(data, dims, strides, offset, order)
    }

    /// Create a view with an explicit declared memory order.
    pub fn with_order(
        data: &'a [T],
        dims: &[usize],
        strides: &[isize],
        offset: isize,
        order: MemoryOrder,
    ) -> Result<Self> {
        validate_bounds(data.len(), dims, strides, offset)?;
        Ok(Self {
            data,
            dims: Dims::from_slice(dims),
            strides: Strides::from_slice(strides),
            offset,
            order,
        })
    }

    /// Dimension sizes.
    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Per-dimension strides, in elements.
    #[inline]
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    /// Buffer index of the logical origin.
    #[inline]
    pub fn offset(&self) -> isize {
        self.offset
    }

    /// Declared memory order.
    #[inline]
    pub fn order(&self) -> MemoryOrder {
        self.order
    }

    /// Number of dimensions.
    #[inline]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Total number of logical elements (1 for rank 0).
    #[inline]
    pub fn len(&self) -> usize {
        index::total_len(&self.dims)
    }

    /// True if any dimension has size 0.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dims.contains(&0)
    }

    /// True if the reachable buffer indices form an unbroken range equal in
    /// size to the element count.
    pub fn is_contiguous(&self) -> bool {
        index::is_contiguous(&self.dims, &self.strides)
    }

    /// Pointer to the logical origin element. Wrapping, since an empty view
    /// may carry an offset outside the buffer and is never dereferenced.
    #[inline]
    pub(crate) fn ptr(&self) -> *const T {
        self.data.as_ptr().wrapping_offset(self.offset)
    }

    /// The underlying buffer.
    #[inline]
    pub fn data(&self) -> &'a [T] {
        self.data
    }

    /// A view with dimensions reordered by `perm` (`perm[i]` names the source
    /// dimension placed at position `i`).
    pub fn permute(&self, perm: &[usize]) -> Result<Self> {
        let (dims, strides) = permuted(&self.dims, &self.strides, perm)?;
        Ok(Self {
            data: self.data,
            dims,
            strides,
            offset: self.offset,
            order: self.order,
        })
    }

    /// A rank-2 view with its two dimensions swapped.
    pub fn transpose(&self) -> Result<Self> {
        if self.rank() != 2 {
            return Err(StridedError::RankMismatch(self.rank(), 2));
        }
        self.permute(&[1, 0])
    }

    /// A view traversing `axis` in reverse (negates that stride and moves the
    /// origin to the axis's last position).
    pub fn reverse_axis(&self, axis: usize) -> Result<Self> {
        let (offset, strides) = reversed(&self.dims, &self.strides, self.offset, axis)?;
        Ok(Self {
            data: self.data,
            dims: self.dims.clone(),
            strides,
            offset,
            order: self.order,
        })
    }

    /// A view restricted to `range` along `axis`.
    pub fn slice_axis(&self, axis: usize, range: std::ops::Range<usize>) -> Result<Self> {
        let (dims, offset) = sliced(&self.dims, &self.strides, self.offset, axis, range)?;
        Ok(Self {
            data: self.data,
            dims,
            strides: self.strides.clone(),
            offset,
            order: self.order,
        })
    }

    /// Sub-view keeping only the listed dimensions, at an extra origin
    /// offset. Used by reductions to materialize core and loop views.
    pub(crate) fn subview(&self, keep: &[usize], extra_offset: isize) -> Result<Self> {
        let mut dims = Dims::new();
        let mut strides = Strides::new();
        for &d in keep {
            if d >= self.rank() {
                return Err(StridedError::InvalidAxis {
                    axis: d,
                    rank: self.rank(),
                });
            }
            dims.push(self.dims[d]);
            strides.push(self.strides[d]);
        }
        let offset = self
            .offset
            .checked_add(extra_offset)
            .ok_or(StridedError::OffsetOverflow)?;
        Self::with_order(self.data, &dims, &strides, offset, self.order)
    }
}

impl<T: Copy> StridedView<'_, T> {
    /// Element at a subscript vector.
    ///
    /// # Panics
    /// Panics if `idx` has the wrong length or any subscript is out of range.
    pub fn get(&self, idx: &[usize]) -> T {
        assert_eq!(idx.len(), self.rank(), "subscript rank mismatch");
        for (i, (&k, &d)) in idx.iter().zip(self.dims.iter()).enumerate() {
            assert!(k < d, "subscript {k} out of range for dim {i} (size {d})");
        }
        let mut off = self.offset;
        for (&k, &s) in idx.iter().zip(self.strides.iter()) {
            off += k as isize * s;
        }
        // In range by the assertions above plus construction-time validation.
        self.data[off as usize]
    }
}

/// A mutable dynamic-rank strided view over a borrowed buffer.
pub struct StridedViewMut<'a, T> {
    data: &'a mut [T],
    dims: Dims,
    strides: Strides,
    offset: isize,
    order: MemoryOrder,
}

impl<T: std::fmt::Debug> std::fmt::Debug for StridedViewMut<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StridedViewMut")
            .field("dims", &self.dims)
            .field("strides", &self.strides)
            .field("offset", &self.offset)
            .field("order", &self.order)
            .finish()
    }
}

impl<'a, T> StridedViewMut<'a, T> {
    /// Create a mutable view, inferring the declared order from the strides.
    pub fn new(
        data: &'a mut [T],
        dims: &[usize],
        strides: &[isize],
        offset: isize,
    ) -> Result<Self> {
        let order = infer_order(dims, strides);
        Self::with_order(data, dims, strides, offset, order)
    }

    /// Create a mutable view with an explicit declared memory order.
    pub fn with_order(
        data: &'a mut [T],
        dims: &[usize],
        strides: &[isize],
        offset: isize,
        order: MemoryOrder,
    ) -> Result<Self> {
        validate_bounds(data.len(), dims, strides, offset)?;
        Ok(Self {
            data,
            dims: Dims::from_slice(dims),
            strides: Strides::from_slice(strides),
            offset,
            order,
        })
    }

    /// Dimension sizes.
    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Per-dimension strides, in elements.
    #[inline]
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    /// Buffer index of the logical origin.
    #[inline]
    pub fn offset(&self) -> isize {
        self.offset
    }

    /// Declared memory order.
    #[inline]
    pub fn order(&self) -> MemoryOrder {
        self.order
    }

    /// Number of dimensions.
    #[inline]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Total number of logical elements (1 for rank 0).
    #[inline]
    pub fn len(&self) -> usize {
        index::total_len(&self.dims)
    }

    /// True if any dimension has size 0.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dims.contains(&0)
    }

    /// Mutable pointer to the logical origin element. Wrapping, like
    /// [`StridedView::ptr`].
    #[inline]
    pub(crate) fn ptr_mut(&mut self) -> *mut T {
        self.data.as_mut_ptr().wrapping_offset(self.offset)
    }

    /// An immutable view of the same region.
    pub fn as_view(&self) -> StridedView<'_, T> {
        StridedView {
            data: self.data,
            dims: self.dims.clone(),
            strides: self.strides.clone(),
            offset: self.offset,
            order: self.order,
        }
    }

    /// A mutable view with dimensions reordered by `perm`.
    pub fn permute(self, perm: &[usize]) -> Result<Self> {
        let (dims, strides) = permuted(&self.dims, &self.strides, perm)?;
        Ok(Self {
            data: self.data,
            dims,
            strides,
            offset: self.offset,
            order: self.order,
        })
    }

    /// A mutable view traversing `axis` in reverse.
    pub fn reverse_axis(self, axis: usize) -> Result<Self> {
        let (offset, strides) = reversed(&self.dims, &self.strides, self.offset, axis)?;
        Ok(Self {
            data: self.data,
            dims: self.dims,
            strides,
            offset,
            order: self.order,
        })
    }
}

impl<T: Copy> StridedViewMut<'_, T> {
    /// Element at a subscript vector.
    ///
    /// # Panics
    /// Panics on rank mismatch or out-of-range subscripts.
    pub fn get(&self, idx: &[usize]) -> T {
        self.as_view().get(idx)
    }

    /// Store `value` at a subscript vector.
    ///
    /// # Panics
    /// Panics on rank mismatch or out-of-range subscripts.
    pub fn set(&mut self, idx: &[usize], value: T) {
        assert_eq!(idx.len(), self.rank(), "subscript rank mismatch");
        for (i, (&k, &d)) in idx.iter().zip(self.dims.iter()).enumerate() {
            assert!(k < d, "subscript {k} out of range for dim {i} (size {d})");
        }
        let mut off = self.offset;
        for (&k, &s) in idx.iter().zip(self.strides.iter()) {
            off += k as isize * s;
        }
        self.data[off as usize] = value;
    }
}

/// An owned strided multidimensional array.
///
/// Holds a dense buffer in the declared memory order with offset 0. Mostly a
/// carrier for reduction outputs and test fixtures; all traversal work
/// happens through its views.
#[derive(Debug, Clone)]
pub struct StridedArray<T> {
    data: Vec<T>,
    dims: Dims,
    strides: Strides,
    order: MemoryOrder,
}

impl<T> StridedArray<T> {
    /// An array of `value` clones with the given shape and layout.
    pub fn filled(dims: &[usize], order: MemoryOrder, value: T) -> Self
    where
        T: Clone,
    {
        let len = index::total_len(dims);
        Self {
            data: vec![value; len],
            dims: Dims::from_slice(dims),
            strides: dense_strides(dims, order),
            order,
        }
    }

    /// An array built by evaluating `f` at every subscript vector.
    pub fn from_fn(dims: &[usize], order: MemoryOrder, f: impl Fn(&[usize]) -> T) -> Self {
        let len = index::total_len(dims);
        let mut idx = Dims::from_elem(0, dims.len());
        let mut data = Vec::with_capacity(len);
        for k in 0..len {
            index::subscripts_at(k, dims, order, &mut idx);
            data.push(f(&idx));
        }
        Self {
            data,
            dims: Dims::from_slice(dims),
            strides: dense_strides(dims, order),
            order,
        }
    }

    /// Adopt an existing buffer with explicit layout metadata.
    pub fn from_parts(
        data: Vec<T>,
        dims: &[usize],
        strides: &[isize],
        order: MemoryOrder,
    ) -> Result<Self> {
        validate_bounds(data.len(), dims, strides, 0)?;
        Ok(Self {
            data,
            dims: Dims::from_slice(dims),
            strides: Strides::from_slice(strides),
            order,
        })
    }

    /// Dimension sizes.
    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Per-dimension strides, in elements.
    #[inline]
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    /// Declared memory order.
    #[inline]
    pub fn order(&self) -> MemoryOrder {
        self.order
    }

    /// Total number of logical elements.
    #[inline]
    pub fn len(&self) -> usize {
        index::total_len(&self.dims)
    }

    /// True if any dimension has size 0.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dims.contains(&0)
    }

    /// The backing buffer in memory order.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// The backing buffer in memory order, mutably.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Iterate the backing buffer in memory order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    /// An immutable view of the whole array.
    pub fn view(&self) -> StridedView<'_, T> {
        StridedView {
            data: &self.data,
            dims: self.dims.clone(),
            strides: self.strides.clone(),
            offset: 0,
            order: self.order,
        }
    }

    /// A mutable view of the whole array.
    pub fn view_mut(&mut self) -> StridedViewMut<'_, T> {
        StridedViewMut {
            data: &mut self.data,
            dims: self.dims.clone(),
            strides: self.strides.clone(),
            offset: 0,
            order: self.order,
        }
    }
}

impl<T: Copy> StridedArray<T> {
    /// Element at a subscript vector.
    ///
    /// # Panics
    /// Panics on rank mismatch or out-of-range subscripts.
    pub fn get(&self, idx: &[usize]) -> T {
        self.view().get(idx)
    }
}

/// Dense strides for a shape in the given order.
pub(crate) fn dense_strides(dims: &[usize], order: MemoryOrder) -> Strides {
    match order {
        MemoryOrder::RowMajor => row_major_strides(dims),
        MemoryOrder::ColMajor => col_major_strides(dims),
    }
}

/// Declared order inferred from stride magnitudes; ambiguous layouts default
/// to row-major.
fn infer_order(dims: &[usize], strides: &[isize]) -> MemoryOrder {
    match crate::order::element_order(dims, strides) {
        crate::order::ElementOrder::ColMajor => MemoryOrder::ColMajor,
        _ => MemoryOrder::RowMajor,
    }
}

fn permuted(dims: &[usize], strides: &[isize], perm: &[usize]) -> Result<(Dims, Strides)> {
    let rank = dims.len();
    if perm.len() != rank {
        return Err(StridedError::RankMismatch(perm.len(), rank));
    }
    let mut seen = Dims::from_elem(0, rank);
    for &p in perm {
        if p >= rank {
            return Err(StridedError::InvalidAxis { axis: p, rank });
        }
        if seen[p] != 0 {
            return Err(StridedError::DuplicateDimension { dim: p });
        }
        seen[p] = 1;
    }
    let dims_out = perm.iter().map(|&p| dims[p]).collect();
    let strides_out = perm.iter().map(|&p| strides[p]).collect();
    Ok((dims_out, strides_out))
}

fn reversed(
    dims: &[usize],
    strides: &[isize],
    offset: isize,
    axis: usize,
) -> Result<(isize, Strides)> {
    let rank = dims.len();
    if axis >= rank {
        return Err(StridedError::InvalidAxis { axis, rank });
    }
    let mut out = Strides::from_slice(strides);
    let span = strides[axis]
        .checked_mul(dims[axis].saturating_sub(1) as isize)
        .ok_or(StridedError::OffsetOverflow)?;
    let offset = offset.checked_add(span).ok_or(StridedError::OffsetOverflow)?;
    out[axis] = -strides[axis];
    Ok((offset, out))
}

fn sliced(
    dims: &[usize],
    strides: &[isize],
    offset: isize,
    axis: usize,
    range: std::ops::Range<usize>,
) -> Result<(Dims, isize)> {
    let rank = dims.len();
    if axis >= rank {
        return Err(StridedError::InvalidAxis { axis, rank });
    }
    if range.end > dims[axis] || range.start > range.end {
        return Err(StridedError::OffsetOverflow);
    }
    let mut out = Dims::from_slice(dims);
    out[axis] = range.end - range.start;
    let step = strides[axis]
        .checked_mul(range.start as isize)
        .ok_or(StridedError::OffsetOverflow)?;
    let offset = offset.checked_add(step).ok_or(StridedError::OffsetOverflow)?;
    Ok((out, offset))
}

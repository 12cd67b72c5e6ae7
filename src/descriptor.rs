//! Descriptor normalization.
//!
//! Anything that can describe its shape, layout and backing buffer can be
//! handed to the traversal entry points by normalizing it into a
//! [`StridedView`] first. Types without explicit strides are treated as
//! dense in their declared order.

use crate::index;
use crate::view::{MemoryOrder, StridedArray, StridedView, StridedViewMut};
use crate::{Dims, Result, Strides};
use smallvec::smallvec;

/// A read-only array description: shape, optional layout, and a buffer.
pub trait ArrayLike<T> {
    /// Dimension sizes.
    fn dims(&self) -> Dims;

    /// Explicit strides, or `None` for a dense layout in [`Self::order`].
    fn strides(&self) -> Option<Strides> {
        None
    }

    /// Declared memory order, used to derive dense strides and as the
    /// traversal hint.
    fn order(&self) -> MemoryOrder {
        MemoryOrder::RowMajor
    }

    /// Buffer index of the logical origin.
    fn offset(&self) -> isize {
        0
    }

    /// The backing buffer.
    fn data(&self) -> &[T];
}

/// An [`ArrayLike`] whose buffer can be written.
pub trait ArrayLikeMut<T>: ArrayLike<T> {
    /// The backing buffer, mutably.
    fn data_mut(&mut self) -> &mut [T];
}

/// Normalize any array description into a validated view.
pub fn normalize<T, A: ArrayLike<T> + ?Sized>(a: &A) -> Result<StridedView<'_, T>> {
    let dims = a.dims();
    let order = a.order();
    let strides = a
        .strides()
        .unwrap_or_else(|| dense_strides(&dims, order));
    StridedView::with_order(a.data(), &dims, &strides, a.offset(), order)
}

/// Normalize a mutable array description into a validated mutable view.
pub fn normalize_mut<T, A: ArrayLikeMut<T> + ?Sized>(a: &mut A) -> Result<StridedViewMut<'_, T>> {
    let dims = a.dims();
    let order = a.order();
    let strides = a
        .strides()
        .unwrap_or_else(|| dense_strides(&dims, order));
    let offset = a.offset();
    StridedViewMut::with_order(a.data_mut(), &dims, &strides, offset, order)
}

fn dense_strides(dims: &[usize], order: MemoryOrder) -> Strides {
    match order {
        MemoryOrder::RowMajor => index::row_major_strides(dims),
        MemoryOrder::ColMajor => index::col_major_strides(dims),
    }
}

impl<T> ArrayLike<T> for [T] {
    fn dims(&self) -> Dims {
        smallvec![self.len()]
    }

    fn data(&self) -> &[T] {
        self
    }
}

impl<T> ArrayLikeMut<T> for [T] {
    fn data_mut(&mut self) -> &mut [T] {
        self
    }
}

impl<T> ArrayLike<T> for Vec<T> {
    fn dims(&self) -> Dims {
        smallvec![self.len()]
    }

    fn data(&self) -> &[T] {
        self
    }
}

impl<T> ArrayLikeMut<T> for Vec<T> {
    fn data_mut(&mut self) -> &mut [T] {
        self
    }
}

impl<T> ArrayLike<T> for StridedArray<T> {
    fn dims(&self) -> Dims {
        Dims::from_slice(StridedArray::dims(self))
    }

    fn strides(&self) -> Option<Strides> {
        Some(Strides::from_slice(StridedArray::strides(self)))
    }

    fn order(&self) -> MemoryOrder {
        StridedArray::order(self)
    }

    fn data(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> ArrayLikeMut<T> for StridedArray<T> {
    fn data_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T> ArrayLike<T> for StridedView<'_, T> {
    fn dims(&self) -> Dims {
        Dims::from_slice(StridedView::dims(self))
    }

    fn strides(&self) -> Option<Strides> {
        Some(Strides::from_slice(StridedView::strides(self)))
    }

    fn order(&self) -> MemoryOrder {
        StridedView::order(self)
    }

    fn offset(&self) -> isize {
        StridedView::offset(self)
    }

    fn data(&self) -> &[T] {
        StridedView::data(self)
    }
}

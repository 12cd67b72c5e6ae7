//! Element codecs over non-`&[T]` storage.
//!
//! A [`Accessor`] translates between logical elements and a backing store
//! whose unit type differs from the element type: packed bits, interleaved
//! component pairs, raw byte buffers. Accessor views carry the same strided
//! metadata as ordinary views but address logical element slots, and the
//! traversal goes through safe indexed `get`/`set` calls instead of raw
//! pointers.

use crate::dispatch::{plan_traversal, traverse, TraverseOptions};
use crate::index::reachable_range;
use crate::map::ensure_same_shape;
use crate::view::MemoryOrder;
use crate::{Dims, Result, StridedError, Strides};
use num_complex::Complex64;

/// A codec between a storage slice and logical elements.
pub trait Accessor {
    /// Unit type of the backing buffer.
    type Store;
    /// Logical element type.
    type Elem;
    /// Bytes one logical element occupies, for cache tile sizing.
    const ELEM_BYTES: usize;

    /// Read the logical element at `index`.
    fn get(store: &[Self::Store], index: usize) -> Self::Elem;
    /// Write the logical element at `index`.
    fn set(store: &mut [Self::Store], index: usize, value: Self::Elem);
    /// Number of logical element slots `store` provides.
    fn capacity(store: &[Self::Store]) -> usize;
}

/// The identity codec: one storage unit per element.
pub struct Direct<T>(std::marker::PhantomData<T>);

impl<T: Copy> Accessor for Direct<T> {
    type Store = T;
    type Elem = T;
    const ELEM_BYTES: usize = std::mem::size_of::<T>();

    #[inline]
    fn get(store: &[T], index: usize) -> T {
        store[index]
    }
    #[inline]
    fn set(store: &mut [T], index: usize, value: T) {
        store[index] = value;
    }
    #[inline]
    fn capacity(store: &[T]) -> usize {
        store.len()
    }
}

/// Booleans packed eight to a byte, least significant bit first.
pub struct PackedBool;

impl Accessor for PackedBool {
    type Store = u8;
    type Elem = bool;
    const ELEM_BYTES: usize = 1;

    #[inline]
    fn get(store: &[u8], index: usize) -> bool {
        store[index / 8] >> (index % 8) & 1 == 1
    }
    #[inline]
    fn set(store: &mut [u8], index: usize, value: bool) {
        let mask = 1u8 << (index % 8);
        if value {
            store[index / 8] |= mask;
        } else {
            store[index / 8] &= !mask;
        }
    }
    #[inline]
    fn capacity(store: &[u8]) -> usize {
        store.len() * 8
    }
}

/// Complex numbers stored as interleaved `re, im` pairs of `f64`.
pub struct InterleavedComplexF64;

impl Accessor for InterleavedComplexF64 {
    type Store = f64;
    type Elem = Complex64;
    const ELEM_BYTES: usize = 2 * std::mem::size_of::<f64>();

    #[inline]
    fn get(store: &[f64], index: usize) -> Complex64 {
        let n = store.len() / 2 * 2;
        let pairs: &[[f64; 2]] = bytemuck::cast_slice(&store[..n]);
        let [re, im] = pairs[index];
        Complex64::new(re, im)
    }
    #[inline]
    fn set(store: &mut [f64], index: usize, value: Complex64) {
        let n = store.len() / 2 * 2;
        let pairs: &mut [[f64; 2]] = bytemuck::cast_slice_mut(&mut store[..n]);
        pairs[index] = [value.re, value.im];
    }
    #[inline]
    fn capacity(store: &[f64]) -> usize {
        store.len() / 2
    }
}

fn validate_slots(capacity: usize, dims: &[usize], strides: &[isize], offset: isize) -> Result<()> {
    if dims.len() != strides.len() {
        return Err(StridedError::StrideLengthMismatch);
    }
    if dims.iter().any(|&d| d == 0) {
        return Ok(());
    }
    let (min, max) = reachable_range(dims, strides, offset)?;
    if min < 0 || max as usize >= capacity {
        return Err(StridedError::OffsetOverflow);
    }
    Ok(())
}

/// A read-only strided view addressing logical slots of an accessor store.
pub struct AccessorView<'a, A: Accessor> {
    store: &'a [A::Store],
    dims: Dims,
    strides: Strides,
    offset: isize,
    order: MemoryOrder,
}

impl<'a, A: Accessor> AccessorView<'a, A> {
    pub fn new(
        store: &'a [A::Store],
        dims: &[usize],
        strides: &[isize],
        offset: isize,
        order: MemoryOrder,
    ) -> Result<Self> {
        validate_slots(A::capacity(store), dims, strides, offset)?;
        Ok(Self {
            store,
            dims: Dims::from_slice(dims),
            strides: Strides::from_slice(strides),
            offset,
            order,
        })
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn len(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decoded element at a subscript vector.
    ///
    /// # Panics
    /// Panics on rank mismatch or out-of-range subscripts.
    pub fn get(&self, idx: &[usize]) -> A::Elem {
        assert_eq!(idx.len(), self.rank(), "subscript rank mismatch");
        let mut slot = self.offset;
        for ((&k, &d), &s) in idx.iter().zip(self.dims.iter()).zip(self.strides.iter()) {
            assert!(k < d, "subscript {k} out of range (size {d})");
            slot += k as isize * s;
        }
        A::get(self.store, slot as usize)
    }
}

/// A mutable strided view addressing logical slots of an accessor store.
pub struct AccessorViewMut<'a, A: Accessor> {
    store: &'a mut [A::Store],
    dims: Dims,
    strides: Strides,
    offset: isize,
    order: MemoryOrder,
}

impl<'a, A: Accessor> AccessorViewMut<'a, A> {
    pub fn new(
        store: &'a mut [A::Store],
        dims: &[usize],
        strides: &[isize],
        offset: isize,
        order: MemoryOrder,
    ) -> Result<Self> {
        validate_slots(A::capacity(store), dims, strides, offset)?;
        Ok(Self {
            store,
            dims: Dims::from_slice(dims),
            strides: Strides::from_slice(strides),
            offset,
            order,
        })
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Decoded element at a subscript vector. Panics like
    /// [`AccessorView::get`].
    pub fn get(&self, idx: &[usize]) -> A::Elem {
        A::get(self.store, self.slot(idx))
    }

    /// Encode `value` into the slot at a subscript vector. Panics like
    /// [`AccessorView::get`].
    pub fn set(&mut self, idx: &[usize], value: A::Elem) {
        let slot = self.slot(idx);
        A::set(self.store, slot, value);
    }

    fn slot(&self, idx: &[usize]) -> usize {
        assert_eq!(idx.len(), self.rank(), "subscript rank mismatch");
        let mut slot = self.offset;
        for ((&k, &d), &s) in idx.iter().zip(self.dims.iter()).zip(self.strides.iter()) {
            assert!(k < d, "subscript {k} out of range (size {d})");
            slot += k as isize * s;
        }
        slot as usize
    }
}

/// `dest[i] = f(src[i])` through two codecs.
pub fn map_accessor_into<SA, SB, F>(
    dest: &mut AccessorViewMut<'_, SB>,
    src: &AccessorView<'_, SA>,
    f: F,
) -> Result<()>
where
    SA: Accessor,
    SB: Accessor,
    F: Fn(SA::Elem) -> SB::Elem,
{
    ensure_same_shape(&dest.dims, &src.dims)?;

    let dims = dest.dims.clone();
    let dst_strides = dest.strides.clone();
    let hint = dest.order;
    let strides_list = [&dst_strides[..], &src.strides[..]];
    let plan = plan_traversal(
        &dims,
        &strides_list,
        Some(0),
        &[SB::ELEM_BYTES, SA::ELEM_BYTES],
        hint,
        TraverseOptions::default(),
    );
    let dst_store = &mut *dest.store;
    traverse(&plan, &[dest.offset, src.offset], |offsets, len, strides| {
        let mut d = offsets[0];
        let mut s = offsets[1];
        for _ in 0..len {
            let v = f(SA::get(src.store, s as usize));
            SB::set(dst_store, d as usize, v);
            d += strides[0];
            s += strides[1];
        }
        Ok(())
    })
}

/// Fold every decoded element of `src` into `init`.
pub fn reduce_accessor<A, Acc, F>(src: &AccessorView<'_, A>, init: Acc, f: F) -> Result<Acc>
where
    A: Accessor,
    F: Fn(&Acc, A::Elem) -> Acc,
{
    let strides_list = [&src.strides[..]];
    let plan = plan_traversal(
        &src.dims,
        &strides_list,
        None,
        &[A::ELEM_BYTES],
        src.order,
        TraverseOptions::default(),
    );
    let mut acc = init;
    traverse(&plan, &[src.offset], |offsets, len, strides| {
        let mut s = offsets[0];
        for _ in 0..len {
            acc = f(&acc, A::get(src.store, s as usize));
            s += strides[0];
        }
        Ok(())
    })?;
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_bool_codec() {
        let mut bits = vec![0u8; 2];
        PackedBool::set(&mut bits, 3, true);
        PackedBool::set(&mut bits, 8, true);
        assert!(PackedBool::get(&bits, 3));
        assert!(PackedBool::get(&bits, 8));
        assert!(!PackedBool::get(&bits, 4));
        assert_eq!(bits, vec![0b1000, 0b1]);
        assert_eq!(PackedBool::capacity(&bits), 16);
    }

    #[test]
    fn interleaved_complex_codec() {
        let mut store = vec![0.0f64; 6];
        InterleavedComplexF64::set(&mut store, 1, Complex64::new(2.0, -3.0));
        assert_eq!(store, vec![0.0, 0.0, 2.0, -3.0, 0.0, 0.0]);
        assert_eq!(InterleavedComplexF64::get(&store, 1), Complex64::new(2.0, -3.0));
        assert_eq!(InterleavedComplexF64::capacity(&store), 3);
    }

    #[test]
    fn view_rejects_out_of_range_slots() {
        let bits = vec![0u8; 1]; // 8 slots
        assert!(AccessorView::<PackedBool>::new(
            &bits,
            &[3, 3],
            &[3, 1],
            0,
            MemoryOrder::RowMajor
        )
        .is_err());
        assert!(AccessorView::<PackedBool>::new(
            &bits,
            &[2, 4],
            &[4, 1],
            0,
            MemoryOrder::RowMajor
        )
        .is_ok());
    }

    #[test]
    fn unpack_bools_into_bytes() {
        // 12 bits, shape [3, 4], row-major slots.
        let mut bits = vec![0u8; 2];
        for i in 0..12 {
            PackedBool::set(&mut bits, i, i % 3 == 0);
        }
        let src =
            AccessorView::<PackedBool>::new(&bits, &[3, 4], &[4, 1], 0, MemoryOrder::RowMajor)
                .unwrap();
        let mut out = vec![0u8; 12];
        let mut dst = AccessorViewMut::<Direct<u8>>::new(
            &mut out,
            &[3, 4],
            &[4, 1],
            0,
            MemoryOrder::RowMajor,
        )
        .unwrap();
        map_accessor_into(&mut dst, &src, |b| b as u8).unwrap();
        for (i, &v) in out.iter().enumerate() {
            assert_eq!(v, (i % 3 == 0) as u8);
        }
    }

    #[test]
    fn transposed_complex_map() {
        // 2x3 complex matrix, map conj through a transposed source view.
        let store: Vec<f64> = (0..12).map(|x| x as f64).collect();
        let src = AccessorView::<InterleavedComplexF64>::new(
            &store,
            &[3, 2],
            &[1, 3], // transpose of a row-major [2, 3]
            0,
            MemoryOrder::ColMajor,
        )
        .unwrap();
        let mut out_store = vec![0.0f64; 12];
        let mut dst = AccessorViewMut::<InterleavedComplexF64>::new(
            &mut out_store,
            &[3, 2],
            &[2, 1],
            0,
            MemoryOrder::RowMajor,
        )
        .unwrap();
        map_accessor_into(&mut dst, &src, |z| z.conj()).unwrap();
        for i in 0..3 {
            for j in 0..2 {
                assert_eq!(dst.get(&[i, j]), src.get(&[i, j]).conj());
            }
        }
    }

    #[test]
    fn count_set_bits() {
        let mut bits = vec![0u8; 4];
        for i in [1usize, 5, 17, 30] {
            PackedBool::set(&mut bits, i, true);
        }
        let v = AccessorView::<PackedBool>::new(&bits, &[32], &[1], 0, MemoryOrder::RowMajor)
            .unwrap();
        let ones = reduce_accessor(&v, 0usize, |n, b| n + b as usize).unwrap();
        assert_eq!(ones, 4);
    }
}

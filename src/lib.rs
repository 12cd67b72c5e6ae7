//! Cache-aware traversal and dispatch engine for strided N-dimensional array views.
//!
//! This crate is the iteration core of an ndarray numeric library: given one or
//! more strided *views* (a linear buffer plus shape, strides, offset and
//! memory-order metadata), it applies an element-wise transform or a
//! dimensional reduction, visiting every logical element exactly once in an
//! order chosen to maximize memory locality.
//!
//! # Core types
//!
//! - [`StridedView`] / [`StridedViewMut`]: zero-copy dynamic-rank views over
//!   existing data
//! - [`StridedArray`]: an owned strided array, used for reduction outputs and
//!   fixtures
//! - [`Accessor`] and its codecs ([`Direct`], [`PackedBool`],
//!   [`InterleavedComplexF64`]): element indirection for representations that
//!   cannot be read by plain subscripting
//!
//! # Map operations
//!
//! - [`map_into`], [`map_indexed_into`]: element-wise transform into a
//!   destination view
//! - [`zip_map2_into`], [`zip_map3_into`], [`zip_map4_into`],
//!   [`zip_map_n_into`]: multi-source element-wise operations
//! - [`for_each_indexed`]: visit every element with its index vector
//! - [`copy_into`], [`fill`]: conveniences built on the same kernels
//!
//! # Reduce operations
//!
//! - [`reduce`], [`zip_reduce2`]: full fold to a scalar
//! - [`reduce_dims_into`] / [`reduce_dims`]: fold an arbitrary dimension
//!   subset, writing one output per kept position
//! - [`reduce_dims_with`], [`reduce_axis_with`]: hand a fresh sub-view over
//!   the reduced dimensions to an external reduction routine
//!
//! # Traversal strategy
//!
//! Every operation flows through the same decision procedure: shapes are
//! validated, size-1 dimensions are elided and jointly contiguous dimensions
//! fused; rank-0 and rank-1 cases short-circuit; well-behaved layouts (all
//! strides monotonic, element orders in agreement) take a direct nested loop
//! in native order; everything else gets a loop-interchanged, cache-blocked
//! traversal with tiles sized to [`BLOCK_MEMORY_SIZE`]; above
//! [`MAX_SPECIALIZED_RANK`] a generic fallback decomposes a linear index on
//! every step.
//!
//! Order-sensitive callbacks can opt out of all of this:
//! [`map_into_opts`] with [`TraverseOptions::strict_traversal_order`] visits
//! elements exactly in the destination's native order, with no interchange,
//! fusion or tiling. Reductions that need a fixed accumulation order can map
//! into a staging buffer under that option and fold the buffer linearly.
//!
//! # Example
//!
//! ```rust
//! use ndstride::{map_into, MemoryOrder, StridedArray};
//!
//! let src = StridedArray::from_fn(&[2, 3], MemoryOrder::RowMajor, |idx| {
//!     (idx[0] * 3 + idx[1]) as f64
//! });
//! let mut dst = StridedArray::filled(&[2, 3], MemoryOrder::RowMajor, 0.0);
//! map_into(&mut dst.view_mut(), &src.view(), |x| x * 2.0).unwrap();
//! assert_eq!(dst.get(&[1, 2]), 10.0);
//! ```

mod accessor;
mod block;
mod descriptor;
mod dispatch;
mod fuse;
mod index;
mod kernel;
mod map;
mod order;
mod reduce;
mod view;

pub use accessor::{
    map_accessor_into, reduce_accessor, Accessor, AccessorView, AccessorViewMut, Direct,
    InterleavedComplexF64, PackedBool,
};
pub use descriptor::{normalize, normalize_mut, ArrayLike, ArrayLikeMut};
pub use dispatch::TraverseOptions;
pub use index::{col_major_strides, linear_offset, reachable_range, row_major_strides};
pub use map::{
    copy_into, fill, for_each_indexed, map_indexed_into, map_into, map_into_opts, zip_map2_into,
    zip_map3_into, zip_map4_into, zip_map_n_into,
};
pub use order::{element_order, iteration_order, ElementOrder, IterationOrder};
pub use reduce::{
    dot, reduce, reduce_axis, reduce_axis_with, reduce_dims, reduce_dims_into, reduce_dims_with,
    sum, zip_reduce2,
};
pub use view::{MemoryOrder, StridedArray, StridedView, StridedViewMut};

use smallvec::SmallVec;

/// Dimension sizes of a view, inline up to rank 8.
pub type Dims = SmallVec<[usize; 8]>;

/// Per-dimension strides of a view, inline up to rank 8.
pub type Strides = SmallVec<[isize; 8]>;

/// Per-array buffer offsets carried through a traversal.
pub(crate) type Offsets = SmallVec<[isize; MAX_ARRAYS]>;

/// Target working-set size for one cache tile, summed over all buffers.
///
/// Blocked traversals split every dimension into tiles whose combined memory
/// footprint stays within this budget (typical L1 data cache size).
pub const BLOCK_MEMORY_SIZE: usize = 32 * 1024;

/// Cache line size in bytes, used by the memory-region estimate.
pub const CACHE_LINE_SIZE: usize = 64;

/// Highest rank served by the specialized (direct or blocked) kernels.
///
/// Views of higher rank are traversed by the generic fallback, which
/// decomposes a linear index into per-array offsets on every step.
pub const MAX_SPECIALIZED_RANK: usize = 10;

/// Maximum number of simultaneously traversed arrays (destination included).
pub const MAX_ARRAYS: usize = 10;

/// Errors raised by traversal and reduction operations.
///
/// All of these are detected eagerly, before any element is visited; a
/// traversal either runs to completion or does not begin.
#[derive(Debug, thiserror::Error)]
pub enum StridedError {
    /// Participating arrays disagree on rank.
    #[error("rank mismatch: {0} vs {1}")]
    RankMismatch(usize, usize),

    /// Participating arrays disagree on dimension sizes that must match.
    #[error("shape mismatch: {0:?} vs {1:?}")]
    ShapeMismatch(Vec<usize>, Vec<usize>),

    /// A dimension index is out of bounds for the view's rank.
    #[error("invalid axis {axis} for rank {rank}")]
    InvalidAxis { axis: usize, rank: usize },

    /// A reduction dimension list names the same dimension twice.
    #[error("duplicate dimension {dim} in reduction dims")]
    DuplicateDimension { dim: usize },

    /// A reduction dimension list selects more dimensions than the array has.
    #[error("selected {selected} dims but rank is {rank}")]
    TooManyDims { selected: usize, rank: usize },

    /// More arrays than a single traversal supports.
    #[error("too many arrays: {0} (limit {MAX_ARRAYS})")]
    TooManyArrays(usize),

    /// Stride list length does not match the dimension list length.
    #[error("stride and dims length mismatch")]
    StrideLengthMismatch,

    /// A view would reach outside its buffer, or offset arithmetic overflowed.
    #[error("offset out of bounds or overflow while computing buffer index")]
    OffsetOverflow,
}

/// Result type for strided operations.
pub type Result<T> = std::result::Result<T, StridedError>;

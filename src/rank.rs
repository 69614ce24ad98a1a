//! Constant-time rank indices over a packed bit vector.
//!
//! Both variants answer `rank(i)`, the number of pattern occurrences starting
//! strictly below bit `i` of the bound vector, in constant time via two-level
//! cumulative counting:
//!
//! - [`DenseRank`]: 512-bit superblocks split into 64-bit blocks, about 25%
//!   space overhead on top of the vector.
//! - [`SparseRank`]: 2048-bit superblocks split into 384-bit blocks, about
//!   6.25% overhead, paying up to five extra word counts per query.
//!
//! The two variants return bit-identical results on the same vector and
//! pattern. An index reflects the vector's bits at build time only; any later
//! mutation requires a full rebuild.
#![cfg(target_pointer_width = "64")]

pub mod dense;
pub mod sparse;

pub use dense::DenseRank;
pub use sparse::SparseRank;

//! # `sucbit`: Packed bit vectors with constant-time rank in Rust
//!
//! `sucbit` is a substrate for [succinct data structures](https://en.wikipedia.org/wiki/Succinct_data_structure):
//! a bit-addressable packed integer array together with constant-time rank
//! indices and the word-level pattern primitives they are built from.
//!
//! ## Data structures
//!
//! - [`PackedVector`]
//!   - Updatable vector of fixed-width integers (1 to 64 bits each) on a
//!     contiguous word buffer, with raw bit-field access, amortized-growth
//!     sequence edits, and optional memory accounting.
//! - [`DenseRank`]
//!   - Constant-time rank index with 512-bit superblocks; about 25% space
//!     overhead.
//! - [`SparseRank`]
//!   - Constant-time rank index with 2048-bit superblocks; about 6.25%
//!     overhead at a slightly higher per-query cost.
//!
//! Both rank variants count occurrences of any 1- or 2-bit pattern from
//! [`pattern`] (`0`, `1`, `00`, `01`, `10`, `11`), not just set bits. The
//! stateless helpers in [`select_support`] underlie block-based select
//! indices built on top of this crate.
//!
//! ## Limitation
//!
//! This library is designed to run on 64-bit machines.
#![deny(missing_docs)]

#[cfg(not(target_pointer_width = "64"))]
compile_error!("`target_pointer_width` must be 64");

pub mod broadword;
pub mod memory;
pub mod packed_vector;
pub mod pattern;
pub mod rank;
pub mod select_support;
pub mod serial;
pub mod utils;

pub use memory::MemTracker;
pub use packed_vector::PackedVector;
pub use rank::DenseRank;
pub use rank::SparseRank;
pub use serial::Serializable;

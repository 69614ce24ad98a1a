//! Rank index with 512-bit superblocks and 64-bit blocks.
#![cfg(target_pointer_width = "64")]

use std::io::{Read, Write};
use std::marker::PhantomData;

use anyhow::{anyhow, Result};

use crate::pattern::{self, One, Pattern};
use crate::PackedVector;
use crate::Serializable;

/// Constant-time rank index with 512-bit superblocks, trading about 25% space
/// overhead for the cheapest possible query.
///
/// Each superblock stores two words: the absolute occurrence count through the
/// previous superblock, and seven 9-bit counts relative to the superblock for
/// its 64-bit blocks (the first block's count is always 0 and omitted).
///
/// The index borrows the vector it was built from and reflects its bits at
/// build time only; after any mutation it must be rebuilt.
///
/// # Examples
///
/// ```
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use sucbit::pattern::One;
/// use sucbit::{DenseRank, PackedVector};
///
/// let bv = PackedVector::from_bits([true, false, true, true, false, true])?;
/// let rank = DenseRank::<One>::build(&bv);
///
/// assert_eq!(rank.rank(0), Some(0));
/// assert_eq!(rank.rank(3), Some(2));
/// assert_eq!(rank.rank(6), Some(4));
/// assert_eq!(rank.rank(7), None);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DenseRank<'a, P = One>
where
    P: Pattern,
{
    bv: &'a PackedVector,
    blocks: Vec<u64>,
    _pattern: PhantomData<P>,
}

/// Two words per 512-bit superblock, plus one trailing pair so queries at the
/// vector boundary stay in range.
const fn num_blocks(bits: usize) -> usize {
    ((((bits >> 6) + 1) >> 3) + 1) * 2
}

impl<'a, P> DenseRank<'a, P>
where
    P: Pattern,
{
    /// Builds the index for `bv` in a single forward pass.
    ///
    /// # Complexity
    ///
    /// Linear over the bits of `bv`.
    pub fn build(bv: &'a PackedVector) -> Self {
        let bits = bv.bit_len();
        let mut blocks = vec![0u64; num_blocks(bits)];
        if bits == 0 {
            return Self {
                bv,
                blocks,
                _pattern: PhantomData,
            };
        }
        let words = bv.words();
        let n_words = (bits >> 6) + 1;
        let mut carry = P::INIT_CARRY;
        let mut sum = pattern::count_in_word::<P>(words[0], &mut carry) as u64;
        let mut second = 0u64;
        let mut j = 0;
        for i in 1..n_words {
            if i % 8 == 0 {
                j += 2;
                blocks[j - 1] = second;
                blocks[j] = blocks[j - 2] + sum;
                second = 0;
                sum = 0;
            } else {
                second |= sum << (63 - 9 * (i % 8));
            }
            sum += pattern::count_in_word::<P>(words[i], &mut carry) as u64;
        }
        if n_words % 8 != 0 {
            second |= sum << (63 - 9 * (n_words % 8));
            blocks[j + 1] = second;
        } else {
            j += 2;
            blocks[j - 1] = second;
            blocks[j] = blocks[j - 2] + sum;
            blocks[j + 1] = 0;
        }
        Self {
            bv,
            blocks,
            _pattern: PhantomData,
        }
    }

    /// Returns the number of occurrences starting strictly below bit `idx`,
    /// or [`None`] if `self.bit_len() < idx`.
    ///
    /// Querying at `idx == self.bit_len()` is valid: an occurrence may start
    /// at the final bit and complete on the guaranteed zero padding.
    ///
    /// # Complexity
    ///
    /// Constant
    #[inline(always)]
    pub fn rank(&self, idx: usize) -> Option<usize> {
        let bits = self.bv.bit_len();
        if bits < idx {
            return None;
        }
        if bits == 0 {
            return Some(0);
        }
        // Occurrences are attributed to their start bit; shifting by the
        // pattern length maps starts onto completion markers.
        let j = idx + (P::LEN - 1);
        let p = (j >> 9) * 2;
        let mut r = (self.blocks[p]
            + ((self.blocks[p + 1] >> (63 - 9 * ((j & 0x1FF) >> 6))) & 0x1FF))
            as usize;
        if j & 0x3F != 0 {
            r += pattern::count_below::<P>(self.bv.words(), j);
        }
        Some(r)
    }

    /// Repoints the index at `bv` without rebuilding.
    ///
    /// Valid only if `bv` holds exactly the bits of the vector the index was
    /// built from; this is not verified.
    pub fn rebind<'b>(self, bv: &'b PackedVector) -> DenseRank<'b, P> {
        DenseRank {
            bv,
            blocks: self.blocks,
            _pattern: PhantomData,
        }
    }

    /// Gets the number of bits the bound vector holds.
    #[inline(always)]
    pub fn bit_len(&self) -> usize {
        self.bv.bit_len()
    }

    /// Serializes the index (without the bound vector) into the writer,
    /// returning the number of serialized bytes.
    pub fn serialize_into<W: Write>(&self, writer: W) -> Result<usize> {
        self.blocks.serialize_into(writer)
    }

    /// Deserializes an index from the reader and binds it to `bv`.
    ///
    /// # Errors
    ///
    /// An error is returned on I/O failure, or if the serialized index does
    /// not match the dimensions of `bv`.
    pub fn deserialize_from<R: Read>(reader: R, bv: &'a PackedVector) -> Result<Self> {
        let blocks = Vec::<u64>::deserialize_from(reader)?;
        if blocks.len() != num_blocks(bv.bit_len()) {
            return Err(anyhow!(
                "the serialized index has {} blocks, but the vector needs {}.",
                blocks.len(),
                num_blocks(bv.bit_len())
            ));
        }
        Ok(Self {
            bv,
            blocks,
            _pattern: PhantomData,
        })
    }

    /// Returns the number of bytes to serialize the index.
    pub fn size_in_bytes(&self) -> usize {
        self.blocks.size_in_bytes()
    }
}

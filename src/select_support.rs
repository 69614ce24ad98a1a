//! Stateless per-pattern helpers underlying block-based select indices.
//!
//! These primitives scan or probe a packed bit vector for pattern occurrences
//! without building any index; a select structure layers block sampling on
//! top of them. The carry rule at the vector start is the one of
//! [`crate::pattern`].
#![cfg(target_pointer_width = "64")]

use crate::broadword::{self, lo_mask};
use crate::pattern::{self, Pattern};
use crate::PackedVector;

pub use crate::pattern::count_in_word as occurrences_in_word;
pub use crate::pattern::count_in_word_masked as occurrences_in_word_masked;
pub use crate::pattern::position_of_kth as position_of_kth_in_word;

/// Counts all occurrences of `P` starting within `bv`, scanning the whole
/// vector word by word.
///
/// An occurrence may start at the final bit and complete on the guaranteed
/// zero padding.
///
/// # Complexity
///
/// Linear over the bits of `bv`.
///
/// # Examples
///
/// ```
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use sucbit::pattern::OneZero;
/// use sucbit::select_support::total_occurrences;
/// use sucbit::PackedVector;
///
/// // Bit stream 1 1 0 1 1 0, then the trailing 1 0 across the padding.
/// let bv = PackedVector::from_bits([true, true, false, true, true, false, true])?;
/// assert_eq!(total_occurrences::<OneZero>(&bv), 3);
/// # Ok(())
/// # }
/// ```
pub fn total_occurrences<P: Pattern>(bv: &PackedVector) -> usize {
    let bits = bv.bit_len();
    if bits == 0 {
        return 0;
    }
    let words = bv.words();
    // Markers sit one pattern-length above the occurrence start.
    let hi = bits + (P::LEN - 1);
    let mut carry = P::INIT_CARRY;
    let mut count = 0;
    for &w in &words[..hi / 64] {
        count += pattern::count_in_word::<P>(w, &mut carry);
    }
    let r = hi % 64;
    if r != 0 {
        count += broadword::popcount(P::mark(words[hi / 64], carry) & lo_mask(r));
    }
    count
}

/// Checks whether an occurrence of `P` starts exactly at bit `i`, or
/// [`None`] if `bv.bit_len() <= i`.
///
/// A 2-bit occurrence starting at the final bit completes on the guaranteed
/// zero padding.
///
/// # Complexity
///
/// Constant
///
/// # Examples
///
/// ```
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use sucbit::pattern::OneZero;
/// use sucbit::select_support::occurs_at;
/// use sucbit::PackedVector;
///
/// let bv = PackedVector::from_bits([true, true, false, true, true, false])?;
/// assert_eq!(occurs_at::<OneZero>(&bv, 0), Some(false));
/// assert_eq!(occurs_at::<OneZero>(&bv, 1), Some(true));
/// assert_eq!(occurs_at::<OneZero>(&bv, 4), Some(true));
/// assert_eq!(occurs_at::<OneZero>(&bv, 6), None);
/// # Ok(())
/// # }
/// ```
#[inline(always)]
pub fn occurs_at<P: Pattern>(bv: &PackedVector, i: usize) -> Option<bool> {
    if bv.bit_len() <= i {
        return None;
    }
    let words = bv.words();
    let m = i + (P::LEN - 1);
    let w = m / 64;
    let carry = if w == 0 {
        P::INIT_CARRY
    } else {
        words[w - 1] >> 63
    };
    Some((P::mark(words[w], carry) >> (m % 64)) & 1 == 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaChaRng;

    use crate::pattern::{One, OneOne, OneZero, Zero, ZeroOne, ZeroZero};

    fn total_naive<P: Pattern>(bv: &PackedVector) -> usize {
        (0..bv.bit_len())
            .filter(|&i| occurs_at::<P>(bv, i) == Some(true))
            .count()
    }

    #[test]
    fn test_occurs_at() {
        // Bit stream 1 1 0 1 1 0.
        let bv = PackedVector::from_bits([true, true, false, true, true, false]).unwrap();
        let starts = (0..6)
            .filter(|&i| occurs_at::<OneZero>(&bv, i).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(starts, vec![1, 4]);
        assert_eq!(occurs_at::<One>(&bv, 2), Some(false));
        assert_eq!(occurs_at::<Zero>(&bv, 2), Some(true));
    }

    #[test]
    fn test_occurs_at_final_bit_uses_padding() {
        let bv = PackedVector::from_bits([false, true]).unwrap();
        // The bit beyond the end reads 0.
        assert_eq!(occurs_at::<OneZero>(&bv, 1), Some(true));
        assert_eq!(occurs_at::<OneOne>(&bv, 1), Some(false));
        let bv = PackedVector::from_bits([true, false]).unwrap();
        assert_eq!(occurs_at::<ZeroZero>(&bv, 1), Some(true));
    }

    #[test]
    fn test_total_occurrences_empty() {
        let bv = PackedVector::new(1).unwrap();
        assert_eq!(total_occurrences::<ZeroZero>(&bv), 0);
    }

    #[test]
    fn test_total_occurrences_random() {
        let mut rng = ChaChaRng::seed_from_u64(77);
        for &len in &[1usize, 64, 65, 1000] {
            let bv =
                PackedVector::from_bits((0..len).map(|_| rng.gen_bool(0.5))).unwrap();
            assert_eq!(total_occurrences::<One>(&bv), total_naive::<One>(&bv));
            assert_eq!(total_occurrences::<Zero>(&bv), total_naive::<Zero>(&bv));
            assert_eq!(
                total_occurrences::<OneZero>(&bv),
                total_naive::<OneZero>(&bv)
            );
            assert_eq!(
                total_occurrences::<ZeroOne>(&bv),
                total_naive::<ZeroOne>(&bv)
            );
            assert_eq!(
                total_occurrences::<ZeroZero>(&bv),
                total_naive::<ZeroZero>(&bv)
            );
            assert_eq!(total_occurrences::<OneOne>(&bv), total_naive::<OneOne>(&bv));
        }
    }
}

//! Word-level counting kernel for 1- and 2-bit patterns.
//!
//! A pattern is a compile-time tag selecting which bit sequence the rank and
//! select machinery operates on. Each pattern derives a *marker word* from an
//! input word: one marker bit per occurrence completing at that bit position.
//! For 2-bit patterns the marker combines the word shifted by one with a carry
//! bit holding the previous word's final bit, so a stream of words can be
//! processed left to right with a single running carry.
//!
//! The carry standing in for the symbol before the vector's first bit is
//! chosen so that it can never complete an occurrence: a virtual `1` for the
//! patterns starting in `0` (`00`, `01`), a virtual `0` for those starting in
//! `1` (`10`, `11`).
#![cfg(target_pointer_width = "64")]

use crate::broadword;
use crate::broadword::{hi_mask, lo_mask};

/// A 1- or 2-bit pattern whose occurrences can be counted and located inside
/// 64-bit words.
///
/// This is a closed set: the six implementors [`One`], [`Zero`], [`OneZero`],
/// [`ZeroOne`], [`ZeroZero`], and [`OneOne`] cover every supported pattern.
pub trait Pattern: Copy + Default + 'static {
    /// Length of the pattern in bits (1 or 2).
    const LEN: usize;

    /// Carry value standing in for the bit just before the vector start.
    const INIT_CARRY: u64;

    /// Returns a word with one bit set per occurrence completing in `word`;
    /// `carry` is the final bit of the previous word (ignored for 1-bit
    /// patterns).
    fn mark(word: u64, carry: u64) -> u64;
}

/// The pattern `1`.
#[derive(Default, Clone, Copy, Debug)]
pub struct One;

/// The pattern `0`.
#[derive(Default, Clone, Copy, Debug)]
pub struct Zero;

/// The pattern `10`: a 1 immediately followed by a 0.
#[derive(Default, Clone, Copy, Debug)]
pub struct OneZero;

/// The pattern `01`: a 0 immediately followed by a 1.
#[derive(Default, Clone, Copy, Debug)]
pub struct ZeroOne;

/// The pattern `00`: two adjacent 0s.
#[derive(Default, Clone, Copy, Debug)]
pub struct ZeroZero;

/// The pattern `11`: two adjacent 1s.
#[derive(Default, Clone, Copy, Debug)]
pub struct OneOne;

impl Pattern for One {
    const LEN: usize = 1;
    const INIT_CARRY: u64 = 0;

    #[inline(always)]
    fn mark(word: u64, _carry: u64) -> u64 {
        word
    }
}

impl Pattern for Zero {
    const LEN: usize = 1;
    const INIT_CARRY: u64 = 0;

    #[inline(always)]
    fn mark(word: u64, _carry: u64) -> u64 {
        !word
    }
}

impl Pattern for OneZero {
    const LEN: usize = 2;
    const INIT_CARRY: u64 = 0;

    #[inline(always)]
    fn mark(word: u64, carry: u64) -> u64 {
        ((word << 1) | carry) & !word
    }
}

impl Pattern for ZeroOne {
    const LEN: usize = 2;
    const INIT_CARRY: u64 = 1;

    #[inline(always)]
    fn mark(word: u64, carry: u64) -> u64 {
        !((word << 1) | carry) & word
    }
}

impl Pattern for ZeroZero {
    const LEN: usize = 2;
    const INIT_CARRY: u64 = 1;

    #[inline(always)]
    fn mark(word: u64, carry: u64) -> u64 {
        !((word << 1) | carry | word)
    }
}

impl Pattern for OneOne {
    const LEN: usize = 2;
    const INIT_CARRY: u64 = 0;

    #[inline(always)]
    fn mark(word: u64, carry: u64) -> u64 {
        ((word << 1) | carry) & word
    }
}

/// Counts the occurrences of `P` completing in `word` and advances `carry` to
/// the word's final bit.
///
/// # Examples
///
/// ```
/// use sucbit::pattern::{count_in_word, OneZero};
///
/// // bits (low to high): 1 1 0 1 1 0 ...
/// let word = 0b011011u64;
/// let mut carry = 0;
/// assert_eq!(count_in_word::<OneZero>(word, &mut carry), 2);
/// assert_eq!(carry, 0);
/// ```
#[inline(always)]
pub fn count_in_word<P: Pattern>(word: u64, carry: &mut u64) -> usize {
    let m = P::mark(word, *carry);
    *carry = word >> 63;
    broadword::popcount(m)
}

/// Counts the occurrences of `P` completing at bit `offset` or above in
/// `word`; `carry` is the previous word's final bit.
#[inline(always)]
pub fn count_in_word_masked<P: Pattern>(word: u64, offset: usize, carry: u64) -> usize {
    debug_assert!(offset < 64);
    broadword::popcount(P::mark(word, carry) & hi_mask(offset))
}

/// Returns the zero-based bit position at which the `k`-th occurrence of `P`
/// completes in `word` (`k` starts at 1), or [`None`] if the word holds fewer
/// than `k` occurrences.
#[inline(always)]
pub fn position_of_kth<P: Pattern>(word: u64, k: usize, carry: u64) -> Option<usize> {
    if k == 0 {
        return None;
    }
    broadword::select_in_word(P::mark(word, carry), k - 1)
}

/// Counts the occurrences of `P` completing strictly below bit `idx` within
/// the word containing `idx`, deriving the carry from the preceding word.
///
/// `idx` must not be a multiple of 64 and `idx / 64` must be a valid index
/// into `words`.
#[inline(always)]
pub(crate) fn count_below<P: Pattern>(words: &[u64], idx: usize) -> usize {
    let (w, r) = (idx >> 6, idx & 63);
    debug_assert!(r != 0);
    debug_assert!(w < words.len());
    let carry = if w == 0 {
        P::INIT_CARRY
    } else {
        words[w - 1] >> 63
    };
    broadword::popcount(P::mark(words[w], carry) & lo_mask(r))
}

/// Counts the occurrences of `P` completing anywhere in word `w`, deriving
/// the carry from the preceding word.
#[inline(always)]
pub(crate) fn count_word_at<P: Pattern>(words: &[u64], w: usize) -> usize {
    debug_assert!(w < words.len());
    let carry = if w == 0 {
        P::INIT_CARRY
    } else {
        words[w - 1] >> 63
    };
    broadword::popcount(P::mark(words[w], carry))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Marker positions expected for the bit stream 1 1 0 1 1 0 (word 0b011011).
    #[test]
    fn test_marks_onezero() {
        let m = OneZero::mark(0b011011, OneZero::INIT_CARRY);
        assert_eq!(m & 0x7F, 0b100100);
    }

    #[test]
    fn test_marks_oneone() {
        let m = OneOne::mark(0b011011, OneOne::INIT_CARRY);
        assert_eq!(m & 0x3F, 0b010010);
    }

    #[test]
    fn test_marks_zeroone() {
        // Virtual 1 before the stream: the 1 at bit 0 does not complete `01`.
        let m = ZeroOne::mark(0b011011, ZeroOne::INIT_CARRY);
        assert_eq!(m & 0x3F, 0b001000);
    }

    #[test]
    fn test_marks_zerozero() {
        // Stream 0 0 1 0 0 1: `00` completes at bits 1 and 4 only.
        let m = ZeroZero::mark(0b100100, ZeroZero::INIT_CARRY);
        assert_eq!(m & 0x3F, 0b010010);
    }

    #[test]
    fn test_carry_chains_across_words() {
        // Word 0 ends in a 1, word 1 starts with a 0: one `10` occurrence
        // completes at bit 0 of word 1.
        let w0 = 1u64 << 63;
        let w1 = 0u64;
        let mut carry = OneZero::INIT_CARRY;
        assert_eq!(count_in_word::<OneZero>(w0, &mut carry), 0);
        assert_eq!(carry, 1);
        assert_eq!(count_in_word::<OneZero>(w1, &mut carry), 1);
        assert_eq!(carry, 0);
    }

    #[test]
    fn test_count_one_bit_patterns() {
        let mut carry = 0;
        assert_eq!(count_in_word::<One>(0b1011, &mut carry), 3);
        let mut carry = 0;
        assert_eq!(count_in_word::<Zero>(u64::MAX, &mut carry), 0);
        let mut carry = 0;
        assert_eq!(count_in_word::<Zero>(0, &mut carry), 64);
    }

    #[test]
    fn test_count_masked() {
        // Markers of `10` in 0b011011 sit at bits 2 and 5.
        assert_eq!(count_in_word_masked::<OneZero>(0b011011, 0, 0), 2);
        assert_eq!(count_in_word_masked::<OneZero>(0b011011, 3, 0), 1);
        assert_eq!(count_in_word_masked::<OneZero>(0b011011, 6, 0), 0);
    }

    #[test]
    fn test_position_of_kth() {
        assert_eq!(position_of_kth::<OneZero>(0b011011, 1, 0), Some(2));
        assert_eq!(position_of_kth::<OneZero>(0b011011, 2, 0), Some(5));
        assert_eq!(position_of_kth::<OneZero>(0b011011, 3, 0), None);
        assert_eq!(position_of_kth::<OneZero>(0b011011, 0, 0), None);
    }

    #[test]
    fn test_count_below_derives_carry() {
        let words = [1u64 << 63, 0u64];
        // Bit 64 is a `10` marker thanks to the carry.
        assert_eq!(count_below::<OneZero>(&words, 65), 1);
        assert_eq!(count_below::<OneZero>(&words, 63), 0);
        assert_eq!(count_word_at::<OneZero>(&words, 1), 1);
        assert_eq!(count_word_at::<OneZero>(&words, 0), 0);
    }

    #[test]
    fn test_virtual_symbol_never_completes() {
        // A word starting in 0 must not complete `00`/`01` at bit 0; one
        // starting in 1 must not complete `10`/`11`.
        assert_eq!(ZeroZero::mark(0, ZeroZero::INIT_CARRY) & 1, 0);
        assert_eq!(ZeroOne::mark(1, ZeroOne::INIT_CARRY) & 1, 0);
        assert_eq!(OneOne::mark(1, OneOne::INIT_CARRY) & 1, 0);
        assert_eq!(OneZero::mark(0, OneZero::INIT_CARRY) & 1, 0);
    }
}

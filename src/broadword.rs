//! Broadword primitives computing aggregates over a whole machine word at once.
#![cfg(target_pointer_width = "64")]

const ONES_STEP_4: u64 = 0x1111111111111111;
const ONES_STEP_8: u64 = 0x0101010101010101;
const MSBS_STEP_8: u64 = 0x80 * ONES_STEP_8;

/// Returns the number of bits set in `x`.
///
/// # Examples
///
/// ```
/// use sucbit::broadword::popcount;
///
/// assert_eq!(popcount(0b1011), 3);
/// assert_eq!(popcount(0), 0);
/// ```
#[inline(always)]
pub const fn popcount(x: u64) -> usize {
    x.count_ones() as usize
}

/// Returns the position of the least significant bit set, or [`None`] if `x == 0`.
///
/// # Examples
///
/// ```
/// use sucbit::broadword::lsb;
///
/// assert_eq!(lsb(0b1010), Some(1));
/// assert_eq!(lsb(0), None);
/// ```
#[inline(always)]
pub const fn lsb(x: u64) -> Option<usize> {
    if x != 0 {
        Some(x.trailing_zeros() as usize)
    } else {
        None
    }
}

/// Returns the position of the most significant bit set, or [`None`] if `x == 0`.
///
/// # Examples
///
/// ```
/// use sucbit::broadword::msb;
///
/// assert_eq!(msb(0b1010), Some(3));
/// assert_eq!(msb(0), None);
/// ```
#[inline(always)]
pub const fn msb(x: u64) -> Option<usize> {
    if x != 0 {
        Some(63 - x.leading_zeros() as usize)
    } else {
        None
    }
}

/// Searches the position of the `k`-th bit set in `x`, where `k` starts at zero,
/// or [`None`] if `x` contains no more than `k` set bits.
///
/// The search runs in constant time through sideways addition over byte lanes.
///
/// # Examples
///
/// ```
/// use sucbit::broadword::select_in_word;
///
/// assert_eq!(select_in_word(0b0110, 0), Some(1));
/// assert_eq!(select_in_word(0b0110, 1), Some(2));
/// assert_eq!(select_in_word(0b0110, 2), None);
/// ```
#[inline(always)]
pub fn select_in_word(x: u64, k: usize) -> Option<usize> {
    if popcount(x) <= k {
        return None;
    }

    // Cumulative popcounts of the eight bytes of x, one per byte lane.
    let mut byte_sums = x - ((x & (0xA * ONES_STEP_4)) >> 1);
    byte_sums = (byte_sums & (3 * ONES_STEP_4)) + ((byte_sums >> 2) & (3 * ONES_STEP_4));
    byte_sums = (byte_sums + (byte_sums >> 4)) & (0xF * ONES_STEP_8);
    byte_sums = byte_sums.wrapping_mul(ONES_STEP_8);

    // Index of the byte holding the k-th set bit.
    let k_step_8 = (k as u64) * ONES_STEP_8;
    let geq_k_step_8 = ((k_step_8 | MSBS_STEP_8) - byte_sums) & MSBS_STEP_8;
    let place = popcount(geq_k_step_8) * 8;

    let byte_rank = k as u64 - (((byte_sums << 8) >> place) & 0xFF);
    let mut byte = (x >> place) & 0xFF;
    let mut r = byte_rank;
    loop {
        let bit = byte.trailing_zeros() as usize;
        if r == 0 {
            return Some(place + bit);
        }
        byte &= byte - 1;
        r -= 1;
    }
}

/// Returns a word whose lowest `len` bits are set (`len <= 64`).
#[inline(always)]
pub(crate) const fn lo_mask(len: usize) -> u64 {
    debug_assert!(len <= 64);
    if len == 64 {
        u64::MAX
    } else {
        (1 << len) - 1
    }
}

/// Returns a word whose bits at positions `offset..64` are set.
#[inline(always)]
pub(crate) const fn hi_mask(offset: usize) -> u64 {
    !lo_mask(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select_naive(x: u64, k: usize) -> Option<usize> {
        let mut cnt = 0;
        for i in 0..64 {
            if (x >> i) & 1 == 1 {
                if cnt == k {
                    return Some(i);
                }
                cnt += 1;
            }
        }
        None
    }

    #[test]
    fn test_select_in_word_exhaustive_small() {
        for x in 0u64..=0xFFFF {
            for k in 0..=popcount(x) {
                assert_eq!(select_in_word(x, k), select_naive(x, k), "x={x:#b}, k={k}");
            }
        }
    }

    #[test]
    fn test_select_in_word_wide() {
        let samples = [
            u64::MAX,
            0x8000000000000001,
            0xAAAAAAAAAAAAAAAA,
            0x5555555555555555,
            0xDEADBEEFDEADBEEF,
            1 << 63,
        ];
        for &x in &samples {
            for k in 0..=popcount(x) {
                assert_eq!(select_in_word(x, k), select_naive(x, k), "x={x:#x}, k={k}");
            }
        }
    }

    #[test]
    fn test_masks() {
        assert_eq!(lo_mask(0), 0);
        assert_eq!(lo_mask(3), 0b111);
        assert_eq!(lo_mask(64), u64::MAX);
        assert_eq!(hi_mask(0), u64::MAX);
        assert_eq!(hi_mask(63), 1 << 63);
    }
}

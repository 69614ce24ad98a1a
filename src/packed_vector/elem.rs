//! Transient mutable handle on a single packed element.
#![cfg(target_pointer_width = "64")]

use anyhow::Result;

use crate::broadword::lo_mask;
use crate::PackedVector;

/// Mutable handle to one element of a [`PackedVector`], created by
/// [`PackedVector::at_mut()`].
///
/// The handle borrows the vector mutably for its whole lifetime, so it can
/// never observe a reallocated or resized buffer. Compound assignments wrap
/// around modulo `2^width`.
///
/// # Examples
///
/// ```
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use sucbit::PackedVector;
///
/// let mut pv = PackedVector::from_elem(6, 4, 3)?;
/// let mut e = pv.at_mut(2).unwrap();
/// assert_eq!(e.read(), 6);
/// e += 3; // wraps in 3 bits
/// assert_eq!(pv.get(2), Some(1));
/// # Ok(())
/// # }
/// ```
pub struct ElemMut<'a> {
    pv: &'a mut PackedVector,
    pos: usize,
}

impl<'a> ElemMut<'a> {
    /// `pos` must be in bounds; checked by the caller.
    pub(crate) fn new(pv: &'a mut PackedVector, pos: usize) -> Self {
        Self { pv, pos }
    }

    /// Reads the referenced element.
    #[inline(always)]
    pub fn read(&self) -> u64 {
        // pos is verified on construction.
        self.pv.get(self.pos).unwrap()
    }

    /// Overwrites the referenced element.
    ///
    /// # Errors
    ///
    /// An error is returned if `val` cannot be represented in the vector's
    /// width.
    #[inline(always)]
    pub fn write(&mut self, val: u64) -> Result<()> {
        self.pv.set(self.pos, val)
    }

    #[inline(always)]
    fn update(&mut self, f: impl FnOnce(u64) -> u64) {
        let width = self.pv.width();
        let masked = if width == 64 {
            f(self.read())
        } else {
            f(self.read()) & lo_mask(width)
        };
        // A masked value always fits.
        self.pv.set(self.pos, masked).unwrap();
    }
}

impl std::ops::AddAssign<u64> for ElemMut<'_> {
    fn add_assign(&mut self, rhs: u64) {
        self.update(|x| x.wrapping_add(rhs));
    }
}

impl std::ops::SubAssign<u64> for ElemMut<'_> {
    fn sub_assign(&mut self, rhs: u64) {
        self.update(|x| x.wrapping_sub(rhs));
    }
}

impl std::ops::BitAndAssign<u64> for ElemMut<'_> {
    fn bitand_assign(&mut self, rhs: u64) {
        self.update(|x| x & rhs);
    }
}

impl std::ops::BitOrAssign<u64> for ElemMut<'_> {
    fn bitor_assign(&mut self, rhs: u64) {
        self.update(|x| x | rhs);
    }
}

impl std::ops::BitXorAssign<u64> for ElemMut<'_> {
    fn bitxor_assign(&mut self, rhs: u64) {
        self.update(|x| x ^ rhs);
    }
}

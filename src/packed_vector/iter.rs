//! Iterator on packed vectors.
#![cfg(target_pointer_width = "64")]

use crate::PackedVector;

/// Iterator for enumerating elements, created by [`PackedVector::iter()`].
pub struct Iter<'a> {
    pv: &'a PackedVector,
    pos: usize,
}

impl<'a> Iter<'a> {
    /// Creates a new iterator.
    pub(crate) const fn new(pv: &'a PackedVector) -> Self {
        Self { pv, pos: 0 }
    }
}

impl Iterator for Iter<'_> {
    type Item = u64;

    #[inline(always)]
    fn next(&mut self) -> Option<Self::Item> {
        if self.pos < self.pv.len() {
            let x = self.pv.get(self.pos);
            self.pos += 1;
            x
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.pv.len(), Some(self.pv.len()))
    }
}

impl ExactSizeIterator for Iter<'_> {
    fn len(&self) -> usize {
        self.pv.len() - self.pos
    }
}

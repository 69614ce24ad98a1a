//! Updatable packed vector storing fixed-width integers on a bit-addressable
//! word buffer.
#![cfg(target_pointer_width = "64")]

pub mod elem;
pub mod iter;

use std::io::{Read, Write};

use anyhow::{anyhow, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_traits::ToPrimitive;

use crate::broadword::lo_mask;
use crate::memory::{self, MemTracker};
use crate::utils;
use crate::Serializable;

pub use elem::ElemMut;
pub use iter::Iter;

/// The number of bits in a machine word.
pub const WORD_LEN: usize = 64;

/// The largest element count expressible in the 56-bit header field.
const MAX_LEN: usize = (1usize << 56) - 1;

/// Capacity ladder anchor: the smallest non-empty allocation, in bits.
const INIT_CAPA_BITS: usize = 64;

#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
enum WidthMode {
    /// The width is part of the vector's identity and cannot be changed.
    Static,
    /// The width is a runtime choice and may be reinterpreted.
    #[default]
    Dynamic,
}

/// Closed set of access layouts. Fixed widths address native word fractions
/// directly; every other width routes through the straddling bit-field path.
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
enum Layout {
    Bit,
    Byte,
    HalfWord,
    Word,
    #[default]
    DoubleWord,
    Generic,
}

impl Layout {
    const fn for_width(width: usize) -> Self {
        match width {
            1 => Self::Bit,
            8 => Self::Byte,
            16 => Self::HalfWord,
            32 => Self::Word,
            64 => Self::DoubleWord,
            _ => Self::Generic,
        }
    }

    #[inline(always)]
    fn get(self, words: &[u64], pos: usize, width: usize) -> u64 {
        match self {
            Self::Bit => (words[pos >> 6] >> (pos & 63)) & 1,
            Self::Byte => (words[pos >> 3] >> ((pos & 7) * 8)) & 0xFF,
            Self::HalfWord => (words[pos >> 2] >> ((pos & 3) * 16)) & 0xFFFF,
            Self::Word => (words[pos >> 1] >> ((pos & 1) * 32)) & 0xFFFF_FFFF,
            Self::DoubleWord => words[pos],
            Self::Generic => read_bits(words, pos * width, width),
        }
    }

    #[inline(always)]
    fn set(self, words: &mut [u64], pos: usize, val: u64, width: usize) {
        match self {
            Self::Bit => {
                let (w, s) = (pos >> 6, pos & 63);
                words[w] = (words[w] & !(1 << s)) | (val << s);
            }
            Self::Byte => {
                let (w, s) = (pos >> 3, (pos & 7) * 8);
                words[w] = (words[w] & !(0xFF << s)) | (val << s);
            }
            Self::HalfWord => {
                let (w, s) = (pos >> 2, (pos & 3) * 16);
                words[w] = (words[w] & !(0xFFFF << s)) | (val << s);
            }
            Self::Word => {
                let (w, s) = (pos >> 1, (pos & 1) * 32);
                words[w] = (words[w] & !(0xFFFF_FFFF << s)) | (val << s);
            }
            Self::DoubleWord => words[pos] = val,
            Self::Generic => write_bits(words, pos * width, val, width),
        }
    }
}

/// Reads `len` bits starting at bit `pos`, possibly straddling two adjacent
/// words. No bounds checks beyond `debug_assert`.
#[inline(always)]
pub(crate) fn read_bits(words: &[u64], pos: usize, len: usize) -> u64 {
    debug_assert!(0 < len && len <= WORD_LEN);
    let (block, shift) = (pos / WORD_LEN, pos % WORD_LEN);
    debug_assert!(block < words.len());
    let mask = lo_mask(len);
    if shift + len <= WORD_LEN {
        (words[block] >> shift) & mask
    } else {
        (words[block] >> shift) | ((words[block + 1] << (WORD_LEN - shift)) & mask)
    }
}

/// Writes the lowest `len` bits of `bits` starting at bit `pos`, splitting at
/// the word boundary when needed. No bounds checks beyond `debug_assert`.
#[inline(always)]
pub(crate) fn write_bits(words: &mut [u64], pos: usize, bits: u64, len: usize) {
    debug_assert!(0 < len && len <= WORD_LEN);
    let mask = lo_mask(len);
    let bits = bits & mask;
    let (block, shift) = (pos / WORD_LEN, pos % WORD_LEN);
    debug_assert!(block < words.len());
    words[block] &= !(mask << shift);
    words[block] |= bits << shift;
    let stored = WORD_LEN - shift;
    if stored < len {
        words[block + 1] &= !(mask >> stored);
        words[block + 1] |= bits >> stored;
    }
}

/// Updatable packed vector storing fixed-width integers on a bit-addressable
/// word buffer.
///
/// Each element occupies `width` bits, `1 <= width <= 64`. The buffer always
/// keeps at least one zeroed word beyond the last stored bit, so derived rank
/// indices may safely read one position past the end.
///
/// # Memory usage
///
/// About $`n w`$ bits for $`n`$ elements of width $`w`$, plus the geometric
/// over-allocation of the growth ladder.
///
/// # Examples
///
/// ```
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use sucbit::PackedVector;
///
/// let mut pv = PackedVector::new(3)?;
/// pv.push(7)?;
/// pv.push(2)?;
///
/// assert_eq!(pv.len(), 2);
/// assert_eq!(pv.get(0), Some(7));
///
/// pv.set(0, 5)?;
/// assert_eq!(pv.get(0), Some(5));
/// # Ok(())
/// # }
/// ```
pub struct PackedVector {
    words: Vec<u64>,
    bit_len: usize,
    width: usize,
    layout: Layout,
    mode: WidthMode,
    tracker: MemTracker,
}

impl Default for PackedVector {
    fn default() -> Self {
        Self {
            words: Vec::new(),
            bit_len: 0,
            width: 64,
            layout: Layout::DoubleWord,
            mode: WidthMode::Dynamic,
            tracker: MemTracker::noop(),
        }
    }
}

impl PackedVector {
    /// Creates a new empty vector whose elements occupy `width` bits each.
    ///
    /// The width is runtime-chosen and may later be reinterpreted with
    /// [`Self::set_width()`].
    ///
    /// # Errors
    ///
    /// An error is returned if `width` is not in `1..=64`.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use sucbit::PackedVector;
    ///
    /// let pv = PackedVector::new(3)?;
    /// assert_eq!(pv.len(), 0);
    /// assert_eq!(pv.width(), 3);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(width: usize) -> Result<Self> {
        Self::check_width(width)?;
        let mut this = Self::default();
        this.width = width;
        this.layout = Layout::for_width(width);
        Ok(this)
    }

    /// Creates a new empty vector with a statically fixed `width`:
    /// [`Self::set_width()`] becomes a no-op and width-checked
    /// deserialization applies.
    ///
    /// # Errors
    ///
    /// An error is returned if `width` is not in `1..=64`.
    pub fn with_fixed_width(width: usize) -> Result<Self> {
        let mut this = Self::new(width)?;
        this.mode = WidthMode::Static;
        Ok(this)
    }

    /// Creates a new empty vector reserving space for at least `capa`
    /// elements of `width` bits.
    ///
    /// # Errors
    ///
    /// An error is returned if `width` is not in `1..=64`, or if the backing
    /// storage cannot be obtained.
    pub fn with_capacity(capa: usize, width: usize) -> Result<Self> {
        let mut this = Self::new(width)?;
        if capa != 0 {
            this.ensure_bit_capacity(capa * width)?;
        }
        Ok(this)
    }

    /// Creates a new vector storing `len` copies of `val` in `width` bits
    /// each.
    ///
    /// # Errors
    ///
    /// An error is returned if
    ///
    /// - `width` is not in `1..=64`,
    /// - `val` cannot be represented in `width` bits, or
    /// - the backing storage cannot be obtained (nothing is allocated then).
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use sucbit::PackedVector;
    ///
    /// let pv = PackedVector::from_elem(7, 2, 3)?;
    /// assert_eq!(pv.len(), 2);
    /// assert_eq!(pv.get(0), Some(7));
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_elem(val: u64, len: usize, width: usize) -> Result<Self> {
        let mut this = Self::new(width)?;
        this.check_fit(val)?;
        if len != 0 {
            this.ensure_bit_capacity(len * width)?;
        }
        this.bit_len = len * width;
        if val != 0 {
            for pos in 0..len {
                this.layout.set(&mut this.words, pos, val, width);
            }
        }
        Ok(this)
    }

    /// Creates a new vector from a slice of integers, fitting the width to
    /// the maximum value automatically.
    ///
    /// # Errors
    ///
    /// An error is returned if some value cannot be cast to `u64`, or if the
    /// backing storage cannot be obtained.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use sucbit::PackedVector;
    ///
    /// let pv = PackedVector::from_slice(&[5, 256, 0])?;
    /// assert_eq!(pv.len(), 3);
    /// assert_eq!(pv.width(), 9);
    /// assert_eq!(pv.get(1), Some(256));
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_slice<T>(vals: &[T]) -> Result<Self>
    where
        T: ToPrimitive,
    {
        let mut max_val = 0;
        for (i, x) in vals.iter().enumerate() {
            let x = x
                .to_u64()
                .ok_or_else(|| anyhow!("vals[{i}] must be castable into u64."))?;
            max_val = max_val.max(x);
        }
        let mut this = Self::with_capacity(vals.len(), utils::needed_bits(max_val))?;
        for x in vals {
            // Cast checked above.
            this.push(x.to_u64().unwrap())?;
        }
        Ok(this)
    }

    /// Creates a new width-1 vector from an input bit stream.
    ///
    /// # Errors
    ///
    /// An error is returned if the backing storage cannot be obtained.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use sucbit::PackedVector;
    ///
    /// let pv = PackedVector::from_bits([true, false, true])?;
    /// assert_eq!(pv.len(), 3);
    /// assert_eq!(pv.get_bit(0), Some(true));
    /// assert_eq!(pv.get_bit(1), Some(false));
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_bits<I>(bits: I) -> Result<Self>
    where
        I: IntoIterator<Item = bool>,
    {
        let mut this = Self::new(1)?;
        for b in bits {
            this.push(b as u64)?;
        }
        Ok(this)
    }

    /// Returns the `pos`-th element, or [`None`] if out of bounds.
    ///
    /// # Complexity
    ///
    /// Constant
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use sucbit::PackedVector;
    ///
    /// let pv = PackedVector::from_slice(&[5, 256, 0])?;
    /// assert_eq!(pv.get(0), Some(5));
    /// assert_eq!(pv.get(3), None);
    /// # Ok(())
    /// # }
    /// ```
    #[inline(always)]
    pub fn get(&self, pos: usize) -> Option<u64> {
        if pos < self.len() {
            Some(self.layout.get(&self.words, pos, self.width))
        } else {
            None
        }
    }

    /// Sets the `pos`-th element to `val`.
    ///
    /// # Errors
    ///
    /// An error is returned if `pos` is out of bounds or `val` cannot be
    /// represented in `self.width()` bits.
    #[inline(always)]
    pub fn set(&mut self, pos: usize, val: u64) -> Result<()> {
        if self.len() <= pos {
            return Err(anyhow!(
                "pos must be no greater than self.len()={}, but got {pos}.",
                self.len()
            ));
        }
        self.check_fit(val)?;
        self.layout.set(&mut self.words, pos, val, self.width);
        Ok(())
    }

    /// Returns the bit at position `pos` of the raw bit view, or [`None`] if
    /// `self.bit_len() <= pos`.
    #[inline(always)]
    pub fn get_bit(&self, pos: usize) -> Option<bool> {
        if pos < self.bit_len {
            Some((self.words[pos / WORD_LEN] >> (pos % WORD_LEN)) & 1 == 1)
        } else {
            None
        }
    }

    /// Updates the bit at position `pos` of the raw bit view.
    ///
    /// # Errors
    ///
    /// An error is returned if `self.bit_len() <= pos`.
    #[inline(always)]
    pub fn set_bit(&mut self, pos: usize, bit: bool) -> Result<()> {
        if self.bit_len <= pos {
            return Err(anyhow!(
                "pos must be no greater than self.bit_len()={}, but got {pos}.",
                self.bit_len
            ));
        }
        let word = pos / WORD_LEN;
        let shift = pos % WORD_LEN;
        self.words[word] &= !(1 << shift);
        self.words[word] |= (bit as u64) << shift;
        Ok(())
    }

    /// Returns the `len` bits starting at bit `pos`, or [`None`] if
    ///
    /// - `len` is greater than [`WORD_LEN`], or
    /// - `self.bit_len() < pos + len`.
    ///
    /// The field may straddle two adjacent words.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use sucbit::PackedVector;
    ///
    /// let pv = PackedVector::from_bits([true, false, true, false])?;
    /// assert_eq!(pv.get_bits(1, 2), Some(0b10));
    /// assert_eq!(pv.get_bits(2, 3), None);
    /// # Ok(())
    /// # }
    /// ```
    #[inline(always)]
    pub fn get_bits(&self, pos: usize, len: usize) -> Option<u64> {
        if WORD_LEN < len || self.bit_len < pos + len {
            return None;
        }
        if len == 0 {
            return Some(0);
        }
        Some(read_bits(&self.words, pos, len))
    }

    /// Updates the `len` bits starting at bit `pos` to the lowest `len` bits
    /// of `bits` (higher bits are truncated).
    ///
    /// # Errors
    ///
    /// An error is returned if `len` is greater than [`WORD_LEN`] or
    /// `self.bit_len() < pos + len`.
    #[inline(always)]
    pub fn set_bits(&mut self, pos: usize, bits: u64, len: usize) -> Result<()> {
        if WORD_LEN < len {
            return Err(anyhow!(
                "len must be no greater than {WORD_LEN}, but got {len}."
            ));
        }
        if self.bit_len < pos + len {
            return Err(anyhow!(
                "pos+len must be no greater than self.bit_len()={}, but got {}.",
                self.bit_len,
                pos + len
            ));
        }
        if len != 0 {
            write_bits(&mut self.words, pos, bits, len);
        }
        Ok(())
    }

    /// Pushes `val` at the end.
    ///
    /// # Errors
    ///
    /// An error is returned if `val` cannot be represented in `self.width()`
    /// bits, or if growth fails to obtain backing storage (the vector is left
    /// unchanged then).
    ///
    /// # Complexity
    ///
    /// Constant (amortized)
    #[inline(always)]
    pub fn push(&mut self, val: u64) -> Result<()> {
        self.check_fit(val)?;
        self.ensure_bit_capacity(self.bit_len + self.width)?;
        write_bits(&mut self.words, self.bit_len, val, self.width);
        self.bit_len += self.width;
        Ok(())
    }

    /// Removes the last element and returns it, or [`None`] if the vector is
    /// empty. The capacity is retained.
    pub fn pop(&mut self) -> Option<u64> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        let val = self.get(len - 1)?;
        let old = self.bit_len;
        self.bit_len -= self.width;
        self.clear_bits(self.bit_len, old);
        Some(val)
    }

    /// Inserts `val` at position `pos`, shifting all elements at positions
    /// `>= pos` one slot towards the end.
    ///
    /// # Errors
    ///
    /// An error is returned if `pos > self.len()`, `val` does not fit, or
    /// growth fails.
    ///
    /// # Complexity
    ///
    /// Linear in the number of elements moved.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use sucbit::PackedVector;
    ///
    /// let mut pv = PackedVector::from_slice(&[4u64, 5, 6])?;
    /// pv.insert(1, 7)?;
    /// assert_eq!(pv.iter().collect::<Vec<_>>(), vec![4, 7, 5, 6]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn insert(&mut self, pos: usize, val: u64) -> Result<()> {
        let len = self.len();
        if len < pos {
            return Err(anyhow!(
                "pos must be no greater than self.len()={len}, but got {pos}."
            ));
        }
        self.check_fit(val)?;
        self.ensure_bit_capacity(self.bit_len + self.width)?;
        for i in (pos..len).rev() {
            let x = self.layout.get(&self.words, i, self.width);
            self.layout.set(&mut self.words, i + 1, x, self.width);
        }
        self.layout.set(&mut self.words, pos, val, self.width);
        self.bit_len += self.width;
        Ok(())
    }

    /// Removes the element at position `pos` and returns it, shifting all
    /// later elements one slot towards the front. The capacity is retained.
    ///
    /// # Errors
    ///
    /// An error is returned if `pos >= self.len()`.
    ///
    /// # Complexity
    ///
    /// Linear in the number of elements moved.
    pub fn remove(&mut self, pos: usize) -> Result<u64> {
        let len = self.len();
        if len <= pos {
            return Err(anyhow!(
                "pos must be less than self.len()={len}, but got {pos}."
            ));
        }
        let val = self.layout.get(&self.words, pos, self.width);
        for i in pos..len - 1 {
            let x = self.layout.get(&self.words, i + 1, self.width);
            self.layout.set(&mut self.words, i, x, self.width);
        }
        let old = self.bit_len;
        self.bit_len -= self.width;
        self.clear_bits(self.bit_len, old);
        Ok(val)
    }

    /// Resizes the vector to `new_len` elements. New elements introduced by
    /// growth are set to `val`; shrinking reallocates the buffer to the exact
    /// needed size.
    ///
    /// Growth beyond the current capacity reallocates to the smallest
    /// capacity of the form `64 * 1.5^k` bits that fits.
    ///
    /// # Errors
    ///
    /// An error is returned if `val` does not fit in `self.width()` bits or
    /// reallocation fails (the vector is left unchanged then).
    pub fn resize(&mut self, new_len: usize, val: u64) -> Result<()> {
        let len = self.len();
        if new_len > len {
            self.check_fit(val)?;
            self.ensure_bit_capacity(new_len * self.width)?;
            self.bit_len = new_len * self.width;
            if val != 0 {
                for pos in len..new_len {
                    self.layout.set(&mut self.words, pos, val, self.width);
                }
            }
        } else if new_len < len {
            let old = self.bit_len;
            self.bit_len = new_len * self.width;
            self.clear_bits(self.bit_len, old);
            memory::reallocate(&mut self.words, (self.bit_len >> 6) + 1, &self.tracker)?;
        }
        Ok(())
    }

    /// Appends all integers of `vals` at the end.
    ///
    /// # Errors
    ///
    /// An error is returned if some value does not fit in `self.width()`
    /// bits, or if growth fails.
    pub fn extend<I>(&mut self, vals: I) -> Result<()>
    where
        I: IntoIterator<Item = u64>,
    {
        for x in vals {
            self.push(x)?;
        }
        Ok(())
    }

    /// Reinterprets the stored bits under a new element width, so that
    /// `self.len()` becomes `self.bit_len() / width`.
    ///
    /// Returns `Ok(false)` without effect when the vector was created with a
    /// statically fixed width.
    ///
    /// # Errors
    ///
    /// An error is returned if `width` is not in `1..=64`.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use sucbit::PackedVector;
    ///
    /// let mut pv = PackedVector::from_elem(0, 4, 16)?;
    /// assert!(pv.set_width(8)?);
    /// assert_eq!(pv.len(), 8);
    ///
    /// let mut fixed = PackedVector::with_fixed_width(16)?;
    /// assert!(!fixed.set_width(8)?);
    /// assert_eq!(fixed.width(), 16);
    /// # Ok(())
    /// # }
    /// ```
    pub fn set_width(&mut self, width: usize) -> Result<bool> {
        Self::check_width(width)?;
        if self.mode == WidthMode::Static {
            return Ok(false);
        }
        self.width = width;
        self.layout = Layout::for_width(width);
        Ok(true)
    }

    /// Returns a transient handle to the `pos`-th element supporting
    /// read-modify-write access, or [`None`] if out of bounds.
    ///
    /// The handle borrows the vector mutably, so it cannot outlive any
    /// reallocation.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use sucbit::PackedVector;
    ///
    /// let mut pv = PackedVector::from_slice(&[5u64, 6])?;
    /// let mut e = pv.at_mut(1).unwrap();
    /// e += 10;
    /// assert_eq!(pv.get(1), Some(16));
    /// # Ok(())
    /// # }
    /// ```
    pub fn at_mut(&mut self, pos: usize) -> Option<ElemMut<'_>> {
        if pos < self.len() {
            Some(ElemMut::new(self, pos))
        } else {
            None
        }
    }

    /// Creates an iterator for enumerating elements.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use sucbit::PackedVector;
    ///
    /// let pv = PackedVector::from_slice(&[5, 256, 0])?;
    /// let mut it = pv.iter();
    ///
    /// assert_eq!(it.next(), Some(5));
    /// assert_eq!(it.next(), Some(256));
    /// assert_eq!(it.next(), Some(0));
    /// assert_eq!(it.next(), None);
    /// # Ok(())
    /// # }
    /// ```
    pub const fn iter(&self) -> Iter {
        Iter::new(self)
    }

    /// Gets the number of elements.
    #[inline(always)]
    pub const fn len(&self) -> usize {
        self.bit_len / self.width
    }

    /// Checks if the vector is empty.
    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.bit_len == 0
    }

    /// Gets the number of stored bits.
    #[inline(always)]
    pub const fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Gets the number of bits per element.
    #[inline(always)]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Returns the total number of elements the vector can hold without
    /// reallocating.
    pub fn capacity(&self) -> usize {
        self.bit_capacity() / self.width
    }

    /// Returns the total number of bits the buffer can hold.
    #[inline(always)]
    pub fn bit_capacity(&self) -> usize {
        self.words.len() * WORD_LEN
    }

    /// Gets the slice of raw words, including the zeroed padding beyond
    /// [`Self::bit_len()`].
    #[inline(always)]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Gets the number of allocated words.
    #[inline(always)]
    pub fn num_words(&self) -> usize {
        self.words.len()
    }

    /// Replaces the memory-accounting context, moving the bytes already
    /// allocated from the old context to the new one.
    #[must_use]
    pub fn with_tracker(mut self, tracker: MemTracker) -> Self {
        let bytes = (self.words.len() * 8) as i64;
        self.tracker.record(-bytes);
        tracker.record(bytes);
        self.tracker = tracker;
        self
    }

    /// Returns the memory-accounting context in use.
    pub fn tracker(&self) -> &MemTracker {
        &self.tracker
    }

    /// Deserializes a vector and checks that the serialized width equals
    /// `width`, failing otherwise. The result has a statically fixed width.
    ///
    /// # Errors
    ///
    /// An error is returned on I/O failure, or if the serialized width
    /// disagrees with `width`.
    pub fn deserialize_with_width<R: Read>(reader: R, width: usize) -> Result<Self> {
        Self::check_width(width)?;
        let mut this = Self::deserialize_from(reader)?;
        if this.width != width {
            return Err(anyhow!(
                "serialized width={} must be equal to the fixed width={width}.",
                this.width
            ));
        }
        this.mode = WidthMode::Static;
        Ok(this)
    }

    fn check_width(width: usize) -> Result<()> {
        if !(1..=WORD_LEN).contains(&width) {
            return Err(anyhow!(
                "width must be in 1..={WORD_LEN}, but got {width}."
            ));
        }
        Ok(())
    }

    #[inline(always)]
    fn check_fit(&self, val: u64) -> Result<()> {
        if self.width != 64 && val >> self.width != 0 {
            return Err(anyhow!(
                "val must fit in self.width()={} bits, but got {val}.",
                self.width
            ));
        }
        Ok(())
    }

    /// Grows the buffer along the capacity ladder so that `min_bits` bits
    /// plus the trailing padding word are addressable. Never shrinks.
    fn ensure_bit_capacity(&mut self, min_bits: usize) -> Result<()> {
        let need = (min_bits >> 6) + 1;
        if self.words.len() >= need {
            return Ok(());
        }
        let mut cap = INIT_CAPA_BITS;
        while cap < min_bits {
            cap += cap / 2;
        }
        memory::reallocate(&mut self.words, (cap >> 6) + 1, &self.tracker)
    }

    /// Zeroes all bits in `[from, to)`.
    fn clear_bits(&mut self, from: usize, to: usize) {
        debug_assert!(from <= to);
        debug_assert!(to <= self.bit_capacity());
        let mut pos = from;
        while pos < to {
            let (w, s) = (pos / WORD_LEN, pos % WORD_LEN);
            let take = (WORD_LEN - s).min(to - pos);
            self.words[w] &= !(lo_mask(take) << s);
            pos += take;
        }
    }

    /// Re-zeroes the partial word straddling `bit_len`, restoring the
    /// padding invariant after word-wise mutation.
    fn clear_tail(&mut self) {
        let r = self.bit_len % WORD_LEN;
        if r != 0 {
            self.words[self.bit_len / WORD_LEN] &= lo_mask(r);
        }
    }
}

impl Clone for PackedVector {
    fn clone(&self) -> Self {
        // The fresh buffer is reported to the shared context so that the
        // aggregate stays balanced when either copy is dropped.
        self.tracker.record((self.words.len() * 8) as i64);
        Self {
            words: self.words.clone(),
            bit_len: self.bit_len,
            width: self.width,
            layout: self.layout,
            mode: self.mode,
            tracker: self.tracker.clone(),
        }
    }
}

impl Drop for PackedVector {
    fn drop(&mut self) {
        memory::release(&mut self.words, &self.tracker);
    }
}

impl PartialEq for PackedVector {
    /// Same-width vectors compare bit-identical over their bit length; vectors
    /// of differing widths compare as decoded element sequences (slow path).
    fn eq(&self, other: &Self) -> bool {
        if self.width == other.width {
            if self.bit_len != other.bit_len {
                return false;
            }
            let full = self.bit_len / WORD_LEN;
            if self.words[..full] != other.words[..full] {
                return false;
            }
            let r = self.bit_len % WORD_LEN;
            r == 0 || (self.words[full] & lo_mask(r)) == (other.words[full] & lo_mask(r))
        } else {
            self.len() == other.len() && self.iter().eq(other.iter())
        }
    }
}

impl Eq for PackedVector {}

impl std::ops::BitAndAssign<&PackedVector> for PackedVector {
    /// Combines the raw bit views word-wise.
    ///
    /// # Panics
    ///
    /// Panics unless both vectors have the same width and bit length.
    fn bitand_assign(&mut self, other: &PackedVector) {
        assert_eq!(self.width, other.width);
        assert_eq!(self.bit_len, other.bit_len);
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a &= *b;
        }
        self.clear_tail();
    }
}

impl std::ops::BitOrAssign<&PackedVector> for PackedVector {
    /// Combines the raw bit views word-wise.
    ///
    /// # Panics
    ///
    /// Panics unless both vectors have the same width and bit length.
    fn bitor_assign(&mut self, other: &PackedVector) {
        assert_eq!(self.width, other.width);
        assert_eq!(self.bit_len, other.bit_len);
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= *b;
        }
        self.clear_tail();
    }
}

impl std::ops::BitXorAssign<&PackedVector> for PackedVector {
    /// Combines the raw bit views word-wise.
    ///
    /// # Panics
    ///
    /// Panics unless both vectors have the same width and bit length.
    fn bitxor_assign(&mut self, other: &PackedVector) {
        assert_eq!(self.width, other.width);
        assert_eq!(self.bit_len, other.bit_len);
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a ^= *b;
        }
        self.clear_tail();
    }
}

impl PackedVector {
    /// Inverts every stored bit, keeping the padding beyond
    /// [`Self::bit_len()`] zero.
    pub fn flip(&mut self) {
        let n = utils::words_for(self.bit_len);
        for w in &mut self.words[..n] {
            *w = !*w;
        }
        self.clear_tail();
    }
}

impl std::fmt::Debug for PackedVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let elems = self.iter().collect::<Vec<_>>();
        f.debug_struct("PackedVector")
            .field("elems", &utils::MatrixView::new(&elems, 16))
            .field("len", &self.len())
            .field("width", &self.width)
            .finish()
    }
}

impl Serializable for PackedVector {
    /// Writes one header word `(width << 56) | element_count`, then
    /// `ceil(len * width / 64)` little-endian words.
    fn serialize_into<W: Write>(&self, mut writer: W) -> Result<usize> {
        let len = self.len();
        if MAX_LEN < len {
            return Err(anyhow!(
                "self.len() must be no greater than {MAX_LEN}, but got {len}."
            ));
        }
        let header = ((self.width as u64) << 56) | (len as u64);
        writer.write_u64::<LittleEndian>(header)?;
        let bits = len * self.width;
        let n_words = utils::words_for(bits);
        let r = bits % WORD_LEN;
        for (i, &w) in self.words[..n_words].iter().enumerate() {
            let w = if i + 1 == n_words && r != 0 {
                w & lo_mask(r)
            } else {
                w
            };
            writer.write_u64::<LittleEndian>(w)?;
        }
        Ok((1 + n_words) * 8)
    }

    fn deserialize_from<R: Read>(mut reader: R) -> Result<Self> {
        let header = reader.read_u64::<LittleEndian>()?;
        let width = (header >> 56) as usize;
        let len = (header & ((1 << 56) - 1)) as usize;
        Self::check_width(width)?;
        let mut this = Self::new(width)?;
        let bits = len * width;
        if bits != 0 {
            this.ensure_bit_capacity(bits)?;
        }
        for w in 0..utils::words_for(bits) {
            this.words[w] = reader.read_u64::<LittleEndian>()?;
        }
        this.bit_len = bits;
        this.clear_tail();
        Ok(this)
    }

    fn size_in_bytes(&self) -> usize {
        (1 + utils::words_for(self.len() * self.width)) * 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaChaRng;

    fn gen_random_vals(len: usize, width: usize, seed: u64) -> Vec<u64> {
        let mut rng = ChaChaRng::seed_from_u64(seed);
        (0..len)
            .map(|_| rng.gen::<u64>() & lo_mask(width))
            .collect()
    }

    #[test]
    fn test_new_invalid_width() {
        assert!(PackedVector::new(0).is_err());
        assert!(PackedVector::new(65).is_err());
    }

    #[test]
    fn test_push_get_set() {
        let mut pv = PackedVector::new(5).unwrap();
        for x in [3, 31, 0, 17] {
            pv.push(x).unwrap();
        }
        assert_eq!(pv.len(), 4);
        assert_eq!(pv.bit_len(), 20);
        assert_eq!(pv.get(1), Some(31));
        assert_eq!(pv.get(4), None);
        pv.set(2, 9).unwrap();
        assert_eq!(pv.get(2), Some(9));
        assert!(pv.set(4, 0).is_err());
        assert!(pv.push(32).is_err());
    }

    #[test]
    fn test_pop_keeps_capacity() {
        let mut pv = PackedVector::from_elem(7, 100, 9).unwrap();
        let capa = pv.capacity();
        for _ in 0..100 {
            assert_eq!(pv.pop(), Some(7));
        }
        assert_eq!(pv.pop(), None);
        assert!(pv.is_empty());
        assert_eq!(pv.capacity(), capa);
    }

    #[test]
    fn test_pop_rezeroes_vacated_bits() {
        let mut pv = PackedVector::from_elem(u64::MAX, 3, 64).unwrap();
        pv.pop().unwrap();
        assert_eq!(pv.words()[2], 0);
        assert_eq!(pv.get_bit(128), None);
    }

    #[test]
    fn test_insert_shifts_right() {
        // Width-3 vector of 5 elements, insert at position 2.
        let mut pv = PackedVector::from_slice(&[1u64, 2, 3, 4, 5]).unwrap();
        assert_eq!(pv.width(), 3);
        pv.insert(2, 7).unwrap();
        assert_eq!(pv.len(), 6);
        assert_eq!(pv.iter().collect::<Vec<_>>(), vec![1, 2, 7, 3, 4, 5]);
        assert!(pv.insert(7, 0).is_err());
    }

    #[test]
    fn test_insert_into_empty() {
        let mut pv = PackedVector::new(11).unwrap();
        pv.insert(0, 2047).unwrap();
        assert_eq!(pv.iter().collect::<Vec<_>>(), vec![2047]);
    }

    #[test]
    fn test_remove_shifts_left() {
        let mut pv = PackedVector::from_slice(&[1u64, 2, 3, 4, 5]).unwrap();
        assert_eq!(pv.remove(1).unwrap(), 2);
        assert_eq!(pv.iter().collect::<Vec<_>>(), vec![1, 3, 4, 5]);
        assert!(pv.remove(4).is_err());
    }

    #[test]
    fn test_resize() {
        let mut pv = PackedVector::from_elem(1, 3, 4).unwrap();
        pv.resize(6, 9).unwrap();
        assert_eq!(pv.iter().collect::<Vec<_>>(), vec![1, 1, 1, 9, 9, 9]);
        pv.resize(2, 0).unwrap();
        assert_eq!(pv.iter().collect::<Vec<_>>(), vec![1, 1]);
        // Shrinking reallocates to the exact needed size.
        assert_eq!(pv.num_words(), pv.bit_len() / WORD_LEN + 1);
    }

    #[test]
    fn test_set_width_reinterprets() {
        let mut pv = PackedVector::from_elem(0x1234, 2, 16).unwrap();
        assert!(pv.set_width(8).unwrap());
        assert_eq!(pv.len(), 4);
        assert_eq!(pv.iter().collect::<Vec<_>>(), vec![0x34, 0x12, 0x34, 0x12]);
        assert!(pv.set_width(32).unwrap());
        assert_eq!(pv.len(), 1);
        assert_eq!(pv.get(0), Some(0x1234_1234));
    }

    #[test]
    fn test_set_width_fixed_is_noop() {
        let mut pv = PackedVector::with_fixed_width(16).unwrap();
        pv.push(42).unwrap();
        assert!(!pv.set_width(8).unwrap());
        assert_eq!(pv.width(), 16);
        assert_eq!(pv.len(), 1);
    }

    #[test]
    fn test_bits_access() {
        let mut pv = PackedVector::from_elem(0, 3, 64).unwrap();
        pv.set_bits(60, 0xFF, 8).unwrap();
        assert_eq!(pv.get_bits(60, 8), Some(0xFF));
        assert_eq!(pv.words()[0] >> 60, 0xF);
        assert_eq!(pv.words()[1] & 0xF, 0xF);
        assert_eq!(pv.get_bits(190, 8), None);
        assert!(pv.set_bits(190, 0, 8).is_err());
        pv.set_bit(0, true).unwrap();
        assert_eq!(pv.get_bit(0), Some(true));
        assert_eq!(pv.get_bit(192), None);
    }

    #[test]
    fn test_flip_keeps_padding_zero() {
        let mut pv = PackedVector::from_bits(vec![false; 65]).unwrap();
        pv.flip();
        assert_eq!(pv.get_bit(64), Some(true));
        assert_eq!(pv.words()[1] >> 1, 0);
        for &w in &pv.words()[2..] {
            assert_eq!(w, 0);
        }
    }

    #[test]
    fn test_bitwise_ops() {
        let mut a = PackedVector::from_bits([true, true, false, false]).unwrap();
        let b = PackedVector::from_bits([true, false, true, false]).unwrap();
        a ^= &b;
        assert_eq!(a, PackedVector::from_bits([false, true, true, false]).unwrap());
        a |= &b;
        assert_eq!(a, PackedVector::from_bits([true, true, true, false]).unwrap());
        a &= &b;
        assert_eq!(a, b);
    }

    #[test]
    fn test_eq_across_widths() {
        let a = PackedVector::from_elem(3, 4, 8).unwrap();
        let mut b = PackedVector::from_elem(3, 4, 8).unwrap();
        assert_eq!(a, b);
        // Same decoded sequence under a different width still compares equal.
        let c = PackedVector::from_elem(0x0303, 2, 16).unwrap();
        assert_eq!(b, c);
        b.push(3).unwrap();
        assert_ne!(a, b);
        assert_ne!(b, c);
    }

    #[test]
    fn test_growth_is_geometric() {
        let mut pv = PackedVector::new(13).unwrap();
        let mut reallocs = 0;
        let mut capa = pv.capacity();
        for _ in 0..10_000 {
            pv.push(1).unwrap();
            if pv.capacity() != capa {
                reallocs += 1;
                capa = pv.capacity();
            }
        }
        // 10_000 * 13 bits fits well within 64 * 1.5^k for k < 30.
        assert!(reallocs < 30, "observed {reallocs} reallocations");
    }

    #[test]
    fn test_tracker_follows_lifecycle() {
        let tracker = MemTracker::new();
        let mut pv = PackedVector::new(32)
            .unwrap()
            .with_tracker(tracker.clone());
        assert_eq!(tracker.bytes(), 0);
        for x in 0..1000 {
            pv.push(x).unwrap();
        }
        let held = tracker.bytes();
        assert_eq!(held, (pv.num_words() * 8) as i64);
        let other = pv.clone();
        assert_eq!(tracker.bytes(), 2 * held);
        drop(other);
        assert_eq!(tracker.bytes(), held);
        pv.resize(10, 0).unwrap();
        assert_eq!(tracker.bytes(), (pv.num_words() * 8) as i64);
        drop(pv);
        assert_eq!(tracker.bytes(), 0);
    }

    #[test]
    fn test_serialize_header_layout() {
        let pv = PackedVector::from_elem(0, 3, 4).unwrap();
        let mut bytes = vec![];
        pv.serialize_into(&mut bytes).unwrap();
        let header = u64::from_le_bytes(bytes[..8].try_into().unwrap());
        assert_eq!(header, (4 << 56) | 3);
        assert_eq!(bytes.len(), 16);
    }

    #[test]
    fn test_store_load() {
        // Width-4 values [1, 15, 0, 7] survive a store/load cycle.
        let mut pv = PackedVector::from_elem(0, 4, 4).unwrap();
        for (i, x) in [1, 15, 0, 7].into_iter().enumerate() {
            pv.set(i, x).unwrap();
        }
        let mut bytes = vec![];
        let size = pv.serialize_into(&mut bytes).unwrap();
        let other = PackedVector::deserialize_from(&bytes[..]).unwrap();
        assert_eq!(pv, other);
        assert_eq!(other.get(1), Some(15));
        assert_eq!(size, bytes.len());
        assert_eq!(size, pv.size_in_bytes());
    }

    #[test]
    fn test_store_load_random() {
        for (i, &width) in [1usize, 7, 8, 16, 32, 64].iter().enumerate() {
            for (j, &len) in [0usize, 1, 63, 64, 65, 512, 513, 4096].iter().enumerate() {
                let vals = gen_random_vals(len, width, (i * 16 + j) as u64);
                let mut pv = PackedVector::with_capacity(len, width).unwrap();
                pv.extend(vals.iter().copied()).unwrap();
                let mut bytes = vec![];
                pv.serialize_into(&mut bytes).unwrap();
                let other = PackedVector::deserialize_from(&bytes[..]).unwrap();
                assert_eq!(other.width(), width);
                assert_eq!(other.iter().collect::<Vec<_>>(), vals);
            }
        }
    }

    #[test]
    fn test_deserialize_with_width() {
        let pv = PackedVector::from_elem(9, 5, 6).unwrap();
        let mut bytes = vec![];
        pv.serialize_into(&mut bytes).unwrap();
        let other = PackedVector::deserialize_with_width(&bytes[..], 6).unwrap();
        assert_eq!(pv, other);
        assert!(PackedVector::deserialize_with_width(&bytes[..], 7).is_err());
    }

    #[test]
    fn test_mutation_random() {
        let mut rng = ChaChaRng::seed_from_u64(13);
        let mut pv = PackedVector::new(11).unwrap();
        let mut shadow = vec![];
        for _ in 0..2000 {
            match rng.gen_range(0..4) {
                0 => {
                    let x = rng.gen::<u64>() & lo_mask(11);
                    pv.push(x).unwrap();
                    shadow.push(x);
                }
                1 => {
                    let pos = rng.gen_range(0..=shadow.len());
                    let x = rng.gen::<u64>() & lo_mask(11);
                    pv.insert(pos, x).unwrap();
                    shadow.insert(pos, x);
                }
                2 if !shadow.is_empty() => {
                    let pos = rng.gen_range(0..shadow.len());
                    assert_eq!(pv.remove(pos).unwrap(), shadow.remove(pos));
                }
                _ => {
                    assert_eq!(pv.pop(), shadow.pop());
                }
            }
            assert_eq!(pv.len(), shadow.len());
        }
        assert_eq!(pv.iter().collect::<Vec<_>>(), shadow);
        // Padding beyond bit_len stays zero through all of the above.
        let r = pv.bit_len() % WORD_LEN;
        if r != 0 {
            assert_eq!(pv.words()[pv.bit_len() / WORD_LEN] >> r, 0);
        }
        for &w in &pv.words()[utils::words_for(pv.bit_len())..] {
            assert_eq!(w, 0);
        }
    }
}

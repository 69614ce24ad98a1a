//! Small shared utilities.
#![cfg(target_pointer_width = "64")]

use crate::broadword;

/// Returns the number of bits needed to represent `x` at least.
///
/// # Examples
///
/// ```
/// use sucbit::utils::needed_bits;
///
/// assert_eq!(needed_bits(0), 1);
/// assert_eq!(needed_bits(1), 1);
/// assert_eq!(needed_bits(2), 2);
/// assert_eq!(needed_bits(255), 8);
/// assert_eq!(needed_bits(256), 9);
/// ```
pub fn needed_bits(x: u64) -> usize {
    broadword::msb(x).map_or(1, |n| n + 1)
}

/// Returns the number of 64-bit words needed to hold `n` bits.
///
/// # Examples
///
/// ```
/// use sucbit::utils::words_for;
///
/// assert_eq!(words_for(0), 0);
/// assert_eq!(words_for(64), 1);
/// assert_eq!(words_for(65), 2);
/// ```
pub const fn words_for(n: usize) -> usize {
    (n + 63) / 64
}

/// A debug view of a matrix-like structure for long arrays.
pub(crate) struct MatrixView<'a, T> {
    data: &'a [T],
    cols: usize,
}

impl<'a, T> MatrixView<'a, T> {
    /// Creates a new `MatrixView` from a slice and the number of columns.
    pub fn new(data: &'a [T], cols: usize) -> Self {
        assert!(cols > 0, "Number of columns must be greater than zero.");
        Self { data, cols }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for MatrixView<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if f.alternate() {
            writeln!(f, "[")?;
            for row in self.data.chunks(self.cols) {
                write!(f, "    ")?;
                for (i, item) in row.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item:?}")?;
                }
                writeln!(f, ",")?;
            }
            write!(f, "]")
        } else {
            write!(f, "[{} items]", self.data.len())
        }
    }
}

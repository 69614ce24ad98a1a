//! Word-buffer allocation seam and memory accounting.
#![cfg(target_pointer_width = "64")]

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};

/// Accounting context receiving the signed byte delta of every successful
/// buffer reallocation or release.
///
/// The default context is a no-op; [`MemTracker::new()`] creates a counting
/// context that can be cloned into any number of vectors, all reporting into
/// the same shared counter. Updates go through an atomic, so concurrent
/// reallocations of independent vectors cannot corrupt the aggregate.
///
/// # Examples
///
/// ```
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use sucbit::memory::MemTracker;
/// use sucbit::PackedVector;
///
/// let tracker = MemTracker::new();
/// let pv = PackedVector::from_elem(0, 100, 8)?.with_tracker(tracker.clone());
/// assert!(tracker.bytes() > 0);
/// drop(pv);
/// assert_eq!(tracker.bytes(), 0);
/// # Ok(())
/// # }
/// ```
#[derive(Default, Clone, Debug)]
pub struct MemTracker {
    cell: Option<Arc<AtomicI64>>,
}

impl MemTracker {
    /// Creates a counting context starting at zero bytes.
    pub fn new() -> Self {
        Self {
            cell: Some(Arc::new(AtomicI64::new(0))),
        }
    }

    /// Creates a no-op context discarding all reports (same as `default()`).
    pub const fn noop() -> Self {
        Self { cell: None }
    }

    /// Returns the net number of bytes currently accounted.
    pub fn bytes(&self) -> i64 {
        self.cell.as_ref().map_or(0, |c| c.load(Ordering::Relaxed))
    }

    #[inline]
    pub(crate) fn record(&self, delta: i64) {
        if let Some(c) = self.cell.as_ref() {
            c.fetch_add(delta, Ordering::Relaxed);
        }
    }
}

/// Allocates a zeroed buffer of `words` 64-bit words, reporting the byte
/// delta to `tracker`.
///
/// # Errors
///
/// An error is returned if the backing storage cannot be obtained; nothing is
/// allocated in that case.
pub(crate) fn allocate(words: usize, tracker: &MemTracker) -> Result<Vec<u64>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(words)
        .map_err(|_| anyhow!("cannot allocate {} bytes of backing storage.", words * 8))?;
    buf.resize(words, 0);
    tracker.record((words * 8) as i64);
    Ok(buf)
}

/// Reallocates `buf` to exactly `words` words, copying the common prefix and
/// zero-filling any growth.
///
/// Follows an allocate-then-swap discipline: on failure `buf` is left
/// unchanged and no delta is reported.
pub(crate) fn reallocate(buf: &mut Vec<u64>, words: usize, tracker: &MemTracker) -> Result<()> {
    if buf.len() == words {
        return Ok(());
    }
    let mut fresh = Vec::new();
    fresh
        .try_reserve_exact(words)
        .map_err(|_| anyhow!("cannot allocate {} bytes of backing storage.", words * 8))?;
    fresh.resize(words, 0);
    let keep = buf.len().min(words);
    fresh[..keep].copy_from_slice(&buf[..keep]);
    let delta = words as i64 - buf.len() as i64;
    *buf = fresh;
    tracker.record(delta * 8);
    Ok(())
}

/// Releases `buf`, reporting the negative byte delta to `tracker`.
pub(crate) fn release(buf: &mut Vec<u64>, tracker: &MemTracker) {
    if !buf.is_empty() {
        tracker.record(-((buf.len() * 8) as i64));
        *buf = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_balances() {
        let tracker = MemTracker::new();
        let mut buf = allocate(4, &tracker).unwrap();
        assert_eq!(tracker.bytes(), 32);
        reallocate(&mut buf, 10, &tracker).unwrap();
        assert_eq!(tracker.bytes(), 80);
        reallocate(&mut buf, 2, &tracker).unwrap();
        assert_eq!(tracker.bytes(), 16);
        release(&mut buf, &tracker);
        assert_eq!(tracker.bytes(), 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_reallocate_preserves_prefix() {
        let tracker = MemTracker::noop();
        let mut buf = allocate(2, &tracker).unwrap();
        buf[0] = 0xDEAD;
        buf[1] = 0xBEEF;
        reallocate(&mut buf, 4, &tracker).unwrap();
        assert_eq!(&buf[..2], &[0xDEAD, 0xBEEF]);
        assert_eq!(&buf[2..], &[0, 0]);
        reallocate(&mut buf, 1, &tracker).unwrap();
        assert_eq!(&buf[..], &[0xDEAD]);
    }

    #[test]
    fn test_noop_tracker_reports_zero() {
        let tracker = MemTracker::noop();
        let mut buf = allocate(8, &tracker).unwrap();
        assert_eq!(tracker.bytes(), 0);
        release(&mut buf, &tracker);
        assert_eq!(tracker.bytes(), 0);
    }
}

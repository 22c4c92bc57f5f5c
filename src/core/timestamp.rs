//! Modification stamps.
//!
//! Every parameter change, connection change or new node takes a fresh stamp
//! from a process-wide counter. A buffered output is reusable only if it was
//! produced at a stamp at least as recent as the pipeline stamp of its node.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_STAMP: AtomicU64 = AtomicU64::new(1);

/// A monotonically increasing modification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Stamp(u64);

impl Stamp {
    /// Take the next stamp from the process-wide counter.
    pub fn next() -> Self {
        Self(NEXT_STAMP.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw counter value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamps_increase() {
        let a = Stamp::next();
        let b = Stamp::next();
        assert!(b > a);
        assert!(a > Stamp::default());
    }
}

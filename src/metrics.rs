//! Per-problem DP counters
//!
//! Each DP problem accumulates into its own [`DpMetrics`] value with no
//! synchronization; worker threads fold their local counts into a
//! [`SharedMetrics`] under its mutex at teardown. There are no global mutable
//! counters.

use std::sync::Mutex;

/// Counters for the fill and backtrace stages of one or more DP problems.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DpMetrics {
    /// DPs tried.
    pub dp: u64,
    /// DPs that saturated the 8-bit range.
    pub dpsat: u64,
    /// DPs that produced nothing above the score floor.
    pub dpfail: u64,
    /// DPs that produced a reportable cell.
    pub dpsucc: u64,
    /// DP columns filled.
    pub col: u64,
    /// DP cells filled.
    pub cell: u64,
    /// Striped inner-loop iterations (vector rows processed).
    pub inner: u64,
    /// Lazy-F fix-up iterations (vector rows reprocessed).
    pub fixup: u64,
    /// Backtraces started.
    pub bt: u64,
    /// Backtraces that failed.
    pub btfail: u64,
    /// Backtraces that produced an alignment.
    pub btsucc: u64,
    /// Cells traversed across all backtraces.
    pub btcell: u64,
    /// Backtraces rejected for missing the core region.
    pub corerej: u64,
    /// Backtraces rejected for consuming an N.
    pub nrej: u64,
}

impl DpMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Fold `other` into `self`. Lock-free; used for per-thread accumulation.
    pub fn merge(&mut self, other: &DpMetrics) {
        self.dp += other.dp;
        self.dpsat += other.dpsat;
        self.dpfail += other.dpfail;
        self.dpsucc += other.dpsucc;
        self.col += other.col;
        self.cell += other.cell;
        self.inner += other.inner;
        self.fixup += other.fixup;
        self.bt += other.bt;
        self.btfail += other.btfail;
        self.btsucc += other.btsucc;
        self.btcell += other.btcell;
        self.corerej += other.corerej;
        self.nrej += other.nrej;
    }
}

/// Mutex-guarded metrics shared across worker threads.
#[derive(Debug, Default)]
pub struct SharedMetrics {
    inner: Mutex<DpMetrics>,
}

impl SharedMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a thread-local metrics value in, taking the lock.
    pub fn merge(&self, other: &DpMetrics) {
        self.inner.lock().unwrap().merge(other);
    }

    /// Read-only snapshot of the merged counters.
    pub fn snapshot(&self) -> DpMetrics {
        *self.inner.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_adds_fieldwise() {
        let mut a = DpMetrics { dp: 1, col: 10, btcell: 3, ..Default::default() };
        let b = DpMetrics { dp: 2, col: 5, nrej: 1, ..Default::default() };
        a.merge(&b);
        assert_eq!(a.dp, 3);
        assert_eq!(a.col, 15);
        assert_eq!(a.btcell, 3);
        assert_eq!(a.nrej, 1);
    }

    #[test]
    fn shared_merge_and_snapshot() {
        let shared = SharedMetrics::new();
        let local = DpMetrics { bt: 4, btsucc: 2, ..Default::default() };
        shared.merge(&local);
        shared.merge(&local);
        let snap = shared.snapshot();
        assert_eq!(snap.bt, 8);
        assert_eq!(snap.btsucc, 4);
    }
}

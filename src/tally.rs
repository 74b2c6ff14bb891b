//! Category-tagged memory accounting
//!
//! Every sizable allocation the DP subsystem makes is tagged with a
//! [`MemCategory`] and reported here, so a process can attribute its resident
//! memory to profile storage, matrix vectors or mask grids. The tally is an
//! opaque sink: it never influences allocation decisions.
//!
//! A single process-global instance guarded by one mutex is shared by all
//! threads; per-allocation traffic is coarse (buffers grow geometrically), so
//! contention is negligible.

use std::sync::Mutex;

use log::warn;

/// Allocation categories tracked by the tally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemCategory {
    /// Striped query-profile vectors.
    QueryProfile,
    /// DP matrix vector quartets.
    DpVectors,
    /// Per-cell backtrack mask words.
    DpMasks,
    /// Anything else.
    Misc,
}

const NUM_CATEGORIES: usize = 4;

impl MemCategory {
    fn index(self) -> usize {
        match self {
            MemCategory::QueryProfile => 0,
            MemCategory::DpVectors => 1,
            MemCategory::DpMasks => 2,
            MemCategory::Misc => 3,
        }
    }
}

/// Byte counts per category, guarded by a single mutex.
pub struct MemoryTally {
    bytes: Mutex<[u64; NUM_CATEGORIES]>,
}

static GLOBAL: MemoryTally = MemoryTally::new();

impl MemoryTally {
    pub const fn new() -> Self {
        MemoryTally {
            bytes: Mutex::new([0; NUM_CATEGORIES]),
        }
    }

    /// Record `n` freshly allocated bytes against `cat`.
    pub fn add(&self, cat: MemCategory, n: usize) {
        let mut bytes = self.bytes.lock().unwrap();
        bytes[cat.index()] += n as u64;
    }

    /// Record `n` freed bytes against `cat`.
    pub fn del(&self, cat: MemCategory, n: usize) {
        let mut bytes = self.bytes.lock().unwrap();
        let slot = &mut bytes[cat.index()];
        *slot = match slot.checked_sub(n as u64) {
            Some(v) => v,
            None => {
                warn!("memory tally underflow for {cat:?}: freed {n} with {slot} live");
                0
            }
        };
    }

    /// Live byte count for one category.
    pub fn live(&self, cat: MemCategory) -> u64 {
        self.bytes.lock().unwrap()[cat.index()]
    }

    /// Snapshot of all categories, indexed as `[profile, vectors, masks, misc]`.
    pub fn snapshot(&self) -> [u64; NUM_CATEGORIES] {
        *self.bytes.lock().unwrap()
    }
}

impl Default for MemoryTally {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-global tally that buffer types report into.
pub fn global() -> &'static MemoryTally {
    &GLOBAL
}

//! Growable, 16-byte-aligned SIMD vector storage
//!
//! [`VecBuf`] owns a contiguous run of [`V128`] cells. The element type's
//! `repr(align(16))` guarantees the base pointer is 16-byte aligned, which the
//! striped inner loops rely on for aligned loads and stores. Two growth
//! policies are exposed: `resize` doubles capacity geometrically (the hot
//! preallocation path amortizes to O(1) per element) and `resize_exact`
//! allocates exactly what is asked for. `clear` keeps capacity so a buffer
//! can be reused across DP problems without reallocating.
//!
//! Every capacity change is reported to the global memory tally under the
//! buffer's category.
//!
//! Growth may relocate storage: raw pointers obtained from `as_ptr` /
//! `as_mut_ptr` are invalidated by any resizing call and must be refetched.

use crate::simd::V128;
use crate::tally::{self, MemCategory};

/// Length-tracking owner of 16-byte-aligned `V128` cells.
#[derive(Debug)]
pub struct VecBuf {
    cells: Vec<V128>,
    /// Capacity currently reported to the tally, in elements.
    accounted: usize,
    cat: MemCategory,
}

impl VecBuf {
    pub fn new(cat: MemCategory) -> Self {
        VecBuf { cells: Vec::new(), accounted: 0, cat }
    }

    /// Number of live elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Number of elements allocated.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.cells.capacity()
    }

    /// Ensure capacity for exactly `n` elements total, allocating no more
    /// than asked (plus allocator rounding).
    pub fn reserve_exact(&mut self, n: usize) {
        if n > self.cells.capacity() {
            self.cells.reserve_exact(n - self.cells.len());
            self.retally();
        }
    }

    /// Set the length to `n`, zero-filling any new elements. Grows capacity
    /// geometrically (doubling) when needed.
    pub fn resize(&mut self, n: usize) {
        if n > self.cells.capacity() {
            let mut newcap = (self.cells.capacity() * 2).max(1);
            while newcap < n {
                newcap *= 2;
            }
            self.cells.reserve_exact(newcap - self.cells.len());
            self.retally();
        }
        self.cells.resize(n, V128::ZERO);
    }

    /// Set the length to `n`, zero-filling any new elements, allocating
    /// exactly `n` when growth is needed.
    pub fn resize_exact(&mut self, n: usize) {
        self.reserve_exact(n);
        self.cells.resize(n, V128::ZERO);
    }

    /// Drop all elements but keep the allocation for reuse.
    pub fn clear(&mut self) {
        self.cells.clear();
    }

    /// Base pointer, guaranteed 16-byte aligned. Invalidated by growth.
    #[inline]
    pub fn as_ptr(&self) -> *const V128 {
        self.cells.as_ptr()
    }

    /// Mutable base pointer, guaranteed 16-byte aligned. Invalidated by
    /// growth.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut V128 {
        self.cells.as_mut_ptr()
    }

    #[inline]
    pub fn as_slice(&self) -> &[V128] {
        &self.cells
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [V128] {
        &mut self.cells
    }

    /// Report the current capacity to the tally, retiring the old figure.
    fn retally(&mut self) {
        let cap = self.cells.capacity();
        if cap != self.accounted {
            tally::global().del(self.cat, self.accounted * std::mem::size_of::<V128>());
            tally::global().add(self.cat, cap * std::mem::size_of::<V128>());
            self.accounted = cap;
        }
    }
}

impl Drop for VecBuf {
    fn drop(&mut self) {
        tally::global().del(self.cat, self.accounted * std::mem::size_of::<V128>());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_pointer_is_aligned() {
        let mut buf = VecBuf::new(MemCategory::Misc);
        buf.resize(3);
        assert_eq!(buf.as_ptr() as usize % 16, 0);
        buf.resize(1000);
        assert_eq!(buf.as_ptr() as usize % 16, 0);
    }

    #[test]
    fn resize_grows_geometrically_and_zero_fills() {
        let mut buf = VecBuf::new(MemCategory::Misc);
        buf.resize(5);
        assert_eq!(buf.len(), 5);
        assert!(buf.capacity() >= 8);
        assert!(buf.as_slice().iter().all(|v| *v == V128::ZERO));

        buf.as_mut_slice()[4] = V128([7; 16]);
        buf.resize(100);
        // growth preserves contents
        assert_eq!(buf.as_slice()[4], V128([7; 16]));
        assert_eq!(buf.as_slice()[5], V128::ZERO);
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut buf = VecBuf::new(MemCategory::Misc);
        buf.resize_exact(64);
        let cap = buf.capacity();
        buf.clear();
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.capacity(), cap);
    }

    #[test]
    fn shrinking_resize_truncates_without_realloc() {
        let mut buf = VecBuf::new(MemCategory::Misc);
        buf.resize(32);
        let cap = buf.capacity();
        buf.resize(4);
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.capacity(), cap);
    }
}

//! Striped DP matrix: E/F/H/TMP vector quartets plus a per-cell mask grid
//!
//! Matrix memory is laid out as follows:
//!
//! - Individual cell scores are packed into 128-bit vectors in the striped
//!   pattern (lane `j` of vector row `i` holds scalar row `i + j * seg_len`).
//! - Vectors are grouped into quartets per vector row: one vector each from
//!   E, F and H, plus a TMP slot.
//! - Quartets are packed into columns; `seg_len` quartets per column.
//!
//! One extra column of quartets past the last reference position stages the
//! initial H column in its TMP slots, so column 0 of the fill reads its
//! left-neighbor vectors the same way every other column does.
//!
//! Alongside the vectors lives a grid of 16-bit mask words, one per scalar
//! cell, holding the remaining legal backtrack predecessors for the cell's H,
//! E and F values plus the reported-through flag:
//!
//! | bits  | meaning                       |
//! |-------|-------------------------------|
//! | 0     | reported-through              |
//! | 1     | H mask initialized            |
//! | 2-6   | H predecessor mask (5 bits)   |
//! | 7     | E mask initialized            |
//! | 8-9   | E predecessor mask            |
//! | 10    | F mask initialized            |
//! | 11-12 | F predecessor mask            |
//!
//! Once a mask's "initialized" bit is set it never clears, and the mask
//! subfield only ever sheds bits as backtraces consume branches. Masks are
//! computed lazily, on a cell's first visit, from the stored scores; the
//! recomputation runs in the stored (biased, saturating) domain so it lands
//! on exactly the predecessors the fill found optimal.

use rand::Rng;

use crate::scoring::Scoring;
use crate::simd::V128;
use crate::tally::{self, MemCategory};
use crate::vecbuf::VecBuf;

/// Quartet slot of the E vectors.
pub const SLOT_E: usize = 0;
/// Quartet slot of the F vectors.
pub const SLOT_F: usize = 1;
/// Quartet slot of the H vectors.
pub const SLOT_H: usize = 2;
/// Quartet slot of the TMP vectors.
pub const SLOT_TMP: usize = 3;

/// H-mask bit: the diagonal predecessor achieves this score.
pub const H_DIAG: u16 = 1 << 0;
/// H-mask bit: the E value at this cell achieves this score.
pub const H_FROM_E: u16 = 1 << 1;
/// H-mask bit: the F value at this cell achieves this score.
pub const H_FROM_F: u16 = 1 << 2;
/// E/F-mask bit: opening from H achieves this score.
pub const GAP_OPEN: u16 = 1 << 0;
/// E/F-mask bit: extending the gap achieves this score.
pub const GAP_EXTEND: u16 = 1 << 1;

const REPORTED_BIT: u16 = 1 << 0;

/// Low sentinel for 16-bit lanes, standing in for minus infinity. The margin
/// above `i16::MIN` absorbs a penalty subtraction without wrapping before the
/// saturating ops clamp.
pub(crate) const I16_LOW: i16 = i16::MIN + 1024;

/// Which of the three DP matrices a value belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layer {
    E,
    F,
    H,
}

impl Layer {
    #[inline]
    pub fn slot(self) -> usize {
        match self {
            Layer::E => SLOT_E,
            Layer::F => SLOT_F,
            Layer::H => SLOT_H,
        }
    }
}

/// Outcome of analyzing one cell during backtrace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellVisit {
    /// A previous backtrace already reported through this cell; abandon.
    ReportedThrough,
    /// Legal terminal cell: score at or below the floor, or a cell that
    /// never had a predecessor.
    Origin,
    /// No way left to backtrack from here.
    Dead,
    /// Take `trans`; `branched` is true when more than one predecessor was
    /// legal and one was consumed at random.
    Step { trans: Transition, branched: bool },
}

/// A backtrace transition out of a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// H cell, diagonal predecessor: consume one query and one reference
    /// character.
    Diag,
    /// H cell resolves to its E value; stay in place, switch layers.
    HFromE,
    /// H cell resolves to its F value; stay in place, switch layers.
    HFromF,
    /// E cell opened from H one column left.
    EOpen,
    /// E cell extends the E gap one column left.
    EExtend,
    /// F cell opened from H one row up.
    FOpen,
    /// F cell extends the F gap one row up.
    FExtend,
}

/// Striped E/F/H/TMP storage plus the parallel mask grid for one DP problem.
#[derive(Debug)]
pub struct DpMatrix {
    buf: VecBuf,
    masks: Vec<u16>,
    masks_accounted: usize,
    nrow: usize,
    ncol: usize,
    nvecrow: usize,
    wperv: usize,
    colstride: usize,
    bias: i32,
    inited: bool,
}

/// Vectors between adjacent quartets in one column.
const ROWSTRIDE: usize = 4;

impl DpMatrix {
    pub fn new() -> Self {
        DpMatrix {
            buf: VecBuf::new(MemCategory::DpVectors),
            masks: Vec::new(),
            masks_accounted: 0,
            nrow: 0,
            ncol: 0,
            nvecrow: 0,
            wperv: 0,
            colstride: 0,
            bias: 0,
            inited: false,
        }
    }

    /// Size the matrix for an `nrow` by `ncol` problem at `wperv` words per
    /// vector, zeroing the mask grid and the staged initial column. Buffer
    /// capacity is retained across calls for reuse.
    pub fn init(&mut self, nrow: usize, ncol: usize, wperv: usize) {
        assert!(nrow > 0 && ncol > 0, "degenerate matrix {nrow}x{ncol}");
        assert!(wperv == 8 || wperv == 16, "unsupported vector width {wperv}");
        let seg = nrow.div_ceil(wperv);
        self.nrow = nrow;
        self.ncol = ncol;
        self.wperv = wperv;
        self.nvecrow = seg;
        self.colstride = ROWSTRIDE * seg;
        self.bias = 0;
        self.inited = true;

        // One staging column past the end; resize zero-fills it along with
        // everything else.
        self.buf.clear();
        self.buf.resize(ROWSTRIDE * seg * (ncol + 1));

        self.masks.clear();
        self.masks.resize(nrow * ncol, 0);
        let cap_bytes = self.masks.capacity() * std::mem::size_of::<u16>();
        if cap_bytes != self.masks_accounted {
            tally::global().del(MemCategory::DpMasks, self.masks_accounted);
            tally::global().add(MemCategory::DpMasks, cap_bytes);
            self.masks_accounted = cap_bytes;
        }
    }

    /// Record the additive score shift the filler worked under (zero in
    /// 16-bit mode). `elt` subtracts it.
    pub(crate) fn set_bias(&mut self, bias: i32) {
        self.bias = bias;
    }

    #[inline]
    pub fn nrow(&self) -> usize {
        self.nrow
    }

    #[inline]
    pub fn ncol(&self) -> usize {
        self.ncol
    }

    /// Vector rows per column (`seg_len`).
    #[inline]
    pub fn nvecrow(&self) -> usize {
        self.nvecrow
    }

    /// Words per vector (16 in u8 mode, 8 in i16 mode).
    #[inline]
    pub fn wperv(&self) -> usize {
        self.wperv
    }

    /// Vectors to skip to move one column right.
    #[inline]
    pub fn colstride(&self) -> usize {
        self.colstride
    }

    /// Vectors to skip to move one vector row down within a column.
    #[inline]
    pub fn rowstride(&self) -> usize {
        ROWSTRIDE
    }

    #[inline]
    pub(crate) fn vec_index(&self, vrow: usize, col: usize, slot: usize) -> usize {
        debug_assert!(vrow < self.nvecrow);
        debug_assert!(col < self.ncol);
        col * self.colstride + vrow * ROWSTRIDE + slot
    }

    /// Index of the staged initial-H vector for `vrow`, in the TMP slot of
    /// the column past the last.
    #[inline]
    pub(crate) fn staging_index(&self, vrow: usize) -> usize {
        debug_assert!(vrow < self.nvecrow);
        self.ncol * self.colstride + vrow * ROWSTRIDE + SLOT_TMP
    }

    /// Base of the vector buffer. Valid until the next `init`.
    #[inline]
    pub(crate) fn base_mut(&mut self) -> *mut V128 {
        self.buf.as_mut_ptr()
    }

    /// Pointer to the E vector at vector row `vrow`, column `col`.
    pub fn evec(&mut self, vrow: usize, col: usize) -> *mut V128 {
        let idx = self.vec_index(vrow, col, SLOT_E);
        unsafe { self.buf.as_mut_ptr().add(idx) }
    }

    /// Pointer to the F vector at vector row `vrow`, column `col`.
    pub fn fvec(&mut self, vrow: usize, col: usize) -> *mut V128 {
        let idx = self.vec_index(vrow, col, SLOT_F);
        unsafe { self.buf.as_mut_ptr().add(idx) }
    }

    /// Pointer to the H vector at vector row `vrow`, column `col`.
    pub fn hvec(&mut self, vrow: usize, col: usize) -> *mut V128 {
        let idx = self.vec_index(vrow, col, SLOT_H);
        unsafe { self.buf.as_mut_ptr().add(idx) }
    }

    /// Pointer to the TMP vector at vector row `vrow`, column `col`.
    pub fn tmpvec(&mut self, vrow: usize, col: usize) -> *mut V128 {
        let idx = self.vec_index(vrow, col, SLOT_TMP);
        unsafe { self.buf.as_mut_ptr().add(idx) }
    }

    // ===== Scalar readout =====

    /// Stored-domain value of logical cell `(row, col)` in `layer`. In u8
    /// mode stored values carry the bias; in i16 mode they are true scores.
    pub(crate) fn elt_raw(&self, row: usize, col: usize, layer: Layer) -> i32 {
        debug_assert!(self.inited);
        debug_assert!(row < self.nrow);
        debug_assert!(col < self.ncol);
        let lane = row / self.nvecrow;
        let vrow = row % self.nvecrow;
        let cell = &self.buf.as_slice()[col * self.colstride + vrow * ROWSTRIDE + layer.slot()];
        if self.wperv == 16 {
            cell.0[lane] as i32
        } else {
            i16::from_le_bytes([cell.0[lane * 2], cell.0[lane * 2 + 1]]) as i32
        }
    }

    /// Score of logical cell `(row, col)` in `layer`, unbiased.
    pub fn elt(&self, row: usize, col: usize, layer: Layer) -> i32 {
        self.elt_raw(row, col, layer) - self.bias
    }

    /// Stored-domain value of the implicit initial H column.
    #[inline]
    pub(crate) fn init_h_raw(&self) -> i32 {
        self.bias
    }

    /// Stored-domain value of the implicit initial E column.
    #[inline]
    pub(crate) fn init_e_raw(&self) -> i32 {
        if self.wperv == 16 {
            0
        } else {
            I16_LOW as i32
        }
    }

    // ===== Mask grid =====

    #[inline]
    fn mask_word(&self, row: usize, col: usize) -> u16 {
        self.masks[row * self.ncol + col]
    }

    #[inline]
    fn mask_word_mut(&mut self, row: usize, col: usize) -> &mut u16 {
        &mut self.masks[row * self.ncol + col]
    }

    /// `(initialized-flag bit, field shift, field width mask)` per layer.
    #[inline]
    fn mask_params(layer: Layer) -> (u16, u32, u16) {
        match layer {
            Layer::H => (1 << 1, 2, 0x1F),
            Layer::E => (1 << 7, 8, 0x3),
            Layer::F => (1 << 10, 11, 0x3),
        }
    }

    /// The stored predecessor mask for `layer`, or `None` if never set.
    pub(crate) fn stored_mask(&self, row: usize, col: usize, layer: Layer) -> Option<u16> {
        let (set, shift, width) = Self::mask_params(layer);
        let word = self.mask_word(row, col);
        if word & set == 0 {
            None
        } else {
            Some((word >> shift) & width)
        }
    }

    /// Write `mask` for `layer` and set its initialized flag.
    pub(crate) fn store_mask(&mut self, row: usize, col: usize, layer: Layer, mask: u16) {
        let (set, shift, width) = Self::mask_params(layer);
        debug_assert!(mask <= width, "mask {mask:#x} too wide for {layer:?}");
        let word = self.mask_word_mut(row, col);
        *word &= !(width << shift);
        *word |= set | (mask << shift);
    }

    /// True iff the H mask has been initialized for this cell.
    pub fn is_h_mask_set(&self, row: usize, col: usize) -> bool {
        self.stored_mask(row, col, Layer::H).is_some()
    }

    /// Set the cell's H mask (5 bits of remaining legal H predecessors).
    pub fn h_mask_set(&mut self, row: usize, col: usize, mask: u16) {
        self.store_mask(row, col, Layer::H, mask);
    }

    /// Remaining H predecessor mask, zero when unset.
    pub fn h_mask(&self, row: usize, col: usize) -> u16 {
        self.stored_mask(row, col, Layer::H).unwrap_or(0)
    }

    /// True iff the E mask has been initialized for this cell.
    pub fn is_e_mask_set(&self, row: usize, col: usize) -> bool {
        self.stored_mask(row, col, Layer::E).is_some()
    }

    /// Set the cell's E mask (2 bits of remaining legal E predecessors).
    pub fn e_mask_set(&mut self, row: usize, col: usize, mask: u16) {
        self.store_mask(row, col, Layer::E, mask);
    }

    /// Remaining E predecessor mask, zero when unset.
    pub fn e_mask(&self, row: usize, col: usize) -> u16 {
        self.stored_mask(row, col, Layer::E).unwrap_or(0)
    }

    /// True iff the F mask has been initialized for this cell.
    pub fn is_f_mask_set(&self, row: usize, col: usize) -> bool {
        self.stored_mask(row, col, Layer::F).is_some()
    }

    /// Set the cell's F mask (2 bits of remaining legal F predecessors).
    pub fn f_mask_set(&mut self, row: usize, col: usize, mask: u16) {
        self.store_mask(row, col, Layer::F, mask);
    }

    /// Remaining F predecessor mask, zero when unset.
    pub fn f_mask(&self, row: usize, col: usize) -> u16 {
        self.stored_mask(row, col, Layer::F).unwrap_or(0)
    }

    /// True iff a backtrace has already been reported through this cell.
    pub fn reported_through(&self, row: usize, col: usize) -> bool {
        self.mask_word(row, col) & REPORTED_BIT != 0
    }

    /// Pin the cell as reported-through. Never cleared.
    pub fn set_reported_through(&mut self, row: usize, col: usize) {
        *self.mask_word_mut(row, col) |= REPORTED_BIT;
    }

    // ===== Cell analysis =====

    /// Analyze a cell during backtrace: decide whether it is a terminal
    /// origin, a dead end, already reported through, or has a predecessor to
    /// step to. On the cell's first visit the predecessor mask is computed
    /// from the stored scores and memorized; when several predecessors tie,
    /// one is chosen uniformly at random and consumed from the mask.
    pub fn analyze_cell<R: Rng>(
        &mut self,
        row: usize,
        col: usize,
        layer: Layer,
        readc: u8,
        refc: u8,
        sc: &Scoring,
        rng: &mut R,
    ) -> CellVisit {
        if layer == Layer::H {
            if self.reported_through(row, col) {
                return CellVisit::ReportedThrough;
            }
            if self.elt_raw(row, col, Layer::H) <= sc.floor + self.bias {
                return CellVisit::Origin;
            }
        }

        let mask = match self.stored_mask(row, col, layer) {
            Some(0) => return CellVisit::Dead,
            Some(m) => m,
            None => {
                let m = self.compute_mask(row, col, layer, readc, refc, sc);
                self.store_mask(row, col, layer, m);
                if m == 0 {
                    // A cell that never had a predecessor is a legal place
                    // for an alignment to start; a gap cell without one is a
                    // dead end.
                    return if layer == Layer::H { CellVisit::Origin } else { CellVisit::Dead };
                }
                m
            }
        };

        let nbits = mask.count_ones();
        let (bit, branched) = if nbits > 1 {
            let bit = kth_set_bit(mask, rng.gen_range(0..nbits));
            self.store_mask(row, col, layer, mask & !bit);
            (bit, true)
        } else {
            (mask, false)
        };

        let trans = match (layer, bit) {
            (Layer::H, H_DIAG) => Transition::Diag,
            (Layer::H, H_FROM_E) => Transition::HFromE,
            (Layer::H, H_FROM_F) => Transition::HFromF,
            (Layer::E, GAP_OPEN) => Transition::EOpen,
            (Layer::E, GAP_EXTEND) => Transition::EExtend,
            (Layer::F, GAP_OPEN) => Transition::FOpen,
            (Layer::F, GAP_EXTEND) => Transition::FExtend,
            _ => unreachable!("invalid mask bit {bit:#x} for {layer:?}"),
        };
        CellVisit::Step { trans, branched }
    }

    /// Recompute the predecessor mask for a cell from the stored scores,
    /// mirroring the fill's saturating arithmetic in the stored domain.
    fn compute_mask(&self, row: usize, col: usize, layer: Layer, readc: u8, refc: u8, sc: &Scoring) -> u16 {
        match layer {
            Layer::H => {
                let s = self.elt_raw(row, col, Layer::H);
                let diag = if row > 0 && col > 0 {
                    self.elt_raw(row - 1, col - 1, Layer::H)
                } else {
                    self.init_h_raw()
                };
                let mut m = 0;
                if self.raw_diag_cand(diag, sc.score_match(readc, refc)) == s {
                    m |= H_DIAG;
                }
                if self.elt_raw(row, col, Layer::E) == s {
                    m |= H_FROM_E;
                }
                if self.elt_raw(row, col, Layer::F) == s {
                    m |= H_FROM_F;
                }
                m
            }
            Layer::E => {
                let s = self.elt_raw(row, col, Layer::E);
                let (h_left, e_left) = if col > 0 {
                    (
                        self.elt_raw(row, col - 1, Layer::H),
                        self.elt_raw(row, col - 1, Layer::E),
                    )
                } else {
                    (self.init_h_raw(), self.init_e_raw())
                };
                let mut m = 0;
                if self.raw_sat_sub(h_left, sc.read_gap_open()) == s {
                    m |= GAP_OPEN;
                }
                if self.raw_sat_sub(e_left, sc.read_gap_extend()) == s {
                    m |= GAP_EXTEND;
                }
                m
            }
            Layer::F => {
                if row == 0 {
                    return 0;
                }
                let s = self.elt_raw(row, col, Layer::F);
                let h_up = self.elt_raw(row - 1, col, Layer::H);
                let f_up = self.elt_raw(row - 1, col, Layer::F);
                let mut m = 0;
                if self.raw_sat_sub(h_up, sc.ref_gap_open()) == s {
                    m |= GAP_OPEN;
                }
                if self.raw_sat_sub(f_up, sc.ref_gap_extend()) == s {
                    m |= GAP_EXTEND;
                }
                m
            }
        }
    }

    /// Stored-domain saturating subtraction of a penalty magnitude.
    #[inline]
    fn raw_sat_sub(&self, a: i32, pen: i32) -> i32 {
        if self.wperv == 16 {
            (a - pen).max(0)
        } else {
            (a - pen).max(i16::MIN as i32)
        }
    }

    /// Stored-domain diagonal candidate: what the fill computed from the
    /// biased profile add followed by the bias subtraction.
    #[inline]
    fn raw_diag_cand(&self, diag_raw: i32, score: i32) -> i32 {
        if self.wperv == 16 {
            let t = (diag_raw + score + self.bias).min(u8::MAX as i32);
            (t - self.bias).max(0)
        } else {
            (diag_raw + score).clamp(i16::MIN as i32, i16::MAX as i32)
        }
    }
}

impl Default for DpMatrix {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DpMatrix {
    fn drop(&mut self) {
        tally::global().del(MemCategory::DpMasks, self.masks_accounted);
    }
}

/// Value of the `k`-th (0-based, from least significant) set bit of `mask`.
#[inline]
fn kth_set_bit(mask: u16, k: u32) -> u16 {
    let mut m = mask;
    for _ in 0..k {
        m &= m - 1;
    }
    m & m.wrapping_neg()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quartet_addressing() {
        let mut mat = DpMatrix::new();
        mat.init(20, 7, 16);
        // ceil(20/16)
        assert_eq!(mat.nvecrow(), 2);
        assert_eq!(mat.rowstride(), 4);
        assert_eq!(mat.colstride(), 8);
        assert_eq!(mat.vec_index(0, 0, SLOT_E), 0);
        assert_eq!(mat.vec_index(1, 0, SLOT_H), 6);
        assert_eq!(mat.vec_index(0, 3, SLOT_F), 25);
        // staging column sits one column past the last
        assert_eq!(mat.staging_index(0), 7 * 8 + SLOT_TMP);
    }

    #[test]
    fn elt_reads_striped_lanes() {
        let mut mat = DpMatrix::new();
        mat.init(20, 3, 16);
        // row 17 lives in lane 8 of vector row 1 (17 = 1 + 8*2)
        unsafe {
            (*mat.hvec(1, 2)).0[8] = 42;
        }
        assert_eq!(mat.elt(17, 2, Layer::H), 42);

        // i16 mode: row 9 is lane 4 of vector row 1 (9 = 1 + 4*2)
        let mut mat = DpMatrix::new();
        mat.init(10, 2, 8);
        unsafe {
            (&mut (*mat.hvec(1, 1)).0)[8..10].copy_from_slice(&(-123i16).to_le_bytes());
        }
        assert_eq!(mat.elt(9, 1, Layer::H), -123);
    }

    #[test]
    fn elt_unbiases_u8_mode() {
        let mut mat = DpMatrix::new();
        mat.init(4, 2, 16);
        mat.set_bias(7);
        unsafe {
            (*mat.hvec(0, 0)).0[2] = 9;
        }
        assert_eq!(mat.elt(2, 0, Layer::H), 2);
    }

    #[test]
    fn mask_fields_pack_independently() {
        let mut mat = DpMatrix::new();
        mat.init(4, 4, 16);
        assert!(!mat.is_h_mask_set(1, 2));
        mat.h_mask_set(1, 2, 0b101);
        mat.e_mask_set(1, 2, 0b11);
        mat.f_mask_set(1, 2, 0b01);
        assert!(mat.is_h_mask_set(1, 2));
        assert_eq!(mat.h_mask(1, 2), 0b101);
        assert_eq!(mat.e_mask(1, 2), 0b11);
        assert_eq!(mat.f_mask(1, 2), 0b01);
        // rewriting one field leaves the others alone
        mat.h_mask_set(1, 2, 0b00001);
        assert_eq!(mat.h_mask(1, 2), 0b00001);
        assert_eq!(mat.e_mask(1, 2), 0b11);
        // neighboring cells untouched
        assert!(!mat.is_h_mask_set(1, 1));
        assert!(!mat.is_e_mask_set(2, 2));
    }

    #[test]
    fn reported_through_is_monotonic() {
        let mut mat = DpMatrix::new();
        mat.init(2, 2, 16);
        assert!(!mat.reported_through(0, 1));
        mat.set_reported_through(0, 1);
        assert!(mat.reported_through(0, 1));
        // setting masks does not clear the flag
        mat.h_mask_set(0, 1, 0b1);
        mat.e_mask_set(0, 1, 0b1);
        assert!(mat.reported_through(0, 1));
    }

    #[test]
    fn init_resets_masks_but_keeps_capacity() {
        let mut mat = DpMatrix::new();
        mat.init(8, 8, 16);
        mat.set_reported_through(3, 3);
        mat.h_mask_set(2, 2, 0b111);
        mat.init(8, 8, 16);
        assert!(!mat.reported_through(3, 3));
        assert!(!mat.is_h_mask_set(2, 2));
    }

    #[test]
    fn kth_set_bit_walks_low_to_high() {
        assert_eq!(kth_set_bit(0b101101, 0), 0b1);
        assert_eq!(kth_set_bit(0b101101, 1), 0b100);
        assert_eq!(kth_set_bit(0b101101, 2), 0b1000);
        assert_eq!(kth_set_bit(0b101101, 3), 0b100000);
    }
}

//! Column-at-a-time striped matrix fill
//!
//! One kernel per working precision, both written against the [`SwSimd`]
//! contract. Per column the kernel performs the Farrar striped update over
//! `seg_len` vector rows:
//!
//! 1. `E[r,c] = max(E[r,c-1] - extend, H[r,c-1] - (open+extend))`
//! 2. `H[r,c] = max(H[r-1,c-1] + score, E[r,c], F[r,c], floor)`
//! 3. carry `F` down the column: `F = max(F - extend, H[r,c] - (open+extend))`
//!
//! The vertical F dependency crosses vector-lane boundaries only in the
//! fix-up loop that follows the main pass: the carried F vector is shifted by
//! one lane and recombined into H (and the stored F) until no lane can raise
//! anything further, bounded by one shift per lane.
//!
//! In unsigned 8-bit mode all stored values carry the scoring bias and the
//! matrix floor sits at `bias`; if any lane climbs to the top of the biased
//! range the fill aborts with [`FillStatus::Saturated`] and the caller
//! retries in 16-bit mode. The filler never panics on score range issues;
//! every outcome is a status.

use log::debug;

use crate::matrix::{DpMatrix, Layer, I16_LOW, SLOT_E, SLOT_F, SLOT_H, SLOT_TMP};
use crate::metrics::DpMetrics;
use crate::profile::{Precision, QueryProfile};
use crate::scoring::{Scoring, N_BASE};
use crate::simd::{Engine128, SwSimd};

/// Outcome of filling one DP matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillStatus {
    /// Fill completed and at least one cell exceeds the score floor.
    Ok(FillResult),
    /// A lane reached the top of the representable range; retry wider.
    Saturated,
    /// Fill completed but nothing rose above the score floor.
    Failed,
}

/// Best cell found by a completed fill.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FillResult {
    /// Best H score, unbiased.
    pub best: i32,
    pub best_row: usize,
    pub best_col: usize,
}

/// Fill `mat` for `reference` against the striped `prof`, recording counters
/// into `metrics`. Initializes (or re-initializes) the matrix to the
/// problem's dimensions; buffer capacity is reused across calls.
pub fn fill(
    mat: &mut DpMatrix,
    prof: &QueryProfile,
    reference: &[u8],
    sc: &Scoring,
    metrics: &mut DpMetrics,
) -> FillStatus {
    assert!(!reference.is_empty(), "empty reference");
    mat.init(prof.query_len(), reference.len(), prof.precision().words_per_vec());
    mat.set_bias(prof.bias());
    metrics.dp += 1;

    debug!(
        "fill {}x{} seg_len={} precision={:?}",
        prof.query_len(),
        reference.len(),
        prof.seg_len(),
        prof.precision()
    );

    let status = unsafe {
        match prof.precision() {
            Precision::U8 => fill_u8::<Engine128>(mat, prof, reference, sc, metrics),
            Precision::I16 => fill_i16::<Engine128>(mat, prof, reference, sc, metrics),
        }
    };
    match status {
        FillStatus::Ok(_) => metrics.dpsucc += 1,
        FillStatus::Saturated => {
            debug!("fill saturated, caller should retry in 16-bit mode");
            metrics.dpsat += 1;
        }
        FillStatus::Failed => metrics.dpfail += 1,
    }
    status
}

/// Locate the topmost row matching the best stored score in the best column.
fn best_cell(mat: &DpMatrix, best_raw: i32, best_col: usize) -> usize {
    for r in 0..mat.nrow() {
        if mat.elt_raw(r, best_col, Layer::H) == best_raw {
            return r;
        }
    }
    unreachable!("column {best_col} lost its maximum");
}

/// Unsigned 8-bit kernel: 16 lanes, all values biased by `prof.bias()`.
#[allow(unsafe_op_in_unsafe_fn)]
unsafe fn fill_u8<E: SwSimd>(
    mat: &mut DpMatrix,
    prof: &QueryProfile,
    reference: &[u8],
    sc: &Scoring,
    metrics: &mut DpMetrics,
) -> FillStatus {
    let seg = prof.seg_len();
    let ncol = reference.len();
    let nrow = mat.nrow();
    let bias = prof.bias();
    let colstride = mat.colstride();
    let staging_idx = mat.staging_index(0);
    let base = mat.base_mut();

    let vzero = E::setzero();
    let vbias = E::set1_epu8(bias as u8);
    // stored floor is the bias: a true score of zero
    let vfloor = vbias;
    let v_rdo = E::set1_epu8(sc.read_gap_open() as u8);
    let v_rde = E::set1_epu8(sc.read_gap_extend() as u8);
    let v_rfo = E::set1_epu8(sc.ref_gap_open() as u8);
    let v_rfe = E::set1_epu8(sc.ref_gap_extend() as u8);
    let vlane0_bias = E::setlane0_epu8(bias as u8);
    // values at or past this mark may have been clipped by saturating adds
    let sat_thresh = u8::MAX as i32 - bias;

    // stage the initial H column (true score zero everywhere)
    let staging = base.add(staging_idx);
    for i in 0..seg {
        E::store(staging.add(i * 4), vbias);
    }

    let floor_raw = sc.floor + bias;
    let mut best_raw = floor_raw;
    let mut best_col = 0usize;

    for (c, &refc) in reference.iter().enumerate() {
        let col_base = base.add(c * colstride);
        let prof_c = prof.symbol_vecs(refc.min(N_BASE));
        let first = c == 0;
        let (left_base, left_slot) = if first {
            (base.add(ncol * colstride), SLOT_TMP)
        } else {
            (base.add((c - 1) * colstride), SLOT_H)
        };

        // Diagonal carry: the left column's last H vector shifted one lane,
        // with the implicit initial H entering at lane 0.
        let last_left = E::load(left_base.add((seg - 1) * 4 + left_slot));
        let mut vh_diag = E::or_si128(E::slli_bytes_1(last_left), vlane0_bias);
        let mut vf = vzero;
        let mut vmax = vzero;

        for i in 0..seg {
            let vh_left = E::load(left_base.add(i * 4 + left_slot));
            let ve_left = if first {
                vzero
            } else {
                E::load(left_base.add(i * 4 + SLOT_E))
            };

            let ve = E::max_epu8(E::subs_epu8(ve_left, v_rde), E::subs_epu8(vh_left, v_rdo));
            E::store(col_base.add(i * 4 + SLOT_E), ve);

            let mut vh = E::adds_epu8(vh_diag, E::load(prof_c.as_ptr().add(i)));
            vh = E::subs_epu8(vh, vbias);
            vh = E::max_epu8(vh, ve);
            vh = E::max_epu8(vh, vf);
            vh = E::max_epu8(vh, vfloor);
            E::store(col_base.add(i * 4 + SLOT_H), vh);
            E::store(col_base.add(i * 4 + SLOT_F), vf);
            vmax = E::max_epu8(vmax, vh);

            vf = E::max_epu8(E::subs_epu8(vf, v_rfe), E::subs_epu8(vh, v_rfo));
            vh_diag = vh_left;
        }
        metrics.inner += seg as u64;

        // Lazy-F fix-up: push the carried F across lane boundaries while it
        // can still feed back into H.
        'fixup: for _ in 0..E::LANES_U8 {
            vf = E::slli_bytes_1(vf);
            for i in 0..seg {
                let hptr = col_base.add(i * 4 + SLOT_H);
                let vh = E::load(hptr);
                if E::movemask_epi8(E::cmpgt_epu8(vf, E::subs_epu8(vh, v_rfo))) == 0 {
                    break 'fixup;
                }
                E::store(hptr, E::max_epu8(vh, vf));
                let fptr = col_base.add(i * 4 + SLOT_F);
                E::store(fptr, E::max_epu8(E::load(fptr), vf));
                vf = E::subs_epu8(vf, v_rfe);
                metrics.fixup += 1;
            }
        }

        metrics.col += 1;
        metrics.cell += nrow as u64;

        let m = E::hmax_epu8(vmax) as i32;
        if m >= sat_thresh {
            return FillStatus::Saturated;
        }
        if m > best_raw {
            best_raw = m;
            best_col = c;
        }
    }

    if best_raw <= floor_raw {
        return FillStatus::Failed;
    }
    let best_row = best_cell(mat, best_raw, best_col);
    FillStatus::Ok(FillResult { best: best_raw - bias, best_row, best_col })
}

/// Signed 16-bit kernel: 8 lanes, unbiased, for problems the 8-bit range
/// cannot hold.
#[allow(unsafe_op_in_unsafe_fn)]
unsafe fn fill_i16<E: SwSimd>(
    mat: &mut DpMatrix,
    prof: &QueryProfile,
    reference: &[u8],
    sc: &Scoring,
    metrics: &mut DpMetrics,
) -> FillStatus {
    let seg = prof.seg_len();
    let ncol = reference.len();
    let nrow = mat.nrow();
    let colstride = mat.colstride();
    let base = mat.base_mut();

    let vzero = E::setzero();
    let vlow = E::set1_epi16(I16_LOW);
    let v_rdo = E::set1_epi16(sc.read_gap_open() as i16);
    let v_rde = E::set1_epi16(sc.read_gap_extend() as i16);
    let v_rfo = E::set1_epi16(sc.ref_gap_open() as i16);
    let v_rfe = E::set1_epi16(sc.ref_gap_extend() as i16);

    // staging column is already zeroed by init, which is the initial H here

    let floor_raw = sc.floor;
    let mut best_raw = floor_raw;
    let mut best_col = 0usize;

    for (c, &refc) in reference.iter().enumerate() {
        let col_base = base.add(c * colstride);
        let prof_c = prof.symbol_vecs(refc.min(N_BASE));
        let first = c == 0;
        let (left_base, left_slot) = if first {
            (base.add(ncol * colstride), SLOT_TMP)
        } else {
            (base.add((c - 1) * colstride), SLOT_H)
        };

        // lane 0 of the shifted diagonal picks up an implicit zero, which is
        // exactly the initial H in this mode
        let last_left = E::load(left_base.add((seg - 1) * 4 + left_slot));
        let mut vh_diag = E::slli_bytes_2(last_left);
        let mut vf = vlow;
        let mut vmax = vlow;

        for i in 0..seg {
            let vh_left = E::load(left_base.add(i * 4 + left_slot));
            let ve_left = if first {
                vlow
            } else {
                E::load(left_base.add(i * 4 + SLOT_E))
            };

            let ve = E::max_epi16(E::subs_epi16(ve_left, v_rde), E::subs_epi16(vh_left, v_rdo));
            E::store(col_base.add(i * 4 + SLOT_E), ve);

            let mut vh = E::adds_epi16(vh_diag, E::load(prof_c.as_ptr().add(i)));
            vh = E::max_epi16(vh, ve);
            vh = E::max_epi16(vh, vf);
            vh = E::max_epi16(vh, vzero);
            E::store(col_base.add(i * 4 + SLOT_H), vh);
            E::store(col_base.add(i * 4 + SLOT_F), vf);
            vmax = E::max_epi16(vmax, vh);

            vf = E::max_epi16(E::subs_epi16(vf, v_rfe), E::subs_epi16(vh, v_rfo));
            vh_diag = vh_left;
        }
        metrics.inner += seg as u64;

        'fixup: for _ in 0..E::LANES_I16 {
            vf = E::slli_bytes_2(vf);
            for i in 0..seg {
                let hptr = col_base.add(i * 4 + SLOT_H);
                let vh = E::load(hptr);
                if E::movemask_epi8(E::cmpgt_epi16(vf, E::subs_epi16(vh, v_rfo))) == 0 {
                    break 'fixup;
                }
                E::store(hptr, E::max_epi16(vh, vf));
                let fptr = col_base.add(i * 4 + SLOT_F);
                E::store(fptr, E::max_epi16(E::load(fptr), vf));
                vf = E::subs_epi16(vf, v_rfe);
                metrics.fixup += 1;
            }
        }

        metrics.col += 1;
        metrics.cell += nrow as u64;

        let m = E::hmax_epi16(vmax) as i32;
        if m >= i16::MAX as i32 {
            return FillStatus::Saturated;
        }
        if m > best_raw {
            best_raw = m;
            best_col = c;
        }
    }

    if best_raw <= floor_raw {
        return FillStatus::Failed;
    }
    let best_row = best_cell(mat, best_raw, best_col);
    FillStatus::Ok(FillResult { best: best_raw, best_row, best_col })
}

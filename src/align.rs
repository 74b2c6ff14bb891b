//! Problem-level drivers: precision retry and batch execution
//!
//! [`solve_one`] runs the caller loop the lower layers are written for:
//! build the 8-bit profile, fill, and when the profile or the fill reports
//! that the biased range is too small, rebuild in 16-bit and refill. After a
//! successful fill it walks candidate solution cells from best downward,
//! reporting up to the requested number of disjoint alignments from one
//! filled matrix.
//!
//! [`solve_batch`] fans independent problems out over rayon. Every worker
//! keeps its own matrix and metrics; locals are folded into the shared
//! metrics under its mutex when the worker's chunk ends.

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::backtrace::{backtrace, Alignment};
use crate::fill::{fill, FillStatus};
use crate::matrix::{DpMatrix, Layer};
use crate::metrics::{DpMetrics, SharedMetrics};
use crate::profile::{Precision, ProfileError, QueryProfile};
use crate::scoring::Scoring;

/// One DP problem: a read against a reference window, both over {0..4}.
#[derive(Clone, Copy, Debug)]
pub struct DpProblem<'a> {
    pub read: &'a [u8],
    pub reference: &'a [u8],
}

/// Align `read` against `reference`, retrying in 16-bit mode when the 8-bit
/// range cannot hold the problem, and report up to `max_alignments` disjoint
/// alignments. The matrix is (re)initialized here; pass the same one across
/// calls to reuse its buffers.
pub fn solve_one<R: Rng>(
    mat: &mut DpMatrix,
    read: &[u8],
    reference: &[u8],
    sc: &Scoring,
    max_alignments: usize,
    rng: &mut R,
    metrics: &mut DpMetrics,
) -> Vec<Alignment> {
    if read.is_empty() || reference.is_empty() || max_alignments == 0 {
        return Vec::new();
    }

    let status = match QueryProfile::build(read, sc, Precision::U8) {
        Ok(prof) => match fill(mat, &prof, reference, sc, metrics) {
            FillStatus::Saturated => None,
            other => Some(other),
        },
        Err(ProfileError::ScoreOverflow(v)) => {
            debug!("8-bit profile overflow ({v}), building 16-bit profile");
            None
        }
        Err(ProfileError::EmptyQuery) => return Vec::new(),
    };

    let status = match status {
        Some(status) => status,
        None => {
            let prof = match QueryProfile::build(read, sc, Precision::I16) {
                Ok(prof) => prof,
                Err(_) => return Vec::new(),
            };
            fill(mat, &prof, reference, sc, metrics)
        }
    };

    let best = match status {
        FillStatus::Ok(best) => best,
        // a second saturation (16-bit) or an empty matrix reports nothing
        FillStatus::Saturated | FillStatus::Failed => return Vec::new(),
    };
    debug_assert_eq!(mat.elt(best.best_row, best.best_col, Layer::H), best.best);

    // Candidate solution cells, best first; ties resolve topmost/leftmost.
    let mut candidates: Vec<(i32, usize, usize)> = Vec::new();
    for row in 0..mat.nrow() {
        for col in 0..mat.ncol() {
            let s = mat.elt(row, col, Layer::H);
            if s > sc.floor {
                candidates.push((s, row, col));
            }
        }
    }
    candidates.sort_unstable_by_key(|&(s, row, col)| (-s, row, col));

    let mut out = Vec::new();
    for (_, row, col) in candidates {
        if out.len() >= max_alignments {
            break;
        }
        if mat.reported_through(row, col) {
            continue;
        }
        if let Some(al) = backtrace(
            mat,
            sc,
            read,
            reference,
            (row, col),
            0..reference.len(),
            rng,
            metrics,
        ) {
            out.push(al);
        }
    }
    out
}

/// Solve many problems in parallel. Alignments come back in problem order;
/// per-worker metrics are merged into `shared` at teardown. `seed` makes the
/// tie-breaking reproducible regardless of thread scheduling.
pub fn solve_batch(
    problems: &[DpProblem<'_>],
    sc: &Scoring,
    max_alignments: usize,
    seed: u64,
    shared: &SharedMetrics,
) -> Vec<Vec<Alignment>> {
    let mut indexed: Vec<(usize, Vec<Alignment>)> = problems
        .par_iter()
        .enumerate()
        .fold(
            || (DpMatrix::new(), DpMetrics::new(), Vec::new()),
            |(mut mat, mut local, mut acc), (idx, p)| {
                let mut rng =
                    StdRng::seed_from_u64(seed ^ (idx as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
                let als =
                    solve_one(&mut mat, p.read, p.reference, sc, max_alignments, &mut rng, &mut local);
                acc.push((idx, als));
                (mat, local, acc)
            },
        )
        .flat_map(|(_mat, local, acc)| {
            shared.merge(&local);
            acc
        })
        .collect();
    indexed.sort_unstable_by_key(|&(idx, _)| idx);
    indexed.into_iter().map(|(_, als)| als).collect()
}

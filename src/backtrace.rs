//! Randomized, mask-driven backtrace
//!
//! The walk starts at a chosen H cell and consults one cell's predecessor
//! mask at a time, descending through the E/F layers for gaps. Ties between
//! predecessors are broken uniformly at random by the injected RNG, and the
//! taken branch is consumed from the stored mask, so repeated walks over the
//! same matrix explore different co-optimal paths. A walk terminates at an
//! origin: an H cell at or below the score floor, or a diagonal step out of
//! the matrix edge.
//!
//! Rejection rules:
//! - A walk that reaches an H cell some earlier alignment was reported
//!   through is abandoned (its endpoint would be redundant).
//! - A walk that consumes an N on either sequence is rejected, unless the
//!   scoring scheme accepts N-to-N columns.
//! - A walk that never touches the caller's core column interval is
//!   rejected.
//!
//! On success every H-level cell the walk visited is pinned as
//! reported-through; E/F-level visits are not pinned.

use std::ops::Range;

use log::trace;
use rand::Rng;

use crate::matrix::{CellVisit, DpMatrix, Layer, Transition};
use crate::metrics::DpMetrics;
use crate::scoring::{Scoring, N_BASE};

/// One alignment column, read from origin to end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edit {
    /// Query base equals reference base.
    Match,
    /// Query base differs from reference base (N columns included).
    Mismatch,
    /// First character of a gap in the query, consuming reference.
    ReadGapOpen,
    /// Further character of a gap in the query, consuming reference.
    ReadGapExtend,
    /// First character of a gap in the reference, consuming query.
    RefGapOpen,
    /// Further character of a gap in the reference, consuming query.
    RefGapExtend,
}

impl Edit {
    /// CIGAR operation code for this edit.
    fn cigar_op(self) -> u8 {
        match self {
            Edit::Match => b'M',
            Edit::Mismatch => b'X',
            Edit::ReadGapOpen | Edit::ReadGapExtend => b'D',
            Edit::RefGapOpen | Edit::RefGapExtend => b'I',
        }
    }
}

/// A recovered local alignment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alignment {
    /// Score of the solution cell the walk started from.
    pub score: i32,
    /// First aligned cell (topmost/leftmost).
    pub origin: (usize, usize),
    /// Solution cell the walk started from.
    pub end: (usize, usize),
    /// Edits from origin to end.
    pub edits: Vec<Edit>,
}

impl Alignment {
    /// Run-length encoded CIGAR in `(op, len)` form, mismatches folded into
    /// `M` runs.
    pub fn cigar(&self) -> Vec<(u8, i32)> {
        let mut out: Vec<(u8, i32)> = Vec::new();
        for e in &self.edits {
            let op = match e.cigar_op() {
                b'X' => b'M',
                op => op,
            };
            match out.last_mut() {
                Some((last, n)) if *last == op => *n += 1,
                _ => out.push((op, 1)),
            }
        }
        out
    }
}

/// Walk back from `start` (an H cell) through the filled matrix, emitting the
/// alignment that ends there. Returns `None` when the walk is rejected or
/// dead-ends; counters record why.
pub fn backtrace<R: Rng>(
    mat: &mut DpMatrix,
    sc: &Scoring,
    read: &[u8],
    reference: &[u8],
    start: (usize, usize),
    core_cols: Range<usize>,
    rng: &mut R,
    metrics: &mut DpMetrics,
) -> Option<Alignment> {
    assert_eq!(read.len(), mat.nrow(), "read length does not match matrix");
    assert_eq!(reference.len(), mat.ncol(), "reference length does not match matrix");
    let (mut row, mut col) = start;
    assert!(row < mat.nrow() && col < mat.ncol(), "start cell out of range");

    metrics.bt += 1;
    let start_score = mat.elt(row, col, Layer::H);
    if start_score <= sc.floor {
        metrics.btfail += 1;
        return None;
    }

    let mut layer = Layer::H;
    let mut edits: Vec<Edit> = Vec::new();
    let mut visited_h: Vec<(usize, usize)> = Vec::new();
    let mut touched_core = false;

    let origin = loop {
        metrics.btcell += 1;
        if layer == Layer::H {
            visited_h.push((row, col));
            if core_cols.contains(&col) {
                touched_core = true;
            }
        }
        let readc = read[row];
        let refc = reference[col];

        match mat.analyze_cell(row, col, layer, readc, refc, sc, rng) {
            CellVisit::ReportedThrough => {
                trace!("backtrace abandoned at reported-through ({row},{col})");
                metrics.btfail += 1;
                return None;
            }
            CellVisit::Dead => {
                trace!("backtrace dead-ended at ({row},{col},{layer:?})");
                metrics.btfail += 1;
                return None;
            }
            CellVisit::Origin => {
                // the floor cell itself is not aligned; the first aligned
                // cell is where the preceding diagonal edit came from
                break (row + 1, col + 1);
            }
            CellVisit::Step { trans, .. } => match trans {
                Transition::Diag => {
                    if rejects_n_pair(sc, readc, refc) {
                        metrics.nrej += 1;
                        metrics.btfail += 1;
                        return None;
                    }
                    edits.push(if readc == refc && readc < N_BASE {
                        Edit::Match
                    } else {
                        Edit::Mismatch
                    });
                    if row == 0 || col == 0 {
                        // diagonal step out of the matrix: the alignment
                        // starts at this cell
                        break (row, col);
                    }
                    row -= 1;
                    col -= 1;
                }
                Transition::HFromE => layer = Layer::E,
                Transition::HFromF => layer = Layer::F,
                Transition::EOpen | Transition::EExtend => {
                    // read gap consumes the reference character
                    if refc >= N_BASE {
                        metrics.nrej += 1;
                        metrics.btfail += 1;
                        return None;
                    }
                    if col == 0 {
                        metrics.btfail += 1;
                        return None;
                    }
                    if trans == Transition::EOpen {
                        edits.push(Edit::ReadGapOpen);
                        layer = Layer::H;
                    } else {
                        edits.push(Edit::ReadGapExtend);
                    }
                    col -= 1;
                }
                Transition::FOpen | Transition::FExtend => {
                    // reference gap consumes the query character
                    if readc >= N_BASE {
                        metrics.nrej += 1;
                        metrics.btfail += 1;
                        return None;
                    }
                    if row == 0 {
                        metrics.btfail += 1;
                        return None;
                    }
                    if trans == Transition::FOpen {
                        edits.push(Edit::RefGapOpen);
                        layer = Layer::H;
                    } else {
                        edits.push(Edit::RefGapExtend);
                    }
                    row -= 1;
                }
            },
        }
    };

    if !touched_core {
        trace!("backtrace from {start:?} missed core columns {core_cols:?}");
        metrics.corerej += 1;
        metrics.btfail += 1;
        return None;
    }
    if edits.is_empty() {
        metrics.btfail += 1;
        return None;
    }

    for &(r, c) in &visited_h {
        mat.set_reported_through(r, c);
    }
    edits.reverse();
    metrics.btsucc += 1;
    trace!(
        "backtrace from {start:?}: origin {origin:?}, {} edits, score {start_score}",
        edits.len()
    );
    Some(Alignment { score: start_score, origin, end: start, edits })
}

/// True when a diagonal step over `(readc, refc)` must be rejected.
#[inline]
fn rejects_n_pair(sc: &Scoring, readc: u8, refc: u8) -> bool {
    if readc < N_BASE && refc < N_BASE {
        return false;
    }
    !(sc.n_to_n_match && readc >= N_BASE && refc >= N_BASE)
}

//! Striped query profile
//!
//! The profile precomputes, for every reference symbol, the vector of scores
//! the filler adds when it advances one column. Vectors are laid out in the
//! striped pattern: lane `j` of vector `i` holds the score for query position
//! `i + j * seg_len`, where `seg_len = ceil(Q / W)` and `W` is the lane
//! count. The filler then consumes one contiguous run of `seg_len` vectors
//! per column, indexed only by the column's reference symbol.
//!
//! In unsigned 8-bit mode every entry is shifted up by the scoring bias so it
//! fits in a `u8`; the filler subtracts the bias again after its saturating
//! add. Entries that would not fit even after biasing fail construction with
//! [`ProfileError::ScoreOverflow`] and the caller retries in 16-bit mode.

use thiserror::Error;

use crate::scoring::{Scoring, ALPHABET};
use crate::simd::V128;
use crate::tally::MemCategory;
use crate::vecbuf::VecBuf;

/// Working precision of the DP lanes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precision {
    /// 16 unsigned 8-bit lanes, scores biased non-negative.
    U8,
    /// 8 signed 16-bit lanes, no bias.
    I16,
}

impl Precision {
    /// Scalar words per 128-bit vector.
    #[inline]
    pub fn words_per_vec(self) -> usize {
        match self {
            Precision::U8 => 16,
            Precision::I16 => 8,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileError {
    /// A biased score fell outside the unsigned 8-bit range; retry in a
    /// wider precision.
    #[error("biased score {0} exceeds the unsigned 8-bit range")]
    ScoreOverflow(i32),
    #[error("query is empty")]
    EmptyQuery,
}

/// Per-reference-symbol score vectors, striped across the query.
#[derive(Debug)]
pub struct QueryProfile {
    buf: VecBuf,
    seg_len: usize,
    query_len: usize,
    precision: Precision,
    bias: i32,
}

impl QueryProfile {
    /// Build the striped profile for `query` under `sc` at the requested
    /// precision.
    pub fn build(query: &[u8], sc: &Scoring, precision: Precision) -> Result<Self, ProfileError> {
        if query.is_empty() {
            return Err(ProfileError::EmptyQuery);
        }
        let wperv = precision.words_per_vec();
        let seg_len = query.len().div_ceil(wperv);
        let bias = match precision {
            Precision::U8 => sc.bias(),
            Precision::I16 => 0,
        };

        let mut buf = VecBuf::new(MemCategory::QueryProfile);
        buf.resize_exact(ALPHABET * seg_len);

        // Padding lanes (query positions at or past Q) take a value that can
        // never lift a cell above the floor: zero biased in u8 mode, a
        // mismatch-grade negative in i16 mode.
        let pad = match precision {
            Precision::U8 => 0,
            Precision::I16 => -sc.mismatch_pen.max(sc.n_pen).max(1),
        };

        for symbol in 0..ALPHABET {
            for i in 0..seg_len {
                let mut cell = V128::ZERO;
                for j in 0..wperv {
                    let pos = i + j * seg_len;
                    let val = if pos < query.len() {
                        sc.score_match(query[pos], symbol as u8) + bias
                    } else {
                        pad
                    };
                    match precision {
                        Precision::U8 => {
                            if !(0..=u8::MAX as i32).contains(&val) {
                                return Err(ProfileError::ScoreOverflow(val));
                            }
                            cell.0[j] = val as u8;
                        }
                        Precision::I16 => {
                            debug_assert!(val >= i16::MIN as i32 && val <= i16::MAX as i32);
                            cell.0[j * 2..j * 2 + 2].copy_from_slice(&(val as i16).to_le_bytes());
                        }
                    }
                }
                buf.as_mut_slice()[symbol * seg_len + i] = cell;
            }
        }

        Ok(QueryProfile { buf, seg_len, query_len: query.len(), precision, bias })
    }

    /// Vectors per column.
    #[inline]
    pub fn seg_len(&self) -> usize {
        self.seg_len
    }

    #[inline]
    pub fn query_len(&self) -> usize {
        self.query_len
    }

    #[inline]
    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// The additive shift applied to every entry (zero in 16-bit mode).
    #[inline]
    pub fn bias(&self) -> i32 {
        self.bias
    }

    /// The `seg_len` profile vectors for one reference symbol.
    #[inline]
    pub fn symbol_vecs(&self, symbol: u8) -> &[V128] {
        let base = symbol as usize * self.seg_len;
        &self.buf.as_slice()[base..base + self.seg_len]
    }

    /// Scalar readout of one profile entry, for tests and mask recomputation.
    pub fn entry(&self, symbol: u8, pos: usize) -> i32 {
        debug_assert!(pos < self.seg_len * self.precision.words_per_vec());
        let i = pos % self.seg_len;
        let j = pos / self.seg_len;
        let cell = &self.symbol_vecs(symbol)[i];
        match self.precision {
            Precision::U8 => cell.0[j] as i32,
            Precision::I16 => i16::from_le_bytes([cell.0[j * 2], cell.0[j * 2 + 1]]) as i32,
        }
    }
}

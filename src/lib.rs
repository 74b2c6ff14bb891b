//! Striped SIMD Smith-Waterman with randomized backtrace
//!
//! The crate fills an affine-gap E/F/H dynamic-programming matrix with
//! 128-bit vectors laid out in Farrar's striped pattern, then recovers
//! alignments by a randomized, mask-driven walk over the filled matrix. An
//! unsigned 8-bit mode (scores biased non-negative) handles the common case;
//! fills that saturate it are retried in signed 16-bit mode.

pub mod align; // precision-retry driver and rayon batch runner
pub mod backtrace; // randomized mask-driven walk
pub mod fill; // striped column fillers and the lazy-F fix-up
pub mod matrix; // E/F/H/TMP quartet storage plus the mask grid
pub mod metrics; // per-problem counters, merged under a mutex
pub mod profile; // striped query profile (u8 biased / i16)
pub mod scalar; // naive scalar DP used as ground truth
pub mod scoring; // match/mismatch/N/gap parameters
pub mod simd; // 128-bit SIMD engine (SSE2 / NEON)
pub mod tally; // category-tagged memory accounting
pub mod vecbuf; // 16-byte-aligned growable vector storage

pub use align::{solve_batch, solve_one, DpProblem};
pub use backtrace::{backtrace, Alignment, Edit};
pub use fill::{fill, FillResult, FillStatus};
pub use matrix::{DpMatrix, Layer};
pub use metrics::{DpMetrics, SharedMetrics};
pub use profile::{Precision, ProfileError, QueryProfile};
pub use scoring::Scoring;

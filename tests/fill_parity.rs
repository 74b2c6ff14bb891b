// Parity of the striped fillers against the naive scalar DP, plus the
// layout invariants the backtrace depends on.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use stripe_align::fill::{fill, FillStatus};
use stripe_align::matrix::{DpMatrix, Layer};
use stripe_align::metrics::DpMetrics;
use stripe_align::profile::{Precision, QueryProfile};
use stripe_align::scalar::ScalarDp;
use stripe_align::scoring::Scoring;

fn random_seq(rng: &mut StdRng, len: usize, with_n: bool) -> Vec<u8> {
    (0..len)
        .map(|_| {
            if with_n && rng.gen_range(0..50) == 0 {
                4
            } else {
                rng.gen_range(0..4) as u8
            }
        })
        .collect()
}

fn assert_h_parity(mat: &DpMatrix, dp: &ScalarDp, read: &[u8], reference: &[u8]) {
    for row in 0..read.len() {
        for col in 0..reference.len() {
            assert_eq!(
                mat.elt(row, col, Layer::H),
                dp.h(row, col),
                "H mismatch at ({row},{col}) for Q={} R={}",
                read.len(),
                reference.len()
            );
        }
    }
}

fn fill_checked(
    mat: &mut DpMatrix,
    read: &[u8],
    reference: &[u8],
    sc: &Scoring,
    precision: Precision,
) -> FillStatus {
    let prof = QueryProfile::build(read, sc, precision).unwrap();
    let mut metrics = DpMetrics::new();
    let status = fill(mat, &prof, reference, sc, &mut metrics);
    if !matches!(status, FillStatus::Saturated) {
        assert_eq!(metrics.col, reference.len() as u64);
        assert_eq!(metrics.cell, (read.len() * reference.len()) as u64);
    }
    status
}

const SIZES: &[(usize, usize)] = &[
    (1, 1),
    (4, 4),
    (5, 7),
    (13, 29),
    (15, 21),
    (16, 16),
    (17, 9),
    (31, 33),
    (32, 24),
    (33, 40),
    (48, 64),
];

#[test]
fn striped_u8_matches_scalar() {
    let sc = Scoring::default();
    let mut rng = StdRng::seed_from_u64(0xDEAD_BEEF_0001);
    let mut mat = DpMatrix::new();
    for &(q, r) in SIZES {
        for trial in 0..4 {
            let read = random_seq(&mut rng, q, trial % 2 == 1);
            let reference = random_seq(&mut rng, r, trial % 2 == 1);
            let status = fill_checked(&mut mat, &read, &reference, &sc, Precision::U8);
            assert!(!matches!(status, FillStatus::Saturated), "unexpected saturation at {q}x{r}");
            let dp = ScalarDp::fill(&read, &reference, &sc);
            assert_h_parity(&mat, &dp, &read, &reference);
        }
    }
}

#[test]
fn striped_i16_matches_scalar() {
    let sc = Scoring::default();
    let mut rng = StdRng::seed_from_u64(0xDEAD_BEEF_0002);
    let mut mat = DpMatrix::new();
    for &(q, r) in SIZES {
        let read = random_seq(&mut rng, q, true);
        let reference = random_seq(&mut rng, r, true);
        let status = fill_checked(&mut mat, &read, &reference, &sc, Precision::I16);
        assert!(!matches!(status, FillStatus::Saturated));
        let dp = ScalarDp::fill(&read, &reference, &sc);
        assert_h_parity(&mat, &dp, &read, &reference);
    }
}

#[test]
fn h_dominates_e_and_f() {
    let sc = Scoring::default();
    let mut rng = StdRng::seed_from_u64(0xDEAD_BEEF_0003);
    let mut mat = DpMatrix::new();
    for &(q, r) in SIZES {
        let read = random_seq(&mut rng, q, false);
        let reference = random_seq(&mut rng, r, false);
        fill_checked(&mut mat, &read, &reference, &sc, Precision::U8);
        for row in 0..q {
            for col in 0..r {
                let h = mat.elt(row, col, Layer::H);
                assert!(h >= mat.elt(row, col, Layer::E), "H < E at ({row},{col})");
                assert!(h >= mat.elt(row, col, Layer::F), "H < F at ({row},{col})");
            }
        }
    }
}

#[test]
fn best_cell_matches_scalar() {
    let sc = Scoring::default();
    let mut rng = StdRng::seed_from_u64(0xDEAD_BEEF_0004);
    let mut mat = DpMatrix::new();
    for &(q, r) in SIZES {
        let read = random_seq(&mut rng, q, false);
        let reference = random_seq(&mut rng, r, false);
        let status = fill_checked(&mut mat, &read, &reference, &sc, Precision::U8);
        let (best, row, col) = ScalarDp::fill(&read, &reference, &sc).best();
        match status {
            FillStatus::Ok(res) => {
                assert_eq!(res.best, best);
                assert_eq!((res.best_row, res.best_col), (row, col));
            }
            FillStatus::Failed => assert_eq!(best, 0),
            FillStatus::Saturated => panic!("unexpected saturation"),
        }
    }
}

// Q one short of a full stripe, then exactly full, then one lane over: the
// padding lanes must never leak into any real cell.
#[test]
fn padding_lanes_do_not_leak() {
    let sc = Scoring::default();
    let mut rng = StdRng::seed_from_u64(0xDEAD_BEEF_0005);
    let mut mat = DpMatrix::new();
    for q in [15usize, 16, 17, 31, 32, 33] {
        // an all-A read makes padding lanes the only difference between
        // neighboring sizes
        let read = vec![0u8; q];
        let reference = random_seq(&mut rng, 40, false);
        fill_checked(&mut mat, &read, &reference, &sc, Precision::U8);
        let dp = ScalarDp::fill(&read, &reference, &sc);
        assert_h_parity(&mat, &dp, &read, &reference);
    }
}

#[test]
fn minimal_matrix_fills_both_ways() {
    let sc = Scoring::default();
    let mut mat = DpMatrix::new();

    let status = fill_checked(&mut mat, &[2], &[2], &sc, Precision::U8);
    match status {
        FillStatus::Ok(res) => {
            assert_eq!(res.best, 2);
            assert_eq!((res.best_row, res.best_col), (0, 0));
        }
        other => panic!("1x1 match fill failed: {other:?}"),
    }

    // a 1x1 mismatch never rises above the floor
    let status = fill_checked(&mut mat, &[2], &[3], &sc, Precision::U8);
    assert_eq!(status, FillStatus::Failed);
}

#[test]
fn all_mismatch_problem_fails() {
    let sc = Scoring::default();
    let mut mat = DpMatrix::new();
    let prof = QueryProfile::build(&[0u8; 8], &sc, Precision::U8).unwrap();
    let mut metrics = DpMetrics::new();
    let status = fill(&mut mat, &prof, &[3u8; 8], &sc, &mut metrics);
    assert_eq!(status, FillStatus::Failed);
    assert_eq!(metrics.dpfail, 1);
    assert_eq!(metrics.dpsucc, 0);
    assert_eq!(metrics.col, 8);
    assert_eq!(metrics.cell, 64);
}

#[test]
fn saturation_detected_in_u8_and_resolved_in_i16() {
    let sc = Scoring::default();
    let mut mat = DpMatrix::new();
    let mut metrics = DpMetrics::new();
    // 150 perfect matches score 300, past the biased 8-bit range
    let seq: Vec<u8> = (0..150).map(|i| (i % 4) as u8).collect();

    let prof = QueryProfile::build(&seq, &sc, Precision::U8).unwrap();
    assert_eq!(fill(&mut mat, &prof, &seq, &sc, &mut metrics), FillStatus::Saturated);
    assert_eq!(metrics.dpsat, 1);

    let prof = QueryProfile::build(&seq, &sc, Precision::I16).unwrap();
    match fill(&mut mat, &prof, &seq, &sc, &mut metrics) {
        FillStatus::Ok(res) => {
            assert_eq!(res.best, 300);
            assert_eq!((res.best_row, res.best_col), (149, 149));
        }
        other => panic!("16-bit retry failed: {other:?}"),
    }
    let dp = ScalarDp::fill(&seq, &seq, &sc);
    assert_h_parity(&mat, &dp, &seq, &seq);
}

//! End-to-end triad scenarios: build, verify, swap, parallel determinism

use approx::assert_abs_diff_eq;
use bf_artifacts::{
    payout_hash, CheckKind, LookupRow, Triad, TriadBuilder, Verifier,
};
use bf_math::{ModeSpec, OptimizeReport, OptimizerConfig, WeightOptimizer};

fn optimized(mode: &ModeSpec) -> (Vec<u64>, OptimizeReport) {
    let cfg = OptimizerConfig {
        seed: 42,
        ..OptimizerConfig::default()
    };
    WeightOptimizer::new(mode, cfg)
        .expect("valid preset")
        .optimize()
        .expect("expansion within depth bound")
}

fn build(mode: &ModeSpec, weights: &[u64], seed: u64) -> Triad {
    TriadBuilder::new(mode, weights, seed)
        .expect("weights match mode")
        .build()
        .expect("build succeeds")
}

// ═══════════════════════════════════════════════════════════════════════
// Every optimized mode yields a verifiable triad
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_all_modes_build_and_verify() {
    for mode in [ModeSpec::mild(), ModeSpec::sinful(), ModeSpec::demonic()] {
        let (weights, report) = optimized(&mode);
        let triad = build(&mode, &weights, 1234);
        let summary = Verifier::new(&mode, &weights)
            .expect("expansion within depth bound")
            .with_report(&report)
            .verify(&triad)
            .unwrap_or_else(|e| panic!("{} failed verification: {e}", mode.name));
        assert!(summary.empirical_rtp > 0.0, "{}", mode.name);
        assert_eq!(summary.payout_hash.len(), 64);
    }
}

#[test]
fn test_mild_single_draw_bands() {
    let mode = ModeSpec::mild();
    let (weights, report) = optimized(&mode);
    assert_eq!(report.relaxed_constraint, None);
    let triad = build(&mode, &weights, 7);
    let summary = Verifier::new(&mode, &weights)
        .expect("expansion within depth bound")
        .verify(&triad)
        .expect("mild triad verifies without waivers");
    // no respins, so the realized numbers equal the analytic ones
    assert_abs_diff_eq!(summary.empirical_rtp, 0.96, epsilon = mode.tolerance);
    assert!(summary.empirical_plb <= mode.plb_max);
}

// ═══════════════════════════════════════════════════════════════════════
// Respin-blind lookups are caught
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_naive_lookup_ignoring_respins_fails() {
    let mode = ModeSpec::sinful();
    let (weights, _) = optimized(&mode);
    let mut triad = build(&mode, &weights, 7);

    // lookup rebuilt from the strip alone, as if no bonus peg existed
    let payouts = mode.bucket_payouts_cents();
    triad.lookup = (0..triad.strip.len())
        .map(|j| LookupRow {
            id: j as u64 + 1,
            weight: 1,
            payout_cents: payouts[triad.strip.bucket_at(j) as usize],
        })
        .collect();

    let err = Verifier::new(&mode, &weights)
        .expect("expansion within depth bound")
        .verify(&triad)
        .expect_err("respin payouts differ from base payouts somewhere");
    assert_eq!(err.kind, CheckKind::PayoutMismatchAt);
}

// ═══════════════════════════════════════════════════════════════════════
// Lookup swap between equivalent builds
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_lookup_swap_between_identical_builds() {
    let mode = ModeSpec::sinful();
    let (weights, _) = optimized(&mode);
    let t1 = build(&mode, &weights, 55);
    let mut t2 = build(&mode, &weights, 55);

    t2.swap_lookup(t1.lookup.clone())
        .expect("identical builds have identical payout columns");
    Verifier::new(&mode, &weights)
        .expect("expansion within depth bound")
        .verify(&t2)
        .expect("swapped triad still verifies");

    let mut corrupted = t1.lookup.clone();
    corrupted[999].payout_cents = 777;
    let before = t2.lookup.clone();
    let err = t2.swap_lookup(corrupted).expect_err("corruption detected");
    assert_eq!(err.kind, CheckKind::PayoutMismatchAt);
    assert_eq!(err.index, Some(999));
    assert_eq!(t2.lookup, before, "rejected swap must not mutate");
}

// ═══════════════════════════════════════════════════════════════════════
// Worker count never changes the artifacts
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_parallel_build_is_byte_identical() {
    let mode = ModeSpec::demonic();
    let (weights, _) = optimized(&mode);
    let reference = TriadBuilder::new(&mode, &weights, 99)
        .expect("weights match mode")
        .workers(1)
        .build()
        .expect("build succeeds");
    for k in [4, 16] {
        let other = TriadBuilder::new(&mode, &weights, 99)
            .expect("weights match mode")
            .workers(k)
            .build()
            .expect("build succeeds");
        assert_eq!(other.strip.to_text(), reference.strip.to_text());
        assert_eq!(other.books, reference.books, "books diverged at k={k}");
        assert_eq!(other.lookup, reference.lookup, "lookup diverged at k={k}");
    }
}

#[test]
fn test_same_seed_same_hash_across_runs() {
    let mode = ModeSpec::sinful();
    let (weights, _) = optimized(&mode);
    let h1 = payout_hash(build(&mode, &weights, 3).books.iter().map(|b| b.payout_multiplier));
    let h2 = payout_hash(build(&mode, &weights, 3).books.iter().map(|b| b.payout_multiplier));
    assert_eq!(h1, h2);
    let h3 = payout_hash(build(&mode, &weights, 4).books.iter().map(|b| b.payout_multiplier));
    assert_ne!(h1, h3);
}

// ═══════════════════════════════════════════════════════════════════════
// Strip multiset carries the weights through shuffling and respins
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_strip_multiset_equals_weights() {
    for mode in [ModeSpec::mild(), ModeSpec::demonic()] {
        let (weights, _) = optimized(&mode);
        let triad = build(&mode, &weights, 21);
        assert_eq!(triad.strip.counts(mode.bucket_count()), weights);
        assert_eq!(triad.strip.len() as u64, weights.iter().sum::<u64>());
    }
}

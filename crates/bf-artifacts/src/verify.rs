//! Equivalence verifier for built triads
//!
//! Pure reporter: checks that the lookup mirrors the books, that the
//! strip carries the optimizer weights, and that the realized numbers
//! sit inside the mode's declared bands. Never mutates artifacts.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use bf_math::{
    expand, ExpandParams, ModeSpec, OptimizeReport, PayoutDist, RelaxedConstraint, TruncationError,
};

use crate::builder::Triad;

/// Which equivalence check failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    LengthMismatch,
    PayoutMismatchAt,
    HashMismatch,
    MultisetMismatch,
    RtpOutOfBand,
    PlbOverCeiling,
}

fn fmt_index(index: &Option<u64>) -> String {
    index.map(|i| format!(" at index {i}")).unwrap_or_default()
}

/// A failed check with the values that disagreed
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{kind:?}{}: expected {expected}, got {actual}", fmt_index(.index))]
pub struct EquivalenceError {
    pub kind: CheckKind,
    pub index: Option<u64>,
    pub expected: String,
    pub actual: String,
}

impl EquivalenceError {
    pub fn new(kind: CheckKind, index: Option<u64>, expected: String, actual: String) -> Self {
        Self {
            kind,
            index,
            expected,
            actual,
        }
    }
}

/// Numbers observed during a passing verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifySummary {
    pub empirical_rtp: f64,
    pub empirical_plb: f64,
    /// Hex SHA-256 of the payout column under the canonical encoding
    pub payout_hash: String,
}

/// SHA-256 over the payout column, each payout as little-endian i64
pub fn payout_hash<I: IntoIterator<Item = i64>>(payouts: I) -> String {
    let mut hasher = Sha256::new();
    for c in payouts {
        hasher.update(c.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Verifier for one mode's triad against its optimizer weights
pub struct Verifier {
    mode: ModeSpec,
    weights: Vec<u64>,
    dist: PayoutDist,
    allow_plb_over: bool,
}

impl Verifier {
    /// Expansion happens once here; the checks reuse the distribution
    pub fn new(mode: &ModeSpec, weights: &[u64]) -> Result<Self, TruncationError> {
        let total: u64 = weights.iter().sum();
        let probs: Vec<f64> = weights.iter().map(|&w| w as f64 / total as f64).collect();
        let dist = expand(
            &probs,
            &mode.bucket_payouts_cents(),
            &ExpandParams::for_respin_p(mode.respin_p),
        )?;
        Ok(Self {
            mode: mode.clone(),
            weights: weights.to_vec(),
            dist,
            allow_plb_over: false,
        })
    }

    /// Accept a ceiling the optimizer reported as relaxed
    pub fn with_report(mut self, report: &OptimizeReport) -> Self {
        if report.relaxed_constraint == Some(RelaxedConstraint::PlbCeiling) {
            self.allow_plb_over = true;
        }
        self
    }

    /// Run all checks in order; first failure wins
    pub fn verify(&self, triad: &Triad) -> Result<VerifySummary, EquivalenceError> {
        self.check_length(triad)?;
        self.check_rows(triad)?;
        let hash = self.check_hash(triad)?;
        self.check_multiset(triad)?;
        let empirical_rtp = self.check_rtp(triad)?;
        let empirical_plb = self.check_plb(triad)?;
        Ok(VerifySummary {
            empirical_rtp,
            empirical_plb,
            payout_hash: hash,
        })
    }

    fn check_length(&self, triad: &Triad) -> Result<(), EquivalenceError> {
        let n = triad.strip.len();
        for got in [triad.books.len(), triad.lookup.len()] {
            if got != n {
                return Err(EquivalenceError::new(
                    CheckKind::LengthMismatch,
                    None,
                    n.to_string(),
                    got.to_string(),
                ));
            }
        }
        Ok(())
    }

    fn check_rows(&self, triad: &Triad) -> Result<(), EquivalenceError> {
        for (j, (book, row)) in triad.books.iter().zip(&triad.lookup).enumerate() {
            if row.payout_cents != book.payout_multiplier {
                return Err(EquivalenceError::new(
                    CheckKind::PayoutMismatchAt,
                    Some(j as u64),
                    book.payout_multiplier.to_string(),
                    row.payout_cents.to_string(),
                ));
            }
        }
        Ok(())
    }

    fn check_hash(&self, triad: &Triad) -> Result<String, EquivalenceError> {
        let books_hash = payout_hash(triad.books.iter().map(|b| b.payout_multiplier));
        let lookup_hash = payout_hash(triad.lookup.iter().map(|r| r.payout_cents));
        if books_hash != lookup_hash {
            return Err(EquivalenceError::new(
                CheckKind::HashMismatch,
                None,
                books_hash,
                lookup_hash,
            ));
        }
        Ok(books_hash)
    }

    fn check_multiset(&self, triad: &Triad) -> Result<(), EquivalenceError> {
        let counts = triad.strip.counts(self.mode.bucket_count());
        if counts != self.weights {
            let bucket = counts
                .iter()
                .zip(&self.weights)
                .position(|(c, w)| c != w)
                .unwrap_or(0);
            return Err(EquivalenceError::new(
                CheckKind::MultisetMismatch,
                Some(bucket as u64),
                self.weights[bucket].to_string(),
                counts[bucket].to_string(),
            ));
        }
        Ok(())
    }

    /// Weights must sit in the target band analytically, and the books'
    /// realized mean must sit inside sampling noise of the analytic mean
    fn check_rtp(&self, triad: &Triad) -> Result<f64, EquivalenceError> {
        let bet = self.mode.bet_in_cents();
        let analytic_rtp = self.dist.rtp(bet);
        if (analytic_rtp - self.mode.rtp_target).abs() > self.mode.tolerance {
            return Err(EquivalenceError::new(
                CheckKind::RtpOutOfBand,
                None,
                format!("{:.6}±{:.6}", self.mode.rtp_target, self.mode.tolerance),
                format!("{analytic_rtp:.6}"),
            ));
        }

        let n = triad.books.len().max(1);
        let sum: i128 = triad
            .books
            .iter()
            .map(|b| b.payout_multiplier as i128)
            .sum();
        let empirical_mean = sum as f64 / n as f64;
        let analytic_mean = analytic_rtp * bet as f64;
        let variance: f64 = self
            .dist
            .iter()
            .map(|(c, p)| p * (c as f64 - analytic_mean).powi(2))
            .sum();
        let band = 3.0 * (variance / n as f64).sqrt() + 1e-6;
        if (empirical_mean - analytic_mean).abs() > band {
            return Err(EquivalenceError::new(
                CheckKind::RtpOutOfBand,
                None,
                format!("{analytic_mean:.2}±{band:.2} cents"),
                format!("{empirical_mean:.2} cents"),
            ));
        }
        Ok(empirical_mean / bet as f64)
    }

    /// Realized prob-less-bet stays under the ceiling plus 0.5% slack
    fn check_plb(&self, triad: &Triad) -> Result<f64, EquivalenceError> {
        let bet = self.mode.bet_in_cents();
        let n = triad.books.len().max(1);
        let below = triad
            .books
            .iter()
            .filter(|b| b.payout_multiplier < bet)
            .count();
        let empirical_plb = below as f64 / n as f64;
        let ceiling = self.mode.plb_max + 0.005;
        if empirical_plb > ceiling && !self.allow_plb_over {
            return Err(EquivalenceError::new(
                CheckKind::PlbOverCeiling,
                None,
                format!("<= {ceiling:.4}"),
                format!("{empirical_plb:.4}"),
            ));
        }
        Ok(empirical_plb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TriadBuilder;

    fn feasible_mild_weights() -> Vec<u64> {
        optimize_mild().0
    }

    fn optimize_mild() -> (Vec<u64>, OptimizeReport) {
        let mode = ModeSpec::mild();
        let cfg = bf_math::OptimizerConfig {
            seed: 1,
            ..Default::default()
        };
        bf_math::WeightOptimizer::new(&mode, cfg)
            .unwrap()
            .optimize()
            .unwrap()
    }

    #[test]
    fn test_payout_hash_is_order_sensitive() {
        let a = payout_hash([100, 200]);
        let b = payout_hash([200, 100]);
        assert_ne!(a, b);
        assert_eq!(a, payout_hash([100, 200]));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_built_triad_passes() {
        let mode = ModeSpec::mild();
        let weights = feasible_mild_weights();
        let triad = TriadBuilder::new(&mode, &weights, 17)
            .unwrap()
            .build()
            .unwrap();
        let summary = Verifier::new(&mode, &weights).unwrap().verify(&triad).unwrap();
        assert!((summary.empirical_rtp - 0.96).abs() <= mode.tolerance);
        assert!(summary.empirical_plb <= mode.plb_max);
    }

    #[test]
    fn test_corrupted_lookup_detected() {
        let mode = ModeSpec::mild();
        let weights = feasible_mild_weights();
        let mut triad = TriadBuilder::new(&mode, &weights, 17)
            .unwrap()
            .build()
            .unwrap();
        triad.lookup[42].payout_cents += 100;
        let err = Verifier::new(&mode, &weights)
            .unwrap()
            .verify(&triad)
            .unwrap_err();
        assert_eq!(err.kind, CheckKind::PayoutMismatchAt);
        assert_eq!(err.index, Some(42));
    }

    #[test]
    fn test_truncated_lookup_detected() {
        let mode = ModeSpec::mild();
        let weights = feasible_mild_weights();
        let mut triad = TriadBuilder::new(&mode, &weights, 17)
            .unwrap()
            .build()
            .unwrap();
        triad.lookup.pop();
        let err = Verifier::new(&mode, &weights)
            .unwrap()
            .verify(&triad)
            .unwrap_err();
        assert_eq!(err.kind, CheckKind::LengthMismatch);
    }

    #[test]
    fn test_wrong_weights_fail_multiset() {
        let mode = ModeSpec::mild();
        let weights = feasible_mild_weights();
        let triad = TriadBuilder::new(&mode, &weights, 17)
            .unwrap()
            .build()
            .unwrap();
        let mut other = weights.clone();
        other[0] += 1;
        other[16] -= 1;
        let err = Verifier::new(&mode, &other).unwrap().verify(&triad).unwrap_err();
        assert_eq!(err.kind, CheckKind::MultisetMismatch);
    }

    #[test]
    fn test_off_target_weights_fail_rtp() {
        let mode = ModeSpec::mild();
        // all mass in the center: rtp far below 0.96
        let mut weights = vec![0u64; 17];
        weights[8] = 1000;
        let triad = TriadBuilder::new(&mode, &weights, 17)
            .unwrap()
            .build()
            .unwrap();
        let err = Verifier::new(&mode, &weights).unwrap().verify(&triad).unwrap_err();
        assert_eq!(err.kind, CheckKind::RtpOutOfBand);
    }
}

//! Integer weight optimization over payout buckets
//!
//! Two-stage search: a discretized-Gaussian seed whose scale is fit by a
//! 1-D search on RTP error, then steepest coordinate-swap refinement that
//! moves single weight units between buckets. All RTP / prob-less-bet
//! evaluation goes through the compound expander, so respin modes are
//! optimized against their true payout distribution.

use serde::{Deserialize, Serialize};

use crate::expander::{ExpandParams, MemoExpander, TruncationError};
use crate::mode::{ConfigError, ModeSpec};

const SIGMA_LO: f64 = 0.4;
const SIGMA_HI: f64 = 4.0;
const SIGMA_STEP: f64 = 0.05;
const SIGMA_REFINE: [f64; 3] = [0.02, 0.005, 0.001];
const MARGIN_RESTARTS: usize = 3;
// integer weights quantize the achievable house edge, so gaps get the
// same 0.1% slack the empirical margin check grants
const MARGIN_SLACK: f64 = 1e-3;

/// Search knobs; defaults match the published table scale
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Total integer weight to distribute (table length)
    pub total_weight: u64,
    /// Seed for deterministic tie-breaking during rounding
    pub seed: u64,
    /// Cap on refinement sweeps
    pub max_sweeps: usize,
    /// Penalty factor on ceiling violations in the reported residual
    pub lambda: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            total_weight: 100_000,
            seed: 0,
            max_sweeps: 400,
            lambda: 1e3,
        }
    }
}

/// Which constraint the optimizer could not satisfy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelaxedConstraint {
    /// Achieved RTP left the target band
    RtpTolerance,
    /// Prob-less-bet ended above the ceiling
    PlbCeiling,
}

/// Outcome summary returned alongside the weights
///
/// Infeasibility is reported through `relaxed_constraint`, never by
/// silently widening a band and never as an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeReport {
    pub rtp_achieved: f64,
    pub plb_achieved: f64,
    pub margin_satisfied: bool,
    /// Final objective value: squared RTP error plus the λ-weighted
    /// squared ceiling violation
    pub residual_error: f64,
    pub relaxed_constraint: Option<RelaxedConstraint>,
}

/// Achieved house edges of already-optimized neighboring modes
#[derive(Debug, Clone, Default)]
pub struct CrossModeContext {
    achieved: std::collections::BTreeMap<String, f64>,
}

impl CrossModeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mode's achieved house edge
    pub fn record(&mut self, name: &str, house_edge: f64) {
        self.achieved.insert(name.to_string(), house_edge);
    }

    pub fn house_edge(&self, name: &str) -> Option<f64> {
        self.achieved.get(name).copied()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OptimizeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Truncation(#[from] TruncationError),
}

/// Weight search over one mode's buckets
pub struct WeightOptimizer {
    payouts_cents: Vec<i64>,
    bet_cents: i64,
    rtp_target: f64,
    plb_max: f64,
    tolerance: f64,
    config: OptimizerConfig,
    memo: MemoExpander,
}

impl WeightOptimizer {
    pub fn new(mode: &ModeSpec, config: OptimizerConfig) -> Result<Self, ConfigError> {
        mode.validate()?;
        let payouts_cents = mode.bucket_payouts_cents();
        let memo = MemoExpander::new(
            ExpandParams::for_respin_p(mode.respin_p),
            payouts_cents.clone(),
        );
        Ok(Self {
            payouts_cents,
            bet_cents: mode.bet_in_cents(),
            rtp_target: mode.rtp_target,
            plb_max: mode.plb_max,
            tolerance: mode.tolerance,
            config,
            memo,
        })
    }

    /// Run the search and report the best point found
    pub fn optimize(&mut self) -> Result<(Vec<u64>, OptimizeReport), OptimizeError> {
        self.optimize_toward(self.rtp_target)
    }

    /// Optimize, then re-run with a shifted RTP target if the achieved
    /// house edge lands too close to an already-optimized neighbor
    pub fn optimize_with_context(
        &mut self,
        mode: &ModeSpec,
        ctx: &CrossModeContext,
    ) -> Result<(Vec<u64>, OptimizeReport), OptimizeError> {
        let (mut weights, mut report) = self.optimize()?;
        for _ in 0..MARGIN_RESTARTS {
            match self.margin_violation(mode, ctx, 1.0 - report.rtp_achieved) {
                None => {
                    report.margin_satisfied = true;
                    return Ok((weights, report));
                }
                Some(shifted_target) => {
                    log::warn!(
                        "{}: house-edge margin violated, restarting toward rtp {:.4}",
                        mode.name,
                        shifted_target
                    );
                    (weights, report) = self.optimize_toward(shifted_target)?;
                }
            }
        }
        report.margin_satisfied = self
            .margin_violation(mode, ctx, 1.0 - report.rtp_achieved)
            .is_none();
        Ok((weights, report))
    }

    /// First neighbor whose house-edge gap is under spec, expressed as
    /// the shifted RTP target that would restore the gap
    fn margin_violation(
        &self,
        mode: &ModeSpec,
        ctx: &CrossModeContext,
        own_he: f64,
    ) -> Option<f64> {
        for n in &mode.neighbors {
            let Some(their_he) = ctx.house_edge(&n.name) else {
                continue;
            };
            if (own_he - their_he).abs() >= n.gap - MARGIN_SLACK {
                continue;
            }
            // widen the gap in the direction it already leans
            let shifted_he = if own_he >= their_he {
                their_he + n.gap
            } else {
                their_he - n.gap
            };
            return Some(1.0 - shifted_he);
        }
        None
    }

    fn optimize_toward(&mut self, target: f64) -> Result<(Vec<u64>, OptimizeReport), OptimizeError> {
        let sigma = self.fit_sigma(target)?;
        let mut weights = self.round_weights(&gaussian_probs(self.payouts_cents.len(), sigma));
        let (mut rtp, mut plb) = self.measure(&weights)?;
        log::debug!("seed sigma={sigma:.3} rtp={rtp:.6} plb={plb:.6}");

        let k = self.payouts_cents.len();
        for _sweep in 0..self.config.max_sweeps {
            let err = rtp - target;
            let lowering = err > 0.0;
            let mut donors: Vec<usize> = (0..k).filter(|&i| weights[i] > 1).collect();
            donors.sort_by_key(|&i| {
                if lowering {
                    -self.payouts_cents[i]
                } else {
                    self.payouts_cents[i]
                }
            });

            let mut improved = false;
            'donor: for &d in &donors {
                let mut recips: Vec<usize> = (0..k)
                    .filter(|&j| {
                        (self.payouts_cents[j] < self.payouts_cents[d]) == lowering
                            && self.payouts_cents[j] != self.payouts_cents[d]
                    })
                    .collect();
                recips.sort_by_key(|&j| {
                    if lowering {
                        self.payouts_cents[j]
                    } else {
                        -self.payouts_cents[j]
                    }
                });
                for &r in &recips {
                    weights[d] -= 1;
                    weights[r] += 1;
                    let (r2, p2) = self.measure(&weights)?;
                    // never cross the ceiling from below; never worsen above it
                    let plb_ok = p2 <= self.plb_max || p2 <= plb;
                    if (r2 - target).abs() < err.abs() && plb_ok {
                        rtp = r2;
                        plb = p2;
                        improved = true;
                        break 'donor;
                    }
                    weights[d] += 1;
                    weights[r] -= 1;
                }
            }
            if !improved {
                break;
            }
        }

        let relaxed = if (rtp - self.rtp_target).abs() > self.tolerance {
            Some(RelaxedConstraint::RtpTolerance)
        } else if plb > self.plb_max {
            Some(RelaxedConstraint::PlbCeiling)
        } else {
            None
        };
        let rtp_err = rtp - self.rtp_target;
        let ceiling_excess = (plb - self.plb_max).max(0.0);
        let report = OptimizeReport {
            rtp_achieved: rtp,
            plb_achieved: plb,
            margin_satisfied: true,
            residual_error: rtp_err * rtp_err + self.config.lambda * ceiling_excess * ceiling_excess,
            relaxed_constraint: relaxed,
        };
        Ok((weights, report))
    }

    /// 1-D search for the Gaussian scale whose *rounded* weights come
    /// closest to the target RTP
    ///
    /// Fitting on the rounded weights matters: min-weight floors on the
    /// extreme buckets shift compound RTP by far more than the rounding
    /// of any interior bucket.
    fn fit_sigma(&mut self, target: f64) -> Result<f64, OptimizeError> {
        let k = self.payouts_cents.len();
        let mut best = (SIGMA_LO, f64::INFINITY);
        let mut sigma = SIGMA_LO;
        while sigma <= SIGMA_HI + 1e-12 {
            let e = self.rounded_rtp_err(k, sigma, target)?;
            if e < best.1 {
                best = (sigma, e);
            }
            sigma += SIGMA_STEP;
        }
        for step in SIGMA_REFINE {
            for s in [
                best.0 - 2.0 * step,
                best.0 - step,
                best.0 + step,
                best.0 + 2.0 * step,
            ] {
                let e = self.rounded_rtp_err(k, s, target)?;
                if e < best.1 {
                    best = (s, e);
                }
            }
        }
        Ok(best.0)
    }

    fn rounded_rtp_err(&mut self, k: usize, sigma: f64, target: f64) -> Result<f64, OptimizeError> {
        let w = self.round_weights(&gaussian_probs(k, sigma));
        let (rtp, _) = self.measure(&w)?;
        Ok((rtp - target).abs())
    }

    fn measure(&mut self, weights: &[u64]) -> Result<(f64, f64), OptimizeError> {
        let dist = self.memo.expand_weights(weights)?;
        Ok((dist.rtp(self.bet_cents), dist.prob_less_bet(self.bet_cents)))
    }

    /// Round probabilities to integer weights summing to `total_weight`
    ///
    /// Floors each share, forces a minimum of 1 so every bucket stays
    /// reachable, then hands the deficit out by descending fractional
    /// part (ties broken by the seeded hash).
    fn round_weights(&self, probs: &[f64]) -> Vec<u64> {
        let total = self.config.total_weight;
        let mut w: Vec<u64> = probs
            .iter()
            .map(|p| ((p * total as f64) as u64).max(1))
            .collect();
        let mut deficit = total as i64 - w.iter().sum::<u64>() as i64;

        let mut order: Vec<usize> = (0..probs.len()).collect();
        order.sort_by(|&a, &b| {
            let fa = (probs[a] * total as f64).fract();
            let fb = (probs[b] * total as f64).fract();
            fb.partial_cmp(&fa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let ha = splitmix64(self.config.seed ^ (a as u64).wrapping_mul(0x9E3779B97F4A7C15));
                    let hb = splitmix64(self.config.seed ^ (b as u64).wrapping_mul(0x9E3779B97F4A7C15));
                    ha.cmp(&hb)
                })
        });
        let mut i = 0;
        while deficit > 0 {
            w[order[i % order.len()]] += 1;
            deficit -= 1;
            i += 1;
        }
        while deficit < 0 {
            // the min-1 floor can overshoot; shave the heaviest bucket
            if let Some(j) = (0..w.len()).max_by_key(|&j| w[j]) {
                w[j] -= 1;
                deficit += 1;
            }
        }
        w
    }
}

/// Discretized Gaussian bell over `k` buckets, centered
fn gaussian_probs(k: usize, sigma: f64) -> Vec<f64> {
    let c = (k - 1) as f64 / 2.0;
    let raw: Vec<f64> = (0..k)
        .map(|i| (-((i as f64 - c).powi(2)) / (2.0 * sigma * sigma)).exp())
        .collect();
    let z: f64 = raw.iter().sum();
    raw.into_iter().map(|x| x / z).collect()
}

fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E3779B97F4A7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

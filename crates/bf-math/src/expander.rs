//! Compound-outcome expansion for bonus-peg respin chains
//!
//! A drop that lands on the bonus peg earns a respin whose bonus
//! probability decays geometrically. Expansion folds those chains into a
//! single payout distribution so the optimizer and verifier can treat a
//! respin mode exactly like a single-draw mode.

use std::collections::{BTreeMap, HashMap};

use log::debug;

/// Compound-payout distribution: payout cents mapped to probability
///
/// Always normalized; total mass sums to 1 within 1e-9.
#[derive(Debug, Clone, PartialEq)]
pub struct PayoutDist {
    mass: BTreeMap<i64, f64>,
}

impl PayoutDist {
    /// Build directly from parallel probability / payout slices
    ///
    /// Zero-probability entries are dropped; equal payouts merge.
    pub fn from_buckets(probs: &[f64], payouts_cents: &[i64]) -> Self {
        let mut mass = BTreeMap::new();
        for (&p, &c) in probs.iter().zip(payouts_cents) {
            if p > 0.0 {
                *mass.entry(c).or_insert(0.0) += p;
            }
        }
        Self { mass }
    }

    /// Expected payout divided by the stake
    pub fn rtp(&self, bet_cents: i64) -> f64 {
        let ev: f64 = self.mass.iter().map(|(&c, &p)| p * c as f64).sum();
        ev / bet_cents as f64
    }

    /// Probability of a payout strictly below the stake
    pub fn prob_less_bet(&self, bet_cents: i64) -> f64 {
        self.mass.range(..bet_cents).map(|(_, &p)| p).sum()
    }

    /// Total probability mass (1.0 after expansion)
    pub fn total_mass(&self) -> f64 {
        self.mass.values().sum()
    }

    /// Distinct payouts in ascending order
    pub fn payouts(&self) -> impl Iterator<Item = i64> + '_ {
        self.mass.keys().copied()
    }

    /// Iterate `(payout_cents, probability)` in ascending payout order
    pub fn iter(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.mass.iter().map(|(&c, &p)| (c, p))
    }

    /// Probability of exactly `payout_cents`
    pub fn prob_of(&self, payout_cents: i64) -> f64 {
        self.mass.get(&payout_cents).copied().unwrap_or(0.0)
    }

    fn normalize(&mut self) {
        let s = self.total_mass();
        if s > 0.0 {
            for p in self.mass.values_mut() {
                *p /= s;
            }
        }
    }

    /// Convolve with a base single-draw distribution (payouts add)
    fn convolve(&self, base: &BTreeMap<i64, f64>) -> BTreeMap<i64, f64> {
        let mut out = BTreeMap::new();
        for (&c1, &p1) in &self.mass {
            for (&c2, &p2) in base {
                *out.entry(c1 + c2).or_insert(0.0) += p1 * p2;
            }
        }
        out
    }
}

/// Expansion parameters for the truncating-with-diminishing-bonus scheme
#[derive(Debug, Clone, Copy)]
pub struct ExpandParams {
    /// First-draw bonus-peg probability
    pub respin_p: f64,
    /// Geometric decay of the bonus probability per respin
    pub decay: f64,
    /// Hard cap on enumerated respins per chain
    pub max_respins: usize,
    /// Ceiling on the probability mass of chains longer than the cap
    pub residual_tol: f64,
}

impl ExpandParams {
    /// Standard scheme: halving decay, five respins max, 1e-6 residual
    pub fn for_respin_p(respin_p: f64) -> Self {
        Self {
            respin_p,
            decay: 0.5,
            max_respins: 5,
            residual_tol: 1e-6,
        }
    }

    /// Bonus probability of the k-th respin (k is 1-based)
    fn beta(&self, k: usize) -> f64 {
        self.respin_p * self.decay.powi(k as i32 - 1)
    }
}

/// Chains past the enumeration cap still carry too much probability
#[derive(Debug, Clone, thiserror::Error)]
#[error("truncated chain mass {residual:.3e} exceeds {tolerance:.1e} at {max_respins} respins")]
pub struct TruncationError {
    pub residual: f64,
    pub tolerance: f64,
    pub max_respins: usize,
}

/// Expand a per-bucket distribution into its compound-payout distribution
///
/// A chain of `n` respins makes `n + 1` draws; its payout is the sum of
/// the drawn bucket payouts and its probability carries the factor
/// `∏_{k≤n} β_k · (1 − β_{n+1})`. Enumeration depth is the smallest `n`
/// whose residual chain mass `∏_{k≤n+1} β_k` falls under the tolerance;
/// if even `max_respins` leaves too much mass the expansion fails rather
/// than silently dropping it.
pub fn expand(
    probs: &[f64],
    payouts_cents: &[i64],
    params: &ExpandParams,
) -> Result<PayoutDist, TruncationError> {
    let base = PayoutDist::from_buckets(probs, payouts_cents);
    if params.respin_p == 0.0 {
        let mut dist = base;
        dist.normalize();
        return Ok(dist);
    }

    let residual_at = |depth: usize| -> f64 {
        (1..=depth + 1).map(|k| params.beta(k)).product()
    };

    let mut depth = 1;
    while depth < params.max_respins && residual_at(depth) >= params.residual_tol {
        depth += 1;
    }
    let residual = residual_at(depth);
    if residual >= params.residual_tol {
        return Err(TruncationError {
            residual,
            tolerance: params.residual_tol,
            max_respins: params.max_respins,
        });
    }
    debug!(
        "expanding respin_p={} to depth {} (residual {:.3e})",
        params.respin_p, depth, residual
    );

    let mut out: BTreeMap<i64, f64> = BTreeMap::new();
    // conv holds the payout distribution of n + 1 summed draws
    let mut conv = base.clone();
    for n in 0..=depth {
        let chain_p: f64 = (1..=n).map(|k| params.beta(k)).product();
        let terminate = 1.0 - params.beta(n + 1);
        for (c, p) in conv.iter() {
            *out.entry(c).or_insert(0.0) += chain_p * terminate * p;
        }
        if n < depth {
            conv = PayoutDist {
                mass: conv.convolve(&base.mass),
            };
        }
    }

    let mut dist = PayoutDist { mass: out };
    dist.normalize();
    Ok(dist)
}

/// Memoizing wrapper around [`expand`] keyed by the integer weight vector
///
/// The optimizer re-evaluates near-identical weight vectors thousands of
/// times per run; the cache turns repeat evaluations into a map lookup.
pub struct MemoExpander {
    params: ExpandParams,
    payouts_cents: Vec<i64>,
    cache: HashMap<Vec<u64>, PayoutDist>,
}

impl MemoExpander {
    pub fn new(params: ExpandParams, payouts_cents: Vec<i64>) -> Self {
        Self {
            params,
            payouts_cents,
            cache: HashMap::new(),
        }
    }

    /// Expand the normalized form of an integer weight vector
    pub fn expand_weights(&mut self, weights: &[u64]) -> Result<&PayoutDist, TruncationError> {
        if !self.cache.contains_key(weights) {
            let total: u64 = weights.iter().sum();
            let probs: Vec<f64> = weights.iter().map(|&w| w as f64 / total as f64).collect();
            let dist = expand(&probs, &self.payouts_cents, &self.params)?;
            self.cache.insert(weights.to_vec(), dist);
        }
        Ok(&self.cache[weights])
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

//! Volatility mode specs and load-time validation

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Margin requirement against a neighboring volatility mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborSpec {
    /// Name of the neighboring mode
    pub name: String,
    /// Required minimum house-edge gap to that neighbor
    pub gap: f64,
}

/// Immutable numeric description of one volatility mode
///
/// Carries the ordered bucket multipliers (symmetric around the center
/// bucket), the bet cost, the bonus-peg respin probability, and the
/// optimization targets. All payout math downstream works in integer
/// cents derived from these multipliers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeSpec {
    /// Mode name (e.g. "mild", "sinful", "demonic"); defaults to the
    /// document key when omitted
    #[serde(default)]
    pub name: String,
    /// Bucket multipliers, mirrored: `m[i] == m[K-1-i]`, K odd
    pub multipliers: Vec<f64>,
    /// Stake per spin, in bet units
    pub bet_cost: f64,
    /// Bonus-peg respin probability in `[0, 1)`
    #[serde(default)]
    pub respin_p: f64,
    /// Target return-to-player
    pub rtp_target: f64,
    /// Ceiling on the probability of winning strictly less than the stake
    pub plb_max: f64,
    /// Allowed absolute RTP deviation
    pub tolerance: f64,
    /// Margin constraints against neighboring modes
    #[serde(default)]
    pub neighbors: Vec<NeighborSpec>,
}

/// Mode spec validation failure
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("mode '{0}' not found in spec document")]
    UnknownMode(String),

    #[error("bucket count {0} must be odd")]
    EvenBucketCount(usize),

    #[error("multiplier table is not symmetric at index {0}")]
    AsymmetricMultipliers(usize),

    #[error("negative multiplier {value} at index {index}")]
    NegativeMultiplier { index: usize, value: f64 },

    #[error("respin probability {0} outside [0, 1)")]
    RespinOutOfRange(f64),

    #[error("{field} = {value} outside (0, 1]")]
    ProbabilityOutOfRange { field: &'static str, value: f64 },

    #[error("bet cost {0} must be positive")]
    NonPositiveBet(f64),

    #[error("failed to read mode spec: {0}")]
    Io(String),

    #[error("failed to parse mode spec: {0}")]
    Parse(String),
}

impl ModeSpec {
    /// Mild volatility: 666x wincap, frequent 1-2x wins, no bonus peg
    pub fn mild() -> Self {
        Self {
            name: "mild".into(),
            multipliers: vec![
                666.0, 150.0, 60.0, 20.0, 8.0, 4.0, 2.0, 1.0, 0.5, 1.0, 2.0, 4.0, 8.0, 20.0, 60.0,
                150.0, 666.0,
            ],
            bet_cost: 1.0,
            respin_p: 0.0,
            rtp_target: 0.96,
            plb_max: 0.79,
            tolerance: 0.005,
            neighbors: vec![NeighborSpec {
                name: "sinful".into(),
                gap: 0.005,
            }],
        }
    }

    /// Sinful volatility: 1666x wincap, 8% bonus peg
    pub fn sinful() -> Self {
        Self {
            name: "sinful".into(),
            multipliers: vec![
                1666.0, 400.0, 120.0, 40.0, 12.0, 4.0, 2.0, 0.5, 0.2, 0.5, 2.0, 4.0, 12.0, 40.0,
                120.0, 400.0, 1666.0,
            ],
            bet_cost: 1.0,
            respin_p: 0.08,
            rtp_target: 0.955,
            plb_max: 0.79,
            tolerance: 0.005,
            neighbors: vec![
                NeighborSpec {
                    name: "mild".into(),
                    gap: 0.005,
                },
                NeighborSpec {
                    name: "demonic".into(),
                    gap: 0.005,
                },
            ],
        }
    }

    /// Demonic volatility: 16666x wincap, three dead center buckets, 12% bonus peg
    pub fn demonic() -> Self {
        Self {
            name: "demonic".into(),
            multipliers: vec![
                16666.0, 2500.0, 600.0, 150.0, 40.0, 8.0, 2.0, 0.0, 0.0, 0.0, 2.0, 8.0, 40.0,
                150.0, 600.0, 2500.0, 16666.0,
            ],
            bet_cost: 1.0,
            respin_p: 0.12,
            rtp_target: 0.95,
            plb_max: 0.79,
            tolerance: 0.005,
            neighbors: vec![NeighborSpec {
                name: "sinful".into(),
                gap: 0.005,
            }],
        }
    }

    /// Look up a built-in preset by name
    pub fn preset(name: &str) -> Result<Self, ConfigError> {
        let spec = match name {
            "mild" => Self::mild(),
            "sinful" => Self::sinful(),
            "demonic" => Self::demonic(),
            other => return Err(ConfigError::UnknownMode(other.to_string())),
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Number of buckets
    pub fn bucket_count(&self) -> usize {
        self.multipliers.len()
    }

    /// Stake in integer cents
    pub fn bet_in_cents(&self) -> i64 {
        (self.bet_cost * 100.0).round() as i64
    }

    /// Ordered per-bucket payouts in integer cents
    pub fn bucket_payouts_cents(&self) -> Vec<i64> {
        self.multipliers
            .iter()
            .map(|m| (m * 100.0).round() as i64)
            .collect()
    }

    /// Maximum single-draw payout in cents
    pub fn wincap_cents(&self) -> i64 {
        self.bucket_payouts_cents().into_iter().max().unwrap_or(0)
    }

    /// Validate the spec; all semantics assume a valid spec
    pub fn validate(&self) -> Result<(), ConfigError> {
        let k = self.multipliers.len();
        if k % 2 == 0 || k == 0 {
            return Err(ConfigError::EvenBucketCount(k));
        }
        for (i, &m) in self.multipliers.iter().enumerate() {
            if m < 0.0 {
                return Err(ConfigError::NegativeMultiplier { index: i, value: m });
            }
            if (m - self.multipliers[k - 1 - i]).abs() > f64::EPSILON {
                return Err(ConfigError::AsymmetricMultipliers(i));
            }
        }
        if !(0.0..1.0).contains(&self.respin_p) {
            return Err(ConfigError::RespinOutOfRange(self.respin_p));
        }
        if self.bet_cost <= 0.0 {
            return Err(ConfigError::NonPositiveBet(self.bet_cost));
        }
        for (field, value) in [
            ("rtp_target", self.rtp_target),
            ("plb_max", self.plb_max),
            ("tolerance", self.tolerance),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::ProbabilityOutOfRange { field, value });
            }
        }
        Ok(())
    }
}

/// A mode spec document: modes keyed by name
///
/// External format is a JSON object `{ "<name>": { ...ModeSpec } }`; the
/// `name` field inside each entry is filled from the key when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModeBook {
    #[serde(flatten)]
    pub modes: BTreeMap<String, ModeSpec>,
}

impl ModeBook {
    /// Built-in presets for the three Plinko volatility modes
    pub fn builtin() -> Self {
        let mut modes = BTreeMap::new();
        for spec in [ModeSpec::mild(), ModeSpec::sinful(), ModeSpec::demonic()] {
            modes.insert(spec.name.clone(), spec);
        }
        Self { modes }
    }

    /// Parse and validate a mode spec document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let mut book: ModeBook =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        for (key, spec) in book.modes.iter_mut() {
            if spec.name.is_empty() {
                spec.name = key.clone();
            }
            spec.validate()?;
        }
        Ok(book)
    }

    /// Load a mode spec document from disk
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_json_str(&json)
    }

    /// Fetch one validated mode by name
    pub fn get(&self, name: &str) -> Result<&ModeSpec, ConfigError> {
        self.modes
            .get(name)
            .ok_or_else(|| ConfigError::UnknownMode(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        for name in ["mild", "sinful", "demonic"] {
            let spec = ModeSpec::preset(name).unwrap();
            assert_eq!(spec.bucket_count(), 17);
            assert_eq!(spec.bet_in_cents(), 100);
        }
    }

    #[test]
    fn test_payouts_are_cents() {
        let spec = ModeSpec::sinful();
        let payouts = spec.bucket_payouts_cents();
        assert_eq!(payouts[0], 166600);
        assert_eq!(payouts[8], 20); // 0.2x center
        assert_eq!(spec.wincap_cents(), 166600);
    }

    #[test]
    fn test_even_bucket_count_rejected() {
        let mut spec = ModeSpec::mild();
        spec.multipliers.pop();
        assert!(matches!(
            spec.validate(),
            Err(ConfigError::EvenBucketCount(16))
        ));
    }

    #[test]
    fn test_asymmetric_rejected() {
        let mut spec = ModeSpec::mild();
        spec.multipliers[1] = 151.0;
        assert!(matches!(
            spec.validate(),
            Err(ConfigError::AsymmetricMultipliers(_))
        ));
    }

    #[test]
    fn test_negative_multiplier_rejected() {
        let mut spec = ModeSpec::mild();
        spec.multipliers[8] = -0.5;
        assert!(matches!(
            spec.validate(),
            Err(ConfigError::NegativeMultiplier { index: 8, .. })
        ));
    }

    #[test]
    fn test_respin_range() {
        let mut spec = ModeSpec::mild();
        spec.respin_p = 1.0;
        assert!(matches!(
            spec.validate(),
            Err(ConfigError::RespinOutOfRange(_))
        ));
    }

    #[test]
    fn test_mode_book_roundtrip() {
        let book = ModeBook::builtin();
        let json = serde_json::to_string(&book).unwrap();
        let parsed = ModeBook::from_json_str(&json).unwrap();
        assert_eq!(parsed.modes.len(), 3);
        assert_eq!(parsed.get("demonic").unwrap().respin_p, 0.12);
        assert!(parsed.get("infernal").is_err());
    }
}

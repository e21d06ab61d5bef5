//! # bf-math — Bucket-payout math for BucketForge
//!
//! Core math for tuning bucket-payout games: volatility mode specs, the
//! compound-outcome expander for bonus-peg respin chains, and the integer
//! weight optimizer that hits a target RTP under a prob-less-bet ceiling.
//!
//! ## Architecture
//!
//! ```text
//! ModeSpec (multipliers, targets)
//!     │
//!     v
//! WeightOptimizer ──calls──> CompoundExpander (respin coupling)
//!     │
//!     v
//! (weights, OptimizeReport) ──> bf-artifacts triad builder
//! ```
//!
//! All payout arithmetic is done in integer cents; probabilities are f64
//! but every comparison against a mode target goes through a declared
//! tolerance, never exact float equality.

pub mod expander;
pub mod mode;
pub mod optimizer;

pub use expander::*;
pub use mode::*;
pub use optimizer::*;

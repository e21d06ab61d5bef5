//! # bf-artifacts — Artifact triad pipeline for BucketForge
//!
//! The publishable form of an optimized mode is a triad of coupled
//! artifacts: a shuffled reel strip, a book stream of per-spin records,
//! and a lookup table mirroring the books' payout column row for row.
//!
//! ## Architecture
//!
//! ```text
//! (ModeSpec, weights, seed)
//!         │
//!         v
//!    TriadBuilder ──> Triad { strip.txt, books.jsonl, lookup.csv }
//!         │                        │
//!         └── atomic writes        v
//!                              Verifier ──> ok | EquivalenceError
//! ```
//!
//! The builder is deterministic per seed for any worker count; the
//! verifier is a pure reporter and never mutates artifacts.

pub mod book;
pub mod builder;
pub mod error;
pub mod lookup;
pub mod strip;
pub mod verify;

pub use book::*;
pub use builder::*;
pub use error::*;
pub use lookup::*;
pub use strip::*;
pub use verify::*;

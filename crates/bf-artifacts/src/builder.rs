//! Artifact triad builder
//!
//! One ordered pass over the shuffled strip emits the book stream and
//! the lookup table in lockstep, so the lookup payout column mirrors the
//! books row for row by construction. Respin chains draw from an
//! auxiliary weighted stream and never consume strip positions, keeping
//! the strip multiset equal to the optimizer weights.
//!
//! Positions are processed in fixed-size batches with per-batch RNG
//! streams derived from the master seed and the batch's starting index.
//! Batch boundaries do not depend on the worker count, so any number of
//! workers produces a byte-identical triad.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use bf_math::{ConfigError, ExpandParams, ModeSpec};

use crate::book::{write_books, Book, Event};
use crate::error::FormatError;
use crate::lookup::{write_lookup, LookupRow};
use crate::strip::ReelStrip;
use crate::verify::{CheckKind, EquivalenceError};

/// Positions per batch; fixed so the batch grid is worker-independent
const BATCH_SIZE: usize = 8192;

pub const STRIP_FILE: &str = "strip.txt";
pub const BOOKS_FILE: &str = "books.jsonl";
pub const LOOKUP_FILE: &str = "lookup.csv";

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("weights cover {got} buckets, mode has {expected}")]
    WeightShape { expected: usize, got: usize },

    #[error("total weight must be positive")]
    EmptyWeights,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("build cancelled")]
    Cancelled,

    #[error("worker pool: {0}")]
    Pool(String),
}

/// The three coupled artifacts of one built mode
#[derive(Debug, Clone, PartialEq)]
pub struct Triad {
    pub strip: ReelStrip,
    pub books: Vec<Book>,
    pub lookup: Vec<LookupRow>,
}

/// On-disk locations of a written triad
#[derive(Debug, Clone)]
pub struct TriadPaths {
    pub strip: PathBuf,
    pub books: PathBuf,
    pub lookup: PathBuf,
}

impl Triad {
    /// Write all three artifacts under `dir` atomically
    ///
    /// Each file goes to a temp path first, is fsynced, then renamed
    /// into place; a failure leaves no partial artifact behind.
    pub fn write_to(&self, dir: &Path) -> Result<TriadPaths, BuildError> {
        fs::create_dir_all(dir)?;
        let paths = TriadPaths {
            strip: dir.join(STRIP_FILE),
            books: dir.join(BOOKS_FILE),
            lookup: dir.join(LOOKUP_FILE),
        };
        write_atomic(&paths.strip, |w| {
            w.write_all(self.strip.to_text().as_bytes())?;
            Ok(())
        })?;
        write_atomic(&paths.books, |w| write_books(w, &self.books))?;
        write_atomic(&paths.lookup, |w| write_lookup(w, &self.lookup))?;
        log::info!(
            "wrote triad: {} positions under {}",
            self.books.len(),
            dir.display()
        );
        Ok(paths)
    }

    /// Load a triad previously written with [`Triad::write_to`]
    pub fn load(dir: &Path) -> Result<Self, FormatError> {
        Ok(Self {
            strip: ReelStrip::load(&dir.join(STRIP_FILE))?,
            books: crate::book::load_books(&dir.join(BOOKS_FILE))?,
            lookup: crate::lookup::load_lookup(&dir.join(LOOKUP_FILE))?,
        })
    }

    /// Replace the lookup with one from another build of the same mode
    ///
    /// Accepted only when the incoming payout column matches the books
    /// row for row; otherwise the triad is left untouched.
    pub fn swap_lookup(&mut self, other: Vec<LookupRow>) -> Result<(), EquivalenceError> {
        if other.len() != self.books.len() {
            return Err(EquivalenceError::new(
                CheckKind::LengthMismatch,
                None,
                self.books.len().to_string(),
                other.len().to_string(),
            ));
        }
        for (j, (book, row)) in self.books.iter().zip(&other).enumerate() {
            if row.payout_cents != book.payout_multiplier {
                return Err(EquivalenceError::new(
                    CheckKind::PayoutMismatchAt,
                    Some(j as u64),
                    book.payout_multiplier.to_string(),
                    row.payout_cents.to_string(),
                ));
            }
        }
        self.lookup = other;
        Ok(())
    }
}

fn write_atomic<F>(path: &Path, write: F) -> Result<(), BuildError>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<(), FormatError>,
{
    let tmp = path.with_extension("tmp");
    let result = (|| -> Result<(), BuildError> {
        let mut w = BufWriter::new(File::create(&tmp)?);
        write(&mut w)?;
        w.flush()?;
        w.get_ref().sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Deterministic triad construction for one mode
pub struct TriadBuilder {
    mode: ModeSpec,
    weights: Vec<u64>,
    payouts_cents: Vec<i64>,
    seed: u64,
    workers: usize,
    cancel: Arc<AtomicBool>,
}

impl TriadBuilder {
    pub fn new(mode: &ModeSpec, weights: &[u64], seed: u64) -> Result<Self, BuildError> {
        mode.validate()?;
        if weights.len() != mode.bucket_count() {
            return Err(BuildError::WeightShape {
                expected: mode.bucket_count(),
                got: weights.len(),
            });
        }
        if weights.iter().sum::<u64>() == 0 {
            return Err(BuildError::EmptyWeights);
        }
        Ok(Self {
            mode: mode.clone(),
            weights: weights.to_vec(),
            payouts_cents: mode.bucket_payouts_cents(),
            seed,
            workers: 0,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Worker count for the batched pass; 0 uses the global pool
    pub fn workers(mut self, k: usize) -> Self {
        self.workers = k;
        self
    }

    /// Flag checked at batch boundaries; set it to abort the build
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn build(&self) -> Result<Triad, BuildError> {
        let mut strip = ReelStrip::from_weights(&self.weights);
        strip.shuffle(self.seed);

        let cumulative: Vec<u64> = self
            .weights
            .iter()
            .scan(0u64, |acc, &w| {
                *acc += w;
                Some(*acc)
            })
            .collect();
        let total: u64 = *cumulative.last().unwrap_or(&0);

        let n = strip.len();
        let starts: Vec<usize> = (0..n).step_by(BATCH_SIZE).collect();
        let run = || -> Result<Vec<(Vec<Book>, Vec<LookupRow>)>, BuildError> {
            starts
                .par_iter()
                .map(|&start| {
                    if self.cancel.load(Ordering::Relaxed) {
                        return Err(BuildError::Cancelled);
                    }
                    let end = (start + BATCH_SIZE).min(n);
                    Ok(self.build_batch(&strip, &cumulative, total, start, end))
                })
                .collect()
        };
        let batches = if self.workers == 0 {
            run()?
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.workers)
                .build()
                .map_err(|e| BuildError::Pool(e.to_string()))?;
            pool.install(run)?
        };

        let mut books = Vec::with_capacity(n);
        let mut lookup = Vec::with_capacity(n);
        for (b, l) in batches {
            books.extend(b);
            lookup.extend(l);
        }
        Ok(Triad {
            strip,
            books,
            lookup,
        })
    }

    fn build_batch(
        &self,
        strip: &ReelStrip,
        cumulative: &[u64],
        total: u64,
        start: usize,
        end: usize,
    ) -> (Vec<Book>, Vec<LookupRow>) {
        let mut rng = ChaCha8Rng::seed_from_u64(batch_seed(self.seed, start as u64));
        let params = ExpandParams::for_respin_p(self.mode.respin_p);
        let mut books = Vec::with_capacity(end - start);
        let mut lookup = Vec::with_capacity(end - start);
        for j in start..end {
            let first = strip.bucket_at(j);
            let mut buckets = vec![first];
            for k in 1..=params.max_respins {
                let beta = self.mode.respin_p * params.decay.powi(k as i32 - 1);
                if beta <= 0.0 || !rng.random_bool(beta) {
                    break;
                }
                buckets.push(draw_weighted(&mut rng, cumulative, total));
            }

            let mut events = Vec::with_capacity(buckets.len() * 2 + 1);
            let mut payout: i64 = 0;
            for (idx, &bucket) in buckets.iter().enumerate() {
                let c = self.payouts_cents[bucket as usize];
                payout += c;
                events.push(Event::PlinkoResult {
                    index: idx as u32,
                    bucket_index: bucket,
                    multiplier: c,
                });
                events.push(Event::SetTotalWin { amount: payout });
            }
            events.push(Event::FinalWin { amount: payout });

            let id = j as u64 + 1;
            books.push(Book {
                id,
                payout_multiplier: payout,
                events,
            });
            lookup.push(LookupRow {
                id,
                weight: 1,
                payout_cents: payout,
            });
        }
        (books, lookup)
    }
}

/// Per-batch stream seed, decorrelated from the shuffle seed
fn batch_seed(master: u64, start: u64) -> u64 {
    splitmix64(master ^ start.wrapping_mul(0x9E3779B97F4A7C15))
}

fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E3779B97F4A7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Draw a bucket index proportionally to its weight
fn draw_weighted(rng: &mut ChaCha8Rng, cumulative: &[u64], total: u64) -> u16 {
    let r = rng.random_range(0..total);
    cumulative.partition_point(|&c| c <= r) as u16
}

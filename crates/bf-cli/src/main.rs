//! BucketForge command line
//!
//! `optimize` finds a weight table for one mode, `optimize-all` runs the
//! volatility ladder with house-edge margins, `build` turns a weight
//! table into the strip/books/lookup triad, `verify` checks a triad.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use bf_artifacts::{Triad, TriadBuilder, Verifier};
use bf_math::{
    CrossModeContext, ModeBook, ModeSpec, OptimizeReport, OptimizerConfig, WeightOptimizer,
};

#[derive(Parser)]
#[command(name = "bucketforge", version, about = "Bucket-payout math workbench")]
struct Cli {
    /// Mode spec document (JSON); built-in presets when omitted
    #[arg(long, global = true)]
    modes_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Optimize one mode's weight table
    Optimize {
        /// Mode name, e.g. mild, sinful, demonic
        mode: String,
        #[arg(long, default_value_t = 100_000)]
        total_weight: u64,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Write the weights document here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Optimize every mode in volatility order, enforcing edge margins
    OptimizeAll {
        #[arg(long, default_value_t = 100_000)]
        total_weight: u64,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Directory for per-mode weights documents
        #[arg(long)]
        out: PathBuf,
    },
    /// Build the strip/books/lookup triad from a weights document
    Build {
        mode: String,
        #[arg(long)]
        weights: PathBuf,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[arg(long)]
        out: PathBuf,
        /// Worker threads for the batched pass; 0 uses all cores
        #[arg(long, default_value_t = 0)]
        workers: usize,
    },
    /// Verify a built triad against its weights document
    Verify {
        mode: String,
        #[arg(long)]
        dir: PathBuf,
        #[arg(long)]
        weights: PathBuf,
    },
}

/// Weights plus the report that produced them, as written by `optimize`
#[derive(Serialize, Deserialize)]
struct WeightsDoc {
    mode: String,
    weights: Vec<u64>,
    report: OptimizeReport,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let book = match &cli.modes_file {
        Some(path) => ModeBook::load(path)
            .with_context(|| format!("loading mode specs from {}", path.display()))?,
        None => ModeBook::builtin(),
    };
    match cli.command {
        Commands::Optimize {
            mode,
            total_weight,
            seed,
            out,
        } => run_optimize(book.get(&mode)?, total_weight, seed, out.as_deref()),
        Commands::OptimizeAll {
            total_weight,
            seed,
            out,
        } => run_optimize_all(&book, total_weight, seed, &out),
        Commands::Build {
            mode,
            weights,
            seed,
            out,
            workers,
        } => run_build(book.get(&mode)?, &weights, seed, &out, workers),
        Commands::Verify { mode, dir, weights } => run_verify(book.get(&mode)?, &dir, &weights),
    }
}

fn optimize_one(
    mode: &ModeSpec,
    total_weight: u64,
    seed: u64,
    ctx: &CrossModeContext,
) -> Result<WeightsDoc> {
    let cfg = OptimizerConfig {
        total_weight,
        seed,
        ..OptimizerConfig::default()
    };
    let mut opt = WeightOptimizer::new(mode, cfg)?;
    let (weights, report) = opt.optimize_with_context(mode, ctx)?;
    if let Some(relaxed) = report.relaxed_constraint {
        log::warn!(
            "{}: targets jointly unreachable, relaxed {:?} (rtp {:.6}, plb {:.6})",
            mode.name,
            relaxed,
            report.rtp_achieved,
            report.plb_achieved
        );
    }
    Ok(WeightsDoc {
        mode: mode.name.clone(),
        weights,
        report,
    })
}

fn emit_doc(doc: &WeightsDoc, out: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(doc)?;
    match out {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("{}: wrote {}", doc.mode, path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn run_optimize(mode: &ModeSpec, total_weight: u64, seed: u64, out: Option<&Path>) -> Result<()> {
    let doc = optimize_one(mode, total_weight, seed, &CrossModeContext::new())?;
    emit_doc(&doc, out)
}

fn run_optimize_all(book: &ModeBook, total_weight: u64, seed: u64, out: &Path) -> Result<()> {
    std::fs::create_dir_all(out)?;
    // lower volatility first: descending RTP target
    let mut modes: Vec<&ModeSpec> = book.modes.values().collect();
    modes.sort_by(|a, b| b.rtp_target.total_cmp(&a.rtp_target));

    let mut ctx = CrossModeContext::new();
    for mode in modes {
        let doc = optimize_one(mode, total_weight, seed, &ctx)?;
        ctx.record(&mode.name, 1.0 - doc.report.rtp_achieved);
        if !doc.report.margin_satisfied {
            log::warn!("{}: house-edge margin not satisfied after restarts", mode.name);
        }
        emit_doc(&doc, Some(&out.join(format!("{}.weights.json", mode.name))))?;
    }
    Ok(())
}

fn load_doc(mode: &ModeSpec, path: &Path) -> Result<WeightsDoc> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let doc: WeightsDoc = serde_json::from_str(&json)
        .with_context(|| format!("parsing {}", path.display()))?;
    if doc.mode != mode.name {
        bail!(
            "weights document is for mode '{}', not '{}'",
            doc.mode,
            mode.name
        );
    }
    Ok(doc)
}

fn run_build(mode: &ModeSpec, weights: &Path, seed: u64, out: &Path, workers: usize) -> Result<()> {
    let doc = load_doc(mode, weights)?;
    let triad = TriadBuilder::new(mode, &doc.weights, seed)?
        .workers(workers)
        .build()?;
    let paths = triad.write_to(out)?;
    println!("{}", paths.strip.display());
    println!("{}", paths.books.display());
    println!("{}", paths.lookup.display());
    Ok(())
}

fn run_verify(mode: &ModeSpec, dir: &Path, weights: &Path) -> Result<()> {
    let doc = load_doc(mode, weights)?;
    let triad = Triad::load(dir)
        .with_context(|| format!("loading triad from {}", dir.display()))?;
    let verifier = Verifier::new(mode, &doc.weights)?.with_report(&doc.report);
    match verifier.verify(&triad) {
        Ok(summary) => {
            println!(
                "{}: ok (rtp {:.6}, plb {:.6}, hash {})",
                mode.name, summary.empirical_rtp, summary.empirical_plb, summary.payout_hash
            );
            Ok(())
        }
        Err(e) => bail!("{}: {e}", mode.name),
    }
}

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use imspeech::{config::Config, evidence::EvidenceSheet, init_logging, segment_subject};
use tracing::info;

#[derive(Parser)]
#[command(name = "segment", about = "Cut notch-filtered trials out of raw .cnt recordings")]
struct Args {
    /// TOML configuration (defaults when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding one sub-directory of .cnt files per subject
    #[arg(long)]
    base_dir: PathBuf,

    /// Evidence sheet (.xlsx, .xls, .ods or .csv)
    #[arg(long)]
    evidence: PathBuf,

    /// Where trial files are written
    #[arg(long)]
    out_dir: PathBuf,

    /// Subjects to process (repeatable; default: all configured subjects)
    #[arg(long = "subject")]
    subjects: Vec<String>,
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();
    let cfg = Config::load_or_default(args.config.as_deref())?;

    let sheet = EvidenceSheet::from_path(&args.evidence)?;
    let subjects = if args.subjects.is_empty() { cfg.segment.subjects.clone() } else { args.subjects };

    let mut total = 0;
    for subject in &subjects {
        total += segment_subject(&args.base_dir, subject, &sheet, &cfg.segment, &args.out_dir)?.len();
    }
    info!(subjects = subjects.len(), trials = total, out = %args.out_dir.display(), "segmentation done");
    Ok(())
}

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use imspeech::{assemble_dataset, config::Config, extract_features, init_logging, io};
use tracing::info;

#[derive(Parser)]
#[command(name = "extract", about = "Assemble trials and extract normalised channel-convolution features")]
struct Args {
    /// TOML configuration (defaults when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory of trial files written by `segment`
    #[arg(long)]
    trials: PathBuf,

    /// Output directory for dataset, train/test features and statistics
    #[arg(long)]
    output_dir: PathBuf,

    /// Hold out this subject as the test split instead of the configured ranges
    #[arg(long)]
    holdout: Option<String>,
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();
    let cfg = Config::load_or_default(args.config.as_deref())?;
    std::fs::create_dir_all(&args.output_dir)?;

    let ds = assemble_dataset(&args.trials, &cfg.segment)?;
    io::save_dataset(&ds, &args.output_dir.join("dataset.safetensors"))?;
    for s in &ds.subjects {
        info!(subject = %s.name, start = s.start, stop = s.stop, "subject range");
    }

    let fs = extract_features(&ds, args.holdout.as_deref(), &cfg.features)?;
    io::save_labeled_set(&fs.train, &args.output_dir.join("train.safetensors"))?;
    io::save_labeled_set(&fs.test, &args.output_dir.join("test.safetensors"))?;
    io::save_stats(&fs.stats, &args.output_dir.join("stats.safetensors"))?;

    info!(
        train = ?fs.train.x.dim(),
        test = ?fs.test.x.dim(),
        out = %args.output_dir.display(),
        "features written"
    );
    Ok(())
}

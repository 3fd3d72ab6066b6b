use std::path::PathBuf;

use anyhow::{Context, Result};
use candle_core::Device;
use clap::Parser;
use imspeech::{
    config::Config,
    evaluate::{argmax_rows, predict, ConfusionMatrix},
    init_logging, io, report, Cgan, Trainer,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "train", about = "Train the cGAN and evaluate its discriminator as a classifier")]
struct Args {
    /// TOML configuration (defaults when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory with train.safetensors / test.safetensors from `extract`
    #[arg(long)]
    features: PathBuf,

    /// Output directory for weights, histories and reports
    #[arg(long)]
    output_dir: PathBuf,

    /// Override the configured number of epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Override the configured seed
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();
    let mut cfg = Config::load_or_default(args.config.as_deref())?;
    if let Some(e) = args.epochs {
        cfg.training.epochs = e;
    }
    if let Some(s) = args.seed {
        cfg.training.seed = s;
    }
    cfg.validate()?;

    let train = io::load_labeled_set(&args.features.join("train.safetensors"))?;
    let test = io::load_labeled_set(&args.features.join("test.safetensors"))?;
    let (image, _) = train.item_shape();
    info!(train = train.len(), test = test.len(), image, "features loaded");

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("create {}", args.output_dir.display()))?;
    cfg.save_toml(args.output_dir.join("config.toml"))?;

    let device = Device::Cpu;
    let model = Cgan::new(&cfg.model, image, &device)?;
    let mut trainer = Trainer::new(cfg.training.clone(), cfg.model.clone());
    let history = trainer.train(&model, &train, &test)?;

    let files = model.save(&args.output_dir, "final")?;
    info!(generator = %files.generator.display(), discriminator = %files.discriminator.display(), "model saved");

    io::save_arrays(&history.arrays(), &args.output_dir.join("history.safetensors"))?;
    report::write_history_csv(&history, &args.output_dir.join("history.csv"))?;
    report::write_batch_history_csv(&history, &args.output_dir.join("history_batch.csv"))?;

    let scores = predict(&model.discriminator, &test, cfg.training.eval_batch_size, &device)?;
    let cm = ConfusionMatrix::from_predictions(&test.y.to_vec(), &argmax_rows(&scores), cfg.model.n_classes)?;
    report::write_confusion_csv(&cm, &args.output_dir.join("confusion.csv"))?;
    info!(
        accuracy = cm.accuracy(),
        precision = cm.precision_macro(),
        recall = cm.recall_macro(),
        "test classification"
    );
    Ok(())
}

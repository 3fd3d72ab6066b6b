use std::path::PathBuf;

use anyhow::Result;
use candle_core::Device;
use clap::Parser;
use imspeech::{config::Config, init_logging, io, trainer::generate_class_samples, Cgan, Generator, LabeledSet};
use ndarray::{concatenate, Array1, Axis};
use rand::{rngs::StdRng, SeedableRng};
use tracing::info;

#[derive(Parser)]
#[command(name = "generate", about = "Sample class-conditioned synthetic features from a trained generator")]
struct Args {
    /// TOML configuration (defaults when omitted); must match the training run
    #[arg(long)]
    config: Option<PathBuf>,

    /// generator_<stem>.safetensors written by `train`
    #[arg(long)]
    generator: PathBuf,

    /// Samples per class
    #[arg(long, default_value_t = 10)]
    per_class: usize,

    /// Output safetensors file (x [n, H, W], y [n])
    #[arg(long)]
    output: PathBuf,

    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();
    let cfg = Config::load_or_default(args.config.as_deref())?;

    let device = Device::Cpu;
    let image = Generator::image_size_from_checkpoint(&args.generator)?;
    let mut model = Cgan::new(&cfg.model, image, &device)?;
    model.load_generator(&args.generator)?;

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut xs = Vec::with_capacity(cfg.model.n_classes);
    let mut ys = Vec::with_capacity(cfg.model.n_classes * args.per_class);
    for class in 0..cfg.model.n_classes as u32 {
        xs.push(generate_class_samples(&model.generator, class, args.per_class, &mut rng, &device)?);
        ys.extend(std::iter::repeat(class).take(args.per_class));
    }
    let views: Vec<_> = xs.iter().map(|x| x.view()).collect();
    let set = LabeledSet::new(concatenate(Axis(0), &views)?, Array1::from(ys))?;
    io::save_labeled_set(&set, &args.output)?;
    info!(samples = set.len(), image, out = %args.output.display(), "synthetic samples written");
    Ok(())
}

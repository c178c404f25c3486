//! Two-phase training CLI for natcg.
//!
//! Trains the image map on natural + CG images, then the NICE flow on the
//! natural images under the soft-boundary hypersphere loss, and writes the
//! checkpoints, `vars.json` and `loss_training.png` into a timestamped
//! results directory.
//!
//! # Usage
//!
//! ```bash
//! cargo run --release -p natcg-learn --bin train-natcg -- \
//!   --data data/natcg.safetensors \
//!   --config natcg.toml \
//!   --results results \
//!   --epochs-embedding 300 --epochs-flow 100 --seed 0
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use natcg_core::TrainConfig;
use natcg_flow::select_device;
use natcg_learn::data::ImageDataset;
use natcg_learn::pipeline;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "train-natcg", about = "Train the natural-vs-CG hypersphere detector")]
struct Args {
    /// Dataset (safetensors with `natural`, `cg.1` … `cg.k`).
    #[arg(long)]
    data: PathBuf,

    /// TOML configuration; missing fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Parent directory of the timestamped run directory.
    #[arg(long, default_value = "results")]
    results: PathBuf,

    #[arg(long)]
    epochs_embedding: Option<usize>,

    #[arg(long)]
    epochs_flow: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Stay on the CPU even if an accelerator is available.
    #[arg(long)]
    cpu: bool,

    /// Disable the per-batch progress bar.
    #[arg(long)]
    no_progress: bool,
}

impl Args {
    fn train_config(&self) -> Result<TrainConfig, natcg_core::NatcgError> {
        let mut config = match &self.config {
            Some(path) => TrainConfig::from_toml_file(path)?,
            None => TrainConfig::default(),
        };
        if let Some(epochs) = self.epochs_embedding {
            config.epochs_embedding = epochs;
        }
        if let Some(epochs) = self.epochs_flow {
            config.epochs_flow = epochs;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if self.no_progress {
            config.show_progress = false;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = args.train_config().unwrap_or_else(|e| {
        tracing::error!("invalid configuration: {e}");
        std::process::exit(1);
    });
    tracing::info!(?config, "configuration");

    let device = select_device(args.cpu);
    tracing::info!(?device, "device selected");

    let start = Instant::now();
    let dataset = ImageDataset::from_safetensors(&args.data, &device).unwrap_or_else(|e| {
        tracing::error!("failed to load dataset: {e}");
        std::process::exit(1);
    });
    tracing::info!(
        natural = dataset.natural_count(),
        cg_algorithms = dataset.num_cg_algorithms(),
        shape = ?dataset.image_shape(),
        secs = start.elapsed().as_secs_f32(),
        "dataset loaded"
    );

    let start = Instant::now();
    let (run, results) = pipeline::train_and_save(&config, &dataset, &args.results).unwrap_or_else(|e| {
        tracing::error!("run failed: {e}");
        std::process::exit(1);
    });
    tracing::info!(
        secs = start.elapsed().as_secs_f32(),
        radius = run.report.hypersphere.radius(),
        weight_stat = run.report.hypersphere.weight_stat(),
        "training complete"
    );
    eprintln!("Results: {}", results.path().display());
}

//! End-to-end run: dataset → split → streams → both phases → artifacts.

use std::path::Path;

use candle_core::Device;
use candle_nn::VarMap;
use natcg_core::{NatcgError, TrainConfig};
use natcg_flow::{seed_parameters, ConvEmbedder, ConvEmbedderConfig, FlowConfig, NiceFlow};

use crate::artifacts::{Network, ResultsDir, StateBundle};
use crate::data::{build_streams, DataLoader, DatasetSplit, ImageDataset};
use crate::trainer::{Trainer, TrainingReport};

/// Stream offsets added to the run seed; every random source gets its own.
const FLOW_INIT_SEED: u64 = 1;
const IMG_MAP_SHUFFLE_SEED: u64 = 2;
const FLOW_SHUFFLE_SEED: u64 = 3;

/// A finished run, ready to be written out.
pub struct TrainedRun {
    pub trainer: Trainer<ConvEmbedder>,
    pub report: TrainingReport,
    pub bundle: StateBundle,
}

/// Reference embedder + flow for `config`, initialized from `config.seed`.
///
/// # Errors
///
/// Returns [`NatcgError::Config`] for an invalid configuration.
pub fn build_trainer(
    config: &TrainConfig,
    in_channels: usize,
    device: &Device,
) -> Result<Trainer<ConvEmbedder>, NatcgError> {
    config.validate()?;

    let embed_vars = VarMap::new();
    let embedder = ConvEmbedder::new_trainable(
        &embed_vars,
        &ConvEmbedderConfig {
            in_channels,
            embedding_dim: config.input_dim,
            num_classes: config.num_classes,
            ..ConvEmbedderConfig::default()
        },
        device,
    )?;
    seed_parameters(&embed_vars, config.seed)?;

    let flow_vars = VarMap::new();
    let flow = NiceFlow::new_trainable(&flow_vars, &FlowConfig::from(config), device)?;
    seed_parameters(&flow_vars, config.seed.wrapping_add(FLOW_INIT_SEED))?;

    tracing::info!(?embedder, ?flow, "built networks");
    Trainer::new(config.clone(), embedder, embed_vars, flow, flow_vars)
}

/// Runs both phases on `dataset`.
///
/// # Errors
///
/// Propagates configuration, data and training errors; nothing is written.
pub fn train(config: &TrainConfig, dataset: &ImageDataset) -> Result<TrainedRun, NatcgError> {
    config.validate()?;
    let split = DatasetSplit::new(dataset, config)?;
    let streams = build_streams(dataset, &split)?;
    tracing::info!(
        img_map_samples = streams.img_map.len(),
        flow_samples = streams.flow.len(),
        seed = config.seed,
        "dataset split"
    );

    let normalize_img_map = streams.img_map.normalization().clone();
    let normalize_flow = streams.flow.normalization().clone();
    let mut img_map_loader = DataLoader::new(
        streams.img_map,
        config.batch_size,
        true,
        config.seed.wrapping_add(IMG_MAP_SHUFFLE_SEED),
    )?;
    let mut flow_loader = DataLoader::new(
        streams.flow,
        config.batch_size,
        true,
        config.seed.wrapping_add(FLOW_SHUFFLE_SEED),
    )?;

    let (channels, _, _) = dataset.image_shape();
    let mut trainer = build_trainer(config, channels, dataset.device())?;
    let report = trainer.run(&mut img_map_loader, &mut flow_loader)?;

    let bundle = StateBundle::new(&split, normalize_img_map, normalize_flow, &report.hypersphere, config);
    Ok(TrainedRun {
        trainer,
        report,
        bundle,
    })
}

/// Writes checkpoints, `vars.json` and the loss plot into `dir`.
///
/// A plot failure is logged and skipped; the other artifacts are required.
///
/// # Errors
///
/// Returns [`NatcgError::Io`] or [`NatcgError::Serialization`] if a
/// checkpoint or the bundle cannot be written.
pub fn write_artifacts(run: &TrainedRun, dir: &ResultsDir) -> Result<(), NatcgError> {
    let config = run.trainer.config();
    dir.save_checkpoint(run.trainer.embed_vars(), Network::ImgMap, config.epochs_embedding)?;
    dir.save_checkpoint(run.trainer.flow_vars(), Network::Flow, config.epochs_flow)?;
    dir.save_bundle(&run.bundle)?;
    if let Err(e) = dir.save_loss_plot(&run.report.losses_img_map, &run.report.losses_flow) {
        tracing::warn!("skipping loss plot: {e}");
    }
    tracing::info!(dir = %dir.path().display(), "artifacts written");
    Ok(())
}

/// Trains on `dataset`, then creates a timestamped directory under
/// `results_root` and writes the artifacts into it.
///
/// The directory only exists once training has succeeded.
///
/// # Errors
///
/// Propagates the errors of [`train`], [`ResultsDir::create_timestamped`]
/// and [`write_artifacts`].
pub fn train_and_save(
    config: &TrainConfig,
    dataset: &ImageDataset,
    results_root: impl AsRef<Path>,
) -> Result<(TrainedRun, ResultsDir), NatcgError> {
    let run = train(config, dataset)?;
    let dir = ResultsDir::create_timestamped(results_root)?;
    write_artifacts(&run, &dir)?;
    Ok((run, dir))
}

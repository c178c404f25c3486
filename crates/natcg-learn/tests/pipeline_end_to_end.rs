//! A full two-phase run on a tiny synthetic dataset.

use candle_core::{Device, Tensor};
use natcg_core::{TrainConfig, TrainingPhase};
use natcg_learn::artifacts::{Network, BUNDLE_FILE};
use natcg_learn::pipeline;
use natcg_learn::{AnomalyScorer, ImageDataset, ResultsDir};

fn class_images(n: usize, class: usize) -> Tensor {
    let per_image = 2 * 8 * 8;
    let data: Vec<f32> = (0..n * per_image)
        .map(|i| {
            let pixel = i % per_image;
            let image = i / per_image;
            let base = ((pixel * (class + 1)) as f32 * 0.13).sin();
            base + ((image * 7 + pixel * 3) % 11) as f32 * 0.02
        })
        .collect();
    Tensor::from_vec(data, (n, 2, 8, 8), &Device::Cpu).unwrap()
}

fn dataset() -> ImageDataset {
    ImageDataset::new(class_images(10, 0), vec![class_images(7, 1), class_images(8, 2)]).unwrap()
}

fn config() -> TrainConfig {
    TrainConfig {
        seed: 5,
        nb_train_natural: 7,
        nb_train_cg: 4,
        nb_test_per_class: 2,
        num_classes: 3,
        batch_size: 4,
        input_dim: 8,
        hidden_dim: 8,
        num_layers: 2,
        coupling_depth: 1,
        epochs_embedding: 2,
        epochs_flow: 3,
        nu: 0.2,
        show_progress: false,
        ..TrainConfig::default()
    }
}

#[test]
fn run_trains_both_phases_and_writes_artifacts() {
    let config = config();
    let run = pipeline::train(&config, &dataset()).unwrap();

    assert_eq!(run.trainer.phase(), TrainingPhase::FlowUnsupervised);
    assert!(run.trainer.is_finished());
    assert_eq!(run.report.losses_img_map.len(), 2);
    assert_eq!(run.report.losses_flow.len(), 3);
    let radius = run.report.hypersphere.radius();
    assert!(radius.is_finite() && radius >= 0.0);
    assert_eq!(run.bundle.train_ni_idx.len(), 7);
    assert_eq!(run.bundle.train_cg_idx.len(), 2);
    assert_eq!(run.bundle.center.len(), 8);

    let tmp = tempfile::tempdir().unwrap();
    let dir = ResultsDir::create(tmp.path().join("run")).unwrap();
    pipeline::write_artifacts(&run, &dir).unwrap();
    assert!(dir.checkpoint_path(Network::ImgMap, 2).is_file());
    assert!(dir.checkpoint_path(Network::Flow, 3).is_file());
    assert!(dir.path().join(BUNDLE_FILE).is_file());

    let scorer = AnomalyScorer::load(&dir, &Device::Cpu).unwrap();
    assert_eq!(scorer.dim(), 8);
    assert_eq!(scorer.radius(), radius);

    // The reloaded flow reproduces the trained one.
    let features = Tensor::new(&[[0.1f32, 0.2, 0.0, 0.5, 0.3, 0.0, 0.9, 0.4]], &Device::Cpu).unwrap();
    let reloaded = scorer.score(&features).unwrap();
    let trained = run
        .report
        .hypersphere
        .distances(&run.trainer.flow().forward(&features).unwrap())
        .unwrap()
        .to_vec1::<f32>()
        .unwrap();
    assert!((reloaded[0] - trained[0]).abs() < 1e-5);
}

#[test]
fn same_seed_same_split_and_normalization() {
    let a = pipeline::train(&TrainConfig { epochs_flow: 1, ..config() }, &dataset()).unwrap();
    let b = pipeline::train(&TrainConfig { epochs_flow: 1, ..config() }, &dataset()).unwrap();
    assert_eq!(a.bundle.train_ni_idx, b.bundle.train_ni_idx);
    assert_eq!(a.bundle.train_cg_idx, b.bundle.train_cg_idx);
    assert_eq!(a.bundle.normalize_flow, b.bundle.normalize_flow);
}

#[test]
fn class_count_mismatch_fails_before_training() {
    let config = TrainConfig {
        num_classes: 4,
        ..config()
    };
    let err = pipeline::train(&config, &dataset()).err().unwrap();
    assert!(err.is_fatal_config());
}

#[test]
fn invalid_config_fails_before_training() {
    let config = TrainConfig { nu: 0.0, ..config() };
    assert!(pipeline::train(&config, &dataset()).is_err());
}

#[test]
fn failed_run_leaves_no_results_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("results");
    std::fs::create_dir(&root).unwrap();

    let bad_config = TrainConfig {
        num_classes: 4,
        ..config()
    };
    assert!(pipeline::train_and_save(&bad_config, &dataset(), &root).is_err());
    assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);

    let (_run, dir) = pipeline::train_and_save(&TrainConfig { epochs_flow: 1, ..config() }, &dataset(), &root).unwrap();
    assert_eq!(dir.path().parent().unwrap(), root.as_path());
    assert!(dir.path().join(BUNDLE_FILE).is_file());
}

//! Data provider for both training phases.
//!
//! An [`ImageDataset`] holds every natural image plus one tensor per CG
//! algorithm. [`DatasetSplit`] draws disjoint train/test index sets per class
//! from the configured seed, and [`build_streams`] materializes the two
//! training streams:
//!
//! - phase 1: natural (label 0) and CG images (label `i` for algorithm `i`),
//! - phase 2: natural training images only, sample index `0..nb_train_natural`.
//!
//! Each stream is normalized per channel with statistics computed on its own
//! training images. A [`DataLoader`] then yields [`Batch`]es in which every
//! sample index appears exactly once per epoch.
//!
//! ## Safetensors layout
//!
//! `natural: [N, C, H, W]`, `cg.1: [N1, C, H, W]`, …, `cg.k: [Nk, C, H, W]`.

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use natcg_core::{NatcgError, Normalization, TrainConfig, NATURAL_CLASS};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

fn tensor_err(context: &'static str) -> impl Fn(candle_core::Error) -> NatcgError + Copy {
    move |e| NatcgError::Tensor {
        message: format!("{context}: {e}"),
    }
}

/// Natural and CG images, one tensor per class.
#[derive(Debug, Clone)]
pub struct ImageDataset {
    natural: Tensor,
    cg: Vec<Tensor>,
}

impl ImageDataset {
    /// Wraps per-class image tensors.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::InvalidBatch`] if any tensor is not rank 4, the
    /// image shapes disagree, or there is no CG class.
    pub fn new(natural: Tensor, cg: Vec<Tensor>) -> Result<Self, NatcgError> {
        if cg.is_empty() {
            return Err(NatcgError::InvalidBatch {
                message: "dataset needs at least one CG algorithm".to_string(),
            });
        }
        let shape = image_shape(&natural, "natural")?;
        for (i, t) in cg.iter().enumerate() {
            let cg_shape = image_shape(t, "cg")?;
            if cg_shape != shape {
                return Err(NatcgError::InvalidBatch {
                    message: format!(
                        "cg.{} images are {cg_shape:?}, natural images are {shape:?}",
                        i + 1
                    ),
                });
            }
        }
        Ok(Self { natural, cg })
    }

    /// Loads a dataset from a safetensors file (`natural`, `cg.1` … `cg.k`).
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::Io`] if the file cannot be read and
    /// [`NatcgError::InvalidBatch`] if a required tensor is missing.
    pub fn from_safetensors(path: impl AsRef<Path>, device: &Device) -> Result<Self, NatcgError> {
        let path = path.as_ref();
        let mut tensors = candle_core::safetensors::load(path, device).map_err(|e| NatcgError::Io {
            message: format!("{}: {e}", path.display()),
        })?;

        let natural = tensors.remove("natural").ok_or_else(|| NatcgError::InvalidBatch {
            message: format!("{}: missing tensor 'natural'", path.display()),
        })?;
        let mut cg = Vec::new();
        while let Some(t) = tensors.remove(&format!("cg.{}", cg.len() + 1)) {
            cg.push(t);
        }
        if let Some(extra) = tensors.keys().next() {
            tracing::warn!(tensor = %extra, "ignoring unrecognized dataset tensor");
        }

        let natural = natural.to_dtype(DType::F32).map_err(tensor_err("from_safetensors"))?;
        let cg = cg
            .into_iter()
            .map(|t| t.to_dtype(DType::F32))
            .collect::<Result<Vec<_>, _>>()
            .map_err(tensor_err("from_safetensors"))?;
        Self::new(natural, cg)
    }

    pub fn natural_count(&self) -> usize {
        self.natural.dims()[0]
    }

    pub fn num_cg_algorithms(&self) -> usize {
        self.cg.len()
    }

    /// Images available for CG algorithm `alg` (1-based).
    pub fn cg_count(&self, alg: usize) -> Option<usize> {
        alg.checked_sub(1)
            .and_then(|i| self.cg.get(i))
            .map(|t| t.dims()[0])
    }

    /// `(channels, height, width)` shared by every image.
    pub fn image_shape(&self) -> (usize, usize, usize) {
        let d = self.natural.dims();
        (d[1], d[2], d[3])
    }

    pub fn device(&self) -> &Device {
        self.natural.device()
    }
}

fn image_shape(t: &Tensor, name: &str) -> Result<(usize, usize, usize), NatcgError> {
    match t.dims() {
        [_, c, h, w] => Ok((*c, *h, *w)),
        other => Err(NatcgError::InvalidBatch {
            message: format!("{name} images must be [N, C, H, W], got {other:?}"),
        }),
    }
}

/// Train/test index sets per class, drawn from the run seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSplit {
    pub train_ni_idx: Vec<usize>,
    pub test_ni_idx: Vec<usize>,
    /// One index set per CG algorithm, in algorithm order.
    pub train_cg_idx: Vec<Vec<usize>>,
    pub test_cg_idx: Vec<Vec<usize>>,
}

impl DatasetSplit {
    /// Shuffles each class with a ChaCha8 stream seeded by `config.seed` and
    /// takes the test indices first, then the training indices.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::Config`] if the class count disagrees with the
    /// dataset or a class has too few images.
    pub fn new(dataset: &ImageDataset, config: &TrainConfig) -> Result<Self, NatcgError> {
        if config.num_cg_algorithms() != dataset.num_cg_algorithms() {
            return Err(NatcgError::Config {
                message: format!(
                    "num_classes = {} expects {} CG algorithms, dataset has {}",
                    config.num_classes,
                    config.num_cg_algorithms(),
                    dataset.num_cg_algorithms()
                ),
            });
        }

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let (test_ni_idx, train_ni_idx) = draw(
            &mut rng,
            dataset.natural_count(),
            config.nb_test_per_class,
            config.nb_train_natural,
            "natural",
        )?;

        let mut train_cg_idx = Vec::with_capacity(dataset.num_cg_algorithms());
        let mut test_cg_idx = Vec::with_capacity(dataset.num_cg_algorithms());
        for alg in 1..=dataset.num_cg_algorithms() {
            let available = dataset.cg_count(alg).unwrap_or(0);
            let (test, train) = draw(
                &mut rng,
                available,
                config.nb_test_per_class,
                config.nb_train_cg,
                &format!("cg.{alg}"),
            )?;
            test_cg_idx.push(test);
            train_cg_idx.push(train);
        }

        Ok(Self {
            train_ni_idx,
            test_ni_idx,
            train_cg_idx,
            test_cg_idx,
        })
    }
}

fn draw(
    rng: &mut ChaCha8Rng,
    available: usize,
    n_test: usize,
    n_train: usize,
    class: &str,
) -> Result<(Vec<usize>, Vec<usize>), NatcgError> {
    if available < n_test + n_train {
        return Err(NatcgError::Config {
            message: format!(
                "class {class} has {available} images, split needs {n_test} test + {n_train} train"
            ),
        });
    }
    let mut perm: Vec<usize> = (0..available).collect();
    perm.shuffle(rng);
    let test = perm[..n_test].to_vec();
    let train = perm[n_test..n_test + n_train].to_vec();
    Ok((test, train))
}

/// Per-channel mean and (population) standard deviation of `[N, C, H, W]`.
///
/// Channels with zero spread get a standard deviation of 1.
///
/// # Errors
///
/// Returns [`NatcgError::InvalidBatch`] for a non-image tensor.
pub fn compute_normalization(images: &Tensor) -> Result<Normalization, NatcgError> {
    let (channels, _, _) = image_shape(images, "normalization input")?;
    let map_err = tensor_err("compute_normalization");

    let per_channel = images
        .transpose(0, 1)
        .and_then(|t| t.contiguous())
        .and_then(|t| t.flatten_from(1))
        .map_err(map_err)?;
    let mean = per_channel.mean_keepdim(1).map_err(map_err)?;
    let std = per_channel
        .broadcast_sub(&mean)
        .and_then(|t| t.sqr())
        .and_then(|t| t.mean_keepdim(1))
        .and_then(|t| t.sqrt())
        .map_err(map_err)?;

    let mean = mean.flatten_all().and_then(|t| t.to_vec1::<f32>()).map_err(map_err)?;
    let std = std
        .flatten_all()
        .and_then(|t| t.to_vec1::<f32>())
        .map_err(map_err)?
        .into_iter()
        .map(|s| if s > 1e-8 { s } else { 1.0 })
        .collect();

    debug_assert_eq!(mean.len(), channels);
    Ok(Normalization { mean, std })
}

/// Applies `(x - mean[c]) / std[c]` to an `[N, C, H, W]` tensor.
///
/// # Errors
///
/// Returns [`NatcgError::DimensionMismatch`] if the channel counts differ.
pub fn normalize(images: &Tensor, norm: &Normalization) -> Result<Tensor, NatcgError> {
    let (channels, _, _) = image_shape(images, "normalize input")?;
    if channels != norm.channels() {
        return Err(NatcgError::DimensionMismatch {
            context: "normalization channels".to_string(),
            expected: norm.channels(),
            actual: channels,
        });
    }
    let map_err = tensor_err("normalize");
    let device = images.device();
    let mean = Tensor::from_slice(&norm.mean, (1, channels, 1, 1), device).map_err(map_err)?;
    let std = Tensor::from_slice(&norm.std, (1, channels, 1, 1), device).map_err(map_err)?;
    images
        .broadcast_sub(&mean)
        .and_then(|t| t.broadcast_div(&std))
        .map_err(map_err)
}

/// A normalized training stream: images, labels and their normalization.
#[derive(Debug, Clone)]
pub struct TrainStream {
    images: Tensor,
    labels: Vec<u32>,
    normalization: Normalization,
}

impl TrainStream {
    /// Normalizes `images` with statistics computed on `images` itself.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::InvalidBatch`] if the stream is empty or the
    /// label count differs from the image count.
    pub fn new(images: Tensor, labels: Vec<u32>) -> Result<Self, NatcgError> {
        let normalization = compute_normalization(&images)?;
        Self::with_normalization(images, labels, normalization)
    }

    /// Normalizes `images` with precomputed statistics.
    ///
    /// # Errors
    ///
    /// Same as [`Self::new`], plus channel mismatches.
    pub fn with_normalization(
        images: Tensor,
        labels: Vec<u32>,
        normalization: Normalization,
    ) -> Result<Self, NatcgError> {
        let n = image_shape(&images, "stream")
            .map(|_| images.dims()[0])?;
        if n == 0 {
            return Err(NatcgError::InvalidBatch {
                message: "training stream is empty".to_string(),
            });
        }
        if labels.len() != n {
            return Err(NatcgError::InvalidBatch {
                message: format!("{n} images but {} labels", labels.len()),
            });
        }
        let images = normalize(&images, &normalization)?;
        Ok(Self {
            images,
            labels,
            normalization,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn normalization(&self) -> &Normalization {
        &self.normalization
    }

    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    fn batch(&self, indices: &[usize]) -> Result<Batch, NatcgError> {
        let map_err = tensor_err("TrainStream batch");
        let device = self.images.device();
        let idx: Vec<u32> = indices.iter().map(|&i| i as u32).collect();
        let idx = Tensor::from_vec(idx, indices.len(), device).map_err(map_err)?;
        let images = self.images.index_select(&idx, 0).map_err(map_err)?;
        let labels: Vec<u32> = indices.iter().map(|&i| self.labels[i]).collect();
        let labels = Tensor::from_vec(labels, indices.len(), device).map_err(map_err)?;
        Ok(Batch {
            images,
            labels,
            indices: indices.to_vec(),
        })
    }
}

/// Both training streams of a run.
#[derive(Debug, Clone)]
pub struct TrainStreams {
    /// Natural + CG stream for the supervised phase.
    pub img_map: TrainStream,
    /// Natural-only stream for the flow phase.
    pub flow: TrainStream,
}

/// Gathers the training images chosen by `split` into the two streams.
///
/// # Errors
///
/// Returns [`NatcgError::Tensor`] if gathering fails.
pub fn build_streams(dataset: &ImageDataset, split: &DatasetSplit) -> Result<TrainStreams, NatcgError> {
    let map_err = tensor_err("build_streams");
    let gather = |t: &Tensor, idx: &[usize]| -> Result<Tensor, NatcgError> {
        let idx: Vec<u32> = idx.iter().map(|&i| i as u32).collect();
        let n = idx.len();
        let idx = Tensor::from_vec(idx, n, t.device()).map_err(map_err)?;
        t.index_select(&idx, 0).map_err(map_err)
    };

    let natural = gather(&dataset.natural, &split.train_ni_idx)?;

    let mut parts = vec![natural.clone()];
    let mut labels = vec![NATURAL_CLASS; split.train_ni_idx.len()];
    for (i, idx) in split.train_cg_idx.iter().enumerate() {
        parts.push(gather(&dataset.cg[i], idx)?);
        labels.extend(std::iter::repeat((i + 1) as u32).take(idx.len()));
    }
    let combined = Tensor::cat(&parts, 0).map_err(map_err)?;

    let flow_labels = vec![NATURAL_CLASS; split.train_ni_idx.len()];
    Ok(TrainStreams {
        img_map: TrainStream::new(combined, labels)?,
        flow: TrainStream::new(natural, flow_labels)?,
    })
}

/// One mini-batch: images, labels and the stream-local sample indices.
#[derive(Debug, Clone)]
pub struct Batch {
    pub images: Tensor,
    pub labels: Tensor,
    pub indices: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Rejects batches whose parts disagree or whose indices fall outside
    /// `0..sample_count`.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::InvalidBatch`] describing the first problem.
    pub fn validate(&self, sample_count: usize) -> Result<(), NatcgError> {
        let n = self.indices.len();
        if n == 0 {
            return Err(NatcgError::InvalidBatch {
                message: "empty batch".to_string(),
            });
        }
        if self.images.rank() != 4 || self.images.dims()[0] != n {
            return Err(NatcgError::InvalidBatch {
                message: format!(
                    "images {:?} do not match {n} sample indices",
                    self.images.dims()
                ),
            });
        }
        if self.labels.dims() != [n] {
            return Err(NatcgError::InvalidBatch {
                message: format!("labels {:?} do not match {n} sample indices", self.labels.dims()),
            });
        }
        if let Some(bad) = self.indices.iter().find(|&&i| i >= sample_count) {
            return Err(NatcgError::InvalidBatch {
                message: format!("sample index {bad} out of range 0..{sample_count}"),
            });
        }
        Ok(())
    }
}

/// Batches a [`TrainStream`], reshuffling every epoch from a seeded RNG.
pub struct DataLoader {
    stream: TrainStream,
    batch_size: usize,
    shuffle: bool,
    rng: ChaCha8Rng,
}

impl DataLoader {
    /// # Errors
    ///
    /// Returns [`NatcgError::Config`] if `batch_size` is zero.
    pub fn new(stream: TrainStream, batch_size: usize, shuffle: bool, seed: u64) -> Result<Self, NatcgError> {
        if batch_size == 0 {
            return Err(NatcgError::Config {
                message: "batch_size must be > 0".to_string(),
            });
        }
        Ok(Self {
            stream,
            batch_size,
            shuffle,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    pub fn sample_count(&self) -> usize {
        self.stream.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Batches per epoch; the last batch may be short.
    pub fn num_batches(&self) -> usize {
        self.sample_count().div_ceil(self.batch_size)
    }

    pub fn stream(&self) -> &TrainStream {
        &self.stream
    }

    /// Starts a training epoch (shuffled if the loader shuffles).
    pub fn epoch(&mut self) -> Batches<'_> {
        let mut order: Vec<usize> = (0..self.stream.len()).collect();
        if self.shuffle {
            order.shuffle(&mut self.rng);
        }
        Batches::new(&self.stream, order, self.batch_size)
    }

    /// One pass in index order, without touching the shuffle RNG.
    pub fn sequential(&self) -> Batches<'_> {
        Batches::new(&self.stream, (0..self.stream.len()).collect(), self.batch_size)
    }
}

/// Iterator over the batches of one pass.
pub struct Batches<'a> {
    stream: &'a TrainStream,
    order: Vec<usize>,
    batch_size: usize,
    pos: usize,
}

impl<'a> Batches<'a> {
    fn new(stream: &'a TrainStream, order: Vec<usize>, batch_size: usize) -> Self {
        Self {
            stream,
            order,
            batch_size,
            pos: 0,
        }
    }
}

impl Iterator for Batches<'_> {
    type Item = Result<Batch, NatcgError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.order.len() {
            return None;
        }
        let end = (self.pos + self.batch_size).min(self.order.len());
        let batch = self.stream.batch(&self.order[self.pos..end]);
        self.pos = end;
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class_images(n: usize, fill: f32) -> Tensor {
        let data: Vec<f32> = (0..n * 2 * 4 * 4).map(|i| fill + (i % 5) as f32 * 0.1).collect();
        Tensor::from_vec(data, (n, 2, 4, 4), &Device::Cpu).unwrap()
    }

    fn dataset() -> ImageDataset {
        ImageDataset::new(class_images(20, 0.0), vec![class_images(12, 1.0), class_images(15, -1.0)]).unwrap()
    }

    fn config() -> TrainConfig {
        TrainConfig {
            seed: 3,
            nb_train_natural: 10,
            nb_train_cg: 6,
            nb_test_per_class: 4,
            num_classes: 3,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn split_is_disjoint_and_sized() {
        let split = DatasetSplit::new(&dataset(), &config()).unwrap();
        assert_eq!(split.train_ni_idx.len(), 10);
        assert_eq!(split.test_ni_idx.len(), 4);
        assert!(split.train_ni_idx.iter().all(|i| !split.test_ni_idx.contains(i)));
        assert_eq!(split.train_cg_idx.len(), 2);
        for (train, test) in split.train_cg_idx.iter().zip(&split.test_cg_idx) {
            assert_eq!(train.len(), 6);
            assert_eq!(test.len(), 4);
            assert!(train.iter().all(|i| !test.contains(i)));
        }
    }

    #[test]
    fn split_depends_only_on_seed() {
        let a = DatasetSplit::new(&dataset(), &config()).unwrap();
        let b = DatasetSplit::new(&dataset(), &config()).unwrap();
        assert_eq!(a, b);
        let c = DatasetSplit::new(&dataset(), &TrainConfig { seed: 4, ..config() }).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn split_rejects_small_class() {
        let config = TrainConfig {
            nb_train_cg: 20,
            ..config()
        };
        assert!(matches!(DatasetSplit::new(&dataset(), &config), Err(NatcgError::Config { .. })));
    }

    #[test]
    fn split_rejects_class_count_mismatch() {
        let config = TrainConfig {
            num_classes: 5,
            ..config()
        };
        assert!(DatasetSplit::new(&dataset(), &config).is_err());
    }

    #[test]
    fn streams_have_expected_labels() {
        let data = dataset();
        let split = DatasetSplit::new(&data, &config()).unwrap();
        let streams = build_streams(&data, &split).unwrap();
        assert_eq!(streams.img_map.len(), 10 + 2 * 6);
        assert_eq!(streams.flow.len(), 10);
        let labels = streams.img_map.labels();
        assert_eq!(labels.iter().filter(|&&l| l == 0).count(), 10);
        assert_eq!(labels.iter().filter(|&&l| l == 1).count(), 6);
        assert_eq!(labels.iter().filter(|&&l| l == 2).count(), 6);
        assert!(streams.flow.labels().iter().all(|&l| l == NATURAL_CLASS));
    }

    #[test]
    fn normalized_stream_is_centered() {
        let stream = TrainStream::new(class_images(8, 3.0), vec![0; 8]).unwrap();
        let norm = compute_normalization(&stream.images).unwrap();
        for (m, s) in norm.mean.iter().zip(&norm.std) {
            assert!(m.abs() < 1e-4, "mean {m}");
            assert!((s - 1.0).abs() < 1e-3, "std {s}");
        }
    }

    #[test]
    fn constant_channel_gets_unit_std() {
        let flat = Tensor::ones((3, 1, 2, 2), DType::F32, &Device::Cpu).unwrap();
        let norm = compute_normalization(&flat).unwrap();
        assert_eq!(norm.mean, vec![1.0]);
        assert_eq!(norm.std, vec![1.0]);
    }

    #[test]
    fn every_index_once_per_epoch() {
        let stream = TrainStream::new(class_images(11, 0.0), vec![0; 11]).unwrap();
        let mut loader = DataLoader::new(stream, 4, true, 9).unwrap();
        assert_eq!(loader.num_batches(), 3);
        for _ in 0..2 {
            let mut seen: Vec<usize> = Vec::new();
            let mut sizes = Vec::new();
            for batch in loader.epoch() {
                let batch = batch.unwrap();
                batch.validate(11).unwrap();
                sizes.push(batch.len());
                seen.extend(&batch.indices);
            }
            seen.sort();
            assert_eq!(seen, (0..11).collect::<Vec<_>>());
            assert_eq!(sizes, vec![4, 4, 3]);
        }
    }

    #[test]
    fn shuffling_changes_between_epochs() {
        let stream = TrainStream::new(class_images(32, 0.0), vec![0; 32]).unwrap();
        let mut loader = DataLoader::new(stream, 32, true, 1).unwrap();
        let first = loader.epoch().next().unwrap().unwrap().indices;
        let second = loader.epoch().next().unwrap().unwrap().indices;
        assert_ne!(first, second);
        let seq = loader.sequential().next().unwrap().unwrap().indices;
        assert_eq!(seq, (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn validate_rejects_out_of_range_index() {
        let stream = TrainStream::new(class_images(4, 0.0), vec![0; 4]).unwrap();
        let loader = DataLoader::new(stream, 4, false, 0).unwrap();
        let batch = loader.sequential().next().unwrap().unwrap();
        assert!(batch.validate(4).is_ok());
        assert!(matches!(batch.validate(3), Err(NatcgError::InvalidBatch { .. })));
    }

    #[test]
    fn label_count_mismatch_rejected() {
        assert!(TrainStream::new(class_images(4, 0.0), vec![0; 3]).is_err());
    }

    #[test]
    fn safetensors_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.safetensors");
        let mut tensors = std::collections::HashMap::new();
        tensors.insert("natural".to_string(), class_images(5, 0.0));
        tensors.insert("cg.1".to_string(), class_images(3, 1.0));
        tensors.insert("cg.2".to_string(), class_images(4, 2.0));
        candle_core::safetensors::save(&tensors, &path).unwrap();

        let data = ImageDataset::from_safetensors(&path, &Device::Cpu).unwrap();
        assert_eq!(data.natural_count(), 5);
        assert_eq!(data.num_cg_algorithms(), 2);
        assert_eq!(data.cg_count(2), Some(4));
        assert_eq!(data.cg_count(3), None);
        assert_eq!(data.image_shape(), (2, 4, 4));
    }

    #[test]
    fn dataset_requires_natural_tensor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.safetensors");
        let mut tensors = std::collections::HashMap::new();
        tensors.insert("cg.1".to_string(), class_images(3, 1.0));
        candle_core::safetensors::save(&tensors, &path).unwrap();
        assert!(matches!(
            ImageDataset::from_safetensors(&path, &Device::Cpu),
            Err(NatcgError::InvalidBatch { .. })
        ));
    }
}

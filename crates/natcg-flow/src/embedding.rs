//! Embedding networks: the image map feeding the flow.
//!
//! An [`EmbeddingNet`] exposes two named capabilities instead of a mode
//! flag: [`classify`](EmbeddingNet::classify) (class logits, supervised
//! phase) and [`embed`](EmbeddingNet::embed) (feature vectors, flow phase).
//!
//! [`ConvEmbedder`] is the reference implementation:
//!
//! ```text
//! [B, C, H, W] → Conv3×3(C→c1) → ReLU → MaxPool2
//!              → Conv3×3(c1→c2) → ReLU → global average pool   [B, c2]
//!              → Linear(c2→D) → ReLU                            embed:    [B, D]
//!              → Linear(D→classes)                              classify: [B, classes]
//! ```

use candle_core::{DType, Device, Tensor, D};
use candle_nn::{conv2d, linear, Conv2d, Conv2dConfig, Linear, Module, VarBuilder, VarMap};
use natcg_core::NatcgError;

/// Contract between the image map and the training core.
pub trait EmbeddingNet {
    /// Class logits `[batch, num_classes]` for a batch of images.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::InvalidBatch`] for a malformed image batch.
    fn classify(&self, images: &Tensor) -> Result<Tensor, NatcgError>;

    /// Feature vectors `[batch, embedding_dim]` for a batch of images.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::InvalidBatch`] for a malformed image batch.
    fn embed(&self, images: &Tensor) -> Result<Tensor, NatcgError>;

    /// Length D of the feature vectors produced by [`Self::embed`].
    fn embedding_dim(&self) -> usize;

    /// Width of the logits produced by [`Self::classify`].
    fn num_classes(&self) -> usize;
}

/// Shape of a [`ConvEmbedder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvEmbedderConfig {
    pub in_channels: usize,
    pub conv1_channels: usize,
    pub conv2_channels: usize,
    pub embedding_dim: usize,
    pub num_classes: usize,
}

impl Default for ConvEmbedderConfig {
    fn default() -> Self {
        Self {
            in_channels: 3,
            conv1_channels: 32,
            conv2_channels: 64,
            embedding_dim: natcg_core::REFERENCE_EMBEDDING_DIM,
            num_classes: 5,
        }
    }
}

/// Small convolutional image map with a feature head and a class head.
///
/// # Example
///
/// ```
/// use natcg_flow::embedding::{ConvEmbedder, ConvEmbedderConfig, EmbeddingNet};
/// use candle_core::{DType, Device, Tensor};
/// use candle_nn::VarMap;
///
/// let var_map = VarMap::new();
/// let config = ConvEmbedderConfig {
///     in_channels: 1, conv1_channels: 4, conv2_channels: 8,
///     embedding_dim: 16, num_classes: 3,
/// };
/// let net = ConvEmbedder::new_trainable(&var_map, &config, &Device::Cpu).unwrap();
/// let images = Tensor::zeros((2, 1, 8, 8), DType::F32, &Device::Cpu).unwrap();
/// assert_eq!(net.embed(&images).unwrap().dims(), &[2, 16]);
/// assert_eq!(net.classify(&images).unwrap().dims(), &[2, 3]);
/// ```
pub struct ConvEmbedder {
    conv1: Conv2d,
    conv2: Conv2d,
    proj: Linear,
    head: Linear,
    config: ConvEmbedderConfig,
}

impl std::fmt::Debug for ConvEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ConvEmbedder({}→{}→{}→D={}, classes={})",
            self.config.in_channels,
            self.config.conv1_channels,
            self.config.conv2_channels,
            self.config.embedding_dim,
            self.config.num_classes
        )
    }
}

impl ConvEmbedder {
    /// Creates a trainable embedder registered in `var_map` under `img_map.`.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::Config`] for zero widths or fewer than two
    /// classes, [`NatcgError::Tensor`] if parameter creation fails.
    pub fn new_trainable(
        var_map: &VarMap,
        config: &ConvEmbedderConfig,
        device: &Device,
    ) -> Result<Self, NatcgError> {
        if config.in_channels == 0
            || config.conv1_channels == 0
            || config.conv2_channels == 0
            || config.embedding_dim == 0
        {
            return Err(NatcgError::Config {
                message: format!("ConvEmbedder widths must be > 0: {config:?}"),
            });
        }
        if config.num_classes < 2 {
            return Err(NatcgError::Config {
                message: format!("ConvEmbedder needs >= 2 classes, got {}", config.num_classes),
            });
        }
        let map_err = |e: candle_core::Error| NatcgError::Tensor {
            message: format!("ConvEmbedder new_trainable: {e}"),
        };

        let vb = VarBuilder::from_varmap(var_map, DType::F32, device);
        let conv_cfg = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };

        let conv1 = conv2d(config.in_channels, config.conv1_channels, 3, conv_cfg, vb.pp("img_map.conv1"))
            .map_err(map_err)?;
        let conv2 = conv2d(config.conv1_channels, config.conv2_channels, 3, conv_cfg, vb.pp("img_map.conv2"))
            .map_err(map_err)?;
        let proj = linear(config.conv2_channels, config.embedding_dim, vb.pp("img_map.proj"))
            .map_err(map_err)?;
        let head = linear(config.embedding_dim, config.num_classes, vb.pp("img_map.head"))
            .map_err(map_err)?;

        Ok(Self {
            conv1,
            conv2,
            proj,
            head,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &ConvEmbedderConfig {
        &self.config
    }

    fn check_images(&self, images: &Tensor) -> Result<(), NatcgError> {
        match images.dims() {
            [b, c, h, w] if *c == self.config.in_channels && *b > 0 && *h >= 2 && *w >= 2 => Ok(()),
            [_, c, _, _] if *c != self.config.in_channels => Err(NatcgError::InvalidBatch {
                message: format!(
                    "expected {} channels, got {c} (shape {:?})",
                    self.config.in_channels,
                    images.dims()
                ),
            }),
            other => Err(NatcgError::InvalidBatch {
                message: format!("expected a non-empty [B, C, H>=2, W>=2] image batch, got {other:?}"),
            }),
        }
    }

    fn features(&self, images: &Tensor) -> Result<Tensor, candle_core::Error> {
        let h = self.conv1.forward(images)?.relu()?.max_pool2d(2)?;
        let h = self.conv2.forward(&h)?.relu()?;
        let pooled = h.flatten_from(2)?.mean(D::Minus1)?;
        self.proj.forward(&pooled)?.relu()
    }
}

impl EmbeddingNet for ConvEmbedder {
    fn classify(&self, images: &Tensor) -> Result<Tensor, NatcgError> {
        self.check_images(images)?;
        let map_err = |e: candle_core::Error| NatcgError::Tensor {
            message: format!("ConvEmbedder classify: {e}"),
        };
        let features = self.features(images).map_err(map_err)?;
        self.head.forward(&features).map_err(map_err)
    }

    fn embed(&self, images: &Tensor) -> Result<Tensor, NatcgError> {
        self.check_images(images)?;
        self.features(images).map_err(|e| NatcgError::Tensor {
            message: format!("ConvEmbedder embed: {e}"),
        })
    }

    fn embedding_dim(&self) -> usize {
        self.config.embedding_dim
    }

    fn num_classes(&self) -> usize {
        self.config.num_classes
    }
}

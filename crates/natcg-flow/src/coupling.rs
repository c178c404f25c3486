//! Additive coupling block.
//!
//! Splits a `[batch, D]` tensor into halves `A = x[:, ..D/2]` and
//! `B = x[:, D/2..]`, keeps one half fixed and shifts the other by an MLP of
//! the fixed half:
//!
//! ```text
//! ShiftSecond:  (A, B) -> (A, B + m(A))
//! ShiftFirst:   (A, B) -> (A + m(B), B)
//! ```
//!
//! The Jacobian is unit triangular, so its determinant is exactly 1 and the
//! inverse is a subtraction of the same shift.

use candle_core::{Device, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder};
use natcg_core::NatcgError;

/// Which half of the vector a coupling block shifts.
///
/// # Example
///
/// ```
/// use natcg_flow::coupling::Orientation;
///
/// assert_eq!(Orientation::for_layer(0), Orientation::ShiftSecond);
/// assert_eq!(Orientation::for_layer(1), Orientation::ShiftFirst);
/// assert_eq!(Orientation::ShiftFirst.flipped(), Orientation::ShiftSecond);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// First half fixed, second half shifted.
    ShiftSecond,
    /// Second half fixed, first half shifted.
    ShiftFirst,
}

impl Orientation {
    /// Alternating orientation for the `layer_idx`-th block of a stack.
    pub fn for_layer(layer_idx: usize) -> Self {
        if layer_idx % 2 == 0 {
            Self::ShiftSecond
        } else {
            Self::ShiftFirst
        }
    }

    pub fn flipped(&self) -> Self {
        match self {
            Self::ShiftSecond => Self::ShiftFirst,
            Self::ShiftFirst => Self::ShiftSecond,
        }
    }
}

/// Shift network `m`: `half → hidden (ReLU) × depth → half`.
struct ShiftNet {
    hidden: Vec<Linear>,
    out: Linear,
}

impl ShiftNet {
    fn forward(&self, input: &Tensor) -> Result<Tensor, candle_core::Error> {
        let mut h = input.clone();
        for layer in &self.hidden {
            h = layer.forward(&h)?.relu()?;
        }
        self.out.forward(&h)
    }

    fn squared_norm(&self) -> Result<f64, candle_core::Error> {
        let mut total = 0.0f64;
        for layer in self.hidden.iter().chain(std::iter::once(&self.out)) {
            total += layer.weight().sqr()?.sum_all()?.to_scalar::<f32>()? as f64;
            if let Some(bias) = layer.bias() {
                total += bias.sqr()?.sum_all()?.to_scalar::<f32>()? as f64;
            }
        }
        Ok(total)
    }
}

/// One additive coupling block with a fixed [`Orientation`].
pub struct CouplingBlock {
    orientation: Orientation,
    shift: ShiftNet,
    half: usize,
}

impl std::fmt::Debug for CouplingBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CouplingBlock({:?}, {}→{}×{}→{})",
            self.orientation,
            self.half,
            self.hidden_dim(),
            self.shift.hidden.len(),
            self.half
        )
    }
}

impl CouplingBlock {
    /// Creates a trainable block whose parameters live under `vb`.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::Config`] if `dim` is odd or any width is zero,
    /// and [`NatcgError::Tensor`] if parameter creation fails.
    pub fn new(
        vb: VarBuilder,
        dim: usize,
        hidden_dim: usize,
        depth: usize,
        orientation: Orientation,
    ) -> Result<Self, NatcgError> {
        if dim < 2 || dim % 2 != 0 {
            return Err(NatcgError::Config {
                message: format!("coupling block needs an even dimension >= 2, got {dim}"),
            });
        }
        if hidden_dim == 0 || depth == 0 {
            return Err(NatcgError::Config {
                message: "coupling block needs hidden_dim > 0 and depth > 0".to_string(),
            });
        }
        let map_err = |e: candle_core::Error| NatcgError::Tensor {
            message: format!("CouplingBlock new: {e}"),
        };

        let half = dim / 2;
        let mut hidden = Vec::with_capacity(depth);
        for i in 0..depth {
            let in_dim = if i == 0 { half } else { hidden_dim };
            hidden.push(linear(in_dim, hidden_dim, vb.pp(format!("hidden_{i}"))).map_err(map_err)?);
        }
        let out = linear(hidden_dim, half, vb.pp("out")).map_err(map_err)?;

        Ok(Self {
            orientation,
            shift: ShiftNet { hidden, out },
            half,
        })
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Full vector dimension this block operates on.
    pub fn dim(&self) -> usize {
        self.half * 2
    }

    fn hidden_dim(&self) -> usize {
        self.shift.out.weight().dims()[1]
    }

    /// Sum of squares of every weight and bias in the shift network.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::Tensor`] if a parameter cannot be read.
    pub fn squared_norm(&self) -> Result<f64, NatcgError> {
        self.shift.squared_norm().map_err(|e| NatcgError::Tensor {
            message: format!("CouplingBlock squared_norm: {e}"),
        })
    }

    /// Applies the block: the shifted half gains `m(fixed half)`.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::DimensionMismatch`] if `input` is not
    /// `[batch, dim]`.
    pub fn forward(&self, input: &Tensor) -> Result<Tensor, NatcgError> {
        self.couple(input, 1.0, "CouplingBlock forward")
    }

    /// Undoes [`Self::forward`]: the shifted half loses `m(fixed half)`.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::DimensionMismatch`] if `input` is not
    /// `[batch, dim]`.
    pub fn inverse(&self, input: &Tensor) -> Result<Tensor, NatcgError> {
        self.couple(input, -1.0, "CouplingBlock inverse")
    }

    fn couple(&self, input: &Tensor, sign: f64, context: &str) -> Result<Tensor, NatcgError> {
        check_rows(input, self.dim(), context)?;
        let map_err = |e: candle_core::Error| NatcgError::Tensor {
            message: format!("{context}: {e}"),
        };

        let first = input.narrow(1, 0, self.half).map_err(map_err)?;
        let second = input.narrow(1, self.half, self.half).map_err(map_err)?;

        // The fixed half passes through untouched; only its shift is added.
        let (first, second) = match self.orientation {
            Orientation::ShiftSecond => {
                let shift = self.shift.forward(&first).map_err(map_err)?;
                let shifted = (second + shift.affine(sign, 0.0).map_err(map_err)?).map_err(map_err)?;
                (first, shifted)
            }
            Orientation::ShiftFirst => {
                let shift = self.shift.forward(&second).map_err(map_err)?;
                let shifted = (first + shift.affine(sign, 0.0).map_err(map_err)?).map_err(map_err)?;
                (shifted, second)
            }
        };

        Tensor::cat(&[&first, &second], 1).map_err(map_err)
    }
}

/// Checks that `input` is `[batch, dim]`.
pub(crate) fn check_rows(input: &Tensor, dim: usize, context: &str) -> Result<(), NatcgError> {
    match input.dims() {
        [_, d] if *d == dim => Ok(()),
        [_, d] => Err(NatcgError::DimensionMismatch {
            context: context.to_string(),
            expected: dim,
            actual: *d,
        }),
        other => Err(NatcgError::DimensionMismatch {
            context: format!("{context} (expected rank 2, got shape {other:?})"),
            expected: dim,
            actual: other.last().copied().unwrap_or(0),
        }),
    }
}

/// Builds a `[rows, dim]` tensor from row-major data.
pub(crate) fn rows_tensor(
    data: &[f32],
    dim: usize,
    device: &Device,
) -> Result<Tensor, NatcgError> {
    if dim == 0 || data.len() % dim != 0 {
        return Err(NatcgError::DimensionMismatch {
            context: "row data".to_string(),
            expected: dim,
            actual: data.len(),
        });
    }
    Tensor::from_slice(data, (data.len() / dim, dim), device).map_err(|e| NatcgError::Tensor {
        message: format!("rows_tensor: {e}"),
    })
}

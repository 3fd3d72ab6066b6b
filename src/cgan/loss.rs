use candle_core::{DType, Result, Tensor};

use crate::config::LossKind;

const EPS: f64 = 1e-7;

/// Mean loss of class scores `pred` against one-hot `target`, both `[B, K]`.
///
/// Cross-entropy treats `pred` as probabilities clipped to `[ε, 1−ε]`.
pub fn compute_loss(kind: LossKind, pred: &Tensor, target: &Tensor) -> Result<Tensor> {
    match kind {
        LossKind::Mse => candle_nn::loss::mse(pred, target),
        LossKind::CategoricalCrossentropy => {
            let logp = pred.clamp(EPS, 1.0 - EPS)?.log()?;
            (logp * target)?.sum(1)?.mean_all()?.neg()
        }
    }
}

/// Fraction of rows whose arg-max matches the target's arg-max.
pub fn accuracy(pred: &Tensor, target: &Tensor) -> Result<f32> {
    pred.argmax(1)?
        .eq(&target.argmax(1)?)?
        .to_dtype(DType::F32)?
        .mean_all()?
        .to_scalar::<f32>()
}

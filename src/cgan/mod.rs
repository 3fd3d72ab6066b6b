//! Label-conditioned GAN whose discriminator is also the classifier.
//!
//! Both networks see square single-channel images `[B, 1, H, H]` (one
//! channel-convolution matrix per window) and a class label per image.
//! The discriminator's head has one output per class; it is trained to
//! predict the class of real images and the conditioning class of generated
//! ones, and the generator is trained through the discriminator to make the
//! conditioning class recognisable.
mod discriminator;
mod generator;
mod loss;
mod model;

pub use discriminator::Discriminator;
pub use generator::Generator;
pub use loss::{accuracy, compute_loss};
pub use model::{Cgan, ModelFiles};

use candle_core::{Result, Tensor};

/// `max(x, slope·x)`, i.e. leaky ReLU for `0 < slope < 1`.
pub(crate) fn leaky_relu(xs: &Tensor, slope: f64) -> Result<Tensor> {
    xs.maximum(&(xs * slope)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn leaky_relu_scales_negatives() {
        let x = Tensor::new(&[-2.0f32, 0.0, 3.0], &Device::Cpu).unwrap();
        let y: Vec<f32> = leaky_relu(&x, 0.2).unwrap().to_vec1().unwrap();
        approx::assert_abs_diff_eq!(y[0], -0.4, epsilon = 1e-6);
        assert_eq!(y[1], 0.0);
        assert_eq!(y[2], 3.0);
    }
}

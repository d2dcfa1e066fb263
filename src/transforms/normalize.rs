use super::pipeline::{MAX_PIXEL_VAL, Transform};
use burn::{
    prelude::Backend,
    tensor::{Device, Tensor},
};
use rand::Rng;

/// Channel means of the ImageNet training set, on the `[0, 1]` scale.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Channel standard deviations of the ImageNet training set, on the `[0, 1]` scale.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Maps raw `0..=255` RGB tensors to the zero-centred inputs the VGG16 weights expect.
///
/// `(p / 255 - mean) / std` is folded into a single `p * scale - shift` per channel.
#[derive(Clone, Debug)]
pub struct ImageNormalizer<B: Backend> {
    scale: Tensor<B, 3>,
    shift: Tensor<B, 3>,
}

impl<B: Backend> ImageNormalizer<B> {
    pub fn new(device: &Device<B>) -> Self {
        let scale = IMAGENET_STD.map(|std| 1.0 / (MAX_PIXEL_VAL * std));
        let shift: [f32; 3] = std::array::from_fn(|c| IMAGENET_MEAN[c] / IMAGENET_STD[c]);

        Self {
            scale: Tensor::<B, 1>::from_floats(scale, device).reshape([3, 1, 1]),
            shift: Tensor::<B, 1>::from_floats(shift, device).reshape([3, 1, 1]),
        }
    }

    /// `[3, H, W]` raw pixels to normalized values.
    pub fn normalize(&self, pixels: Tensor<B, 3>) -> Tensor<B, 3> {
        pixels * self.scale.clone() - self.shift.clone()
    }
}

impl<B: Backend, R: Rng> Transform<B, R> {
    /// Last step before batching, for training and validation images alike.
    pub fn normalize(mut self) -> Self {
        self.image = ImageNormalizer::new(&self.device).normalize(self.image);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::pipeline::create_test_image;
    use burn::backend::{NdArray, ndarray::NdArrayDevice};
    use burn::tensor::{Tolerance, ops::FloatElem};

    type B = NdArray<f32>;
    type FT = FloatElem<B>;

    #[test]
    fn normalize_uses_imagenet_statistics() {
        let device = &NdArrayDevice::default();
        let image = create_test_image(2, 2, [255, 0, 128]);

        let out = Transform::<B>::new(image, device).normalize().finish();

        let r = (1.0 - 0.485) / 0.229;
        let g = (0.0 - 0.456) / 0.224;
        let b = (128.0 / 255.0 - 0.406) / 0.225;

        Tensor::<B, 3>::from_data(
            [[[r, r], [r, r]], [[g, g], [g, g]], [[b, b], [b, b]]],
            device,
        )
        .into_data()
        .assert_approx_eq::<FT>(&out.to_data(), Tolerance::default());
    }
}

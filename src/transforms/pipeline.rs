use burn::tensor::{Tensor, TensorData, backend::Backend};
use image::RgbImage;

use rand::{Rng, SeedableRng, rngs::StdRng};

/// Maximum pixel value for a RGB8 pixel
pub const MAX_PIXEL_VAL: f32 = 255.0;

/// Chainable per-image preprocessing: resize, random augmentation and normalization.
///
/// Holds the `[C, H, W]` image tensor (pixel values in `0..=255` until [`Transform::normalize`])
/// together with the random generator the stochastic steps draw from, so a seeded `R` gives
/// reproducible augmentations.
#[derive(Clone, Debug)]
pub struct Transform<B, R = StdRng>
where
    B: Backend,
    R: Rng,
{
    pub image: Tensor<B, 3>,
    pub device: <B as Backend>::Device,
    pub rng: R,
}

impl<B: Backend, R: Rng> Transform<B, R> {
    /// Pipeline over an existing tensor with a caller supplied generator.
    pub fn new_seeded(image: Tensor<B, 3>, rng: R) -> Self {
        let device = image.device();
        Self { image, device, rng }
    }

    /// Returns `true` with probability `p`.
    ///
    /// Values of `p` outside `[0.0, 1.0]` are clamped to this range, so `0.0` never applies and
    /// `1.0` always does.
    pub fn should_apply(&mut self, p: f32) -> bool {
        self.rng.random::<f32>() < p.clamp(0.0, 1.0)
    }

    /// Ends the chain and returns the `[3, H, W]` tensor.
    pub fn finish(self) -> Tensor<B, 3> {
        self.image
    }

    /// Converts the current `[C, H, W]` tensor back into an `image::RgbImage`.
    ///
    /// Pixel values are expected in the `0–255` range and saturate when cast to `u8`.
    pub fn to_rgb_image(&self) -> RgbImage {
        let [_ch, height, width] = self.image.dims();
        let buf: Vec<u8> = self
            .image
            .clone()
            .permute([1, 2, 0])
            .to_data()
            .iter::<f32>()
            .map(|p| p as u8)
            .collect();

        RgbImage::from_fn(width as u32, height as u32, |x, y| {
            let i = (y as usize * width + x as usize) * 3;
            image::Rgb([buf[i], buf[i + 1], buf[i + 2]])
        })
    }

    /// `[H, W, 3]` interleaved pixels to a channel-first `[3, H, W]` tensor, values unscaled.
    pub fn rgb_img_as_tensor(image: RgbImage, device: &B::Device) -> Tensor<B, 3> {
        let (width, height) = image.dimensions();
        let img_vec: Vec<f32> = image.into_raw().iter().map(|&p| p as f32).collect();
        Tensor::<B, 3>::from_data(
            TensorData::new(img_vec, [height as usize, width as usize, 3])
                .convert::<B::FloatElem>(),
            device,
        )
        .permute([2, 0, 1])
    }
}

impl<B: Backend> Transform<B> {
    /// Pipeline over a decoded image, seeded from the OS.
    pub fn new(image: RgbImage, device: &<B as Backend>::Device) -> Self {
        let image = Self::rgb_img_as_tensor(image, device);

        Self {
            rng: StdRng::from_os_rng(),
            image,
            device: device.clone(),
        }
    }
}

/// Creates an RGB test image filled with a single colour.
pub fn create_test_image(width: u32, height: u32, pattern: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(width, height, image::Rgb(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{NdArray, ndarray::NdArrayDevice};

    type B = NdArray<f32>;

    #[test]
    fn equal_seeds_draw_equal_augmentations() {
        let device = &NdArrayDevice::default();
        let image = Tensor::<B, 3>::zeros([3, 2, 2], device);

        let mut a = Transform::new_seeded(image.clone(), StdRng::seed_from_u64(3));
        let mut b = Transform::new_seeded(image, StdRng::seed_from_u64(3));

        let draws_a: Vec<bool> = (0..32).map(|_| a.should_apply(0.5)).collect();
        let draws_b: Vec<bool> = (0..32).map(|_| b.should_apply(0.5)).collect();

        assert_eq!(draws_a, draws_b);
        assert!(draws_a.contains(&true) && draws_a.contains(&false));
    }

    #[test]
    fn rgb_image_round_trips_through_channel_first_tensor() {
        let device = &NdArrayDevice::default();
        let mut image = create_test_image(3, 2, [10, 20, 30]);
        image.put_pixel(2, 1, image::Rgb([200, 100, 50]));

        let t = Transform::<B>::new(image.clone(), device);
        assert_eq!(t.image.dims(), [3, 2, 3]);
        assert_eq!(t.to_rgb_image(), image);
    }

    #[test]
    fn should_apply_respects_bounds() {
        let device = &NdArrayDevice::default();
        let image = Tensor::<B, 3>::zeros([3, 2, 2], device);
        let mut t = Transform::new_seeded(image, StdRng::seed_from_u64(7));

        assert!((0..100).all(|_| !t.should_apply(0.0)));
        assert!((0..100).all(|_| t.should_apply(1.0)));
        assert!((0..100).all(|_| t.should_apply(4.0)));
    }
}

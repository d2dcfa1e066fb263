use super::pipeline::Transform;
use burn::prelude::Backend;
use image::{DynamicImage, imageops::FilterType};
use rand::Rng;

impl<B: Backend, R: Rng> Transform<B, R> {
    /// Stretches the image to `new_w` x `new_h` with a triangle (bilinear) filter, ignoring the
    /// aspect ratio, the way images are fed to the classifier.
    ///
    /// Runs on the CPU through `image`. Same-size and zero-size requests leave the image as is.
    pub fn resize_triangular(mut self, new_w: usize, new_h: usize) -> Self {
        let [_ch, height, width] = self.image.dims();

        if (new_w == width && new_h == height) || new_w == 0 || new_h == 0 {
            return self;
        }

        let image = DynamicImage::from(self.to_rgb_image())
            .resize_exact(new_w as u32, new_h as u32, FilterType::Triangle)
            .to_rgb8();

        self.image = Self::rgb_img_as_tensor(image, &self.device);

        self
    }
}

#[cfg(test)]
mod tests {
    use crate::transforms::pipeline::{Transform, create_test_image};
    use burn::backend::{NdArray, ndarray::NdArrayDevice};

    type B = NdArray<f32>;

    #[test]
    fn triangular_resize_changes_dimensions() {
        let device = &NdArrayDevice::default();
        let image = create_test_image(40, 20, [12, 34, 56]);

        let resized = Transform::<B>::new(image, device)
            .resize_triangular(16, 8)
            .finish();

        assert_eq!(resized.dims(), [3, 8, 16]);
    }

    #[test]
    fn triangular_resize_keeps_flat_colour() {
        let device = &NdArrayDevice::default();
        let image = create_test_image(10, 10, [12, 34, 56]);

        let t = Transform::<B>::new(image, device).resize_triangular(5, 7);
        let out = t.to_rgb_image();

        assert_eq!(out.dimensions(), (5, 7));
        assert!(out.pixels().all(|p| p.0 == [12, 34, 56]));
    }

    #[test]
    fn same_size_is_a_no_op() {
        let device = &NdArrayDevice::default();
        let image = create_test_image(6, 4, [1, 2, 3]);

        let t = Transform::<B>::new(image.clone(), device).resize_triangular(6, 4);
        assert_eq!(t.to_rgb_image(), image);
    }
}

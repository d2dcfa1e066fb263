use super::pipeline::Transform;
use burn::prelude::Backend;
use imageproc::geometric_transformations::{Interpolation, Projection, warp};
use rand::Rng;

/// Ranges of the random geometric augmentation applied to training images.
///
/// Rotation and shear are in degrees, shifts are fractions of the image size and `zoom_range`
/// `z` draws independent horizontal and vertical zoom factors from `[1 - z, 1 + z]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AugmentationConfig {
    pub rotation_range: f32,
    pub width_shift_range: f32,
    pub height_shift_range: f32,
    pub shear_range: f32,
    pub zoom_range: f32,
    pub horizontal_flip: bool,
}

impl AugmentationConfig {
    /// The augmentation used for training data.
    pub fn standard() -> Self {
        Self {
            rotation_range: 30.0,
            width_shift_range: 0.2,
            height_shift_range: 0.2,
            shear_range: 0.2,
            zoom_range: 0.2,
            horizontal_flip: true,
        }
    }

    pub fn none() -> Self {
        Self {
            rotation_range: 0.0,
            width_shift_range: 0.0,
            height_shift_range: 0.0,
            shear_range: 0.0,
            zoom_range: 0.0,
            horizontal_flip: false,
        }
    }

    fn is_affine_identity(&self) -> bool {
        self.rotation_range == 0.0
            && self.width_shift_range == 0.0
            && self.height_shift_range == 0.0
            && self.shear_range == 0.0
            && self.zoom_range == 0.0
    }
}

/// One draw of the random affine augmentation, in pixels and degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineParams {
    pub rotation: f32,
    pub shift_x: f32,
    pub shift_y: f32,
    pub shear: f32,
    pub zoom_x: f32,
    pub zoom_y: f32,
}

fn symmetric<R: Rng>(rng: &mut R, range: f32) -> f32 {
    if range > 0.0 {
        rng.random_range(-range..=range)
    } else {
        0.0
    }
}

impl AffineParams {
    pub fn sample<R: Rng>(rng: &mut R, cfg: &AugmentationConfig, width: usize, height: usize) -> Self {
        Self {
            rotation: symmetric(rng, cfg.rotation_range),
            shift_x: symmetric(rng, cfg.width_shift_range) * width as f32,
            shift_y: symmetric(rng, cfg.height_shift_range) * height as f32,
            shear: symmetric(rng, cfg.shear_range),
            zoom_x: 1.0 + symmetric(rng, cfg.zoom_range),
            zoom_y: 1.0 + symmetric(rng, cfg.zoom_range),
        }
    }

    /// Builds the input to output mapping, rotating, shearing and zooming about the image
    /// centre before shifting.
    pub fn projection(&self, width: usize, height: usize) -> Projection {
        let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
        let shear = self.shear.to_radians();

        // A near 90 degree shear is not invertible, skip it rather than fail.
        let shear = Projection::from_matrix([
            1.0,
            -shear.sin(),
            0.0,
            0.0,
            shear.cos(),
            0.0,
            0.0,
            0.0,
            1.0,
        ])
        .unwrap_or_else(|| Projection::scale(1.0, 1.0));

        Projection::translate(-cx, -cy)
            .and_then(Projection::rotate(self.rotation.to_radians()))
            .and_then(shear)
            .and_then(Projection::scale(self.zoom_x, self.zoom_y))
            .and_then(Projection::translate(cx + self.shift_x, cy + self.shift_y))
    }
}

impl<B: Backend, R: Rng> Transform<B, R> {
    /// Applies a random rotation, shift, shear and zoom drawn from `cfg`, followed by a
    /// horizontal flip with probability 0.5 when `cfg.horizontal_flip` is set.
    ///
    /// Pixels mapped from outside the source frame are filled with black.
    pub fn random_augment(mut self, cfg: &AugmentationConfig) -> Self {
        if !cfg.is_affine_identity() {
            let [_ch, height, width] = self.image.dims();
            let params = AffineParams::sample(&mut self.rng, cfg, width, height);
            self = self.affine(&params);
        }

        if cfg.horizontal_flip {
            self = self.random_horizontal_flip(0.5);
        }

        self
    }

    /// Warps the image with a fixed set of affine parameters.
    pub fn affine(mut self, params: &AffineParams) -> Self {
        let [_ch, height, width] = self.image.dims();
        let projection = params.projection(width, height);

        let warped = warp(
            &self.to_rgb_image(),
            &projection,
            Interpolation::Bilinear,
            image::Rgb([0, 0, 0]),
        );

        self.image = Self::rgb_img_as_tensor(warped, &self.device);
        self
    }
}

use crate::transforms::pipeline::Transform;
use burn::prelude::Backend;
use rand::Rng;

impl<B: Backend, R: Rng> Transform<B, R> {
    /// Mirrors the image left to right.
    pub fn horizontal_flip(mut self) -> Self {
        self.image = self.image.flip([2]);
        self
    }

    /// Mirrors the image with probability `p`.
    pub fn random_horizontal_flip(mut self, p: f32) -> Self {
        if !self.should_apply(p) {
            return self;
        }
        self.horizontal_flip()
    }
}

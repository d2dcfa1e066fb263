use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use image::RgbImage;
use log::warn;

use crate::dataset::ImageSample;
use crate::transforms::{AugmentationConfig, Transform};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchType {
    Train,
    Test,
}

#[derive(Clone, Debug)]
pub struct ClassificationBatch<B: Backend> {
    /// `[N, 3, H, W]`, normalized.
    pub images: Tensor<B, 4>,
    /// `[N]` class ids.
    pub targets: Tensor<B, 1, Int>,
}

/// Decodes, augments and stacks image samples into model-ready batches.
#[derive(Clone, Debug)]
pub struct ImageBatcher {
    image_size: usize,
    augmentation: Option<AugmentationConfig>,
}

impl ImageBatcher {
    /// Training batches are always augmented, test batches only when `test_augmentation` is set.
    pub fn new(batch_type: BatchType, image_size: usize, test_augmentation: bool) -> Self {
        let augmentation = match batch_type {
            BatchType::Train => Some(AugmentationConfig::standard()),
            BatchType::Test if test_augmentation => Some(AugmentationConfig::standard()),
            BatchType::Test => None,
        };

        Self {
            image_size,
            augmentation,
        }
    }

    pub fn is_augmenting(&self) -> bool {
        self.augmentation.is_some()
    }

    fn load<B: Backend>(&self, sample: &ImageSample, device: &B::Device) -> Tensor<B, 3> {
        let size = self.image_size as u32;
        let image = match image::open(&sample.path) {
            Ok(image) => image.to_rgb8(),
            Err(err) => {
                warn!("Couldn't decode {}: {}, using a blank frame", sample.path.display(), err);
                RgbImage::new(size, size)
            }
        };

        let mut t = Transform::<B>::new(image, device).resize_triangular(self.image_size, self.image_size);

        if let Some(cfg) = self.augmentation.as_ref() {
            t = t.random_augment(cfg);
        }

        t.normalize().finish()
    }
}

impl<B: Backend> Batcher<B, ImageSample, ClassificationBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<ImageSample>, device: &B::Device) -> ClassificationBatch<B> {
        let images = items
            .iter()
            .map(|item| self.load::<B>(item, device).unsqueeze::<4>())
            .collect();

        let labels: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let count = labels.len();

        let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(labels, [count]), device);

        ClassificationBatch {
            images: Tensor::cat(images, 0),
            targets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::pipeline::create_test_image;
    use burn::backend::{NdArray, ndarray::NdArrayDevice};
    use burn::tensor::cast::ToElement;

    type B = NdArray<f32>;

    #[test]
    fn test_batches_are_augmented_only_on_request() {
        assert!(ImageBatcher::new(BatchType::Train, 32, false).is_augmenting());
        assert!(!ImageBatcher::new(BatchType::Test, 32, false).is_augmenting());
        assert!(ImageBatcher::new(BatchType::Test, 32, true).is_augmenting());
    }

    #[test]
    fn batch_stacks_resized_images_and_targets() {
        let device = &NdArrayDevice::default();
        let tmp = tempfile::tempdir().unwrap();

        let a = tmp.path().join("a.png");
        let b = tmp.path().join("b.png");
        create_test_image(20, 10, [255, 0, 0]).save(&a).unwrap();
        create_test_image(7, 9, [0, 0, 255]).save(&b).unwrap();

        let batcher = ImageBatcher::new(BatchType::Test, 16, false);
        let batch: ClassificationBatch<B> = batcher.batch(
            vec![
                ImageSample { path: a, label: 1 },
                ImageSample { path: b, label: 0 },
            ],
            device,
        );

        assert_eq!(batch.images.dims(), [2, 3, 16, 16]);
        assert_eq!(
            batch.targets.to_data().to_vec::<i64>().unwrap(),
            vec![1, 0]
        );
    }

    #[test]
    fn undecodable_image_becomes_blank_frame() {
        let device = &NdArrayDevice::default();
        let tmp = tempfile::tempdir().unwrap();
        let broken = tmp.path().join("broken.jpg");
        std::fs::write(&broken, b"not an image").unwrap();

        let batcher = ImageBatcher::new(BatchType::Test, 8, false);
        let batch: ClassificationBatch<B> = batcher.batch(
            vec![ImageSample {
                path: broken,
                label: 0,
            }],
            device,
        );

        assert_eq!(batch.images.dims(), [1, 3, 8, 8]);
        // A black frame normalizes to -mean/std, red channel = -0.485 / 0.229
        let first = batch.images.slice([0..1, 0..1, 0..1, 0..1]).into_scalar().to_f32();
        assert!((first + 0.485 / 0.229).abs() < 1e-4);
    }
}

//! Training batches delivered by the external data pipeline

use crate::error::{Error, Result};
use crate::model::Device;
use crate::tensor::Tensor;
use ndarray::Array3;

/// Number of segmentation classes (background, vehicle)
pub const NUM_CLASSES: usize = 2;

/// Class id of the positive (vehicle) class
pub const FOREGROUND: u8 = 1;

/// One batch: an image tensor and its integer class-label masks
///
/// Images have shape (n, channels, h, w); masks have shape (n, h, w) with
/// values in `0..NUM_CLASSES`. Batches are produced by the data pipeline and
/// consumed read-only by the training loop.
#[derive(Debug, Clone)]
pub struct Batch {
    pub images: Tensor,
    pub masks: Array3<u8>,
}

impl Batch {
    pub fn new(images: Tensor, masks: Array3<u8>) -> Self {
        Self { images, masks }
    }

    /// Check that image and mask spatial dimensions agree
    ///
    /// A mismatch is an upstream data-pipeline defect and aborts the run.
    pub fn validate(&self) -> Result<()> {
        let shape = self.images.shape();
        let (n, h, w) = self.masks.dim();
        if shape.len() != 4 || shape[0] != n || shape[2] != h || shape[3] != w {
            return Err(Error::ShapeMismatch {
                expected: vec![n, h, w],
                got: shape.to_vec(),
            });
        }
        Ok(())
    }

    /// Place the batch tensors on the compute device
    ///
    /// The host backend keeps data in place; the call still participates in
    /// the per-batch protocol so accelerator backends have a seam.
    pub fn to_device(&self, device: &Device) -> Result<()> {
        device.ensure_available()
    }

    /// Total number of labelled pixels in the batch
    pub fn pixel_count(&self) -> usize {
        self.masks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(n: usize, c: usize, h: usize, w: usize) -> Batch {
        Batch::new(
            Tensor::zeros(&[n, c, h, w], false),
            Array3::zeros((n, h, w)),
        )
    }

    #[test]
    fn test_validate_accepts_matching_shapes() {
        assert!(batch(2, 3, 4, 4).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_spatial_mismatch() {
        let b = Batch::new(
            Tensor::zeros(&[1, 3, 4, 4], false),
            Array3::zeros((1, 4, 5)),
        );
        let err = b.validate().unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_validate_rejects_non_4d_images() {
        let b = Batch::new(Tensor::from_vec(vec![0.0; 16], false), Array3::zeros((1, 4, 4)));
        assert!(b.validate().is_err());
    }

    #[test]
    fn test_to_device_cpu() {
        assert!(batch(1, 1, 2, 2).to_device(&Device::Cpu).is_ok());
        assert!(batch(1, 1, 2, 2).to_device(&Device::Accelerator(1)).is_err());
    }

    #[test]
    fn test_pixel_count() {
        assert_eq!(batch(2, 3, 4, 5).pixel_count(), 40);
    }
}

//! Device abstraction and the segmentation-model collaborator trait

use crate::error::{Error, Result};
use crate::tensor::Tensor;

/// Compute device a run is pinned to
///
/// The device is an explicit parameter threaded through the training loop
/// rather than an ambient global. The ndarray backend is host-only, so
/// requesting an accelerator fails up front instead of silently falling back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    Accelerator(usize),
}

impl Device {
    /// Fail fast if this backend cannot place tensors on the device
    pub fn ensure_available(&self) -> Result<()> {
        match self {
            Device::Cpu => Ok(()),
            Device::Accelerator(idx) => Err(Error::DeviceUnavailable(*idx)),
        }
    }
}

/// An opaque differentiable segmentation model
///
/// The training loop only ever sees this surface: a forward pass producing
/// per-pixel class scores of shape (n, classes, h, w), the trainable
/// parameter slice the optimizer mutates, and device placement. The score
/// tensor returned by `forward` must carry the model's own backward chain so
/// that, once the loss writes a gradient into the score tensor's cell and
/// invokes that chain, parameter gradients are populated.
pub trait SegmentationModel {
    /// Forward-evaluate a batch of images, shape (n, channels, h, w)
    fn forward(&mut self, images: &Tensor) -> Result<Tensor>;

    /// Trainable parameters, in a stable order
    fn parameters(&mut self) -> &mut [Tensor];

    /// Move parameters to the given device
    fn to_device(&mut self, device: &Device) -> Result<()>;
}

//! # Segmentar: Binary Segmentation Training Loop
//!
//! Segmentar drives training for two-class image segmentation models: a
//! Dice-aware composite loss, step-decay learning-rate scheduling, windowed
//! telemetry, and resumable rolling checkpoints with a best-model copy.
//!
//! ## Architecture
//!
//! - **tensor**: Flat tensors with gradient cells and a backward-op seam
//! - **model**: The `SegmentationModel` trait and device placement
//! - **data**: Batches of images and class masks
//! - **optim**: Adam and step-decay scheduling
//! - **train**: Metrics, loss composition, and the training session
//! - **checkpoint**: Rolling checkpoint plus best-model persistence
//! - **monitor**: Scalar and image telemetry sinks

pub mod checkpoint;
pub mod data;
pub mod model;
pub mod monitor;
pub mod optim;
pub mod tensor;
pub mod train;

pub mod error;

// Re-export commonly used types
pub use checkpoint::{Checkpoint, CheckpointManager, ModelSnapshot};
pub use data::{Batch, FOREGROUND, NUM_CLASSES};
pub use error::{Error, Result};
pub use model::{Device, SegmentationModel};
pub use tensor::{backward, BackwardOp, Tensor};
pub use train::{SegLoss, TrainConfig, TrainSession};

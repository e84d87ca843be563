//! Training loop: configuration, metrics, loss, and the run session

pub mod config;
pub mod loss;
pub mod metrics;
pub mod session;

pub use config::TrainConfig;
pub use loss::SegLoss;
pub use metrics::{argmax_classes, dice_coefficient, error_mask, pixel_matches, WindowAggregates};
pub use session::{EpochOutcome, FitResult, StepOutcome, TrainSession};

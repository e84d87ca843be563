//! Optimizers and learning-rate scheduling

pub mod adam;
pub mod optimizer;
pub mod scheduler;

pub use adam::Adam;
pub use optimizer::{Optimizer, OptimizerSnapshot};
pub use scheduler::{step_decay, StepDecayLR};

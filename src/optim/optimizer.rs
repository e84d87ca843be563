//! Optimizer trait and serializable optimizer state

use crate::error::Result;
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};

/// Trait for optimization algorithms
///
/// Implementations own their internal state (step counts, moment estimates)
/// and mutate parameters in place from the gradients accumulated during the
/// backward pass.
pub trait Optimizer {
    /// Update parameters using their accumulated gradients
    fn step(&mut self, parameters: &mut [Tensor]);

    /// Clear gradients on all parameters
    fn zero_grad(&mut self, parameters: &mut [Tensor]) {
        for param in parameters.iter() {
            param.zero_grad();
        }
    }

    /// Current learning rate
    fn lr(&self) -> f32;

    /// Override the learning rate, e.g. from a schedule
    fn set_lr(&mut self, lr: f32);

    /// Snapshot internal state for checkpointing
    fn state(&self) -> OptimizerSnapshot;

    /// Restore internal state from a checkpoint
    fn load_state(&mut self, snapshot: OptimizerSnapshot) -> Result<()>;
}

/// Serializable optimizer state
///
/// `lr` reflects configuration at save time and is overwritten by the
/// schedule on resume; `step_count` and the moment estimates are learned
/// state and must survive a round trip exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerSnapshot {
    pub lr: f32,
    pub step_count: u64,
    pub first_moment: Vec<Option<Vec<f32>>>,
    pub second_moment: Vec<Option<Vec<f32>>>,
}

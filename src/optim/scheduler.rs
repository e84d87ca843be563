//! Learning rate schedulers

use super::Optimizer;

/// Step-decay learning rate for a given epoch
///
/// Formula: lr_t = base_lr * 0.1^(epoch / decay_period)
///
/// The rate is a pure function of the epoch index, so recomputing it on
/// resume lands on the same value the interrupted run was using.
pub fn step_decay(base_lr: f32, epoch: usize, decay_period: usize) -> f32 {
    debug_assert!(decay_period > 0, "decay period must be positive");
    base_lr * 0.1f32.powi((epoch / decay_period) as i32)
}

/// Step Decay Learning Rate Scheduler
///
/// Divides the learning rate by 10 every `decay_period` epochs.
pub struct StepDecayLR {
    base_lr: f32,
    decay_period: usize,
}

impl StepDecayLR {
    /// Create a new step-decay scheduler
    ///
    /// # Arguments
    /// * `base_lr` - Learning rate for epochs `0..decay_period`
    /// * `decay_period` - Number of epochs between tenfold reductions
    pub fn new(base_lr: f32, decay_period: usize) -> Self {
        Self {
            base_lr,
            decay_period,
        }
    }

    /// Learning rate for the given epoch
    pub fn lr_for_epoch(&self, epoch: usize) -> f32 {
        step_decay(self.base_lr, epoch, self.decay_period)
    }

    /// Apply the epoch's learning rate to an optimizer
    pub fn apply(&self, optimizer: &mut dyn Optimizer, epoch: usize) {
        optimizer.set_lr(self.lr_for_epoch(epoch));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::Adam;
    use approx::assert_relative_eq;

    #[test]
    fn test_step_decay_values() {
        assert_relative_eq!(step_decay(1e-3, 0, 5), 1e-3);
        assert_relative_eq!(step_decay(1e-3, 4, 5), 1e-3);
        assert_relative_eq!(step_decay(1e-3, 5, 5), 1e-4);
        assert_relative_eq!(step_decay(1e-3, 9, 5), 1e-4);
        assert_relative_eq!(step_decay(1e-3, 12, 5), 1e-5, epsilon = 1e-10);
    }

    #[test]
    fn test_apply_overwrites_optimizer_lr() {
        let scheduler = StepDecayLR::new(1e-3, 5);
        let mut optimizer = Adam::default_params(123.0);
        scheduler.apply(&mut optimizer, 7);
        assert_relative_eq!(optimizer.lr(), 1e-4);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn lr_never_increases_with_epoch(
                epoch in 0usize..200,
                period in 1usize..20,
            ) {
                let early = step_decay(1e-3, epoch, period);
                let late = step_decay(1e-3, epoch + 1, period);
                prop_assert!(late <= early);
            }

            #[test]
            fn lr_is_idempotent_per_epoch(
                epoch in 0usize..200,
                period in 1usize..20,
            ) {
                prop_assert_eq!(
                    step_decay(1e-3, epoch, period),
                    step_decay(1e-3, epoch, period)
                );
            }
        }
    }
}

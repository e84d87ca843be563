//! Combined segmentation loss
//!
//! Weighted per-pixel negative log-likelihood over class scores, plus a
//! Dice penalty `dice_scale * (1 - dice)` that pushes the overlap score
//! toward 1. The Dice term is computed from hardened predictions and
//! carries no gradient; only the NLL term backpropagates.

use crate::data::NUM_CLASSES;
use crate::tensor::{BackwardOp, Tensor};
use ndarray::{Array1, Array3};
use std::cell::RefCell;
use std::rc::Rc;

/// Loss composer for binary segmentation
#[derive(Debug, Clone)]
pub struct SegLoss {
    class_weights: [f32; NUM_CLASSES],
    dice_scale: f32,
}

impl Default for SegLoss {
    fn default() -> Self {
        Self {
            class_weights: [0.25, 0.75],
            dice_scale: 10.0,
        }
    }
}

impl SegLoss {
    pub fn new(class_weights: [f32; NUM_CLASSES], dice_scale: f32) -> Self {
        Self {
            class_weights,
            dice_scale,
        }
    }

    /// Compose the scalar loss for one batch
    ///
    /// `scores` has shape (n, classes, h, w) and `masks` (n, h, w); the
    /// caller has already validated agreement. The returned scalar tensor
    /// carries a backward op that writes the NLL gradient into `scores` and
    /// then invokes the score tensor's own chain, so a single `backward`
    /// call reaches the model parameters.
    pub fn forward(&self, scores: &Tensor, masks: &Array3<u8>, dice: f32) -> Tensor {
        let shape = scores.shape();
        debug_assert_eq!(shape.len(), 4);
        debug_assert_eq!(shape[1], NUM_CLASSES);
        let (n, classes, h, w) = (shape[0], shape[1], shape[2], shape[3]);
        debug_assert_eq!(masks.dim(), (n, h, w));

        let data = scores.data();
        let plane = h * w;
        let mut grad = Array1::zeros(data.len());
        let mut nll_sum = 0.0f32;
        let mut weight_sum = 0.0f32;

        for i in 0..n {
            for y in 0..h {
                for x in 0..w {
                    let base = i * classes * plane + y * w + x;
                    let at = |c: usize| data[base + c * plane];

                    // Stable log-softmax over the class axis
                    let mut max = f32::NEG_INFINITY;
                    for c in 0..classes {
                        max = max.max(at(c));
                    }
                    let mut exp_sum = 0.0f32;
                    for c in 0..classes {
                        exp_sum += (at(c) - max).exp();
                    }
                    let log_sum = exp_sum.ln();

                    let target = masks[[i, y, x]] as usize;
                    let weight = self.class_weights[target];
                    nll_sum += weight * (log_sum - (at(target) - max));
                    weight_sum += weight;

                    for c in 0..classes {
                        let softmax = (at(c) - max).exp() / exp_sum;
                        let indicator = (c == target) as u8 as f32;
                        grad[base + c * plane] = weight * (softmax - indicator);
                    }
                }
            }
        }

        // Weighted mean, matching the class-weighted NLL convention
        if weight_sum > 0.0 {
            nll_sum /= weight_sum;
            grad.mapv_inplace(|g| g / weight_sum);
        }

        let value = nll_sum + self.dice_scale * (1.0 - dice);
        let mut loss = Tensor::from_vec(vec![value], true);
        loss.set_backward_op(Rc::new(SegLossBackward {
            score_grad: scores.grad_cell(),
            grad,
            chain: scores.backward_op(),
        }));
        loss
    }
}

/// Backward op for [`SegLoss`]
///
/// Accumulates the precomputed score gradient, then hands control to the
/// score tensor's own backward chain.
struct SegLossBackward {
    score_grad: Rc<RefCell<Option<Array1<f32>>>>,
    grad: Array1<f32>,
    chain: Option<Rc<dyn BackwardOp>>,
}

impl BackwardOp for SegLossBackward {
    fn backward(&self) {
        {
            let mut cell = self.score_grad.borrow_mut();
            if let Some(existing) = cell.as_mut() {
                *existing = &*existing + &self.grad;
            } else {
                *cell = Some(self.grad.clone());
            }
        }
        if let Some(chain) = &self.chain {
            chain.backward();
        }
    }
}

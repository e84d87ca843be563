//! Segmentation metrics
//!
//! The Dice coefficient is computed jointly over every pixel in a batch,
//! with a +1 smoothing term in both numerator and denominator so an
//! all-background pair scores 1.0 instead of dividing by zero.

use crate::data::FOREGROUND;
use crate::error::{Error, Result};
use crate::tensor::Tensor;
use ndarray::Array3;

/// Dice coefficient between predicted and target class masks
///
/// dice = (2 * |pred ∩ target| + 1) / (|pred| + |target| + 1), counting
/// foreground pixels. Always in (0, 1].
pub fn dice_coefficient(prediction: &Array3<u8>, target: &Array3<u8>) -> f32 {
    debug_assert_eq!(prediction.dim(), target.dim());
    let mut intersection = 0usize;
    let mut pred_fg = 0usize;
    let mut target_fg = 0usize;
    for (&p, &t) in prediction.iter().zip(target.iter()) {
        let p = (p == FOREGROUND) as usize;
        let t = (t == FOREGROUND) as usize;
        intersection += p & t;
        pred_fg += p;
        target_fg += t;
    }
    (2.0 * intersection as f32 + 1.0) / (pred_fg as f32 + target_fg as f32 + 1.0)
}

/// Per-pixel argmax over the class axis of a score tensor
///
/// Input shape is (n, classes, h, w); output is the (n, h, w) class-id mask.
pub fn argmax_classes(scores: &Tensor) -> Result<Array3<u8>> {
    let shape = scores.shape();
    if shape.len() != 4 {
        return Err(Error::ShapeMismatch {
            expected: vec![0, 0, 0, 0],
            got: shape.to_vec(),
        });
    }
    let (n, classes, h, w) = (shape[0], shape[1], shape[2], shape[3]);
    let data = scores.data();
    let plane = h * w;

    let mut out = Array3::zeros((n, h, w));
    for i in 0..n {
        for y in 0..h {
            for x in 0..w {
                let mut best = 0usize;
                let mut best_score = f32::NEG_INFINITY;
                for c in 0..classes {
                    let score = data[i * classes * plane + c * plane + y * w + x];
                    if score > best_score {
                        best_score = score;
                        best = c;
                    }
                }
                out[[i, y, x]] = best as u8;
            }
        }
    }
    Ok(out)
}

/// Number of pixels where prediction and target agree
pub fn pixel_matches(prediction: &Array3<u8>, target: &Array3<u8>) -> usize {
    prediction
        .iter()
        .zip(target.iter())
        .filter(|(p, t)| p == t)
        .count()
}

/// Mask with 1 where prediction and target disagree
pub fn error_mask(prediction: &Array3<u8>, target: &Array3<u8>) -> Array3<u8> {
    let mut mask = Array3::zeros(prediction.dim());
    for ((m, &p), &t) in mask.iter_mut().zip(prediction.iter()).zip(target.iter()) {
        *m = (p != t) as u8;
    }
    mask
}

/// Running totals for one logging window
#[derive(Debug, Default, Clone)]
pub struct WindowAggregates {
    dice_sum: f32,
    correct_pixels: usize,
    pixels: usize,
    batches: usize,
}

impl WindowAggregates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one batch's results into the window
    pub fn absorb(&mut self, dice: f32, correct_pixels: usize, pixels: usize) {
        self.dice_sum += dice;
        self.correct_pixels += correct_pixels;
        self.pixels += pixels;
        self.batches += 1;
    }

    /// Mean Dice over the window's batches
    pub fn mean_dice(&self) -> f32 {
        if self.batches == 0 {
            0.0
        } else {
            self.dice_sum / self.batches as f32
        }
    }

    /// Pixel accuracy over the pixels actually seen in the window
    pub fn accuracy(&self) -> f32 {
        if self.pixels == 0 {
            0.0
        } else {
            self.correct_pixels as f32 / self.pixels as f32
        }
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Start a fresh window
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr3;

    #[test]
    fn test_dice_identical_masks() {
        let mask = arr3(&[[[1u8, 0], [1, 1]]]);
        assert_relative_eq!(dice_coefficient(&mask, &mask), 1.0);
    }

    #[test]
    fn test_dice_all_background() {
        let empty: Array3<u8> = Array3::zeros((1, 3, 3));
        // Smoothing keeps the empty-vs-empty case at exactly 1
        assert_relative_eq!(dice_coefficient(&empty, &empty), 1.0);
    }

    #[test]
    fn test_dice_disjoint_masks() {
        let a = arr3(&[[[1u8, 0], [0, 0]]]);
        let b = arr3(&[[[0u8, 1], [0, 0]]]);
        // (0 + 1) / (1 + 1 + 1)
        assert_relative_eq!(dice_coefficient(&a, &b), 1.0 / 3.0);
    }

    #[test]
    fn test_dice_partial_overlap() {
        let pred = arr3(&[[[1u8, 1], [0, 0]]]);
        let target = arr3(&[[[1u8, 0], [1, 0]]]);
        // (2*1 + 1) / (2 + 2 + 1)
        assert_relative_eq!(dice_coefficient(&pred, &target), 3.0 / 5.0);
    }

    #[test]
    fn test_argmax_picks_highest_class() {
        // Shape (1, 2, 1, 2): pixel 0 favors class 0, pixel 1 favors class 1
        let scores = Tensor::new(
            ndarray::Array1::from(vec![0.9, 0.2, 0.1, 0.8]),
            vec![1, 2, 1, 2],
            false,
        );
        let classes = argmax_classes(&scores).unwrap();
        assert_eq!(classes[[0, 0, 0]], 0);
        assert_eq!(classes[[0, 0, 1]], 1);
    }

    #[test]
    fn test_argmax_rejects_non_4d() {
        let scores = Tensor::from_vec(vec![1.0, 2.0], false);
        assert!(argmax_classes(&scores).is_err());
    }

    #[test]
    fn test_pixel_matches_and_error_mask() {
        let pred = arr3(&[[[1u8, 0], [1, 0]]]);
        let target = arr3(&[[[1u8, 1], [0, 0]]]);
        assert_eq!(pixel_matches(&pred, &target), 2);
        assert_eq!(error_mask(&pred, &target), arr3(&[[[0u8, 1], [1, 0]]]));
    }

    #[test]
    fn test_window_aggregates() {
        let mut window = WindowAggregates::new();
        window.absorb(0.8, 90, 100);
        window.absorb(0.6, 40, 100);

        assert_eq!(window.batches(), 2);
        assert_relative_eq!(window.mean_dice(), 0.7, epsilon = 1e-6);
        assert_relative_eq!(window.accuracy(), 0.65, epsilon = 1e-6);

        window.reset();
        assert_eq!(window.batches(), 0);
        assert_eq!(window.mean_dice(), 0.0);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn mask_strategy() -> impl Strategy<Value = Array3<u8>> {
            proptest::collection::vec(0u8..2, 16)
                .prop_map(|v| Array3::from_shape_vec((1, 4, 4), v).unwrap())
        }

        proptest! {
            #[test]
            fn dice_is_symmetric(a in mask_strategy(), b in mask_strategy()) {
                let ab = dice_coefficient(&a, &b);
                let ba = dice_coefficient(&b, &a);
                prop_assert_eq!(ab, ba);
            }

            #[test]
            fn dice_stays_in_unit_interval(a in mask_strategy(), b in mask_strategy()) {
                let dice = dice_coefficient(&a, &b);
                prop_assert!(dice > 0.0 && dice <= 1.0);
            }

            #[test]
            fn identical_masks_score_one(a in mask_strategy()) {
                prop_assert_eq!(dice_coefficient(&a, &a), 1.0);
            }
        }
    }
}

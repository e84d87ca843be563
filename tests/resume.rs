//! End-to-end checkpoint/resume behavior across separate sessions

use ndarray::{Array1, Array3};
use segmentar::monitor::MemorySink;
use segmentar::optim::Adam;
use segmentar::train::{TrainConfig, TrainSession};
use segmentar::{backward, Batch, BackwardOp, Device, Result, SegmentationModel, Tensor, NUM_CLASSES};
use std::cell::RefCell;
use std::rc::Rc;
use tempfile::tempdir;

/// Minimal differentiable model: one learnable bias per class, broadcast
/// over every pixel of a single-image batch
struct BiasField {
    params: Vec<Tensor>,
}

impl BiasField {
    fn new() -> Self {
        Self {
            params: vec![Tensor::from_vec(vec![0.2, -0.2], true)],
        }
    }
}

struct BiasFieldBackward {
    bias_grad: Rc<RefCell<Option<Array1<f32>>>>,
    score_grad: Rc<RefCell<Option<Array1<f32>>>>,
    plane: usize,
}

impl BackwardOp for BiasFieldBackward {
    fn backward(&self) {
        if let Some(score_grad) = self.score_grad.borrow().as_ref() {
            let mut grad = Array1::zeros(NUM_CLASSES);
            for c in 0..NUM_CLASSES {
                for p in 0..self.plane {
                    grad[c] += score_grad[c * self.plane + p];
                }
            }
            let mut cell = self.bias_grad.borrow_mut();
            if let Some(existing) = cell.as_mut() {
                *existing = &*existing + &grad;
            } else {
                *cell = Some(grad);
            }
        }
    }
}

impl SegmentationModel for BiasField {
    fn forward(&mut self, images: &Tensor) -> Result<Tensor> {
        let shape = images.shape();
        let (h, w) = (shape[2], shape[3]);
        let plane = h * w;
        let bias = self.params[0].data().clone();

        let mut data = Array1::zeros(NUM_CLASSES * plane);
        for c in 0..NUM_CLASSES {
            for p in 0..plane {
                data[c * plane + p] = bias[c];
            }
        }
        let mut scores = Tensor::new(data, vec![1, NUM_CLASSES, h, w], true);
        scores.set_backward_op(Rc::new(BiasFieldBackward {
            bias_grad: self.params[0].grad_cell(),
            score_grad: scores.grad_cell(),
            plane,
        }));
        Ok(scores)
    }

    fn parameters(&mut self) -> &mut [Tensor] {
        &mut self.params
    }

    fn to_device(&mut self, device: &Device) -> Result<()> {
        device.ensure_available()
    }
}

fn half_foreground_batch() -> Batch {
    let mut masks = Array3::zeros((1, 4, 4));
    for y in 0..2 {
        for x in 0..4 {
            masks[[0, y, x]] = 1;
        }
    }
    Batch::new(Tensor::zeros(&[1, 3, 4, 4], false), masks)
}

fn session(
    dir: &std::path::Path,
    config: TrainConfig,
) -> TrainSession<BiasField, MemorySink> {
    let config = config.with_checkpoint_dir(dir);
    let optimizer = Box::new(Adam::default_params(config.lr));
    TrainSession::new(BiasField::new(), optimizer, config, MemorySink::new()).unwrap()
}

#[test]
fn cold_run_then_resume_continues_the_schedule() {
    let dir = tempdir().unwrap();
    let batches = || (0..12).map(|_| half_foreground_batch()).collect::<Vec<_>>();

    // First session: two epochs from scratch
    let config = TrainConfig::new().with_epochs(2).with_log_interval(5);
    let mut first = session(dir.path(), config);
    let first_result = first.fit(|_| batches()).unwrap();

    assert_eq!(first_result.final_epoch, 1);
    assert!(first_result.best_loss.is_finite());
    // Two windows per epoch of twelve batches at interval five
    assert_eq!(first_result.iterations, 4);
    assert!(dir.path().join("checkpoint.json").exists());
    assert!(dir.path().join("model_best.json").exists());

    // Second session: resume and run two more epochs
    let config = TrainConfig::new()
        .with_epochs(4)
        .with_log_interval(5)
        .with_resume(dir.path().join("checkpoint.json"));
    let mut second = session(dir.path(), config);
    let second_result = second.fit(|_| batches()).unwrap();

    // Picks up at epoch 2, carries the window counter forward
    assert_eq!(second_result.final_epoch, 3);
    assert_eq!(second_result.iterations, 8);
    assert!(second_result.best_loss <= first_result.best_loss);

    let checkpoint =
        segmentar::CheckpointManager::load(&dir.path().join("checkpoint.json")).unwrap();
    assert_eq!(checkpoint.epoch, 3);
    assert_eq!(checkpoint.iteration_count, 8);
}

#[test]
fn resume_restores_model_parameters() {
    let dir = tempdir().unwrap();
    let batches = || vec![half_foreground_batch()];

    let mut first = session(dir.path(), TrainConfig::new().with_epochs(1));
    first.fit(|_| batches()).unwrap();
    let trained = first.model_mut().params[0].data().clone();

    let config = TrainConfig::new()
        .with_epochs(1)
        .with_resume(dir.path().join("checkpoint.json"));
    let mut second = session(dir.path(), config);
    // Nothing left to train (start epoch equals the schedule end), so the
    // restored parameters come straight from the checkpoint
    second.fit(|_| batches()).unwrap();
    assert_eq!(second.model_mut().params[0].data(), &trained);
}

#[test]
fn missing_resume_path_falls_back_to_cold_start() {
    let dir = tempdir().unwrap();
    let config = TrainConfig::new()
        .with_epochs(1)
        .with_resume(dir.path().join("never_written.json"));
    let mut s = session(dir.path(), config);

    let result = s.fit(|_| vec![half_foreground_batch()]).unwrap();
    assert_eq!(result.final_epoch, 0);
    assert_eq!(result.iterations, 0);
}

#[test]
fn training_reduces_loss_on_a_fixed_batch() {
    let dir = tempdir().unwrap();
    let mut s = session(dir.path(), TrainConfig::new().with_epochs(1));

    let first = s.train_step(&half_foreground_batch()).unwrap();
    for _ in 0..50 {
        s.train_step(&half_foreground_batch()).unwrap();
    }
    let last = s.train_step(&half_foreground_batch()).unwrap();
    assert!(last.loss < first.loss, "{} !< {}", last.loss, first.loss);
}

#[test]
fn gradient_flows_from_loss_into_model_parameters() {
    let mut model = BiasField::new();
    let batch = half_foreground_batch();

    let scores = model.forward(&batch.images).unwrap();
    let mut loss = segmentar::SegLoss::default().forward(&scores, &batch.masks, 0.5);
    backward(&mut loss, None);

    let grad = model.params[0].grad().unwrap();
    assert!(grad.iter().any(|&g| g != 0.0));
}

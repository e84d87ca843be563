//! Training session: the per-batch protocol and the epoch/run orchestrator

use super::config::TrainConfig;
use super::loss::SegLoss;
use super::metrics::{
    argmax_classes, dice_coefficient, error_mask, pixel_matches, WindowAggregates,
};
use crate::checkpoint::{Checkpoint, CheckpointManager, ModelSnapshot};
use crate::data::{Batch, NUM_CLASSES};
use crate::error::{Error, Result};
use crate::model::{Device, SegmentationModel};
use crate::monitor::MetricsSink;
use crate::optim::{step_decay, Optimizer};
use crate::tensor::{backward, Tensor};
use ndarray::Array3;

/// Result of a single training step
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Scalar loss for the batch
    pub loss: f32,
    /// Dice coefficient of the hardened prediction
    pub dice: f32,
    /// Hardened per-pixel class prediction, shape (n, h, w)
    pub prediction: Array3<u8>,
}

/// Result of one epoch
#[derive(Debug, Clone)]
pub struct EpochOutcome {
    /// Loss of the last batch in the epoch
    pub final_loss: f32,
    /// Number of batches processed
    pub batches: usize,
}

/// Result of a full run
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Index of the last completed epoch
    pub final_epoch: usize,
    /// Best end-of-epoch loss seen across the run, including resumed history
    pub best_loss: f32,
    /// Total logging windows emitted, including resumed history
    pub iterations: usize,
}

/// Orchestrates training over an opaque segmentation model
///
/// Each batch runs a fixed protocol: validate shapes, place on device,
/// forward, harden to a prediction, score with Dice, compose the loss,
/// clear gradients, backpropagate, and step the optimizer. Every
/// `log_interval` batches the session prints a progress line and pushes
/// windowed telemetry to the sink; after every epoch it rewrites the
/// rolling checkpoint, copying it to the best-model path when the epoch's
/// final loss strictly improves on the best seen so far.
///
/// # Example
///
/// ```no_run
/// # use segmentar::train::{TrainSession, TrainConfig};
/// # use segmentar::monitor::MemorySink;
/// # use segmentar::optim::Adam;
/// # use segmentar::model::SegmentationModel;
/// # fn run(model: impl SegmentationModel) -> segmentar::Result<()> {
/// let config = TrainConfig::new().with_epochs(3);
/// let optimizer = Box::new(Adam::default_params(config.lr));
/// let mut session = TrainSession::new(model, optimizer, config, MemorySink::new())?;
/// let result = session.fit(|_epoch| Vec::new())?;
/// println!("best loss {:.4}", result.best_loss);
/// # Ok(())
/// # }
/// ```
pub struct TrainSession<M: SegmentationModel, S: MetricsSink> {
    model: M,
    optimizer: Box<dyn Optimizer>,
    loss: SegLoss,
    config: TrainConfig,
    checkpoints: CheckpointManager,
    sink: S,
    device: Device,
}

impl<M: SegmentationModel, S: MetricsSink> TrainSession<M, S> {
    /// Create a session, rejecting invalid configurations up front
    pub fn new(model: M, optimizer: Box<dyn Optimizer>, config: TrainConfig, sink: S) -> Result<Self> {
        config.validate()?;
        let checkpoints = CheckpointManager::new(&config.checkpoint_dir);
        Ok(Self {
            model,
            optimizer,
            loss: SegLoss::default(),
            config,
            checkpoints,
            sink,
            device: Device::default(),
        })
    }

    /// Pin the run to a device
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Replace the default loss composer
    pub fn with_loss(mut self, loss: SegLoss) -> Self {
        self.loss = loss;
        self
    }

    /// Access the telemetry sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Access the trained model
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    /// Run the fixed per-batch protocol on one batch
    pub fn train_step(&mut self, batch: &Batch) -> Result<StepOutcome> {
        batch.validate()?;
        batch.to_device(&self.device)?;

        let scores = self.model.forward(&batch.images)?;
        let shape = scores.shape();
        if shape.len() != 4 || shape[1] != NUM_CLASSES {
            return Err(Error::ShapeMismatch {
                expected: vec![batch.masks.dim().0, NUM_CLASSES],
                got: shape.to_vec(),
            });
        }

        let prediction = argmax_classes(&scores)?;
        let dice = dice_coefficient(&prediction, &batch.masks);
        let mut loss = self.loss.forward(&scores, &batch.masks, dice);

        self.optimizer.zero_grad(self.model.parameters());
        backward(&mut loss, None);
        self.optimizer.step(self.model.parameters());

        Ok(StepOutcome {
            loss: loss.data()[0],
            dice,
            prediction,
        })
    }

    /// Train over one epoch's batches, emitting windowed telemetry
    ///
    /// `iteration_count` is the global window counter; it advances by one
    /// per emission and is persisted in the checkpoint.
    pub fn train_epoch<I>(
        &mut self,
        epoch: usize,
        batches: I,
        iteration_count: &mut usize,
    ) -> Result<EpochOutcome>
    where
        I: IntoIterator<Item = Batch>,
    {
        let mut window = WindowAggregates::new();
        let mut last_loss = None;
        let mut batch_count = 0usize;

        for (batch_idx, batch) in batches.into_iter().enumerate() {
            let outcome = self.train_step(&batch)?;
            window.absorb(
                outcome.dice,
                pixel_matches(&outcome.prediction, &batch.masks),
                batch.pixel_count(),
            );
            last_loss = Some(outcome.loss);
            batch_count += 1;

            if batch_idx % self.config.log_interval == 0 && batch_idx != 0 {
                println!(
                    "Epoch {}, batch {}: loss={:.4}, dice={:.4}, acc={:.4}, lr={:.6}",
                    epoch,
                    batch_idx,
                    outcome.loss,
                    window.mean_dice(),
                    window.accuracy(),
                    self.optimizer.lr()
                );
                self.emit_window(&batch, &outcome, &window, *iteration_count);
                *iteration_count += 1;
                window.reset();
            }
        }

        let final_loss = last_loss.ok_or(Error::EmptyEpoch)?;
        Ok(EpochOutcome {
            final_loss,
            batches: batch_count,
        })
    }

    /// Run the full training schedule, resuming from a checkpoint if one is
    /// configured and readable
    ///
    /// `batch_fn` is called once per epoch with the epoch index and yields
    /// that epoch's batches.
    pub fn fit<B, I>(&mut self, mut batch_fn: B) -> Result<FitResult>
    where
        B: FnMut(usize) -> I,
        I: IntoIterator<Item = Batch>,
    {
        self.device.ensure_available()?;
        self.model.to_device(&self.device)?;

        let mut start_epoch = self.config.start_epoch;
        let mut best_loss = f32::INFINITY;
        let mut iteration_count = 0usize;

        if let Some(path) = self.config.resume.clone() {
            match CheckpointManager::load(&path) {
                Ok(checkpoint) => {
                    println!(
                        "==> loaded checkpoint '{}' (epoch {})",
                        path.display(),
                        checkpoint.epoch
                    );
                    checkpoint.model.restore(&mut self.model)?;
                    self.optimizer.load_state(checkpoint.optimizer)?;
                    start_epoch = checkpoint.epoch + 1;
                    best_loss = checkpoint.best_loss;
                    iteration_count = checkpoint.iteration_count;
                }
                Err(Error::CheckpointNotFound(missing)) => {
                    eprintln!("==> no checkpoint found at '{}', starting cold", missing);
                }
                Err(other) => return Err(other),
            }
        }

        let mut final_epoch = start_epoch.saturating_sub(1);
        for epoch in start_epoch..self.config.epochs {
            self.optimizer
                .set_lr(step_decay(self.config.lr, epoch, self.config.lr_decay_period));

            let outcome = self.train_epoch(epoch, batch_fn(epoch), &mut iteration_count)?;

            let is_best = improves_on(outcome.final_loss, best_loss);
            if is_best {
                best_loss = outcome.final_loss;
            }
            let checkpoint = Checkpoint {
                epoch,
                model: ModelSnapshot::capture(&mut self.model),
                optimizer: self.optimizer.state(),
                best_loss,
                iteration_count,
            };
            self.checkpoints.save(&checkpoint, is_best)?;
            final_epoch = epoch;
        }

        Ok(FitResult {
            final_epoch,
            best_loss,
            iterations: iteration_count,
        })
    }

    fn emit_window(
        &mut self,
        batch: &Batch,
        outcome: &StepOutcome,
        window: &WindowAggregates,
        step: usize,
    ) {
        self.sink.add_scalar("loss", outcome.loss, step);
        self.sink.add_scalar("dice_coef", window.mean_dice(), step);

        if let Some(panel) = first_image_panel(&batch.images) {
            self.sink.add_image("image", &panel, step);
        }
        self.sink
            .add_image("pred", &first_mask_panel(&outcome.prediction), step);
        self.sink
            .add_image("ground truth", &first_mask_panel(&batch.masks), step);
        let wrong = error_mask(&outcome.prediction, &batch.masks);
        self.sink
            .add_image("wrong prediction", &first_mask_panel(&wrong), step);
    }
}

/// Strict improvement test for the best-model decision; ties do not count
fn improves_on(loss: f32, best_loss: f32) -> bool {
    loss < best_loss
}

/// First element of a (n, c, h, w) image tensor as a (c, h, w) panel
fn first_image_panel(images: &Tensor) -> Option<Array3<f32>> {
    let shape = images.shape();
    if shape.len() != 4 {
        return None;
    }
    let (c, h, w) = (shape[1], shape[2], shape[3]);
    let mut panel = Array3::zeros((c, h, w));
    let data = images.data();
    for ch in 0..c {
        for y in 0..h {
            for x in 0..w {
                panel[[ch, y, x]] = data[ch * h * w + y * w + x];
            }
        }
    }
    Some(panel)
}

/// First element of a (n, h, w) class mask as a grayscale (1, h, w) panel
fn first_mask_panel(mask: &Array3<u8>) -> Array3<f32> {
    let (_, h, w) = mask.dim();
    let mut panel = Array3::zeros((1, h, w));
    for y in 0..h {
        for x in 0..w {
            panel[[0, y, x]] = mask[[0, y, x]] as f32;
        }
    }
    panel
}

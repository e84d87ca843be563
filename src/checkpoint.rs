//! Checkpoint persistence
//!
//! One rolling checkpoint file is rewritten after every epoch; whenever an
//! epoch sets a new best loss the record is also copied to a fixed best-model
//! path. A missing or unreadable checkpoint is reported as
//! `CheckpointNotFound` so the orchestrator can fall back to a cold start.

use crate::error::{Error, Result};
use crate::model::SegmentationModel;
use crate::optim::OptimizerSnapshot;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Rolling checkpoint file name
pub const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Best-model copy file name
pub const BEST_FILE: &str = "model_best.json";

/// Positional snapshot of model parameters
///
/// Parameters are stored in the order `SegmentationModel::parameters`
/// yields them; restore matches them back up positionally and rejects any
/// count or length drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub parameters: Vec<Vec<f32>>,
}

impl ModelSnapshot {
    /// Capture the current parameter values of a model
    pub fn capture<M: SegmentationModel>(model: &mut M) -> Self {
        Self {
            parameters: model
                .parameters()
                .iter()
                .map(|p| p.data().to_vec())
                .collect(),
        }
    }

    /// Write the snapshot's values back into a model's parameters
    pub fn restore<M: SegmentationModel>(&self, model: &mut M) -> Result<()> {
        let params = model.parameters();
        if params.len() != self.parameters.len() {
            return Err(Error::ShapeMismatch {
                expected: vec![self.parameters.len()],
                got: vec![params.len()],
            });
        }
        for (param, values) in params.iter_mut().zip(&self.parameters) {
            if param.len() != values.len() {
                return Err(Error::ShapeMismatch {
                    expected: vec![values.len()],
                    got: vec![param.len()],
                });
            }
            param
                .data_mut()
                .iter_mut()
                .zip(values)
                .for_each(|(dst, src)| *dst = *src);
        }
        Ok(())
    }
}

/// Everything needed to resume an interrupted run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Index of the last completed epoch
    pub epoch: usize,
    pub model: ModelSnapshot,
    pub optimizer: OptimizerSnapshot,
    /// Best final-window loss seen so far across the run
    pub best_loss: f32,
    /// Count of logging windows emitted so far
    pub iteration_count: usize,
}

/// Saves and loads checkpoints under a run directory
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the rolling checkpoint
    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_FILE)
    }

    /// Path of the best-model copy
    pub fn best_path(&self) -> PathBuf {
        self.dir.join(BEST_FILE)
    }

    /// Persist a checkpoint, additionally copying it to the best-model path
    /// when `is_best` is set
    pub fn save(&self, checkpoint: &Checkpoint, is_best: bool) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(checkpoint)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        let path = self.checkpoint_path();
        fs::write(&path, json)?;
        if is_best {
            fs::copy(&path, self.best_path())?;
        }
        Ok(())
    }

    /// Load a checkpoint from an explicit path
    ///
    /// Any failure to read or parse maps to `CheckpointNotFound`; the caller
    /// decides whether that means a cold start or an abort.
    pub fn load(path: &Path) -> Result<Checkpoint> {
        let display = path.display().to_string();
        let contents =
            fs::read_to_string(path).map_err(|_| Error::CheckpointNotFound(display.clone()))?;
        serde_json::from_str(&contents).map_err(|_| Error::CheckpointNotFound(display))
    }
}

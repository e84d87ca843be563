//! Run configuration

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Hyperparameters and run controls for a training session
///
/// Defaults mirror the reference segmentation recipe: thirty epochs of
/// single-image batches at lr 1e-3, a tenfold decay every five epochs, and a
/// logging window of ten batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub batch_size: usize,
    pub test_batch_size: usize,
    pub lr: f32,
    pub start_epoch: usize,
    pub epochs: usize,
    pub seed: u64,
    pub log_interval: usize,
    /// Checkpoint to resume from; `None` forces a cold start
    pub resume: Option<PathBuf>,
    /// Epochs between tenfold learning-rate reductions
    pub lr_decay_period: usize,
    pub checkpoint_dir: PathBuf,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            test_batch_size: 12,
            lr: 1e-3,
            start_epoch: 0,
            epochs: 30,
            seed: 212,
            log_interval: 10,
            resume: None,
            lr_decay_period: 5,
            checkpoint_dir: PathBuf::from("checkpoints"),
        }
    }
}

impl TrainConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lr(mut self, lr: f32) -> Self {
        self.lr = lr;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_log_interval(mut self, log_interval: usize) -> Self {
        self.log_interval = log_interval;
        self
    }

    pub fn with_resume(mut self, path: impl Into<PathBuf>) -> Self {
        self.resume = Some(path.into());
        self
    }

    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = dir.into();
        self
    }

    /// Load a configuration from a YAML file
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: Self = serde_yaml::from_str(&contents)
            .map_err(|e| Error::ConfigError(format!("Failed to parse YAML config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::ConfigError("epochs must be positive".to_string()));
        }
        if self.log_interval == 0 {
            return Err(Error::ConfigError(
                "log_interval must be positive".to_string(),
            ));
        }
        if self.lr_decay_period == 0 {
            return Err(Error::ConfigError(
                "lr_decay_period must be positive".to_string(),
            ));
        }
        if !self.lr.is_finite() || self.lr <= 0.0 {
            return Err(Error::ConfigError(format!(
                "lr must be positive and finite, got {}",
                self.lr
            )));
        }
        if self.start_epoch > self.epochs {
            return Err(Error::ConfigError(format!(
                "start_epoch {} exceeds epochs {}",
                self.start_epoch, self.epochs
            )));
        }
        Ok(())
    }
}

//! Speech probability models.
//!
//! The engine drives anything implementing [`SpeechModel`]; production
//! sessions use the ONNX-backed [`silero::SileroModel`], while tests and
//! embedders can script probabilities with [`ScriptedModel`].

pub mod silero;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::config::ModelVersion;
use crate::error::{Result, VadgateError};

pub use silero::SileroModel;

/// A recurrent per-frame speech probability source.
///
/// Implementations keep hidden state between calls; `evaluate` must see
/// frames in stream order.
pub trait SpeechModel: Send {
    /// Evaluate one frame and return its speech probability in `[0, 1]`.
    fn evaluate(&mut self, frame: &[f32]) -> Result<f32>;

    /// Zero the recurrent state.
    fn reset(&mut self);
}

/// Resolve and verify the on-disk path of a model asset.
pub fn resolve_model_path(base: &Path, version: ModelVersion) -> Result<PathBuf> {
    if !base.exists() {
        return Err(VadgateError::ModelLoadFailure {
            message: format!("Model directory not found: {}", base.display()),
        });
    }
    let path = base.join(version.file_name());
    if !path.exists() {
        return Err(VadgateError::ModelLoadFailure {
            message: format!("Model file not found: {}", path.display()),
        });
    }
    Ok(path)
}

/// Deterministic model for testing and offline replay.
///
/// Plays back a scripted probability sequence, one value per frame, then
/// repeats the final value. Individual frames can be scripted to fail so
/// skip-and-continue handling is testable.
pub struct ScriptedModel {
    script: VecDeque<f32>,
    last: f32,
    fail_at: Vec<usize>,
    index: usize,
}

impl ScriptedModel {
    pub fn new(probabilities: impl IntoIterator<Item = f32>) -> Self {
        Self {
            script: probabilities.into_iter().collect(),
            last: 0.0,
            fail_at: Vec::new(),
            index: 0,
        }
    }

    /// Make `evaluate` fail on the given zero-based frame indices.
    pub fn with_failures_at(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.fail_at = indices.into_iter().collect();
        self
    }

    /// Number of frames evaluated so far (failures included).
    pub fn frames_seen(&self) -> usize {
        self.index
    }
}

impl SpeechModel for ScriptedModel {
    fn evaluate(&mut self, _frame: &[f32]) -> Result<f32> {
        let index = self.index;
        self.index += 1;

        if self.fail_at.contains(&index) {
            return Err(VadgateError::InferenceFailure {
                message: format!("scripted failure at frame {index}"),
            });
        }

        if let Some(p) = self.script.pop_front() {
            self.last = p;
        }
        Ok(self.last)
    }

    fn reset(&mut self) {
        self.index = 0;
    }
}

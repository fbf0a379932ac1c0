//! Silero VAD inference over ONNX Runtime.
//!
//! Supports both shipped model generations. The v4 network keeps separate
//! LSTM hidden/cell tensors of shape `[2, 1, 64]`; v5 folds them into one
//! `[2, 1, 128]` state tensor and additionally expects each input window
//! to be prefixed with the last 64 samples of the previous frame.

use ndarray::{Array1, Array2, ArrayD};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::{Session, SessionOutputs};
use ort::value::Tensor;
use std::path::Path;

use crate::config::ModelVersion;
use crate::error::{Result, VadgateError};
use crate::model::{SpeechModel, resolve_model_path};

const V4_STATE_SHAPE: [usize; 3] = [2, 1, 64];
const V5_STATE_SHAPE: [usize; 3] = [2, 1, 128];
/// Samples of the previous frame prepended to each v5 input at 16kHz.
const V5_CONTEXT_SIZE: usize = 64;

enum RecurrentState {
    V4 { h: ArrayD<f32>, c: ArrayD<f32> },
    V5 { state: ArrayD<f32>, context: Vec<f32> },
}

impl RecurrentState {
    fn zeroed(version: ModelVersion) -> Self {
        match version {
            ModelVersion::V4 => RecurrentState::V4 {
                h: ArrayD::zeros(ndarray::IxDyn(&V4_STATE_SHAPE)),
                c: ArrayD::zeros(ndarray::IxDyn(&V4_STATE_SHAPE)),
            },
            ModelVersion::V5 => RecurrentState::V5 {
                state: ArrayD::zeros(ndarray::IxDyn(&V5_STATE_SHAPE)),
                context: vec![0.0; V5_CONTEXT_SIZE],
            },
        }
    }
}

/// ONNX-backed Silero model holding its recurrent state between frames.
pub struct SileroModel {
    session: Session,
    version: ModelVersion,
    state: RecurrentState,
}

impl SileroModel {
    /// Load the asset for `version` from the given directory.
    pub fn load(base_asset_path: &Path, version: ModelVersion) -> Result<Self> {
        let path = resolve_model_path(base_asset_path, version)?;
        Self::from_path(&path, version)
    }

    /// Load a model from an explicit ONNX file path.
    pub fn from_path(path: &Path, version: ModelVersion) -> Result<Self> {
        let session = build_session(path).map_err(|e| VadgateError::ModelLoadFailure {
            message: format!("{}: {}", path.display(), e),
        })?;
        tracing::debug!(path = %path.display(), ?version, "loaded silero model");

        Ok(Self {
            session,
            version,
            state: RecurrentState::zeroed(version),
        })
    }

    pub fn version(&self) -> ModelVersion {
        self.version
    }

    fn evaluate_v4(&mut self, frame: &[f32]) -> Result<f32> {
        let RecurrentState::V4 { h, c } = &mut self.state else {
            return Err(internal("v4 evaluation with mismatched state"));
        };

        let input = Array2::from_shape_vec((1, frame.len()), frame.to_vec())
            .map_err(inference_err)?;
        let sr = Array1::<i64>::from_elem(1, 16_000);

        let input_tensor = Tensor::from_array(input).map_err(inference_err)?;
        let sr_tensor = Tensor::from_array(sr).map_err(inference_err)?;
        let h_tensor = Tensor::from_array(h.clone()).map_err(inference_err)?;
        let c_tensor = Tensor::from_array(c.clone()).map_err(inference_err)?;

        let outputs = self
            .session
            .run(ort::inputs![input_tensor, sr_tensor, h_tensor, c_tensor])
            .map_err(inference_err)?;

        let probability = extract_probability(&outputs)?;
        *h = extract_state(&outputs, "hn", 1)?;
        *c = extract_state(&outputs, "cn", 2)?;
        Ok(probability)
    }

    fn evaluate_v5(&mut self, frame: &[f32]) -> Result<f32> {
        let RecurrentState::V5 { state, context } = &mut self.state else {
            return Err(internal("v5 evaluation with mismatched state"));
        };

        let mut windowed = Vec::with_capacity(V5_CONTEXT_SIZE + frame.len());
        windowed.extend_from_slice(context);
        windowed.extend_from_slice(frame);
        let input = Array2::from_shape_vec((1, windowed.len()), windowed)
            .map_err(inference_err)?;
        let sr = Array1::<i64>::from_elem(1, 16_000);

        let input_tensor = Tensor::from_array(input).map_err(inference_err)?;
        let state_tensor = Tensor::from_array(state.clone()).map_err(inference_err)?;
        let sr_tensor = Tensor::from_array(sr).map_err(inference_err)?;

        let outputs = self
            .session
            .run(ort::inputs![input_tensor, state_tensor, sr_tensor])
            .map_err(inference_err)?;

        let probability = extract_probability(&outputs)?;
        *state = extract_state(&outputs, "stateN", 1)?;

        // The tail of this frame seeds the next window.
        if frame.len() >= V5_CONTEXT_SIZE {
            context.copy_from_slice(&frame[frame.len() - V5_CONTEXT_SIZE..]);
        }
        Ok(probability)
    }
}

impl SpeechModel for SileroModel {
    fn evaluate(&mut self, frame: &[f32]) -> Result<f32> {
        match self.version {
            ModelVersion::V4 => self.evaluate_v4(frame),
            ModelVersion::V5 => self.evaluate_v5(frame),
        }
    }

    fn reset(&mut self) {
        self.state = RecurrentState::zeroed(self.version);
    }
}

fn build_session(path: &Path) -> std::result::Result<Session, ort::Error> {
    Session::builder()?
        .with_intra_threads(1)?
        .with_inter_threads(1)?
        .with_execution_providers([CPUExecutionProvider::default().build()])?
        .commit_from_file(path)
}

fn extract_probability(outputs: &SessionOutputs) -> Result<f32> {
    let key = if outputs.contains_key("output") {
        "output"
    } else {
        outputs
            .iter()
            .next()
            .map(|(name, _)| name)
            .unwrap_or("output")
    };
    let (_, data) = outputs[key]
        .try_extract_tensor::<f32>()
        .map_err(inference_err)?;
    data.first().copied().ok_or_else(|| VadgateError::InferenceFailure {
        message: "model returned an empty probability tensor".to_string(),
    })
}

fn extract_state(outputs: &SessionOutputs, name: &str, position: usize) -> Result<ArrayD<f32>> {
    let key = if outputs.contains_key(name) {
        name
    } else {
        outputs
            .iter()
            .nth(position)
            .map(|(n, _)| n)
            .ok_or_else(|| VadgateError::InferenceFailure {
                message: format!("model output {name:?} missing"),
            })?
    };
    let (shape, data) = outputs[key]
        .try_extract_tensor::<f32>()
        .map_err(inference_err)?;
    ArrayD::from_shape_vec(shape.to_ixdyn(), data.to_vec()).map_err(inference_err)
}

fn inference_err(e: impl std::fmt::Display) -> VadgateError {
    VadgateError::InferenceFailure {
        message: e.to_string(),
    }
}

fn internal(message: &str) -> VadgateError {
    VadgateError::Internal {
        message: message.to_string(),
    }
}

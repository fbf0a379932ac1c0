use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::defaults;
use crate::error::{Result, VadgateError};

/// Silero model generation.
///
/// The two generations differ in frame width and recurrent-state layout,
/// so several frame-counted parameters carry different defaults (see
/// [`VadConfig::resolve`]).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelVersion {
    #[default]
    V4,
    V5,
}

impl ModelVersion {
    /// File name of the ONNX asset for this generation.
    pub fn file_name(self) -> &'static str {
        match self {
            ModelVersion::V4 => "silero_vad_v4.onnx",
            ModelVersion::V5 => "silero_vad_v5.onnx",
        }
    }
}

/// Per-session VAD configuration.
///
/// Immutable once a session starts; the handler rebuilds the iterator when
/// any field changes between `start_listening` calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VadConfig {
    /// Which Silero generation to load.
    pub model: ModelVersion,
    /// Model input frame width in samples (512, 1024 or 1536).
    pub frame_samples: usize,
    /// Probability at/above which a frame is speech.
    pub positive_speech_threshold: f32,
    /// Probability below which a frame counts toward redemption.
    pub negative_speech_threshold: f32,
    /// Consecutive sub-negative frames after speech start that end the utterance.
    pub redemption_frames: u32,
    /// Capacity of the rolling pre-speech frame ring.
    pub pre_speech_pad_frames: u32,
    /// Positive frames required before an utterance is validated.
    pub min_speech_frames: u32,
    /// Redemption-tail frames appended to the emitted utterance.
    pub end_speech_pad_frames: u32,
    /// Frames between intermediate chunk emissions; 0 disables them.
    pub num_frames_to_emit: u32,
    /// Force-end the active utterance when pausing or stopping.
    pub submit_user_speech_on_pause: bool,
    /// Directory holding the Silero ONNX assets.
    pub base_asset_path: PathBuf,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            model: ModelVersion::V4,
            frame_samples: defaults::V4_FRAME_SAMPLES,
            positive_speech_threshold: defaults::POSITIVE_SPEECH_THRESHOLD,
            negative_speech_threshold: defaults::NEGATIVE_SPEECH_THRESHOLD,
            redemption_frames: defaults::V4_REDEMPTION_FRAMES,
            pre_speech_pad_frames: defaults::V4_PRE_SPEECH_PAD_FRAMES,
            min_speech_frames: defaults::V4_MIN_SPEECH_FRAMES,
            end_speech_pad_frames: defaults::V4_END_SPEECH_PAD_FRAMES,
            num_frames_to_emit: defaults::NUM_FRAMES_TO_EMIT,
            submit_user_speech_on_pause: false,
            base_asset_path: PathBuf::from(defaults::MODEL_DIR),
        }
    }
}

impl VadConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: VadConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file, or return defaults if it doesn't exist.
    ///
    /// Only falls back to defaults when the file is missing; invalid TOML
    /// still surfaces as an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(VadgateError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported environment variables:
    /// - VADGATE_MODEL_DIR → base_asset_path
    /// - VADGATE_MODEL → model ("v4" or "v5")
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("VADGATE_MODEL_DIR")
            && !dir.is_empty()
        {
            self.base_asset_path = PathBuf::from(dir);
        }

        if let Ok(model) = std::env::var("VADGATE_MODEL") {
            match model.to_ascii_lowercase().as_str() {
                "v4" => self.model = ModelVersion::V4,
                "v5" => self.model = ModelVersion::V5,
                "" => {}
                other => tracing::warn!("ignoring unknown VADGATE_MODEL value {other:?}"),
            }
        }

        self
    }

    /// Remap v4 defaults to their v5 counterparts.
    ///
    /// A caller that only sets `model: V5` and leaves the frame-counted
    /// parameters untouched would otherwise run the v5 network with v4
    /// tuning (a 1536-sample frame it cannot accept, and redemption spans
    /// three times too short). Each field is remapped only while it still
    /// holds the v4 default, so explicit values are respected.
    pub fn resolve(mut self) -> Self {
        if self.model == ModelVersion::V5 {
            if self.frame_samples == defaults::V4_FRAME_SAMPLES {
                self.frame_samples = defaults::V5_FRAME_SAMPLES;
            }
            if self.pre_speech_pad_frames == defaults::V4_PRE_SPEECH_PAD_FRAMES {
                self.pre_speech_pad_frames = defaults::V5_PRE_SPEECH_PAD_FRAMES;
            }
            if self.redemption_frames == defaults::V4_REDEMPTION_FRAMES {
                self.redemption_frames = defaults::V5_REDEMPTION_FRAMES;
            }
            if self.min_speech_frames == defaults::V4_MIN_SPEECH_FRAMES {
                self.min_speech_frames = defaults::V5_MIN_SPEECH_FRAMES;
            }
            if self.end_speech_pad_frames == defaults::V4_END_SPEECH_PAD_FRAMES {
                self.end_speech_pad_frames = defaults::V5_END_SPEECH_PAD_FRAMES;
            }
        }
        self
    }

    /// Validate the configuration.
    ///
    /// Checked at the `start_listening` boundary; a session never starts
    /// with an invalid configuration.
    pub fn validate(&self) -> Result<()> {
        if self.frame_samples == 0 {
            return Err(invalid("frame_samples", "must be positive"));
        }
        if self.positive_speech_threshold <= 0.0 || self.positive_speech_threshold >= 1.0 {
            return Err(invalid(
                "positive_speech_threshold",
                "must lie in (0, 1)",
            ));
        }
        if self.negative_speech_threshold <= 0.0 || self.negative_speech_threshold >= 1.0 {
            return Err(invalid(
                "negative_speech_threshold",
                "must lie in (0, 1)",
            ));
        }
        if self.negative_speech_threshold >= self.positive_speech_threshold {
            return Err(invalid(
                "negative_speech_threshold",
                "must be strictly below positive_speech_threshold",
            ));
        }
        if self.redemption_frames == 0 {
            return Err(invalid("redemption_frames", "must be at least 1"));
        }
        if self.min_speech_frames == 0 {
            return Err(invalid("min_speech_frames", "must be at least 1"));
        }
        Ok(())
    }

    /// Path of the ONNX asset this configuration selects.
    pub fn model_path(&self) -> PathBuf {
        self.base_asset_path.join(self.model.file_name())
    }
}

fn invalid(key: &str, message: &str) -> VadgateError {
    VadgateError::ConfigInvalid {
        key: key.to_string(),
        message: message.to_string(),
    }
}

//! Default configuration constants for vadgate.
//!
//! This module provides shared constants used across different configuration
//! types to ensure consistency and eliminate duplication.

/// Audio sample rate in Hz.
///
/// The Silero models are trained on 16kHz speech; the engine accepts no
/// other rate.
pub const SAMPLE_RATE: u32 = 16000;

/// Probability at or above which a frame counts as speech.
pub const POSITIVE_SPEECH_THRESHOLD: f32 = 0.5;

/// Probability below which a frame counts toward redemption.
///
/// Must stay strictly below [`POSITIVE_SPEECH_THRESHOLD`]; frames landing
/// between the two thresholds neither extend nor end an utterance.
pub const NEGATIVE_SPEECH_THRESHOLD: f32 = 0.35;

/// Frame count between intermediate chunk emissions. Zero disables
/// intermediate chunks; the utterance is still delivered on speech end.
pub const NUM_FRAMES_TO_EMIT: u32 = 0;

/// Default directory searched for the Silero ONNX assets.
pub const MODEL_DIR: &str = "models";

// Silero v4 tuning. One frame is 96ms at 1536 samples / 16kHz.

/// v4 model input width in samples.
pub const V4_FRAME_SAMPLES: usize = 1536;
/// v4 rolling pre-speech pad capacity in frames.
pub const V4_PRE_SPEECH_PAD_FRAMES: u32 = 1;
/// v4 consecutive sub-negative frames that end an utterance.
pub const V4_REDEMPTION_FRAMES: u32 = 8;
/// v4 positive frames required to validate an utterance.
pub const V4_MIN_SPEECH_FRAMES: u32 = 3;
/// v4 redemption-tail frames appended to the emitted utterance.
pub const V4_END_SPEECH_PAD_FRAMES: u32 = 1;

// Silero v5 tuning. The v5 network consumes 512-sample (32ms) frames, so
// the frame-counted parameters scale up by 3x to cover the same wall time.

/// v5 model input width in samples.
pub const V5_FRAME_SAMPLES: usize = 512;
/// v5 rolling pre-speech pad capacity in frames.
pub const V5_PRE_SPEECH_PAD_FRAMES: u32 = 3;
/// v5 consecutive sub-negative frames that end an utterance.
pub const V5_REDEMPTION_FRAMES: u32 = 24;
/// v5 positive frames required to validate an utterance.
pub const V5_MIN_SPEECH_FRAMES: u32 = 9;
/// v5 redemption-tail frames appended to the emitted utterance.
pub const V5_END_SPEECH_PAD_FRAMES: u32 = 3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_ordered() {
        assert!(NEGATIVE_SPEECH_THRESHOLD < POSITIVE_SPEECH_THRESHOLD);
    }

    #[test]
    fn v5_frame_parameters_cover_the_same_wall_time() {
        // 3 frames of 512 samples span one 1536-sample v4 frame.
        assert_eq!(V4_FRAME_SAMPLES, 3 * V5_FRAME_SAMPLES);
        assert_eq!(V5_REDEMPTION_FRAMES, 3 * V4_REDEMPTION_FRAMES);
        assert_eq!(V5_MIN_SPEECH_FRAMES, 3 * V4_MIN_SPEECH_FRAMES);
    }
}

//! The VAD iterator: glue between the byte stream, the model and the
//! speech state machine.
//!
//! `process` must complete for one batch before the next is fed so the
//! model's recurrent state advances in stream order; the handler enforces
//! this by running a single consumer task per session.

use crate::config::VadConfig;
use crate::engine::assembler::FrameAssembler;
use crate::engine::state::SpeechStateMachine;
use crate::events::VadEvent;
use crate::model::SpeechModel;

pub struct VadIterator {
    assembler: FrameAssembler,
    model: Box<dyn SpeechModel>,
    machine: SpeechStateMachine,
}

impl VadIterator {
    /// Builds an iterator from a resolved, validated configuration and a
    /// loaded model.
    pub fn new(config: &VadConfig, model: Box<dyn SpeechModel>) -> Self {
        Self {
            assembler: FrameAssembler::new(config.frame_samples),
            model,
            machine: SpeechStateMachine::new(config),
        }
    }

    /// Feed one PCM16-LE byte batch and collect the resulting events.
    ///
    /// A failed inference skips only the offending frame: the recurrent
    /// state and the speech state are left untouched and the failure is
    /// surfaced as a [`VadEvent::Error`].
    pub fn process(&mut self, bytes: &[u8]) -> Vec<VadEvent> {
        let mut events = Vec::new();
        for frame in self.assembler.push_bytes(bytes) {
            match self.model.evaluate(&frame) {
                Ok(probability) => {
                    events.extend(self.machine.process_frame(probability, &frame));
                }
                Err(e) => {
                    tracing::warn!("skipping frame after inference failure: {e}");
                    events.push(VadEvent::Error {
                        message: e.to_string(),
                    });
                }
            }
        }
        events
    }

    /// Force-end the active utterance (see
    /// [`SpeechStateMachine::force_end`]).
    pub fn force_end(&mut self) -> Vec<VadEvent> {
        self.machine.force_end()
    }

    /// Silently drop all session state, including buffered input bytes
    /// and the model's recurrent state.
    pub fn reset(&mut self) {
        self.assembler.reset();
        self.machine.reset();
        self.model.reset();
    }

    pub fn is_speaking(&self) -> bool {
        self.machine.is_speaking()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::chunker::encode_pcm16;
    use crate::model::ScriptedModel;

    const FRAME: usize = 4;

    fn test_config() -> VadConfig {
        VadConfig {
            frame_samples: FRAME,
            redemption_frames: 2,
            min_speech_frames: 1,
            pre_speech_pad_frames: 1,
            end_speech_pad_frames: 1,
            ..Default::default()
        }
    }

    fn pcm_frames(count: usize) -> Vec<u8> {
        // Each frame holds a recognizable constant sample.
        let mut bytes = Vec::new();
        for i in 0..count {
            let sample = (i as i16 + 1) * 100;
            for _ in 0..FRAME {
                bytes.extend_from_slice(&sample.to_le_bytes());
            }
        }
        bytes
    }

    fn labels(events: &[VadEvent]) -> Vec<&'static str> {
        events
            .iter()
            .filter_map(|e| match e {
                VadEvent::SpeechStart => Some("start"),
                VadEvent::RealSpeechStart => Some("real_start"),
                VadEvent::SpeechEnd { .. } => Some("end"),
                VadEvent::Misfire => Some("misfire"),
                VadEvent::Chunk(_) => Some("chunk"),
                VadEvent::Error { .. } => Some("error"),
                VadEvent::FrameProcessed(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_full_utterance_over_byte_stream() {
        let model = ScriptedModel::new([0.1, 0.9, 0.9, 0.1, 0.1]);
        let mut iterator = VadIterator::new(&test_config(), Box::new(model));

        let events = iterator.process(&pcm_frames(5));
        assert_eq!(labels(&events), vec!["start", "real_start", "end"]);

        // pre-pad + 2 speech + 1 end-pad
        let samples = events
            .iter()
            .find_map(|e| match e {
                VadEvent::SpeechEnd { samples } => Some(samples.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(samples.len(), 4 * FRAME);
        // The pre-pad frame carries sample 100.
        assert!((samples[0] - 100.0 / 32768.0).abs() < 1e-6);
    }

    #[test]
    fn test_partial_batches_assemble_frames() {
        let model = ScriptedModel::new([0.9]);
        let mut iterator = VadIterator::new(&test_config(), Box::new(model));

        let bytes = pcm_frames(1);
        // Deliver the frame one byte at a time; only the final byte
        // completes it.
        for &b in &bytes[..bytes.len() - 1] {
            assert!(iterator.process(&[b]).is_empty());
        }
        let events = iterator.process(&bytes[bytes.len() - 1..]);
        assert_eq!(labels(&events), vec!["start", "real_start"]);
    }

    #[test]
    fn test_inference_failure_skips_frame_and_continues() {
        // Frame 1 fails; the script resumes with speech on the next frame.
        let model = ScriptedModel::new([0.1, 0.9, 0.1, 0.1]).with_failures_at([1]);
        let mut iterator = VadIterator::new(&test_config(), Box::new(model));

        let events = iterator.process(&pcm_frames(5));
        assert_eq!(labels(&events), vec!["error", "start", "real_start", "end"]);

        // Frame reports exist only for the four evaluated frames.
        let reports = events
            .iter()
            .filter(|e| matches!(e, VadEvent::FrameProcessed(_)))
            .count();
        assert_eq!(reports, 4);
    }

    #[test]
    fn test_chunk_stream_matches_utterance_across_batches() {
        let config = VadConfig {
            num_frames_to_emit: 2,
            ..test_config()
        };
        let model = ScriptedModel::new([0.1, 0.9, 0.9, 0.9, 0.9, 0.1, 0.1]);
        let mut iterator = VadIterator::new(&config, Box::new(model));

        let bytes = pcm_frames(7);
        let mut events = Vec::new();
        for batch in bytes.chunks(5) {
            events.extend(iterator.process(batch));
        }

        let samples = events
            .iter()
            .find_map(|e| match e {
                VadEvent::SpeechEnd { samples } => Some(samples.clone()),
                _ => None,
            })
            .unwrap();
        let stream: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                VadEvent::Chunk(c) => Some(c.bytes.clone()),
                _ => None,
            })
            .flatten()
            .collect();
        assert_eq!(stream, encode_pcm16(&samples));
    }

    #[test]
    fn test_reset_clears_everything() {
        let model = ScriptedModel::new([0.9]);
        let mut iterator = VadIterator::new(&test_config(), Box::new(model));

        // Half a frame of bytes, then reset: the residue must not leak
        // into the next frame.
        let bytes = pcm_frames(1);
        iterator.process(&bytes[..FRAME]);
        iterator.reset();
        assert!(!iterator.is_speaking());

        let events = iterator.process(&bytes);
        assert_eq!(labels(&events), vec!["start", "real_start"]);
        assert!(iterator.is_speaking());
    }

    #[test]
    fn test_force_end_delegates_to_machine() {
        let model = ScriptedModel::new([0.9]);
        let mut iterator = VadIterator::new(&test_config(), Box::new(model));
        iterator.process(&pcm_frames(1));
        assert!(iterator.is_speaking());

        let events = iterator.force_end();
        assert_eq!(labels(&events), vec!["end"]);
        assert!(!iterator.is_speaking());
    }
}

//! Chunk emitter for the streaming utterance.
//!
//! While an utterance is active, confirmed frames accumulate here; every
//! `num_frames_to_emit` frames the leading block is packaged as PCM16 and
//! handed out as an intermediate chunk. At speech end the remainder of the
//! utterance goes out as one final chunk, so the concatenation of all chunk
//! payloads reproduces the `speech_end` samples exactly.

/// Encode normalized float samples as PCM16 little-endian bytes.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let quantized = (sample * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
        bytes.extend_from_slice(&quantized.to_le_bytes());
    }
    bytes
}

/// Accumulates confirmed utterance frames and cuts them into chunks.
///
/// Inactive when `frames_to_emit` is zero: no bytes are produced and the
/// utterance is only delivered via `speech_end`.
pub struct ChunkEmitter {
    frames_to_emit: u32,
    frame_samples: usize,
    accumulator: Vec<f32>,
    emitted_samples: usize,
}

impl ChunkEmitter {
    pub fn new(frames_to_emit: u32, frame_samples: usize) -> Self {
        Self {
            frames_to_emit,
            frame_samples,
            accumulator: Vec::new(),
            emitted_samples: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.frames_to_emit > 0
    }

    /// Add one confirmed frame; returns an intermediate chunk when the
    /// accumulator reaches the emission threshold.
    pub fn push_frame(&mut self, frame: &[f32]) -> Option<Vec<u8>> {
        if !self.is_active() {
            return None;
        }
        self.accumulator.extend_from_slice(frame);

        let threshold = self.frames_to_emit as usize * self.frame_samples;
        if self.accumulator.len() >= threshold {
            let rest = self.accumulator.split_off(threshold);
            let block = std::mem::replace(&mut self.accumulator, rest);
            self.emitted_samples += block.len();
            return Some(encode_pcm16(&block));
        }
        None
    }

    /// Close the utterance: everything past the already-emitted prefix of
    /// the final sample vector goes out as the final chunk, even if empty.
    pub fn finish(&mut self, utterance: &[f32]) -> Option<Vec<u8>> {
        if !self.is_active() {
            return None;
        }
        let start = self.emitted_samples.min(utterance.len());
        let bytes = encode_pcm16(&utterance[start..]);
        self.reset();
        Some(bytes)
    }

    /// Drop accumulated state (used on misfire and on session reset).
    pub fn reset(&mut self) {
        self.accumulator.clear();
        self.emitted_samples = 0;
    }

    /// Frames currently accumulated and not yet emitted.
    pub fn pending_frames(&self) -> usize {
        if self.frame_samples == 0 {
            return 0;
        }
        self.accumulator.len() / self.frame_samples
    }
}

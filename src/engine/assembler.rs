//! Frame assembler for the incoming PCM16 byte stream.
//!
//! Byte batches arrive with arbitrary lengths; the assembler decodes them
//! into normalized float samples and slices those into model-sized frames,
//! retaining any residue for the next batch.

/// Converts PCM16-LE byte batches into fixed-width float frames.
///
/// Samples are normalized to `[-1.0, 1.0]` by dividing by 32768. A batch
/// ending mid-sample carries its odd byte into the next batch.
pub struct FrameAssembler {
    frame_samples: usize,
    pending: Vec<f32>,
    carry: Option<u8>,
}

impl FrameAssembler {
    pub fn new(frame_samples: usize) -> Self {
        Self {
            frame_samples,
            pending: Vec::with_capacity(frame_samples),
            carry: None,
        }
    }

    /// Feed a byte batch and collect every complete frame it yields.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<Vec<f32>> {
        let mut data = bytes;
        if let Some(low) = self.carry.take() {
            if data.is_empty() {
                self.carry = Some(low);
                return Vec::new();
            }
            self.pending.push(decode_sample(low, data[0]));
            data = &data[1..];
        }

        let mut pairs = data.chunks_exact(2);
        for pair in &mut pairs {
            self.pending.push(decode_sample(pair[0], pair[1]));
        }
        if let [odd] = pairs.remainder() {
            self.carry = Some(*odd);
        }

        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_samples {
            let rest = self.pending.split_off(self.frame_samples);
            frames.push(std::mem::replace(&mut self.pending, rest));
        }
        frames
    }

    /// Number of decoded samples waiting for a full frame.
    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }

    /// Drop buffered samples and any carried byte.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.carry = None;
    }
}

#[inline]
fn decode_sample(low: u8, high: u8) -> f32 {
    i16::from_le_bytes([low, high]) as f32 / 32768.0
}

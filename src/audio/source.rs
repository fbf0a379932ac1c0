use crate::error::{Result, VadgateError};

/// Trait for audio byte sources.
///
/// Sources deliver signed 16-bit little-endian PCM at 16kHz mono, in
/// arbitrarily sized batches. The trait allows swapping implementations
/// (real capture device vs mock).
pub trait AudioSource: Send + Sync {
    /// Start capturing audio from the source.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing audio from the source.
    fn stop(&mut self) -> Result<()>;

    /// Read the next batch of PCM16-LE bytes.
    ///
    /// Finite sources signal exhaustion with an empty batch; live sources
    /// return an empty batch when no audio has accumulated yet.
    fn read(&mut self) -> Result<Vec<u8>>;

    /// Whether this source ends on its own (e.g. canned test input)
    /// rather than running until stopped.
    fn is_finite(&self) -> bool {
        false
    }
}

/// Mock audio source for testing.
#[derive(Debug, Clone)]
pub struct MockAudioSource {
    is_started: bool,
    batches: Vec<Vec<u8>>,
    cursor: usize,
    repeat: Option<Vec<u8>>,
    should_fail_start: bool,
    should_fail_read: bool,
    error_message: String,
}

impl MockAudioSource {
    /// Create a mock that endlessly repeats a batch of silence.
    pub fn new() -> Self {
        Self {
            is_started: false,
            batches: Vec::new(),
            cursor: 0,
            repeat: Some(vec![0u8; 320]),
            should_fail_start: false,
            should_fail_read: false,
            error_message: "mock audio error".to_string(),
        }
    }

    /// Configure the mock to play the given batches once, then end.
    pub fn with_batches(mut self, batches: Vec<Vec<u8>>) -> Self {
        self.batches = batches;
        self.repeat = None;
        self
    }

    /// Configure the mock to fail on start.
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Configure the mock to fail on read.
    pub fn with_read_failure(mut self) -> Self {
        self.should_fail_read = true;
        self
    }

    /// Configure the error message for failures.
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    pub fn is_started(&self) -> bool {
        self.is_started
    }
}

impl Default for MockAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for MockAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.should_fail_start {
            Err(VadgateError::CaptureFailure {
                message: self.error_message.clone(),
            })
        } else {
            self.is_started = true;
            Ok(())
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.is_started = false;
        Ok(())
    }

    fn read(&mut self) -> Result<Vec<u8>> {
        if self.should_fail_read {
            return Err(VadgateError::CaptureFailure {
                message: self.error_message.clone(),
            });
        }
        if let Some(batch) = self.repeat.clone() {
            return Ok(batch);
        }
        let batch = self.batches.get(self.cursor).cloned().unwrap_or_default();
        self.cursor += 1;
        Ok(batch)
    }

    fn is_finite(&self) -> bool {
        self.repeat.is_none()
    }
}

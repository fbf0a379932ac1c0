//! Event types and output channels for the engine.
//!
//! The iterator produces an ordered list of [`VadEvent`]s per input batch;
//! the handler fans them out onto seven named broadcast sinks, one per
//! event kind. Late subscribers do not receive historical events.

use tokio::sync::broadcast;

/// Per-frame probability report.
#[derive(Debug, Clone)]
pub struct FrameReport {
    /// Model speech probability for the frame.
    pub is_speech: f32,
    /// Complement of the speech probability.
    pub not_speech: f32,
    /// The normalized frame that was evaluated.
    pub frame: Vec<f32>,
}

/// An audio chunk emitted during or at the end of an utterance.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// PCM16 little-endian payload, same framing as the input stream.
    pub bytes: Vec<u8>,
    /// True for the single closing chunk of an utterance.
    pub is_final: bool,
}

/// Lifecycle events produced by the VAD iterator, in delivery order.
#[derive(Debug, Clone)]
pub enum VadEvent {
    /// A frame crossed the positive threshold; an utterance may be starting.
    SpeechStart,
    /// The utterance accumulated enough positive frames to be validated.
    RealSpeechStart,
    /// The utterance ended; carries the captured float samples.
    SpeechEnd { samples: Vec<f32> },
    /// Emitted once per processed frame.
    FrameProcessed(FrameReport),
    /// The utterance ended before validation and was discarded.
    Misfire,
    /// Intermediate or final PCM16 chunk of the active utterance.
    Chunk(AudioChunk),
    /// A non-fatal failure, described for the subscriber.
    Error { message: String },
}

impl VadEvent {
    /// Channel name of this event, for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            VadEvent::SpeechStart => "speech_start",
            VadEvent::RealSpeechStart => "real_speech_start",
            VadEvent::SpeechEnd { .. } => "speech_end",
            VadEvent::FrameProcessed(_) => "frame_processed",
            VadEvent::Misfire => "misfire",
            VadEvent::Chunk(_) => "chunk",
            VadEvent::Error { .. } => "error",
        }
    }

    /// Returns true if this event terminates an utterance.
    pub fn is_terminal(&self) -> bool {
        matches!(self, VadEvent::SpeechEnd { .. } | VadEvent::Misfire)
    }

    /// Extracts the chunk if this is a Chunk variant.
    pub fn into_chunk(self) -> Option<AudioChunk> {
        match self {
            VadEvent::Chunk(c) => Some(c),
            _ => None,
        }
    }

    /// Extracts the utterance samples if this is a SpeechEnd variant.
    pub fn into_speech_end(self) -> Option<Vec<f32>> {
        match self {
            VadEvent::SpeechEnd { samples } => Some(samples),
            _ => None,
        }
    }
}

/// Capacity of each broadcast sink.
///
/// `frame_processed` is the busiest channel at one event per frame (about
/// ten per second at v4 frame width); a slow subscriber lags rather than
/// blocking the iterator task.
const CHANNEL_CAPACITY: usize = 256;

/// The seven named output channels of a handler.
///
/// Each sink is multi-subscriber; subscribers run on their own tasks and
/// must not mutate engine state.
pub struct EventChannels {
    speech_start: broadcast::Sender<()>,
    real_speech_start: broadcast::Sender<()>,
    speech_end: broadcast::Sender<Vec<f32>>,
    frame_processed: broadcast::Sender<FrameReport>,
    misfire: broadcast::Sender<()>,
    chunk: broadcast::Sender<AudioChunk>,
    error: broadcast::Sender<String>,
}

impl EventChannels {
    pub fn new() -> Self {
        Self {
            speech_start: broadcast::channel(CHANNEL_CAPACITY).0,
            real_speech_start: broadcast::channel(CHANNEL_CAPACITY).0,
            speech_end: broadcast::channel(CHANNEL_CAPACITY).0,
            frame_processed: broadcast::channel(CHANNEL_CAPACITY).0,
            misfire: broadcast::channel(CHANNEL_CAPACITY).0,
            chunk: broadcast::channel(CHANNEL_CAPACITY).0,
            error: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn subscribe_speech_start(&self) -> broadcast::Receiver<()> {
        self.speech_start.subscribe()
    }

    pub fn subscribe_real_speech_start(&self) -> broadcast::Receiver<()> {
        self.real_speech_start.subscribe()
    }

    pub fn subscribe_speech_end(&self) -> broadcast::Receiver<Vec<f32>> {
        self.speech_end.subscribe()
    }

    pub fn subscribe_frame_processed(&self) -> broadcast::Receiver<FrameReport> {
        self.frame_processed.subscribe()
    }

    pub fn subscribe_misfire(&self) -> broadcast::Receiver<()> {
        self.misfire.subscribe()
    }

    pub fn subscribe_chunk(&self) -> broadcast::Receiver<AudioChunk> {
        self.chunk.subscribe()
    }

    pub fn subscribe_error(&self) -> broadcast::Receiver<String> {
        self.error.subscribe()
    }

    /// Fan an event out to its channel.
    ///
    /// Send failures mean no subscriber is currently listening, which is
    /// not an error for a broadcast sink.
    pub fn publish(&self, event: VadEvent) {
        match event {
            VadEvent::SpeechStart => {
                let _ = self.speech_start.send(());
            }
            VadEvent::RealSpeechStart => {
                let _ = self.real_speech_start.send(());
            }
            VadEvent::SpeechEnd { samples } => {
                let _ = self.speech_end.send(samples);
            }
            VadEvent::FrameProcessed(report) => {
                let _ = self.frame_processed.send(report);
            }
            VadEvent::Misfire => {
                let _ = self.misfire.send(());
            }
            VadEvent::Chunk(chunk) => {
                let _ = self.chunk.send(chunk);
            }
            VadEvent::Error { message } => {
                let _ = self.error.send(message);
            }
        }
    }
}

impl Default for EventChannels {
    fn default() -> Self {
        Self::new()
    }
}

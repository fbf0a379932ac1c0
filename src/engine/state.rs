//! Speech state machine.
//!
//! Turns the per-frame probability stream into lifecycle events using
//! threshold hysteresis and redemption counting. Two states: `Idle` and
//! `Speaking`. A frame at or above the positive threshold opens (or
//! extends) an utterance; a frame below the negative threshold advances
//! the redemption counter; a frame between the thresholds holds, neither
//! advancing nor resetting redemption. When the counter reaches
//! `redemption_frames` the utterance closes: validated as speech if it
//! gathered `min_speech_frames` positive frames, discarded as a misfire
//! otherwise.

use crate::config::VadConfig;
use crate::engine::chunker::ChunkEmitter;
use crate::engine::prebuffer::PreSpeechPad;
use crate::events::{AudioChunk, FrameReport, VadEvent};

/// Current state of the speech detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechState {
    /// No utterance in progress.
    Idle,
    /// Inside a potential utterance.
    Speaking,
}

/// The streaming hysteresis + redemption state machine.
pub struct SpeechStateMachine {
    positive_threshold: f32,
    negative_threshold: f32,
    redemption_frames: u32,
    min_speech_frames: u32,
    end_speech_pad_frames: u32,
    frame_samples: usize,

    state: SpeechState,
    positive_frame_count: u32,
    redemption_counter: u32,
    real_start_emitted: bool,
    pre_buffer: PreSpeechPad,
    /// Ordered samples captured for the active utterance.
    utterance: Vec<f32>,
    /// Sub-negative frames of the current redemption run; the leading
    /// `end_speech_pad_frames` of these survive into the utterance.
    end_pad: Vec<Vec<f32>>,
    /// Every frame observed since redemption began, holds included, so
    /// its length is the elapsed length of the run. These are not yet
    /// confirmed for the chunk stream: flushed to the chunker when speech
    /// resumes, removed from the utterance when it closes.
    tail_pending: Vec<Vec<f32>>,
    chunker: ChunkEmitter,
}

impl SpeechStateMachine {
    /// Builds a machine from an already-resolved configuration.
    pub fn new(config: &VadConfig) -> Self {
        Self {
            positive_threshold: config.positive_speech_threshold,
            negative_threshold: config.negative_speech_threshold,
            redemption_frames: config.redemption_frames,
            min_speech_frames: config.min_speech_frames,
            end_speech_pad_frames: config.end_speech_pad_frames,
            frame_samples: config.frame_samples,
            state: SpeechState::Idle,
            positive_frame_count: 0,
            redemption_counter: 0,
            real_start_emitted: false,
            pre_buffer: PreSpeechPad::new(config.pre_speech_pad_frames as usize),
            utterance: Vec::new(),
            end_pad: Vec::new(),
            tail_pending: Vec::new(),
            chunker: ChunkEmitter::new(config.num_frames_to_emit, config.frame_samples),
        }
    }

    pub fn state(&self) -> SpeechState {
        self.state
    }

    pub fn is_speaking(&self) -> bool {
        self.state == SpeechState::Speaking
    }

    /// Process one frame with its speech probability.
    ///
    /// Returns the lifecycle events this frame produced, in delivery
    /// order; the closing `FrameProcessed` report is always last.
    pub fn process_frame(&mut self, probability: f32, frame: &[f32]) -> Vec<VadEvent> {
        let mut events = Vec::new();

        match self.state {
            SpeechState::Idle => {
                if probability >= self.positive_threshold {
                    self.begin_utterance(frame, &mut events);
                } else {
                    self.pre_buffer.push(frame);
                }
            }
            SpeechState::Speaking => {
                self.utterance.extend_from_slice(frame);

                if probability >= self.positive_threshold {
                    self.confirm_pending(&mut events);
                    self.end_pad.clear();
                    self.redemption_counter = 0;
                    self.positive_frame_count += 1;
                    if !self.real_start_emitted
                        && self.positive_frame_count >= self.min_speech_frames
                    {
                        self.real_start_emitted = true;
                        events.push(VadEvent::RealSpeechStart);
                    }
                    self.feed_chunker(frame, &mut events);
                } else if probability < self.negative_threshold {
                    self.redemption_counter += 1;
                    self.end_pad.push(frame.to_vec());
                    self.tail_pending.push(frame.to_vec());
                    if self.redemption_counter >= self.redemption_frames {
                        self.end_utterance(&mut events);
                    }
                } else if self.redemption_counter > 0 {
                    // Held frame inside a redemption window: stays in the
                    // utterance, unconfirmed for the chunk stream.
                    self.tail_pending.push(frame.to_vec());
                } else {
                    self.feed_chunker(frame, &mut events);
                }
            }
        }

        events.push(VadEvent::FrameProcessed(FrameReport {
            is_speech: probability,
            not_speech: 1.0 - probability,
            frame: frame.to_vec(),
        }));
        events
    }

    /// Close the active utterance immediately, bypassing the
    /// `min_speech_frames` gate and keeping the full captured buffer.
    ///
    /// Used when the handler pauses or stops with
    /// `submit_user_speech_on_pause` set. A no-op while idle.
    pub fn force_end(&mut self) -> Vec<VadEvent> {
        let mut events = Vec::new();
        if self.state != SpeechState::Speaking {
            return events;
        }

        let samples = std::mem::take(&mut self.utterance);
        let final_chunk = self.chunker.finish(&samples);
        events.push(VadEvent::SpeechEnd { samples });
        if let Some(bytes) = final_chunk {
            events.push(VadEvent::Chunk(AudioChunk {
                bytes,
                is_final: true,
            }));
        }
        self.reset_session();
        events
    }

    /// Unconditionally drop all session state without emitting events.
    pub fn reset(&mut self) {
        self.reset_session();
        self.pre_buffer.clear();
    }

    fn begin_utterance(&mut self, frame: &[f32], events: &mut Vec<VadEvent>) {
        self.state = SpeechState::Speaking;
        self.positive_frame_count = 1;
        self.redemption_counter = 0;
        self.real_start_emitted = false;
        self.end_pad.clear();
        self.tail_pending.clear();

        events.push(VadEvent::SpeechStart);
        if self.positive_frame_count >= self.min_speech_frames {
            self.real_start_emitted = true;
            events.push(VadEvent::RealSpeechStart);
        }

        for padded in self.pre_buffer.drain() {
            self.utterance.extend_from_slice(&padded);
            self.feed_chunker(&padded, events);
        }
        self.utterance.extend_from_slice(frame);
        self.feed_chunker(frame, events);
    }

    fn end_utterance(&mut self, events: &mut Vec<VadEvent>) {
        // The redemption tail does not belong to the utterance. Hold
        // frames inside the run do not advance the counter, so the run
        // can span more than `redemption_frames` frames; `tail_pending`
        // holds all of them.
        let tail_samples = self.tail_pending.len() * self.frame_samples;
        let keep = self.utterance.len().saturating_sub(tail_samples);
        self.utterance.truncate(keep);

        // Retain the leading end-pad frames so the cut is not abrupt.
        let pad = self
            .end_speech_pad_frames
            .min(self.redemption_frames) as usize;
        for frame in self.end_pad.iter().take(pad) {
            self.utterance.extend_from_slice(frame);
        }

        if self.positive_frame_count >= self.min_speech_frames {
            let samples = std::mem::take(&mut self.utterance);
            let final_chunk = self.chunker.finish(&samples);
            events.push(VadEvent::SpeechEnd { samples });
            if let Some(bytes) = final_chunk {
                events.push(VadEvent::Chunk(AudioChunk {
                    bytes,
                    is_final: true,
                }));
            }
        } else {
            events.push(VadEvent::Misfire);
        }
        self.reset_session();
    }

    /// Speech resumed: frames held during the redemption window are part
    /// of the utterance after all, so confirm them for the chunk stream.
    fn confirm_pending(&mut self, events: &mut Vec<VadEvent>) {
        for frame in std::mem::take(&mut self.tail_pending) {
            self.feed_chunker(&frame, events);
        }
    }

    fn feed_chunker(&mut self, frame: &[f32], events: &mut Vec<VadEvent>) {
        if let Some(bytes) = self.chunker.push_frame(frame) {
            events.push(VadEvent::Chunk(AudioChunk {
                bytes,
                is_final: false,
            }));
        }
    }

    fn reset_session(&mut self) {
        self.state = SpeechState::Idle;
        self.positive_frame_count = 0;
        self.redemption_counter = 0;
        self.real_start_emitted = false;
        self.utterance.clear();
        self.end_pad.clear();
        self.tail_pending.clear();
        self.chunker.reset();
    }
}

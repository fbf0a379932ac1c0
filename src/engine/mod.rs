//! Streaming VAD engine.
//!
//! The processing chain for one session:
//! ```text
//! ┌──────────┐    ┌───────────┐    ┌─────────────┐    ┌──────────────┐
//! │  PCM16   │───▶│  Frame    │───▶│   Speech    │───▶│  lifecycle   │
//! │  bytes   │    │ Assembler │    │   model     │    │   events,    │
//! └──────────┘    └───────────┘    └─────────────┘    │   chunks     │
//!                                        │            └──────────────┘
//!                                        ▼                   ▲
//!                                  probability ── state machine
//! ```
//! [`iterator::VadIterator`] owns the chain; the handler owns the iterator.

pub mod assembler;
pub mod chunker;
pub mod iterator;
pub mod prebuffer;
pub mod state;

pub use assembler::FrameAssembler;
pub use chunker::{ChunkEmitter, encode_pcm16};
pub use iterator::VadIterator;
pub use prebuffer::PreSpeechPad;
pub use state::{SpeechState, SpeechStateMachine};

//! vadgate - Real-time Silero voice activity detection for PCM16 streams
//!
//! Gates a continuous 16kHz mono stream into validated utterances: a
//! recurrent neural model scores each frame, a hysteresis + redemption
//! state machine decides utterance boundaries, and subscribers receive
//! lifecycle events (speech start, validated start, intermediate chunks,
//! speech end with the captured audio, or a misfire).
//!
//! ```no_run
//! use vadgate::{VadConfig, VadHandler};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut handler = VadHandler::create(false);
//!     let mut speech_end = handler.subscribe_speech_end();
//!
//!     // No external stream: the default microphone is opened and owned
//!     // by the session.
//!     handler.start_listening(VadConfig::default(), None).await?;
//!
//!     let utterance = speech_end.recv().await?;
//!     println!("captured {} samples", utterance.len());
//!
//!     handler.dispose().await;
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod config;
pub mod defaults;
pub mod engine;
pub mod error;
pub mod events;
pub mod handler;
pub mod model;

pub use config::{ModelVersion, VadConfig};
pub use error::{Result, VadgateError};
pub use events::{AudioChunk, FrameReport, VadEvent};
pub use handler::VadHandler;

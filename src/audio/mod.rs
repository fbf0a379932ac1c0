//! Audio input: the source trait, the CPAL microphone, and the pump that
//! feeds an owned device into a session's byte channel.

pub mod capture;
pub mod pump;
pub mod source;

pub use capture::{CaptureOptions, InputDevice, MicrophoneSource, list_input_devices};
pub use pump::{CapturePump, CapturePumpConfig, CapturePumpHandle};
pub use source::{AudioSource, MockAudioSource};

//! Microphone capture using CPAL (Cross-Platform Audio Library).
//!
//! Produces the PCM16-LE/16kHz/mono byte stream the engine consumes.
//! Desktop hosts expose many ALSA aliases per physical microphone
//! (monitor taps, split surround channels, digital outputs); a
//! [`CaptureOptions`] policy decides which of them a session may open.
//! Echo cancellation, auto gain and noise suppression are DSP concerns
//! of the platform audio server and apply upstream of the device opened
//! here.

use crate::audio::source::AudioSource;
use crate::defaults;
use crate::error::{Result, VadgateError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};

/// Device selection policy for an owned capture session.
///
/// Ranking is by case-insensitive name fragments: a name containing an
/// `excluded` fragment is disqualified, otherwise its rank is the index
/// of the first `preferred` fragment it matches, with unmatched names
/// ranked after all preferred ones.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Exact device name to open. None selects the best-ranked device.
    pub device: Option<String>,
    /// Name fragments tried in order; earlier matches rank better.
    pub preferred: Vec<String>,
    /// Name fragments that disqualify a device for voice input.
    pub excluded: Vec<String>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            device: None,
            // Server-backed endpoints resample to 16kHz transparently and
            // follow the desktop's input selection.
            preferred: vec!["pipewire".to_string(), "pulse".to_string()],
            // Playback taps and channel-split aliases, never microphones.
            excluded: vec![
                "monitor".to_string(),
                "surround".to_string(),
                "hdmi".to_string(),
                "spdif".to_string(),
                "s/pdif".to_string(),
                "front:".to_string(),
                "rear:".to_string(),
            ],
        }
    }
}

impl CaptureOptions {
    /// Rank a device name under this policy. None means disqualified;
    /// otherwise lower is better.
    fn rank(&self, name: &str) -> Option<usize> {
        let lower = name.to_lowercase();
        if self
            .excluded
            .iter()
            .any(|fragment| lower.contains(&fragment.to_lowercase()))
        {
            return None;
        }
        Some(
            self.preferred
                .iter()
                .position(|fragment| lower.contains(&fragment.to_lowercase()))
                .unwrap_or(self.preferred.len()),
        )
    }
}

/// An input device admitted by a [`CaptureOptions`] policy.
#[derive(Debug, Clone)]
pub struct InputDevice {
    pub name: String,
    /// Selection rank; a session opens the lowest.
    pub rank: usize,
}

/// Mutes stderr for the guard's lifetime.
///
/// Opening a cpal host probes every backend it was compiled with, and
/// the probes that fail (JACK without a server, bare ALSA PCMs) print
/// straight to stderr. A session runs the probe twice, once to list
/// devices and once to open one, so the descriptor is gated here instead
/// of at each call site.
///
/// SAFETY: fd 2 is duplicated before redirection and restored on drop;
/// no other thread may reconfigure stderr while a gate is alive.
struct StderrGate {
    saved_fd: libc::c_int,
}

impl StderrGate {
    fn mute() -> Self {
        unsafe {
            let saved_fd = libc::dup(2);
            if saved_fd >= 0 {
                let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
                if devnull >= 0 {
                    libc::dup2(devnull, 2);
                    libc::close(devnull);
                }
            }
            Self { saved_fd }
        }
    }
}

impl Drop for StderrGate {
    fn drop(&mut self) {
        if self.saved_fd >= 0 {
            unsafe {
                libc::dup2(self.saved_fd, 2);
                libc::close(self.saved_fd);
            }
        }
    }
}

/// List the input devices a session could open, best rank first.
pub fn list_input_devices(options: &CaptureOptions) -> Result<Vec<InputDevice>> {
    let _quiet = StderrGate::mute();
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| VadgateError::CaptureFailure {
            message: format!("Failed to enumerate input devices: {}", e),
        })?;

    let mut admitted = Vec::new();
    for device in devices {
        let Ok(name) = device.name() else { continue };
        if let Some(rank) = options.rank(&name) {
            admitted.push(InputDevice { name, rank });
        }
    }
    admitted.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.name.cmp(&b.name)));
    Ok(admitted)
}

/// Open the device the policy selects.
fn select_device(options: &CaptureOptions) -> Result<cpal::Device> {
    let _quiet = StderrGate::mute();
    let host = cpal::default_host();

    if let Some(wanted) = &options.device {
        let devices = host
            .input_devices()
            .map_err(|e| VadgateError::CaptureFailure {
                message: format!("Failed to enumerate input devices: {}", e),
            })?;
        for device in devices {
            if device.name().is_ok_and(|name| &name == wanted) {
                return Ok(device);
            }
        }
        return Err(VadgateError::DeviceNotFound {
            device: wanted.clone(),
        });
    }

    let mut best: Option<(usize, cpal::Device)> = None;
    if let Ok(devices) = host.input_devices() {
        for device in devices {
            let Ok(name) = device.name() else { continue };
            let Some(rank) = options.rank(&name) else { continue };
            if best.as_ref().is_none_or(|(current, _)| rank < *current) {
                best = Some((rank, device));
            }
        }
    }
    if let Some((_, device)) = best {
        return Ok(device);
    }

    // The policy admitted nothing; let the host pick as a last resort.
    host.default_input_device()
        .ok_or_else(|| VadgateError::DeviceNotFound {
            device: "default".to_string(),
        })
}

/// cpal streams are not Send on every backend. The session keeps its
/// stream behind a mutex and only touches it from one thread at a time,
/// which is what moving the source into the pump thread requires.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Microphone capture implementing [`AudioSource`].
///
/// Opens the selected device at 16kHz mono, preferring the i16 format
/// (server-backed hosts convert transparently) and falling back to f32
/// with software quantization.
pub struct MicrophoneSource {
    device: cpal::Device,
    stream: Arc<Mutex<Option<SendableStream>>>,
    buffer: Arc<Mutex<Vec<u8>>>,
    sample_rate: u32,
}

impl MicrophoneSource {
    /// Open the capture device selected by the given policy.
    pub fn new(options: &CaptureOptions) -> Result<Self> {
        let device = select_device(options)?;
        Ok(Self {
            device,
            stream: Arc::new(Mutex::new(None)),
            buffer: Arc::new(Mutex::new(Vec::new())),
            sample_rate: defaults::SAMPLE_RATE,
        })
    }

    /// Build the input stream at 16kHz mono.
    ///
    /// Tries i16 first (zero-copy path), then f32 with quantization.
    fn build_stream(&self) -> Result<cpal::Stream> {
        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            tracing::warn!("audio stream error: {err}");
        };

        let buffer = Arc::clone(&self.buffer);
        if let Ok(stream) = self.device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = buffer.lock() {
                    for sample in data {
                        buf.extend_from_slice(&sample.to_le_bytes());
                    }
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        let buffer = Arc::clone(&self.buffer);
        self.device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        for sample in data {
                            let quantized =
                                (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                            buf.extend_from_slice(&quantized.to_le_bytes());
                        }
                    }
                },
                err_callback,
                None,
            )
            .map_err(|e| capture_error("Failed to build input stream", e))
    }
}

fn capture_error(context: &str, e: impl std::fmt::Display) -> VadgateError {
    let message = format!("{}: {}", context, e);
    if message.to_lowercase().contains("permission") {
        VadgateError::PermissionDenied { message }
    } else {
        VadgateError::CaptureFailure { message }
    }
}

impl AudioSource for MicrophoneSource {
    fn start(&mut self) -> Result<()> {
        {
            let stream_guard = self.stream.lock().map_err(|e| VadgateError::Internal {
                message: format!("Failed to lock stream: {}", e),
            })?;
            if stream_guard.is_some() {
                return Ok(()); // Already started
            }
        }

        let stream = self.build_stream()?;
        stream
            .play()
            .map_err(|e| capture_error("Failed to start audio stream", e))?;

        let mut stream_guard = self.stream.lock().map_err(|e| VadgateError::Internal {
            message: format!("Failed to lock stream: {}", e),
        })?;
        *stream_guard = Some(SendableStream(stream));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut stream_guard = self.stream.lock().map_err(|e| VadgateError::Internal {
            message: format!("Failed to lock stream: {}", e),
        })?;

        if let Some(sendable_stream) = stream_guard.take() {
            sendable_stream
                .0
                .pause()
                .map_err(|e| capture_error("Failed to stop audio stream", e))?;
        }
        Ok(())
    }

    fn read(&mut self) -> Result<Vec<u8>> {
        let mut buffer = self.buffer.lock().map_err(|e| VadgateError::Internal {
            message: format!("Failed to lock audio buffer: {}", e),
        })?;
        Ok(std::mem::take(&mut *buffer))
    }
}

//! Capture pump for owned audio devices.
//!
//! Wraps an [`AudioSource`] and provides:
//! - continuous reading on a dedicated thread
//! - delivery of byte batches into a tokio channel
//! - decoupling of device timing from iterator timing

use crate::audio::source::AudioSource;
use crate::error::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;

/// Configuration for the capture pump.
#[derive(Debug, Clone)]
pub struct CapturePumpConfig {
    /// Channel buffer size (number of batches to buffer).
    pub channel_buffer_size: usize,
    /// Polling interval when no bytes are available (ms).
    pub poll_interval_ms: u64,
}

impl Default for CapturePumpConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: 1000,
            poll_interval_ms: 10,
        }
    }
}

/// Pump that continuously reads an audio source and emits byte batches.
pub struct CapturePump<A: AudioSource> {
    source: A,
    config: CapturePumpConfig,
    running: Arc<AtomicBool>,
}

impl<A: AudioSource + 'static> CapturePump<A> {
    /// Creates a new pump wrapping the given audio source.
    pub fn new(source: A) -> Self {
        Self::with_config(source, CapturePumpConfig::default())
    }

    /// Creates a new pump with custom configuration.
    pub fn with_config(source: A, config: CapturePumpConfig) -> Self {
        Self {
            source,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Starts the source and the capture thread.
    ///
    /// Returns a receiver for byte batches. Capture runs until `stop()`
    /// is called, the receiver is dropped, or a finite source is
    /// exhausted.
    pub fn start(mut self) -> Result<(mpsc::Receiver<Vec<u8>>, CapturePumpHandle)> {
        let (tx, rx) = mpsc::channel(self.config.channel_buffer_size);
        let running = self.running.clone();

        self.source.start()?;
        running.store(true, Ordering::SeqCst);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                match self.source.read() {
                    Ok(batch) if !batch.is_empty() => {
                        if tx.blocking_send(batch).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {
                        if self.source.is_finite() {
                            running.store(false, Ordering::SeqCst);
                            break;
                        }
                        thread::sleep(poll_interval);
                    }
                    Err(e) => {
                        tracing::warn!("audio capture error, stopping pump: {e}");
                        running.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            }

            if let Err(e) = self.source.stop() {
                tracing::debug!("error stopping audio source: {e}");
            }
        });

        let handle = CapturePumpHandle {
            running: self.running.clone(),
        };

        Ok((rx, handle))
    }
}

/// Handle to control a running capture pump.
#[derive(Clone)]
pub struct CapturePumpHandle {
    running: Arc<AtomicBool>,
}

impl CapturePumpHandle {
    /// Stops the pump; the source is stopped by the capture thread.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Returns true if the pump is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

//! Session coordinator.
//!
//! A [`VadHandler`] owns at most one live VAD session at a time: the
//! iterator, the input subscription, and (when no external stream is
//! supplied) the capture device. All session state is mutated by a single
//! consumer task, which preserves the per-frame ordering guarantees of
//! the engine; the handler itself only exchanges control messages with
//! that task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::audio::capture::{CaptureOptions, MicrophoneSource};
use crate::audio::pump::{CapturePump, CapturePumpHandle};
use crate::config::VadConfig;
use crate::engine::iterator::VadIterator;
use crate::error::{Result, VadgateError};
use crate::events::{AudioChunk, EventChannels, FrameReport, VadEvent};
use crate::model::{SileroModel, SpeechModel};

/// Builds a model for a resolved configuration.
///
/// The default factory loads the Silero ONNX asset; tests and embedders
/// can substitute scripted models.
pub type ModelFactory = Box<dyn Fn(&VadConfig) -> Result<Box<dyn SpeechModel>> + Send + Sync>;

enum Control {
    ForceEnd,
    Stop,
}

struct Session {
    control_tx: mpsc::UnboundedSender<Control>,
    task: JoinHandle<()>,
    /// Present when the handler owns the capture device.
    pump: Option<CapturePumpHandle>,
}

/// Lifecycle coordinator for the streaming VAD engine.
pub struct VadHandler {
    channels: Option<Arc<EventChannels>>,
    model_factory: ModelFactory,
    session: Option<Session>,
    last_config: Option<VadConfig>,
    capture_options: CaptureOptions,
    paused: Arc<AtomicBool>,
    is_debug: bool,
    disposed: bool,
}

impl VadHandler {
    /// Create a handler.
    ///
    /// With `is_debug` set, every lifecycle event is also traced at debug
    /// level.
    pub fn create(is_debug: bool) -> Self {
        Self::with_model_factory(
            is_debug,
            Box::new(|config: &VadConfig| {
                let model = SileroModel::load(&config.base_asset_path, config.model)?;
                Ok(Box::new(model) as Box<dyn SpeechModel>)
            }),
        )
    }

    /// Create a handler with a custom model factory.
    pub fn with_model_factory(is_debug: bool, model_factory: ModelFactory) -> Self {
        Self {
            channels: Some(Arc::new(EventChannels::new())),
            model_factory,
            session: None,
            last_config: None,
            capture_options: CaptureOptions::default(),
            paused: Arc::new(AtomicBool::new(false)),
            is_debug,
            disposed: false,
        }
    }

    /// Replace the device-selection policy used when the handler opens
    /// its own microphone. Takes effect on the next
    /// [`start_listening`](Self::start_listening) that acquires a device.
    pub fn set_capture_options(&mut self, options: CaptureOptions) {
        self.capture_options = options;
    }

    /// Start (or resume) listening.
    ///
    /// When `external_pcm` is supplied the handler subscribes to it and
    /// never touches the platform microphone; the caller keeps ownership
    /// of the upstream. Without it, the default capture device is opened
    /// and owned by the session.
    ///
    /// A running session with an identical configuration is reused; the
    /// call then only clears the paused flag. Any configuration change
    /// tears the old session down and builds a fresh iterator, model
    /// state included.
    pub async fn start_listening(
        &mut self,
        config: VadConfig,
        external_pcm: Option<mpsc::Receiver<Vec<u8>>>,
    ) -> Result<()> {
        if self.disposed {
            return Err(disposed_error());
        }

        let resolved = config.resolve();
        if let Err(e) = resolved.validate() {
            self.report(&e);
            return Err(e);
        }

        let session_alive = self
            .session
            .as_ref()
            .is_some_and(|s| !s.task.is_finished());
        if session_alive && self.last_config.as_ref() == Some(&resolved) {
            self.paused.store(false, Ordering::SeqCst);
            tracing::debug!("resuming existing session");
            return Ok(());
        }

        self.teardown_session().await;

        let model = match (self.model_factory)(&resolved) {
            Ok(model) => model,
            Err(e) => {
                self.report(&e);
                return Err(e);
            }
        };

        let (input_rx, pump) = match external_pcm {
            Some(rx) => (rx, None),
            None => match self.open_microphone() {
                Ok((rx, handle)) => (rx, Some(handle)),
                Err(e) => {
                    self.report(&e);
                    return Err(e);
                }
            },
        };

        let iterator = VadIterator::new(&resolved, model);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let channels = self.channels().clone();
        let paused = self.paused.clone();
        let is_debug = self.is_debug;

        let task = tokio::spawn(run_session(
            iterator, input_rx, control_rx, channels, paused, is_debug,
        ));

        self.paused.store(false, Ordering::SeqCst);
        self.session = Some(Session {
            control_tx,
            task,
            pump,
        });
        self.last_config = Some(resolved);
        Ok(())
    }

    /// Pause the session: audio delivered while paused is dropped
    /// silently and is not replayed on resume. Resume with
    /// [`start_listening`](Self::start_listening).
    ///
    /// With `submit_user_speech_on_pause` set, any active utterance is
    /// force-ended first.
    pub fn pause_listening(&mut self) {
        if self.disposed || self.session.is_none() {
            return;
        }
        self.paused.store(true, Ordering::SeqCst);
        if self.submit_on_pause() {
            self.send_control(Control::ForceEnd);
        }
        tracing::debug!("session paused");
    }

    /// Stop the session: cancels the input subscription, stops and
    /// releases the capture device if owned, and resets the iterator.
    /// Output channels stay open.
    pub async fn stop_listening(&mut self) {
        if self.session.is_none() {
            return;
        }
        if self.submit_on_pause() {
            self.send_control(Control::ForceEnd);
        }
        self.teardown_session().await;
        self.paused.store(false, Ordering::SeqCst);
        tracing::debug!("session stopped");
    }

    /// Stop the session, release the model, and close all output
    /// channels. Further calls on this handler are no-ops or errors.
    pub async fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.stop_listening().await;
        self.channels = None;
        self.disposed = true;
    }

    /// True while a session is live and not paused.
    pub fn is_listening(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| !s.task.is_finished())
            && !self.is_paused()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    // Output channel subscriptions. Panics after dispose, like sending on
    // any closed handle would.

    pub fn subscribe_speech_start(&self) -> broadcast::Receiver<()> {
        self.channels().subscribe_speech_start()
    }

    pub fn subscribe_real_speech_start(&self) -> broadcast::Receiver<()> {
        self.channels().subscribe_real_speech_start()
    }

    pub fn subscribe_speech_end(&self) -> broadcast::Receiver<Vec<f32>> {
        self.channels().subscribe_speech_end()
    }

    pub fn subscribe_frame_processed(&self) -> broadcast::Receiver<FrameReport> {
        self.channels().subscribe_frame_processed()
    }

    pub fn subscribe_misfire(&self) -> broadcast::Receiver<()> {
        self.channels().subscribe_misfire()
    }

    pub fn subscribe_chunk(&self) -> broadcast::Receiver<AudioChunk> {
        self.channels().subscribe_chunk()
    }

    pub fn subscribe_error(&self) -> broadcast::Receiver<String> {
        self.channels().subscribe_error()
    }

    fn channels(&self) -> &Arc<EventChannels> {
        self.channels
            .as_ref()
            .expect("handler has been disposed")
    }

    fn open_microphone(&self) -> Result<(mpsc::Receiver<Vec<u8>>, CapturePumpHandle)> {
        let source = MicrophoneSource::new(&self.capture_options)?;
        CapturePump::new(source).start()
    }

    fn submit_on_pause(&self) -> bool {
        self.last_config
            .as_ref()
            .is_some_and(|c| c.submit_user_speech_on_pause)
    }

    fn send_control(&self, control: Control) {
        if let Some(session) = &self.session {
            let _ = session.control_tx.send(control);
        }
    }

    fn report(&self, error: &VadgateError) {
        tracing::error!("{error}");
        if let Some(channels) = &self.channels {
            channels.publish(VadEvent::Error {
                message: error.to_string(),
            });
        }
    }

    async fn teardown_session(&mut self) {
        if let Some(session) = self.session.take() {
            if let Some(pump) = &session.pump {
                pump.stop();
            }
            let _ = session.control_tx.send(Control::Stop);
            if let Err(e) = session.task.await {
                tracing::warn!("session task ended abnormally: {e}");
            }
        }
    }
}

fn disposed_error() -> VadgateError {
    VadgateError::Internal {
        message: "handler has been disposed".to_string(),
    }
}

/// The single consumer task of a session.
///
/// Control messages take priority over audio so a stop or force-end never
/// waits behind buffered input. Audio arriving while paused is discarded.
async fn run_session(
    mut iterator: VadIterator,
    mut input_rx: mpsc::Receiver<Vec<u8>>,
    mut control_rx: mpsc::UnboundedReceiver<Control>,
    channels: Arc<EventChannels>,
    paused: Arc<AtomicBool>,
    is_debug: bool,
) {
    loop {
        tokio::select! {
            biased;

            control = control_rx.recv() => match control {
                Some(Control::ForceEnd) => {
                    for event in iterator.force_end() {
                        publish(&channels, event, is_debug);
                    }
                }
                Some(Control::Stop) | None => {
                    iterator.reset();
                    break;
                }
            },

            batch = input_rx.recv() => match batch {
                Some(bytes) => {
                    if paused.load(Ordering::SeqCst) {
                        continue;
                    }
                    for event in iterator.process(&bytes) {
                        publish(&channels, event, is_debug);
                    }
                }
                None => {
                    tracing::debug!("audio input stream ended");
                    break;
                }
            },
        }
    }
}

fn publish(channels: &EventChannels, event: VadEvent, is_debug: bool) {
    if is_debug && !matches!(event, VadEvent::FrameProcessed(_)) {
        tracing::debug!(event = event.name(), "vad event");
    }
    channels.publish(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScriptedModel;

    fn scripted_handler(probabilities: Vec<f32>) -> VadHandler {
        VadHandler::with_model_factory(
            false,
            Box::new(move |_config| {
                Ok(Box::new(ScriptedModel::new(probabilities.clone())) as Box<dyn SpeechModel>)
            }),
        )
    }

    fn test_config() -> VadConfig {
        VadConfig {
            frame_samples: 4,
            min_speech_frames: 1,
            redemption_frames: 2,
            pre_speech_pad_frames: 0,
            end_speech_pad_frames: 0,
            ..Default::default()
        }
    }

    fn frame_bytes(count: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        for _ in 0..count * 4 {
            bytes.extend_from_slice(&1000i16.to_le_bytes());
        }
        bytes
    }

    #[tokio::test]
    async fn test_invalid_config_reports_and_refuses() {
        let mut handler = scripted_handler(vec![0.1]);
        let mut errors = handler.subscribe_error();

        let config = VadConfig {
            positive_speech_threshold: 0.2,
            negative_speech_threshold: 0.8,
            ..Default::default()
        };
        let result = handler.start_listening(config, None).await;

        assert!(matches!(result, Err(VadgateError::ConfigInvalid { .. })));
        assert!(errors.recv().await.unwrap().contains("negative_speech_threshold"));
        assert!(!handler.is_listening());
    }

    #[tokio::test]
    async fn test_model_load_failure_reports_and_refuses() {
        let mut handler = VadHandler::with_model_factory(
            false,
            Box::new(|_| {
                Err(VadgateError::ModelLoadFailure {
                    message: "asset missing".to_string(),
                })
            }),
        );
        let mut errors = handler.subscribe_error();

        let result = handler.start_listening(test_config(), None).await;
        assert!(matches!(result, Err(VadgateError::ModelLoadFailure { .. })));
        assert!(errors.recv().await.unwrap().contains("asset missing"));
    }

    #[tokio::test]
    async fn test_external_stream_session_emits_events() {
        let mut handler = scripted_handler(vec![0.9, 0.9, 0.1, 0.1]);
        let mut starts = handler.subscribe_speech_start();
        let mut ends = handler.subscribe_speech_end();

        let (tx, rx) = mpsc::channel(16);
        handler
            .start_listening(test_config(), Some(rx))
            .await
            .unwrap();
        assert!(handler.is_listening());

        tx.send(frame_bytes(4)).await.unwrap();

        assert!(starts.recv().await.is_ok());
        let samples = ends.recv().await.unwrap();
        // 2 speech frames, no pads, tail removed.
        assert_eq!(samples.len(), 8);

        handler.stop_listening().await;
        assert!(!handler.is_listening());
    }

    #[tokio::test]
    async fn test_pause_drops_audio_and_resume_reuses_session() {
        let mut handler = scripted_handler(vec![0.9; 64]);
        let mut frames = handler.subscribe_frame_processed();

        let (tx, rx) = mpsc::channel(16);
        let config = test_config();
        handler
            .start_listening(config.clone(), Some(rx))
            .await
            .unwrap();

        tx.send(frame_bytes(1)).await.unwrap();
        assert!(frames.recv().await.is_ok());

        handler.pause_listening();
        assert!(handler.is_paused());
        tx.send(frame_bytes(1)).await.unwrap();
        // Let the session task pull and drop the paused batch.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // Resume with the identical config: same session, paused cleared.
        handler.start_listening(config, None).await.unwrap();
        assert!(!handler.is_paused());

        // The batch sent while paused was dropped, so the next report can
        // only come from audio sent after the resume.
        tx.send(frame_bytes(1)).await.unwrap();
        assert!(frames.recv().await.is_ok());
        assert!(
            frames.try_recv().is_err(),
            "paused batch must not be replayed"
        );

        handler.stop_listening().await;
    }

    #[tokio::test]
    async fn test_force_end_on_pause_when_configured() {
        let mut handler = scripted_handler(vec![0.9; 8]);
        let mut ends = handler.subscribe_speech_end();

        let config = VadConfig {
            submit_user_speech_on_pause: true,
            min_speech_frames: 3,
            ..test_config()
        };
        let (tx, rx) = mpsc::channel(16);
        handler.start_listening(config, Some(rx)).await.unwrap();

        // One positive frame: below min_speech_frames, yet a forced end
        // must still deliver the buffer.
        tx.send(frame_bytes(1)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        handler.pause_listening();

        let samples = ends.recv().await.unwrap();
        assert_eq!(samples.len(), 4);

        handler.stop_listening().await;
    }

    #[tokio::test]
    async fn test_reconfiguration_rebuilds_session() {
        let mut handler = scripted_handler(vec![0.9; 8]);

        let (tx1, rx1) = mpsc::channel(16);
        handler
            .start_listening(test_config(), Some(rx1))
            .await
            .unwrap();

        // Changed config: new session even though the first is alive.
        let (_tx2, rx2) = mpsc::channel(16);
        let changed = VadConfig {
            redemption_frames: 5,
            ..test_config()
        };
        handler.start_listening(changed, Some(rx2)).await.unwrap();

        // The first subscription was cancelled.
        assert!(tx1.is_closed());

        handler.stop_listening().await;
    }

    #[tokio::test]
    async fn test_dispose_closes_channels_and_blocks_restart() {
        let mut handler = scripted_handler(vec![0.1]);
        let mut starts = handler.subscribe_speech_start();

        let (_tx, rx) = mpsc::channel(16);
        handler
            .start_listening(test_config(), Some(rx))
            .await
            .unwrap();
        handler.dispose().await;

        assert!(matches!(
            starts.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert!(handler
            .start_listening(test_config(), None)
            .await
            .is_err());

        // Idempotent.
        handler.dispose().await;
    }

    #[tokio::test]
    async fn test_stop_without_session_is_a_no_op() {
        let mut handler = scripted_handler(vec![0.1]);
        handler.stop_listening().await;
        handler.pause_listening();
        assert!(!handler.is_paused());
    }
}

//! End-to-end session tests driving the public handler API with scripted
//! probability models and an external PCM stream.

use tokio::sync::mpsc;
use vadgate::config::{ModelVersion, VadConfig};
use vadgate::handler::VadHandler;
use vadgate::model::{ScriptedModel, SpeechModel};

/// Handler whose model plays back the given probability script.
fn scripted_handler(probabilities: Vec<f32>) -> VadHandler {
    VadHandler::with_model_factory(
        false,
        Box::new(move |_config| {
            Ok(Box::new(ScriptedModel::new(probabilities.clone())) as Box<dyn SpeechModel>)
        }),
    )
}

/// PCM16-LE bytes for `frames` frames of `frame_samples` constant samples.
fn pcm_frames(frames: usize, frame_samples: usize, value: i16) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(frames * frame_samples * 2);
    for _ in 0..frames * frame_samples {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| {
            let q = (s * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
            q.to_le_bytes()
        })
        .collect()
}

#[tokio::test]
async fn valid_utterance_with_default_v4_tuning() {
    // Two pad-filling silence frames, ten speech frames, an eight-frame
    // trail-off: the classic validated utterance.
    let mut script = vec![0.1, 0.1];
    script.extend(std::iter::repeat_n(0.9, 10));
    script.extend(std::iter::repeat_n(0.1, 8));

    let mut handler = scripted_handler(script);
    let mut starts = handler.subscribe_speech_start();
    let mut real_starts = handler.subscribe_real_speech_start();
    let mut ends = handler.subscribe_speech_end();

    let (tx, rx) = mpsc::channel(64);
    let config = VadConfig::default();
    let frame_samples = config.frame_samples;
    handler.start_listening(config, Some(rx)).await.unwrap();

    tx.send(pcm_frames(20, frame_samples, 2000)).await.unwrap();

    assert!(starts.recv().await.is_ok());
    assert!(real_starts.recv().await.is_ok());

    // 1 pre-pad + 10 speech + 1 end-pad frames.
    let samples = ends.recv().await.unwrap();
    assert_eq!(samples.len(), 12 * frame_samples);

    handler.stop_listening().await;
}

#[tokio::test]
async fn short_blip_misfires_without_speech_end() {
    let mut script = vec![0.9, 0.9];
    script.extend(std::iter::repeat_n(0.1, 20));

    let mut handler = scripted_handler(script);
    let mut ends = handler.subscribe_speech_end();
    let mut misfires = handler.subscribe_misfire();
    let mut chunks = handler.subscribe_chunk();
    let mut frames = handler.subscribe_frame_processed();

    let (tx, rx) = mpsc::channel(64);
    let config = VadConfig {
        frame_samples: 64,
        num_frames_to_emit: 0,
        ..Default::default()
    };
    handler.start_listening(config, Some(rx)).await.unwrap();

    tx.send(pcm_frames(22, 64, 1500)).await.unwrap();

    assert!(misfires.recv().await.is_ok());
    for _ in 0..22 {
        assert!(frames.recv().await.is_ok());
    }
    assert!(ends.try_recv().is_err(), "misfire must not emit speech_end");
    assert!(chunks.try_recv().is_err(), "misfire must not emit chunks");

    handler.stop_listening().await;
}

#[tokio::test]
async fn chunk_stream_reconstructs_the_utterance() {
    let mut script = vec![0.1];
    script.extend(std::iter::repeat_n(0.9, 10));
    script.extend(std::iter::repeat_n(0.1, 8));

    let mut handler = scripted_handler(script);
    let mut ends = handler.subscribe_speech_end();
    let mut chunks = handler.subscribe_chunk();

    let (tx, rx) = mpsc::channel(64);
    let config = VadConfig {
        frame_samples: 32,
        num_frames_to_emit: 4,
        ..Default::default()
    };
    handler.start_listening(config, Some(rx)).await.unwrap();

    // Vary the payload so reconstruction errors would be visible.
    let mut bytes = Vec::new();
    for i in 0..19i16 {
        bytes.extend_from_slice(&pcm_frames(1, 32, i * 321));
    }
    tx.send(bytes).await.unwrap();

    let samples = ends.recv().await.unwrap();

    let mut stream = Vec::new();
    loop {
        let chunk = chunks.recv().await.unwrap();
        stream.extend_from_slice(&chunk.bytes);
        if chunk.is_final {
            break;
        }
    }
    assert_eq!(stream, encode_pcm16(&samples));
    assert!(chunks.try_recv().is_err(), "exactly one final chunk");

    handler.stop_listening().await;
}

#[tokio::test]
async fn restart_with_v5_defaults_remaps_frame_parameters() {
    let mut handler = scripted_handler(vec![0.1; 16]);
    let (tx1, rx1) = mpsc::channel(16);
    handler
        .start_listening(VadConfig::default(), Some(rx1))
        .await
        .unwrap();
    drop(tx1);
    handler.stop_listening().await;

    // Caller passes v4 defaults with only the model switched; the second
    // session must still run at the v5 frame width.
    let mut frames = handler.subscribe_frame_processed();
    let (tx2, rx2) = mpsc::channel(16);
    handler
        .start_listening(
            VadConfig {
                model: ModelVersion::V5,
                ..Default::default()
            },
            Some(rx2),
        )
        .await
        .unwrap();

    // 1536 samples now split into three 512-sample frames.
    tx2.send(pcm_frames(1, 1536, 700)).await.unwrap();
    for _ in 0..3 {
        let report = frames.recv().await.unwrap();
        assert_eq!(report.frame.len(), 512);
    }

    handler.stop_listening().await;
}

#[tokio::test]
async fn stop_submits_user_speech_when_configured() {
    let mut handler = scripted_handler(vec![0.9; 4]);
    let mut ends = handler.subscribe_speech_end();

    let config = VadConfig {
        frame_samples: 16,
        submit_user_speech_on_pause: true,
        ..Default::default()
    };
    let (tx, rx) = mpsc::channel(16);
    handler.start_listening(config, Some(rx)).await.unwrap();

    // Two positive frames, well under min_speech_frames.
    tx.send(pcm_frames(2, 16, 900)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    handler.stop_listening().await;

    let samples = ends.recv().await.unwrap();
    assert_eq!(samples.len(), 2 * 16);
}

#[tokio::test]
async fn consecutive_utterances_pair_starts_with_terminals() {
    // speech, silence, speech, silence.
    let mut script = Vec::new();
    for block in 0..4 {
        let p = if block % 2 == 0 { 0.9 } else { 0.1 };
        script.extend(std::iter::repeat_n(p, 10));
    }

    let mut handler = scripted_handler(script);
    let mut starts = handler.subscribe_speech_start();
    let mut ends = handler.subscribe_speech_end();

    let (tx, rx) = mpsc::channel(64);
    let config = VadConfig {
        frame_samples: 16,
        ..Default::default()
    };
    handler.start_listening(config, Some(rx)).await.unwrap();

    tx.send(pcm_frames(40, 16, 1200)).await.unwrap();

    for _ in 0..2 {
        assert!(starts.recv().await.is_ok());
        assert!(ends.recv().await.is_ok());
    }
    assert!(starts.try_recv().is_err());

    handler.stop_listening().await;
}

#[tokio::test]
async fn inference_failures_surface_and_session_survives() {
    let mut handler = VadHandler::with_model_factory(
        false,
        Box::new(|_config| {
            let model = ScriptedModel::new(vec![0.1, 0.9, 0.9, 0.1, 0.1, 0.1])
                .with_failures_at([0]);
            Ok(Box::new(model) as Box<dyn SpeechModel>)
        }),
    );
    let mut errors = handler.subscribe_error();
    let mut ends = handler.subscribe_speech_end();

    let config = VadConfig {
        frame_samples: 16,
        min_speech_frames: 1,
        redemption_frames: 2,
        pre_speech_pad_frames: 0,
        end_speech_pad_frames: 0,
        ..Default::default()
    };
    let (tx, rx) = mpsc::channel(16);
    handler.start_listening(config, Some(rx)).await.unwrap();

    tx.send(pcm_frames(6, 16, 800)).await.unwrap();

    let message = errors.recv().await.unwrap();
    assert!(message.contains("inference"));

    // The failed frame was skipped; the rest of the script still forms a
    // complete utterance.
    assert!(ends.recv().await.is_ok());

    handler.stop_listening().await;
}

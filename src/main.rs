//! Engine process entry point.
//!
//! Speaks JSON lines over stdio with the host UI: commands in on stdin,
//! events out on stdout, logs on stderr. Holds at most one voice
//! session at a time.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gespreksbot_voice::audio::{CpalCaptureProvider, RodioSink};
use gespreksbot_voice::chat::HttpGenerationClient;
use gespreksbot_voice::config::read_engine_config;
use gespreksbot_voice::ipc::bridge::{emit_event, spawn_stdin_reader};
use gespreksbot_voice::ipc::recognition::IpcRecognitionProvider;
use gespreksbot_voice::ipc::{VoiceCommand, VoiceEvent};
use gespreksbot_voice::source::{RecognitionError, RecognitionEvent};
use gespreksbot_voice::stt::HttpTranscriptionClient;
use gespreksbot_voice::tts::HttpSynthesisClient;
use gespreksbot_voice::{Phase, SourceMode, VoiceEngine, VoiceSession};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    emit_event(&VoiceEvent::Starting {});

    let config = read_engine_config();
    info!(
        api_base = %config.api_base,
        language = %config.language,
        "Voice engine starting"
    );

    let recognition = IpcRecognitionProvider::new();
    let engine = VoiceEngine {
        generation: Arc::new(HttpGenerationClient::new(&config.api_base)),
        transcription: Arc::new(HttpTranscriptionClient::new(&config.api_base)),
        synthesis: Arc::new(HttpSynthesisClient::new(&config.api_base)),
        sink: Arc::new(RodioSink::new(config.volume, config.output_device.clone())),
        recognition: Some(Arc::new(recognition.clone())),
        capture: Some(Arc::new(CpalCaptureProvider::new(
            config.input_device.clone(),
            config.max_segment_secs,
        ))),
        config,
    };

    let mut cmd_rx = spawn_stdin_reader();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    emit_event(&VoiceEvent::Ready {});

    let mut scenario: Option<String> = None;
    let mut session: Option<VoiceSession> = None;

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                if let Some(event) = event {
                    emit_event(&event);
                }
            }
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    info!("stdin closed, shutting down");
                    break;
                };
                match cmd {
                    VoiceCommand::SetScenario { system_prompt } => {
                        scenario = Some(system_prompt);
                    }
                    VoiceCommand::Open { mode } => {
                        // Only one session at a time; reopening replaces it.
                        if let Some(mut existing) = session.take() {
                            existing.close().await;
                        }
                        let mode = parse_mode(mode.as_deref());
                        match engine.open(scenario.as_deref(), mode, event_tx.clone()) {
                            Ok(opened) => session = Some(opened),
                            Err(e) => {
                                warn!(error = %e, "Failed to open voice session");
                                emit_event(&VoiceEvent::Error {
                                    message: e.user_message(),
                                });
                            }
                        }
                    }
                    VoiceCommand::Close {} => {
                        if let Some(mut closing) = session.take() {
                            closing.close().await;
                        }
                    }
                    VoiceCommand::Status {} => {
                        let phase = session
                            .as_ref()
                            .filter(|s| s.is_active())
                            .map(|s| s.phase())
                            .unwrap_or(Phase::Idle);
                        emit_event(&VoiceEvent::StateChange {
                            state: phase.to_string(),
                        });
                    }
                    VoiceCommand::RecognitionResult { text, is_final } => {
                        let event = if is_final {
                            RecognitionEvent::Final(text)
                        } else {
                            RecognitionEvent::Interim(text)
                        };
                        recognition.route(event);
                    }
                    VoiceCommand::RecognitionEnded {} => {
                        recognition.end();
                    }
                    VoiceCommand::RecognitionError { error } => {
                        recognition.route(RecognitionEvent::Error(RecognitionError::from_code(
                            &error,
                        )));
                    }
                    VoiceCommand::Ping {} => {
                        emit_event(&VoiceEvent::Pong {});
                    }
                    VoiceCommand::Stop {} => {
                        emit_event(&VoiceEvent::Stopping {});
                        break;
                    }
                }
            }
        }
    }

    if let Some(mut closing) = session.take() {
        closing.close().await;
    }
    // Flush the closing session's trailing events.
    while let Ok(event) = event_rx.try_recv() {
        emit_event(&event);
    }
    info!("Voice engine stopped");
}

fn parse_mode(mode: Option<&str>) -> SourceMode {
    match mode {
        Some("continuous") => SourceMode::Continuous,
        Some("segmented") => SourceMode::Segmented,
        Some(other) => {
            warn!(mode = other, "Unknown source mode, using auto");
            SourceMode::Auto
        }
        None => SourceMode::Auto,
    }
}

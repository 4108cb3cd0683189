//! The voice session: orchestrates source, generation, synthesis and
//! playback for one overlay activation.
//!
//! One session owns one source task and at most one turn at a time. A
//! turn is two tasks tied to a child cancellation token: the stream
//! consumer (deltas -> sentences) and the playback queue. Both report
//! back over an internal channel stamped with the turn sequence number,
//! so completions from an interrupted turn are ignored. Barge-in
//! cancels the child token, waits for both tasks to wind down, and only
//! then accepts the new utterance.

mod phase;

pub use phase::{Phase, PhaseMachine};

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audio::{AudioSink, CaptureProvider};
use crate::chat::{self, ChatTurn, GenerationClient, Role};
use crate::config::EngineConfig;
use crate::error::VoiceError;
use crate::ipc::VoiceEvent;
use crate::source::{
    CaptureTuning, RecognitionProvider, SourceContext, SourceEvent, Utterance, UtteranceSource,
};
use crate::stt::TranscriptionClient;
use crate::tts::queue::{playback_loop, QueueOutcome};
use crate::tts::SynthesisClient;

/// Which utterance source a session should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMode {
    /// Continuous when a recognition provider exists, else segmented.
    #[default]
    Auto,
    Continuous,
    Segmented,
}

/// Capability wiring for the engine. Production wires HTTP clients and
/// real audio devices; tests inject fakes through the same seams.
pub struct VoiceEngine {
    pub config: EngineConfig,
    pub generation: Arc<dyn GenerationClient>,
    pub transcription: Arc<dyn TranscriptionClient>,
    pub synthesis: Arc<dyn SynthesisClient>,
    pub sink: Arc<dyn AudioSink>,
    pub recognition: Option<Arc<dyn RecognitionProvider>>,
    pub capture: Option<Arc<dyn CaptureProvider>>,
}

impl VoiceEngine {
    /// Open a voice session. Fails fast when no scenario prompt is set
    /// or no capture capability can be acquired; on success the session
    /// is already listening. The caller keeps at most one session open.
    pub fn open(
        &self,
        scenario: Option<&str>,
        mode: SourceMode,
        events: mpsc::UnboundedSender<VoiceEvent>,
    ) -> Result<VoiceSession, VoiceError> {
        let system_prompt = scenario
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(VoiceError::NoScenario)?
            .to_string();

        let source = self.select_source(mode)?;

        let phase = PhaseMachine::new();
        let cancel = CancellationToken::new();
        let (preview_tx, preview_rx) = watch::channel(String::new());
        let (source_tx, source_rx) = mpsc::unbounded_channel();
        let (turn_tx, turn_rx) = mpsc::unbounded_channel();

        phase.transition(Phase::Idle, Phase::Listening);
        let _ = events.send(VoiceEvent::StateChange {
            state: Phase::Listening.to_string(),
        });
        info!("Voice session opened");

        let ctx = SourceContext {
            language: self.config.language.clone(),
            phase: Arc::clone(&phase),
            cancel: cancel.clone(),
            tx: source_tx,
            tuning: CaptureTuning::from_config(&self.config),
        };
        let source_task = source.spawn(ctx);

        let runner = Runner {
            phase: Arc::clone(&phase),
            events,
            preview: preview_tx,
            generation: Arc::clone(&self.generation),
            synthesis: Arc::clone(&self.synthesis),
            sink: Arc::clone(&self.sink),
            system_prompt,
            language: self.config.language.clone(),
            history: Vec::new(),
            cancel: cancel.clone(),
            turn_seq: 0,
            turn: None,
            turn_tx,
        };
        let runner_task = tokio::spawn(runner.run(source_rx, turn_rx, source_task));

        Ok(VoiceSession {
            cancel,
            phase,
            preview: preview_rx,
            runner: Some(runner_task),
        })
    }

    fn select_source(&self, mode: SourceMode) -> Result<UtteranceSource, VoiceError> {
        match mode {
            SourceMode::Continuous => self.continuous_source(),
            SourceMode::Segmented => self.segmented_source(),
            SourceMode::Auto => {
                if self.recognition.is_some() {
                    self.continuous_source()
                } else {
                    self.segmented_source()
                }
            }
        }
    }

    fn continuous_source(&self) -> Result<UtteranceSource, VoiceError> {
        match &self.recognition {
            Some(provider) => Ok(UtteranceSource::Continuous {
                provider: Arc::clone(provider),
            }),
            None => Err(VoiceError::CaptureUnavailable(
                "no recognition provider".to_string(),
            )),
        }
    }

    fn segmented_source(&self) -> Result<UtteranceSource, VoiceError> {
        let capture = self.capture.as_ref().ok_or_else(|| {
            VoiceError::CaptureUnavailable("no capture device configured".to_string())
        })?;
        // Mic acquisition happens here so a failure aborts the open.
        let device = capture
            .open()
            .map_err(|e| VoiceError::CaptureUnavailable(e.to_string()))?;
        Ok(UtteranceSource::Segmented {
            device,
            transcription: Arc::clone(&self.transcription),
        })
    }
}

/// Handle to one live session.
pub struct VoiceSession {
    cancel: CancellationToken,
    phase: Arc<PhaseMachine>,
    preview: watch::Receiver<String>,
    runner: Option<JoinHandle<()>>,
}

impl VoiceSession {
    /// Current phase, read-only.
    pub fn phase(&self) -> Phase {
        self.phase.current()
    }

    /// Live transcript preview for the UI.
    pub fn transcript_preview(&self) -> watch::Receiver<String> {
        self.preview.clone()
    }

    /// False once the session closed (explicitly or on a fatal source
    /// condition such as an exhausted retry budget).
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Close the session. Idempotent and safe in any phase; returns
    /// once playback, the reply stream and capture have all wound down.
    pub async fn close(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.runner.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        // Tasks observe the token and wind down on their own.
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

enum TurnMsg {
    StreamDone {
        seq: u64,
        result: Result<String, VoiceError>,
    },
    QueueDrained {
        seq: u64,
    },
}

struct Turn {
    seq: u64,
    cancel: CancellationToken,
    stream: Option<JoinHandle<()>>,
    queue: Option<JoinHandle<()>>,
    stream_done: bool,
    queue_done: bool,
}

struct Runner {
    phase: Arc<PhaseMachine>,
    events: mpsc::UnboundedSender<VoiceEvent>,
    preview: watch::Sender<String>,
    generation: Arc<dyn GenerationClient>,
    synthesis: Arc<dyn SynthesisClient>,
    sink: Arc<dyn AudioSink>,
    system_prompt: String,
    language: String,
    history: Vec<ChatTurn>,
    cancel: CancellationToken,
    turn_seq: u64,
    turn: Option<Turn>,
    turn_tx: mpsc::UnboundedSender<TurnMsg>,
}

impl Runner {
    async fn run(
        mut self,
        mut source_rx: mpsc::UnboundedReceiver<SourceEvent>,
        mut turn_rx: mpsc::UnboundedReceiver<TurnMsg>,
        source_task: JoinHandle<()>,
    ) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = source_rx.recv() => match event {
                    Some(event) => {
                        if !self.on_source_event(event).await {
                            break;
                        }
                    }
                    None => break,
                },
                msg = turn_rx.recv() => {
                    if let Some(msg) = msg {
                        self.on_turn_msg(msg).await;
                    }
                }
            }
        }

        // Teardown: stop everything, wait for it, land in idle. After
        // this there is no playing audio, no queued sentence, no open
        // capture and no in-flight stream.
        self.cancel.cancel();
        self.abort_turn().await;
        let _ = source_task.await;
        self.phase.reset();
        self.emit_state(Phase::Idle);
        let _ = self.events.send(VoiceEvent::SessionClosed {});
        info!("Voice session closed");
    }

    /// Returns false when the session must close.
    async fn on_source_event(&mut self, event: SourceEvent) -> bool {
        match event {
            SourceEvent::Preview { text, interim } => {
                let _ = self.preview.send(text.clone());
                let _ = self.events.send(VoiceEvent::Preview { text, interim });
                true
            }
            SourceEvent::Utterance(utterance) => {
                self.on_utterance(utterance).await;
                true
            }
            SourceEvent::Notice(message) => {
                let _ = self.events.send(VoiceEvent::SystemMessage { message });
                true
            }
            SourceEvent::Fatal(error) => {
                warn!(%error, "Utterance source failed, closing session");
                let _ = self.events.send(VoiceEvent::SystemMessage {
                    message: error.user_message(),
                });
                false
            }
        }
    }

    async fn on_utterance(&mut self, utterance: Utterance) {
        match self.phase.current() {
            Phase::Listening => {
                if self.phase.transition(Phase::Listening, Phase::Processing) {
                    self.start_turn(utterance);
                }
            }
            Phase::Speaking => {
                info!("Barge-in: student spoke during playback");
                self.interrupt_turn().await;
                if self.phase.transition(Phase::Listening, Phase::Processing) {
                    self.start_turn(utterance);
                }
            }
            Phase::Processing => {
                // One turn in flight at a time; late finals are dropped.
                debug!(text = utterance.as_str(), "Utterance while processing, ignored");
            }
            Phase::Idle => {}
        }
    }

    fn start_turn(&mut self, utterance: Utterance) {
        let text = utterance.into_string();
        self.history.push(ChatTurn {
            role: Role::User,
            content: text.clone(),
        });
        let _ = self.events.send(VoiceEvent::Transcription { text });
        self.emit_state(Phase::Processing);

        self.turn_seq += 1;
        let seq = self.turn_seq;
        let cancel = self.cancel.child_token();
        let (sentence_tx, sentence_rx) = mpsc::unbounded_channel();

        let queue = {
            let synthesis = Arc::clone(&self.synthesis);
            let sink = Arc::clone(&self.sink);
            let phase = Arc::clone(&self.phase);
            let events = self.events.clone();
            let language = self.language.clone();
            let cancel = cancel.clone();
            let turn_tx = self.turn_tx.clone();
            tokio::spawn(async move {
                let outcome =
                    playback_loop(sentence_rx, synthesis, sink, phase, events, language, cancel)
                        .await;
                if outcome == QueueOutcome::Drained {
                    let _ = turn_tx.send(TurnMsg::QueueDrained { seq });
                }
            })
        };

        let stream = {
            let generation = Arc::clone(&self.generation);
            let system_prompt = self.system_prompt.clone();
            let history = self.history.clone();
            let cancel = cancel.clone();
            let turn_tx = self.turn_tx.clone();
            tokio::spawn(async move {
                let result = chat::consume_reply(
                    generation.as_ref(),
                    &system_prompt,
                    &history,
                    sentence_tx,
                    cancel,
                )
                .await;
                let _ = turn_tx.send(TurnMsg::StreamDone { seq, result });
            })
        };

        self.turn = Some(Turn {
            seq,
            cancel,
            stream: Some(stream),
            queue: Some(queue),
            stream_done: false,
            queue_done: false,
        });
    }

    async fn on_turn_msg(&mut self, msg: TurnMsg) {
        let current_seq = match &self.turn {
            Some(turn) => turn.seq,
            None => return,
        };
        match msg {
            TurnMsg::StreamDone { seq, result } if seq == current_seq => {
                if let Some(turn) = self.turn.as_mut() {
                    turn.stream_done = true;
                    turn.stream = None;
                }
                match result {
                    Ok(full_text) => {
                        // The assistant turn is committed exactly once,
                        // from the terminal event's full text.
                        if !full_text.is_empty() {
                            self.history.push(ChatTurn {
                                role: Role::Assistant,
                                content: full_text.clone(),
                            });
                            let _ = self.events.send(VoiceEvent::Reply { text: full_text });
                        }
                        self.maybe_finish_turn();
                    }
                    Err(VoiceError::Cancelled) => {
                        // Our own barge-in or close; nothing to report.
                    }
                    Err(error) => {
                        warn!(%error, "Reply stream failed");
                        let _ = self.events.send(VoiceEvent::SystemMessage {
                            message: error.user_message(),
                        });
                        self.fail_turn().await;
                    }
                }
            }
            TurnMsg::QueueDrained { seq } if seq == current_seq => {
                if let Some(turn) = self.turn.as_mut() {
                    turn.queue_done = true;
                    turn.queue = None;
                }
                self.maybe_finish_turn();
            }
            _ => {
                // Stale completion from an interrupted turn.
            }
        }
    }

    /// Normal completion: stream finished AND queue drained.
    fn maybe_finish_turn(&mut self) {
        let finished = self
            .turn
            .as_ref()
            .map(|t| t.stream_done && t.queue_done)
            .unwrap_or(false);
        if finished {
            self.turn = None;
            self.phase.force(Phase::Listening);
            self.emit_state(Phase::Listening);
        }
    }

    /// Barge-in: stop audio, drop the queue, cancel the stream, and
    /// wait for both tasks so nothing stale can act afterwards.
    async fn interrupt_turn(&mut self) {
        self.abort_turn().await;
        self.phase.force(Phase::Listening);
        self.emit_state(Phase::Listening);
    }

    /// Stream failure mid-turn: discard the partial turn, back to
    /// listening with the system message already emitted.
    async fn fail_turn(&mut self) {
        self.abort_turn().await;
        self.phase.force(Phase::Listening);
        self.emit_state(Phase::Listening);
    }

    async fn abort_turn(&mut self) {
        if let Some(turn) = self.turn.take() {
            turn.cancel.cancel();
            if let Some(handle) = turn.queue {
                let _ = handle.await;
            }
            if let Some(handle) = turn.stream {
                let _ = handle.await;
            }
        }
    }

    fn emit_state(&self, phase: Phase) {
        let _ = self.events.send(VoiceEvent::StateChange {
            state: phase.to_string(),
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

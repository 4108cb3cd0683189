//! Per-turn synthesis and playback queue.
//!
//! Sentences arrive from the stream consumer in order. Exactly one
//! sentence plays at a time; while it plays, the next sentence's
//! synthesis is kicked off so playback stays gapless (lookahead of
//! one). A failed synthesis skips that sentence. Cancellation (barge-in
//! or close) stops the current audio and discards everything pending.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::SynthesisClient;
use crate::audio::AudioSink;
use crate::ipc::VoiceEvent;
use crate::session::{Phase, PhaseMachine};

/// How the queue ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOutcome {
    /// All enqueued sentences played and the sender was dropped.
    Drained,
    /// Cancelled mid-turn; pending entries were discarded.
    Cancelled,
}

/// Run one turn's queue to completion.
///
/// The first sentence whose audio is ready flips the session from
/// processing to speaking (compare-and-swap, so a barge-in that already
/// moved the phase is never overwritten).
pub async fn playback_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    synthesis: Arc<dyn SynthesisClient>,
    sink: Arc<dyn AudioSink>,
    phase: Arc<PhaseMachine>,
    events: mpsc::UnboundedSender<VoiceEvent>,
    language: String,
    cancel: CancellationToken,
) -> QueueOutcome {
    // Next sentence whose synthesis is already in flight.
    let mut staged: Option<JoinHandle<anyhow::Result<Vec<u8>>>> = None;
    let mut rx_open = true;

    loop {
        let mut fetch = match staged.take() {
            Some(fetch) => fetch,
            None => {
                if !rx_open {
                    return QueueOutcome::Drained;
                }
                let text = tokio::select! {
                    _ = cancel.cancelled() => return QueueOutcome::Cancelled,
                    next = rx.recv() => match next {
                        Some(text) => text,
                        None => return QueueOutcome::Drained,
                    },
                };
                spawn_synthesis(&synthesis, &language, text)
            }
        };

        let audio = tokio::select! {
            _ = cancel.cancelled() => {
                fetch.abort();
                return QueueOutcome::Cancelled;
            }
            result = &mut fetch => result,
        };
        let bytes = match audio {
            Ok(Ok(bytes)) if !bytes.is_empty() => bytes,
            Ok(Ok(_)) => {
                debug!("Synthesis produced no audio, skipping sentence");
                continue;
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Sentence synthesis failed, skipping");
                continue;
            }
            Err(e) => {
                warn!(error = %e, "Synthesis task failed, skipping");
                continue;
            }
        };
        if cancel.is_cancelled() {
            return QueueOutcome::Cancelled;
        }

        if phase.transition(Phase::Processing, Phase::Speaking) {
            let _ = events.send(VoiceEvent::StateChange {
                state: Phase::Speaking.to_string(),
            });
        }

        let mut play = sink.play(bytes, cancel.clone());
        loop {
            tokio::select! {
                result = &mut play => {
                    if let Err(e) = result {
                        warn!(error = %e, "Playback failed, skipping sentence");
                    }
                    break;
                }
                next = rx.recv(), if staged.is_none() && rx_open => {
                    match next {
                        Some(text) => {
                            staged = Some(spawn_synthesis(&synthesis, &language, text));
                        }
                        None => rx_open = false,
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            if let Some(fetch) = staged.take() {
                fetch.abort();
            }
            return QueueOutcome::Cancelled;
        }
    }
}

fn spawn_synthesis(
    synthesis: &Arc<dyn SynthesisClient>,
    language: &str,
    text: String,
) -> JoinHandle<anyhow::Result<Vec<u8>>> {
    let synthesis = Arc::clone(synthesis);
    let language = language.to_string();
    tokio::spawn(async move { synthesis.synthesize(&text, &language).await })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    struct EchoSynthesis;

    impl SynthesisClient for EchoSynthesis {
        fn synthesize(
            &self,
            text: &str,
            _language: &str,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<u8>>> + Send + '_>> {
            let bytes = text.as_bytes().to_vec();
            Box::pin(async move { Ok(bytes) })
        }
    }

    /// Synthesis that never completes, so cancellation can be observed
    /// while a fetch is in flight.
    struct StuckSynthesis;

    impl SynthesisClient for StuckSynthesis {
        fn synthesize(
            &self,
            _text: &str,
            _language: &str,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<u8>>> + Send + '_>> {
            Box::pin(async move {
                std::future::pending::<()>().await;
                Ok(Vec::new())
            })
        }
    }

    struct RecordingSink {
        played: Mutex<Vec<String>>,
    }

    impl AudioSink for RecordingSink {
        fn play(
            &self,
            audio: Vec<u8>,
            _cancel: CancellationToken,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
            self.played
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(&audio).to_string());
            Box::pin(async move { Ok(()) })
        }
    }

    #[tokio::test]
    async fn plays_sentences_in_order_and_drains() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send("Een.".to_string()).unwrap();
        tx.send("Twee.".to_string()).unwrap();
        drop(tx);

        let sink = Arc::new(RecordingSink {
            played: Mutex::new(Vec::new()),
        });
        let phase = PhaseMachine::new();
        phase.force(Phase::Processing);
        let (events_tx, _events_rx) = mpsc::unbounded_channel();

        let outcome = playback_loop(
            rx,
            Arc::new(EchoSynthesis),
            Arc::clone(&sink) as Arc<dyn AudioSink>,
            Arc::clone(&phase),
            events_tx,
            "nl-NL".to_string(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome, QueueOutcome::Drained);
        assert_eq!(*sink.played.lock().unwrap(), vec!["Een.", "Twee."]);
        assert_eq!(phase.current(), Phase::Speaking);
    }

    #[tokio::test]
    async fn cancellation_during_an_in_flight_fetch_stops_the_queue() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send("Hallo daar.".to_string()).unwrap();

        let phase = PhaseMachine::new();
        phase.force(Phase::Processing);
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let queue = tokio::spawn(playback_loop(
            rx,
            Arc::new(StuckSynthesis),
            Arc::new(RecordingSink {
                played: Mutex::new(Vec::new()),
            }) as Arc<dyn AudioSink>,
            phase,
            events_tx,
            "nl-NL".to_string(),
            cancel.clone(),
        ));

        // Let the queue pick up the sentence and start its fetch.
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        cancel.cancel();
        assert_eq!(queue.await.unwrap(), QueueOutcome::Cancelled);
        drop(tx);
    }
}

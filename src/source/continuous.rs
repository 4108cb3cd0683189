//! Continuous recognition mode.
//!
//! A host-side streaming recognizer runs the whole session: interim
//! results become previews, finalized non-empty results become
//! utterances. The recognizer stays live while the persona speaks so a
//! barge-in can be detected. When a stream ends it is reopened, except
//! while an utterance is being processed; the restart happens once the
//! session leaves the processing phase.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::{
    cancellable_sleep, RecognitionError, RecognitionEvent, RecognitionProvider, SourceContext,
    SourceEvent, Utterance,
};
use crate::error::VoiceError;
use crate::session::Phase;

/// How often to re-check the phase while waiting out processing before
/// a recognizer restart.
const RESTART_POLL: Duration = Duration::from_millis(100);

pub async fn run(provider: Arc<dyn RecognitionProvider>, ctx: SourceContext) {
    'stream: loop {
        if ctx.cancel.is_cancelled() {
            return;
        }

        let mut stream = match provider.open(&ctx.language) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Failed to open recognition stream");
                let _ = ctx
                    .tx
                    .send(SourceEvent::Fatal(VoiceError::CaptureUnavailable(
                        e.to_string(),
                    )));
                return;
            }
        };

        loop {
            let event = tokio::select! {
                _ = ctx.cancel.cancelled() => return,
                event = stream.next_event() => event,
            };

            match event {
                Some(RecognitionEvent::Interim(text)) => {
                    let _ = ctx.tx.send(SourceEvent::Preview {
                        text,
                        interim: true,
                    });
                }
                Some(RecognitionEvent::Final(text)) => {
                    match Utterance::new(&text) {
                        Some(utterance) => {
                            let _ = ctx.tx.send(SourceEvent::Preview {
                                text: utterance.as_str().to_string(),
                                interim: false,
                            });
                            let _ = ctx.tx.send(SourceEvent::Utterance(utterance));
                        }
                        None => {
                            // Whitespace-only finals never leave the source.
                            debug!("Discarding empty final recognition result");
                        }
                    }
                }
                Some(RecognitionEvent::Error(error)) => match error {
                    RecognitionError::NoSpeech | RecognitionError::Aborted => {
                        debug!(?error, "Recoverable recognition error");
                    }
                    RecognitionError::PermissionDenied => {
                        let _ = ctx.tx.send(SourceEvent::Fatal(VoiceError::PermissionDenied));
                        return;
                    }
                    RecognitionError::Other(message) => {
                        warn!(%message, "Recognition error, continuing");
                    }
                },
                None => {
                    // Stream ended. Restart, but not while an utterance
                    // is being processed; resume once the phase moves on.
                    loop {
                        if ctx.cancel.is_cancelled() {
                            return;
                        }
                        if ctx.phase.current() != Phase::Processing {
                            continue 'stream;
                        }
                        if cancellable_sleep(&ctx.cancel, RESTART_POLL).await {
                            return;
                        }
                    }
                }
            }
        }
    }
}

//! Segmented capture mode (push-to-talk style fallback).
//!
//! Records one microphone segment at a time: a grace period so the
//! student can start talking, then energy polling until silence has
//! persisted long enough, then WAV upload for transcription. Empty or
//! failed transcriptions burn the retry budget with linear backoff;
//! when the budget runs out the source goes fatal and the session
//! closes with "no speech detected". Capture only runs while the
//! session is listening; the loop idles during processing and playback
//! and resumes afterwards.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{
    cancellable_sleep, RetryBudget, SourceContext, SourceEvent, Utterance,
};
use crate::audio::CaptureDevice;
use crate::error::VoiceError;
use crate::session::Phase;
use crate::stt::TranscriptionClient;
use crate::vad::SilenceDetector;

/// How often to re-check the phase while the session is not listening.
const IDLE_POLL: Duration = Duration::from_millis(100);

pub async fn run(
    mut device: Box<dyn CaptureDevice>,
    transcription: Arc<dyn TranscriptionClient>,
    ctx: SourceContext,
) {
    let tuning = ctx.tuning.clone();
    let mut budget = RetryBudget::new(tuning.max_empty_retries, tuning.retry_backoff_step);
    let required_polls = (tuning.silence_duration.as_millis() as u64)
        .div_ceil(tuning.silence_poll.as_millis().max(1) as u64) as u32;

    'capture: loop {
        // Wait until the session is listening again.
        loop {
            if ctx.cancel.is_cancelled() {
                return;
            }
            if ctx.phase.current() == Phase::Listening {
                break;
            }
            if cancellable_sleep(&ctx.cancel, IDLE_POLL).await {
                return;
            }
        }

        device.begin_segment();

        // Grace period: don't judge silence before the student has a
        // chance to start talking.
        if cancellable_sleep(&ctx.cancel, tuning.silence_grace).await {
            return;
        }

        let mut detector = SilenceDetector::new(tuning.silence_threshold, required_polls);
        loop {
            if ctx.cancel.is_cancelled() {
                return;
            }
            // The session may have accepted the previous utterance (or
            // been barged in on) since this segment opened; a segment
            // recorded through processing and playback must never reach
            // transcription.
            if ctx.phase.current() != Phase::Listening {
                debug!("Session moved on mid-segment, discarding capture");
                continue 'capture;
            }
            let energy = device.poll_energy();
            if detector.observe(energy) {
                break;
            }
            if cancellable_sleep(&ctx.cancel, tuning.silence_poll).await {
                return;
            }
        }

        let segment = device.end_segment();
        debug!(bytes = segment.len(), "Capture segment closed");

        let transcript = tokio::select! {
            _ = ctx.cancel.cancelled() => return,
            result = transcription.transcribe(segment, &ctx.language) => result,
        };

        match transcript {
            Ok(text) => match Utterance::new(&text) {
                Some(utterance) => {
                    info!(chars = utterance.as_str().len(), "Segment transcribed");
                    let _ = ctx.tx.send(SourceEvent::Preview {
                        text: utterance.as_str().to_string(),
                        interim: false,
                    });
                    let _ = ctx.tx.send(SourceEvent::Utterance(utterance));
                    // The budget is NOT refunded on success; it counts
                    // failures over the whole session.
                }
                None => {
                    if exhaust_or_backoff(&mut budget, &ctx).await {
                        return;
                    }
                }
            },
            Err(e) => {
                warn!(error = %e, "Transcription failed");
                let _ = ctx.tx.send(SourceEvent::Notice(
                    VoiceError::Transcription(e.to_string()).user_message(),
                ));
                if exhaust_or_backoff(&mut budget, &ctx).await {
                    return;
                }
            }
        }
    }
}

/// Burn one attempt. Emits the fatal event and returns true when the
/// budget is gone; otherwise backs off linearly and returns false.
async fn exhaust_or_backoff(budget: &mut RetryBudget, ctx: &SourceContext) -> bool {
    if budget.record_failure() {
        info!(attempts = budget.attempts(), "No usable speech, giving up");
        let _ = ctx
            .tx
            .send(SourceEvent::Fatal(VoiceError::RetriesExhausted(
                budget.attempts(),
            )));
        return true;
    }
    debug!(
        attempts = budget.attempts(),
        backoff_ms = budget.backoff().as_millis() as u64,
        "Empty segment, retrying"
    );
    cancellable_sleep(&ctx.cancel, budget.backoff()).await
}

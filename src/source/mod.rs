//! Utterance sources: where finalized user speech comes from.
//!
//! Two production variants behind one event stream. Continuous mode is
//! fed by a host-provided streaming recognizer (the UI forwards browser
//! speech-recognition results over IPC); segmented mode records
//! microphone segments bounded by silence and transcribes them. The
//! session treats both identically.

pub mod continuous;
pub mod segmented;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::audio::CaptureDevice;
use crate::config::EngineConfig;
use crate::error::VoiceError;
use crate::session::PhaseMachine;
use crate::stt::TranscriptionClient;

/// A finalized, non-empty piece of user speech. Construction trims and
/// rejects whitespace-only text, so holders never re-check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance(String);

impl Utterance {
    pub fn new(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Events a source emits toward the session.
#[derive(Debug)]
pub enum SourceEvent {
    /// Live transcript for the UI. Interim previews may still change;
    /// final ones reflect accepted text.
    Preview { text: String, interim: bool },
    /// Finalized non-empty speech. The session decides what it means
    /// (new turn, barge-in, or ignored while processing).
    Utterance(Utterance),
    /// Transient trouble worth telling the user about; the source keeps
    /// going.
    Notice(String),
    /// The source cannot continue; the session closes.
    Fatal(VoiceError),
}

/// Events from the host's streaming recognizer (continuous mode).
#[derive(Debug, Clone)]
pub enum RecognitionEvent {
    Interim(String),
    Final(String),
    Error(RecognitionError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    /// Recognizer heard nothing; harmless, it restarts.
    NoSpeech,
    /// Recognizer was aborted, usually by our own restart.
    Aborted,
    /// User denied microphone access. Fatal.
    PermissionDenied,
    Other(String),
}

impl RecognitionError {
    /// Map the Web Speech API error codes the host forwards.
    pub fn from_code(code: &str) -> Self {
        match code {
            "no-speech" => RecognitionError::NoSpeech,
            "aborted" => RecognitionError::Aborted,
            "not-allowed" | "service-not-allowed" => RecognitionError::PermissionDenied,
            other => RecognitionError::Other(other.to_string()),
        }
    }
}

/// One live recognizer stream; ends when the recognizer stops.
pub trait RecognitionStream: Send {
    fn next_event(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Option<RecognitionEvent>> + Send + '_>>;
}

/// Opens recognizer streams. A fresh stream is requested every time the
/// previous one ends (the session restarts recognition).
pub trait RecognitionProvider: Send + Sync {
    fn open(&self, language: &str) -> anyhow::Result<Box<dyn RecognitionStream>>;
}

/// Session-scoped budget for empty or failed transcription attempts in
/// segmented mode. Monotonically non-decreasing: a successful utterance
/// never refunds attempts, so a session with flaky audio still closes
/// after `max` total failures.
pub struct RetryBudget {
    attempts: u32,
    max: u32,
    backoff_step: Duration,
}

impl RetryBudget {
    pub fn new(max: u32, backoff_step: Duration) -> Self {
        Self {
            attempts: 0,
            max: max.max(1),
            backoff_step,
        }
    }

    /// Record one failed attempt. Returns true when the budget is
    /// exhausted — exactly at `max`, not before.
    pub fn record_failure(&mut self) -> bool {
        self.attempts += 1;
        self.attempts >= self.max
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Linear backoff: attempt N waits N x step.
    pub fn backoff(&self) -> Duration {
        self.backoff_step * self.attempts
    }
}

/// Shared wiring handed to a source task.
pub struct SourceContext {
    pub language: String,
    pub phase: Arc<PhaseMachine>,
    pub cancel: CancellationToken,
    pub tx: mpsc::UnboundedSender<SourceEvent>,
    pub tuning: CaptureTuning,
}

/// Heuristics for segmented capture, lifted from the engine settings.
#[derive(Debug, Clone)]
pub struct CaptureTuning {
    pub silence_threshold: f32,
    pub silence_duration: Duration,
    pub silence_grace: Duration,
    pub silence_poll: Duration,
    pub max_empty_retries: u32,
    pub retry_backoff_step: Duration,
}

impl CaptureTuning {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            silence_threshold: config.silence_threshold,
            silence_duration: Duration::from_millis(config.silence_duration_ms),
            silence_grace: Duration::from_millis(config.silence_grace_ms),
            silence_poll: Duration::from_millis(config.silence_poll_ms.max(1)),
            max_empty_retries: config.max_empty_retries,
            retry_backoff_step: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// The two capture variants, dispatched like an adapter enum.
pub enum UtteranceSource {
    Continuous {
        provider: Arc<dyn RecognitionProvider>,
    },
    Segmented {
        device: Box<dyn CaptureDevice>,
        transcription: Arc<dyn TranscriptionClient>,
    },
}

impl UtteranceSource {
    /// Spawn the source task. It runs until the context token is
    /// cancelled or a fatal condition is emitted.
    pub fn spawn(self, ctx: SourceContext) -> JoinHandle<()> {
        match self {
            UtteranceSource::Continuous { provider } => {
                tokio::spawn(continuous::run(provider, ctx))
            }
            UtteranceSource::Segmented {
                device,
                transcription,
            } => tokio::spawn(segmented::run(device, transcription, ctx)),
        }
    }
}

/// Sleep that wakes early on cancellation. Returns true if cancelled.
pub(crate) async fn cancellable_sleep(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utterance_rejects_empty_and_trims() {
        assert!(Utterance::new("").is_none());
        assert!(Utterance::new("   \n\t").is_none());
        assert_eq!(
            Utterance::new("  Goedemorgen  ").map(|u| u.into_string()),
            Some("Goedemorgen".to_string())
        );
    }

    #[test]
    fn retry_budget_exhausts_exactly_at_max() {
        let mut budget = RetryBudget::new(3, Duration::from_secs(1));
        assert!(!budget.record_failure());
        assert!(!budget.record_failure());
        assert!(budget.record_failure());
        assert_eq!(budget.attempts(), 3);
    }

    #[test]
    fn retry_budget_backoff_is_linear() {
        let mut budget = RetryBudget::new(5, Duration::from_secs(1));
        budget.record_failure();
        assert_eq!(budget.backoff(), Duration::from_secs(1));
        budget.record_failure();
        assert_eq!(budget.backoff(), Duration::from_secs(2));
    }

    #[test]
    fn recognition_error_codes_map_like_the_browser() {
        assert_eq!(
            RecognitionError::from_code("no-speech"),
            RecognitionError::NoSpeech
        );
        assert_eq!(
            RecognitionError::from_code("aborted"),
            RecognitionError::Aborted
        );
        assert_eq!(
            RecognitionError::from_code("not-allowed"),
            RecognitionError::PermissionDenied
        );
        assert!(matches!(
            RecognitionError::from_code("network"),
            RecognitionError::Other(_)
        ));
    }
}

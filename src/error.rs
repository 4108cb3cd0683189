//! Engine error taxonomy.
//!
//! Capability adapters (HTTP, audio devices) report `anyhow::Error`
//! internally; at the session boundary everything is folded into
//! `VoiceError` so callers and the IPC layer can tell fatal conditions
//! apart from transient ones and render a Dutch user-facing message.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoiceError {
    /// No microphone / capture capability could be acquired.
    #[error("speech capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// The user denied microphone access. Fatal for the session.
    #[error("microphone permission denied")]
    PermissionDenied,

    /// `open()` was called without an active scenario prompt.
    #[error("no active scenario")]
    NoScenario,

    /// The segmented source gave up after too many empty or failed
    /// transcription attempts.
    #[error("no speech detected after {0} attempts")]
    RetriesExhausted(u32),

    /// The streaming generation request failed or errored mid-stream.
    #[error("generation failed: {0}")]
    Generation(String),

    /// The speech-to-text service failed.
    #[error("transcription failed: {0}")]
    Transcription(String),

    /// Work was cancelled by the session itself (barge-in or close).
    /// Never surfaced to the user.
    #[error("cancelled")]
    Cancelled,
}

impl VoiceError {
    /// User-facing message (Dutch, like the rest of the app UI).
    pub fn user_message(&self) -> String {
        match self {
            VoiceError::CaptureUnavailable(_) => {
                "Kon de microfoon niet openen. Controleer je audio-instellingen.".to_string()
            }
            VoiceError::PermissionDenied => {
                "Microfoontoegang geweigerd. Sta de microfoon toe in je browserinstellingen."
                    .to_string()
            }
            VoiceError::NoScenario => {
                "Start eerst een gesprek voordat je de spraakmodus opent.".to_string()
            }
            VoiceError::RetriesExhausted(_) => {
                "Geen spraak gedetecteerd. Druk opnieuw op de microfoon.".to_string()
            }
            VoiceError::Generation(_) => "Er ging iets mis. Probeer het opnieuw.".to_string(),
            VoiceError::Transcription(_) => {
                "Spraakherkenning is tijdelijk niet beschikbaar.".to_string()
            }
            VoiceError::Cancelled => String::new(),
        }
    }
}

//! IPC protocol with the host UI.
//!
//! Events use `{"event": "<name>", "data": {...}}` (engine -> host).
//! Commands use `{"command": "<name>", ...}` (host -> engine).

pub mod bridge;
pub mod recognition;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Events: engine -> host (stdout)
// ---------------------------------------------------------------------------

/// Everything the engine tells the host, as JSON lines on stdout. The
/// same enum doubles as the in-process event stream when the engine is
/// embedded as a library.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum VoiceEvent {
    Starting {},
    Ready {},
    /// Session phase changed: idle, listening, processing, speaking.
    StateChange { state: String },
    /// Live transcript preview; interim previews may still change.
    Preview { text: String, interim: bool },
    /// Accepted student utterance (committed to history).
    Transcription { text: String },
    /// Full persona reply (committed to history).
    Reply { text: String },
    /// User-visible notice, in Dutch.
    SystemMessage { message: String },
    SessionClosed {},
    Error { message: String },
    Pong {},
    Stopping {},
}

// ---------------------------------------------------------------------------
// Commands: host -> engine (stdin)
// ---------------------------------------------------------------------------

/// Everything the host can ask, as JSON lines on stdin.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command")]
#[serde(rename_all = "snake_case")]
pub enum VoiceCommand {
    /// Set the persona system prompt for subsequent sessions.
    SetScenario { system_prompt: String },
    /// Open the voice overlay. `mode` is "continuous", "segmented" or
    /// absent (prefer continuous when the host forwards recognition).
    Open {
        #[serde(default)]
        mode: Option<String>,
    },
    Close {},
    /// Ask for the current phase (answered with a state_change event).
    Status {},
    /// Host-forwarded browser recognition result.
    RecognitionResult {
        text: String,
        #[serde(default)]
        is_final: bool,
    },
    /// The browser recognizer stopped; the engine will ask for a restart
    /// by reopening its stream.
    RecognitionEnded {},
    /// Browser recognizer error code (e.g. "no-speech", "not-allowed").
    RecognitionError { error: String },
    Ping {},
    Stop {},
}

//! Engine settings, read from `voice_engine.json` in the platform
//! settings directory. Every field has a default so a missing or
//! partial file is fine; keys are camelCase to match the host app.

pub mod paths;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Base URL of the gespreksbot server (chat stream, STT, TTS).
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// BCP-47 tag for recognition and synthesis.
    #[serde(default = "default_language")]
    pub language: String,

    /// Named input device; `None` uses the system default.
    #[serde(default)]
    pub input_device: Option<String>,

    /// Named output device; `None` uses the system default.
    #[serde(default)]
    pub output_device: Option<String>,

    /// Playback volume (1.0 = normal).
    #[serde(default = "default_volume")]
    pub volume: f32,

    /// Mean-absolute-amplitude level below which a poll counts as silent.
    #[serde(default = "default_silence_threshold")]
    pub silence_threshold: f32,

    /// Sustained silence that ends a capture segment.
    #[serde(default = "default_silence_duration_ms")]
    pub silence_duration_ms: u64,

    /// Delay before silence detection starts on a fresh segment, so the
    /// segment is not closed before the student begins talking.
    #[serde(default = "default_silence_grace_ms")]
    pub silence_grace_ms: u64,

    /// Energy poll interval during segmented capture.
    #[serde(default = "default_silence_poll_ms")]
    pub silence_poll_ms: u64,

    /// Empty/failed transcription attempts before the session gives up.
    #[serde(default = "default_max_empty_retries")]
    pub max_empty_retries: u32,

    /// Backoff step between retries (attempt N waits N x this).
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Hard cap on a capture segment, in seconds of 16 kHz audio.
    #[serde(default = "default_max_segment_secs")]
    pub max_segment_secs: u32,
}

fn default_api_base() -> String {
    "http://localhost:3001".to_string()
}

fn default_language() -> String {
    "nl-NL".to_string()
}

fn default_volume() -> f32 {
    1.0
}

fn default_silence_threshold() -> f32 {
    0.01
}

fn default_silence_duration_ms() -> u64 {
    1500
}

fn default_silence_grace_ms() -> u64 {
    1000
}

fn default_silence_poll_ms() -> u64 {
    100
}

fn default_max_empty_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_max_segment_secs() -> u32 {
    60
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            language: default_language(),
            input_device: None,
            output_device: None,
            volume: default_volume(),
            silence_threshold: default_silence_threshold(),
            silence_duration_ms: default_silence_duration_ms(),
            silence_grace_ms: default_silence_grace_ms(),
            silence_poll_ms: default_silence_poll_ms(),
            max_empty_retries: default_max_empty_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_segment_secs: default_max_segment_secs(),
        }
    }
}

/// Read the settings file, falling back to defaults when it is missing
/// or unparseable.
pub fn read_engine_config() -> EngineConfig {
    let path = paths::settings_dir().join("voice_engine.json");
    read_json_file(&path)
}

fn read_json_file(path: &Path) -> EngineConfig {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), "Failed to parse settings, using defaults: {}", e);
                EngineConfig::default()
            }
        },
        Err(_) => EngineConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_app_heuristics() {
        let config = EngineConfig::default();
        assert_eq!(config.language, "nl-NL");
        assert_eq!(config.silence_duration_ms, 1500);
        assert_eq!(config.silence_grace_ms, 1000);
        assert_eq!(config.silence_poll_ms, 100);
        assert_eq!(config.max_empty_retries, 3);
        assert_eq!(config.retry_backoff_ms, 1000);
    }

    #[test]
    fn partial_file_fills_missing_fields() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"apiBase": "http://server:9000", "maxEmptyRetries": 5}"#)
                .unwrap();
        assert_eq!(config.api_base, "http://server:9000");
        assert_eq!(config.max_empty_retries, 5);
        assert_eq!(config.language, "nl-NL");
        assert!((config.volume - 1.0).abs() < f32::EPSILON);
    }
}

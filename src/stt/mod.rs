//! Speech-to-text over the gespreksbot server.

use std::future::Future;
use std::pin::Pin;

use reqwest::multipart;
use serde::Deserialize;
use tracing::debug;

/// Transcribes one WAV-encoded capture segment. Tests inject a
/// scripted fake; production posts to the server.
pub trait TranscriptionClient: Send + Sync {
    fn transcribe(
        &self,
        audio_wav: Vec<u8>,
        language: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>>;
}

pub struct HttpTranscriptionClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTranscriptionClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    transcript: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl TranscriptionClient for HttpTranscriptionClient {
    fn transcribe(
        &self,
        audio_wav: Vec<u8>,
        language: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>> {
        let url = format!("{}/api/speech-to-text", self.base_url);
        let language = language.to_string();
        Box::pin(async move {
            debug!(bytes = audio_wav.len(), "Sending segment for transcription");

            let file_part = multipart::Part::bytes(audio_wav)
                .file_name("recording.wav")
                .mime_str("audio/wav")?;
            let form = multipart::Form::new()
                .text("language", language)
                .part("audio", file_part);

            let resp = self.client.post(&url).multipart(form).send().await?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!("Speech-to-text API error {}: {}", status, body);
            }

            let parsed: TranscriptionResponse = resp.json().await?;
            if let Some(error) = parsed.error {
                anyhow::bail!("Speech-to-text failed: {}", error);
            }
            Ok(parsed.transcript.unwrap_or_default())
        })
    }
}

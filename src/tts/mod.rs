//! Text-to-speech over the gespreksbot server.

pub mod queue;

use std::future::Future;
use std::pin::Pin;

use tracing::debug;

/// Synthesizes one sentence to encoded audio bytes (MP3 from the
/// server). Tests inject a fake; production posts to the server.
pub trait SynthesisClient: Send + Sync {
    fn synthesize(
        &self,
        text: &str,
        language: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<u8>>> + Send + '_>>;
}

pub struct HttpSynthesisClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSynthesisClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

impl SynthesisClient for HttpSynthesisClient {
    fn synthesize(
        &self,
        text: &str,
        language: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<u8>>> + Send + '_>> {
        let url = format!("{}/api/text-to-speech", self.base_url);
        let body = serde_json::json!({
            "text": text,
            "language": language,
        });
        Box::pin(async move {
            let resp = self.client.post(&url).json(&body).send().await?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!("Text-to-speech API error {}: {}", status, body);
            }

            let bytes = resp.bytes().await?;
            debug!(bytes = bytes.len(), "Sentence synthesized");
            Ok(bytes.to_vec())
        })
    }
}

//! Streaming persona replies from the chat service.
//!
//! The server streams the reply as SSE: `data: {"delta": ...}` blocks,
//! closed by `data: {"done": true, "fullText": ...}` or
//! `data: {"error": ...}`. The consumer feeds deltas through the
//! sentence segmenter and hands completed sentences to the synthesis
//! queue while the stream is still running.

pub mod segmenter;

use std::future::Future;
use std::pin::Pin;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::VoiceError;
use segmenter::SentenceSegmenter;

/// One turn of the conversation history, wire-compatible with the
/// server's `messages` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Events of one streamed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Delta(String),
    Done { full_text: String },
    Error(String),
}

/// Issues streaming generation requests. Production talks HTTP/SSE to
/// the gespreksbot server; tests inject a scripted fake.
pub trait GenerationClient: Send + Sync {
    fn stream_reply(
        &self,
        system_prompt: &str,
        history: &[ChatTurn],
        cancel: CancellationToken,
    ) -> Pin<
        Box<dyn Future<Output = anyhow::Result<mpsc::UnboundedReceiver<StreamEvent>>> + Send + '_>,
    >;
}

pub struct HttpGenerationClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpGenerationClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

impl GenerationClient for HttpGenerationClient {
    fn stream_reply(
        &self,
        system_prompt: &str,
        history: &[ChatTurn],
        cancel: CancellationToken,
    ) -> Pin<
        Box<dyn Future<Output = anyhow::Result<mpsc::UnboundedReceiver<StreamEvent>>> + Send + '_>,
    > {
        let url = format!("{}/api/chat/stream", self.base_url);
        let body = serde_json::json!({
            "systemPrompt": system_prompt,
            "messages": history,
        });
        let client = self.client.clone();
        Box::pin(async move {
            let resp = client.post(&url).json(&body).send().await?;
            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                anyhow::bail!("Chat stream API error {}: {}", status, text);
            }

            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(async move {
                let mut body_stream = resp.bytes_stream();
                let mut buf = String::new();
                loop {
                    let chunk = tokio::select! {
                        // Dropping the response body closes the
                        // connection, which is how a mid-stream
                        // cancellation reaches the server.
                        _ = cancel.cancelled() => {
                            debug!("Chat stream cancelled");
                            return;
                        }
                        chunk = body_stream.next() => chunk,
                    };
                    match chunk {
                        Some(Ok(bytes)) => {
                            buf.push_str(&String::from_utf8_lossy(&bytes));
                            while let Some(idx) = buf.find("\n\n") {
                                let block: String = buf.drain(..idx + 2).collect();
                                for line in block.lines() {
                                    if let Some(event) = parse_sse_line(line) {
                                        let terminal = !matches!(event, StreamEvent::Delta(_));
                                        if tx.send(event).is_err() || terminal {
                                            return;
                                        }
                                    }
                                }
                            }
                        }
                        Some(Err(e)) => {
                            let _ = tx.send(StreamEvent::Error(e.to_string()));
                            return;
                        }
                        None => return,
                    }
                }
            });

            Ok(rx)
        })
    }
}

#[derive(Deserialize)]
struct SsePayload {
    #[serde(default)]
    delta: Option<String>,
    #[serde(default)]
    done: Option<bool>,
    #[serde(rename = "fullText", default)]
    full_text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn parse_sse_line(line: &str) -> Option<StreamEvent> {
    let data = line
        .strip_prefix("data: ")
        .or_else(|| line.strip_prefix("data:"))?
        .trim();
    if data.is_empty() {
        return None;
    }
    let payload: SsePayload = match serde_json::from_str(data) {
        Ok(p) => p,
        Err(e) => {
            warn!("Unparseable SSE payload: {} — {}", e, data);
            return None;
        }
    };
    if let Some(error) = payload.error {
        Some(StreamEvent::Error(error))
    } else if payload.done.unwrap_or(false) {
        Some(StreamEvent::Done {
            full_text: payload.full_text.unwrap_or_default(),
        })
    } else {
        payload.delta.map(StreamEvent::Delta)
    }
}

/// Consume one streamed reply: segment deltas into sentences, forward
/// each to the synthesis queue, and return the full reply text from the
/// terminal event. The queue sender is dropped on return, which lets
/// the playback loop drain naturally.
pub async fn consume_reply(
    generation: &dyn GenerationClient,
    system_prompt: &str,
    history: &[ChatTurn],
    sentences: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
) -> Result<String, VoiceError> {
    let mut rx = generation
        .stream_reply(system_prompt, history, cancel.clone())
        .await
        .map_err(|e| VoiceError::Generation(e.to_string()))?;

    let mut segmenter = SentenceSegmenter::new();
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return Err(VoiceError::Cancelled),
            event = rx.recv() => event,
        };
        match event {
            Some(StreamEvent::Delta(delta)) => {
                for sentence in segmenter.push(&delta) {
                    if sentences.send(sentence).is_err() {
                        return Err(VoiceError::Cancelled);
                    }
                }
            }
            Some(StreamEvent::Done { full_text }) => {
                if let Some(rest) = segmenter.finish() {
                    let _ = sentences.send(rest);
                }
                return Ok(full_text);
            }
            Some(StreamEvent::Error(message)) => {
                return Err(VoiceError::Generation(message));
            }
            None => {
                return if cancel.is_cancelled() {
                    Err(VoiceError::Cancelled)
                } else {
                    Err(VoiceError::Generation(
                        "response stream ended without completion".to_string(),
                    ))
                };
            }
        }
    }
}

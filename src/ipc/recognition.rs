//! Recognition provider fed by the host over IPC.
//!
//! The host UI runs the browser's speech recognition and forwards
//! results as `recognition_*` commands. This provider turns those into
//! the engine's recognition stream: `open()` installs a fresh channel,
//! `end()` (on `recognition_ended`) closes the current stream so the
//! continuous source reopens one, which is the restart handshake.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

use crate::source::{RecognitionEvent, RecognitionProvider, RecognitionStream};

#[derive(Clone, Default)]
pub struct IpcRecognitionProvider {
    slot: Arc<Mutex<Option<mpsc::UnboundedSender<RecognitionEvent>>>>,
}

impl IpcRecognitionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a host-forwarded event into the currently open stream.
    /// Dropped silently when no session stream is open.
    pub fn route(&self, event: RecognitionEvent) {
        if let Ok(guard) = self.slot.lock() {
            if let Some(tx) = guard.as_ref() {
                let _ = tx.send(event);
                return;
            }
        }
        debug!("Recognition event with no open stream, dropped");
    }

    /// The host's recognizer stopped; end the current stream.
    pub fn end(&self) {
        if let Ok(mut guard) = self.slot.lock() {
            guard.take();
        }
    }
}

impl RecognitionProvider for IpcRecognitionProvider {
    fn open(&self, _language: &str) -> anyhow::Result<Box<dyn RecognitionStream>> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.slot.lock() {
            Ok(mut guard) => {
                *guard = Some(tx);
            }
            Err(_) => anyhow::bail!("recognition slot poisoned"),
        }
        Ok(Box::new(IpcRecognitionStream { rx }))
    }
}

struct IpcRecognitionStream {
    rx: mpsc::UnboundedReceiver<RecognitionEvent>,
}

impl RecognitionStream for IpcRecognitionStream {
    fn next_event(
        &mut self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Option<RecognitionEvent>> + Send + '_>>
    {
        Box::pin(async move { self.rx.recv().await })
    }
}

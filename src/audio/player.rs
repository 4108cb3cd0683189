//! Audio playback through rodio.
//!
//! Playback runs on a blocking thread; the sink polls the cancellation
//! token every 50 ms so a barge-in or close stops audio promptly.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait};
use rodio::{OutputStream, OutputStreamHandle, Sink};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Plays one blob of encoded audio to completion or cancellation.
/// Tests inject a fake; production uses [`RodioSink`].
pub trait AudioSink: Send + Sync {
    fn play(
        &self,
        audio: Vec<u8>,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;
}

pub struct RodioSink {
    volume: f32,
    output_device: Option<String>,
}

impl RodioSink {
    pub fn new(volume: f32, output_device: Option<String>) -> Self {
        Self {
            volume,
            output_device,
        }
    }
}

impl AudioSink for RodioSink {
    fn play(
        &self,
        audio: Vec<u8>,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let volume = self.volume;
        let device = self.output_device.clone();
        Box::pin(async move {
            let result = tokio::task::spawn_blocking(move || {
                play_encoded(audio, volume, device.as_deref(), &cancel)
            })
            .await;
            match result {
                Ok(r) => r.map_err(|e| anyhow::anyhow!(e)),
                Err(e) => Err(anyhow::anyhow!("playback task panicked: {}", e)),
            }
        })
    }
}

/// Decode and play one audio blob on the blocking thread.
fn play_encoded(
    audio: Vec<u8>,
    volume: f32,
    output_device_name: Option<&str>,
    cancel: &CancellationToken,
) -> Result<(), String> {
    let (_stream, stream_handle) = open_output_stream(output_device_name)?;

    let sink = Sink::try_new(&stream_handle)
        .map_err(|e| format!("Failed to create audio sink: {}", e))?;
    sink.set_volume(volume.clamp(0.0, 2.0));

    let source = rodio::Decoder::new(std::io::Cursor::new(audio))
        .map_err(|e| format!("Failed to decode audio: {}", e))?;
    sink.append(source);

    while !sink.empty() {
        if cancel.is_cancelled() {
            info!("Playback cancelled");
            sink.stop();
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    sink.sleep_until_end();

    Ok(())
}

/// Open the output stream for a named or default device.
fn open_output_stream(
    output_device_name: Option<&str>,
) -> Result<(OutputStream, OutputStreamHandle), String> {
    if let Some(name) = output_device_name {
        let host = cpal::default_host();
        let device = host
            .output_devices()
            .map_err(|e| format!("Failed to enumerate output devices: {}", e))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false));

        match device {
            Some(dev) => {
                info!(device = %name, "Using configured output device");
                OutputStream::try_from_device(&dev)
                    .map_err(|e| format!("Failed to open output device '{}': {}", name, e))
            }
            None => {
                warn!(device = %name, "Configured output device not found, using default");
                OutputStream::try_default()
                    .map_err(|e| format!("No audio output device available: {}", e))
            }
        }
    } else {
        OutputStream::try_default()
            .map_err(|e| format!("No audio output device available: {}", e))
    }
}

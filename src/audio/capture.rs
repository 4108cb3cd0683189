//! Microphone capture for segmented mode, via cpal.
//!
//! Opens the default (or named) input device, captures at its native
//! rate, resamples to 16 kHz mono f32, and writes chunks into a ring
//! buffer that the segment polling loop drains.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use tracing::{error, info};

use super::ring_buffer::{capture_ring_buffer, CaptureConsumer, CaptureProducer};
use super::wav::encode_wav;
use crate::vad;

/// Sample rate the rest of the engine works in.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Push granularity from the cpal callback (80 ms at 16 kHz).
const CHUNK_SAMPLES: usize = 1280;

/// Something that can hand out capture devices. The production
/// implementation opens a cpal stream; tests inject a scripted fake.
pub trait CaptureProvider: Send + Sync {
    fn open(&self) -> anyhow::Result<Box<dyn CaptureDevice>>;
}

/// One live microphone acquisition. Dropping the device releases it.
///
/// The segmented source drives this in a poll loop: `begin_segment`,
/// repeated `poll_energy` calls until silence persists, then
/// `end_segment` to get the encoded audio for transcription.
pub trait CaptureDevice: Send {
    /// Discard buffered audio and start accumulating a new segment.
    fn begin_segment(&mut self);

    /// Drain freshly captured samples into the current segment and
    /// return their energy level (0.0 when nothing new arrived).
    fn poll_energy(&mut self) -> f32;

    /// Close the segment and return it encoded as WAV.
    fn end_segment(&mut self) -> Vec<u8>;
}

pub struct CpalCaptureProvider {
    input_device: Option<String>,
    max_segment_samples: usize,
}

impl CpalCaptureProvider {
    pub fn new(input_device: Option<String>, max_segment_secs: u32) -> Self {
        Self {
            input_device,
            max_segment_samples: max_segment_secs as usize * TARGET_SAMPLE_RATE as usize,
        }
    }
}

impl CaptureProvider for CpalCaptureProvider {
    fn open(&self) -> anyhow::Result<Box<dyn CaptureDevice>> {
        let (producer, consumer) = capture_ring_buffer(None);
        let stream = start_capture(producer, self.input_device.as_deref())
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(Box::new(CpalCaptureDevice {
            _stream: SendStream(stream),
            consumer,
            segment: Vec::new(),
            max_segment_samples: self.max_segment_samples,
        }))
    }
}

// cpal::Stream is !Send, but we never touch it after construction; it
// only has to move into the source task once, and cpal drives the
// callbacks from its own audio thread.
struct SendStream(cpal::Stream);
unsafe impl Send for SendStream {}

struct CpalCaptureDevice {
    _stream: SendStream,
    consumer: CaptureConsumer,
    segment: Vec<f32>,
    max_segment_samples: usize,
}

impl CaptureDevice for CpalCaptureDevice {
    fn begin_segment(&mut self) {
        self.consumer.drain_all();
        self.segment.clear();
    }

    fn poll_energy(&mut self) -> f32 {
        let fresh = self.consumer.drain_all();
        if fresh.is_empty() {
            return 0.0;
        }
        let room = self.max_segment_samples.saturating_sub(self.segment.len());
        self.segment.extend_from_slice(&fresh[..fresh.len().min(room)]);
        vad::level(&fresh)
    }

    fn end_segment(&mut self) -> Vec<u8> {
        let samples = std::mem::take(&mut self.segment);
        encode_wav(&samples, TARGET_SAMPLE_RATE)
    }
}

/// Resolved input device and stream parameters.
struct CaptureConfig {
    device: cpal::Device,
    stream_config: StreamConfig,
    native_rate: u32,
}

fn resolve_device(device_name: Option<&str>) -> Result<CaptureConfig, String> {
    let host = cpal::default_host();

    let device = if let Some(name) = device_name {
        host.input_devices()
            .map_err(|e| format!("Failed to enumerate input devices: {e}"))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| format!("Input device not found: {name}"))?
    } else {
        host.default_input_device()
            .ok_or_else(|| "No default input device available".to_string())?
    };

    let dev_name = device.name().unwrap_or_else(|_| "unknown".into());
    info!(device = %dev_name, "Selected input device");

    let default_config = device
        .default_input_config()
        .map_err(|e| format!("Failed to get default input config: {e}"))?;

    let native_rate = default_config.sample_rate().0;
    let channels = default_config.channels();

    let stream_config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(native_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    info!(
        native_rate,
        channels,
        "Input device config (will resample to {}Hz mono if needed)",
        TARGET_SAMPLE_RATE,
    );

    Ok(CaptureConfig {
        device,
        stream_config,
        native_rate,
    })
}

/// Linear resampler, mono f32.
fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return input.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((input.len() as f64) / ratio).floor() as usize;
    let mut output = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_idx = i as f64 * ratio;
        let idx0 = src_idx.floor() as usize;
        let frac = (src_idx - idx0 as f64) as f32;
        let s0 = input.get(idx0).copied().unwrap_or(0.0);
        let s1 = input.get(idx0 + 1).copied().unwrap_or(s0);
        output.push(s0 + frac * (s1 - s0));
    }
    output
}

/// Down-mix to mono by averaging channels.
fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let ch = channels as usize;
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Build and start the input stream. The returned `Stream` must be kept
/// alive for capture to continue.
fn start_capture(
    mut producer: CaptureProducer,
    device_name: Option<&str>,
) -> Result<cpal::Stream, String> {
    let cfg = resolve_device(device_name)?;
    let native_rate = cfg.native_rate;
    let channels = cfg.stream_config.channels;
    let needs_resample = native_rate != TARGET_SAMPLE_RATE;
    let needs_downmix = channels > 1;

    let mut chunk_buf: Vec<f32> = Vec::with_capacity(CHUNK_SAMPLES * 2);

    let stream = cfg
        .device
        .build_input_stream(
            &cfg.stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                let mono = if needs_downmix {
                    to_mono(data, channels)
                } else {
                    data.to_vec()
                };

                let resampled = if needs_resample {
                    resample_linear(&mono, native_rate, TARGET_SAMPLE_RATE)
                } else {
                    mono
                };

                chunk_buf.extend_from_slice(&resampled);
                while chunk_buf.len() >= CHUNK_SAMPLES {
                    let chunk: Vec<f32> = chunk_buf.drain(..CHUNK_SAMPLES).collect();
                    producer.push_slice(&chunk);
                }
            },
            move |err| {
                error!("Audio input stream error: {}", err);
            },
            None,
        )
        .map_err(|e| format!("Failed to build input stream: {e}"))?;

    stream
        .play()
        .map_err(|e| format!("Failed to start input stream: {e}"))?;

    info!("Microphone capture started");

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_halves_length_when_downsampling_2x() {
        let input = vec![0.0f32; 320];
        let out = resample_linear(&input, 32_000, 16_000);
        assert_eq!(out.len(), 160);
    }

    #[test]
    fn to_mono_averages_stereo_frames() {
        let out = to_mono(&[1.0, 0.0, 0.5, 0.5], 2);
        assert_eq!(out, vec![0.5, 0.5]);
    }
}

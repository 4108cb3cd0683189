//! Audio I/O: microphone capture, ring buffer, WAV encoding, playback.

pub mod capture;
pub mod player;
pub mod ring_buffer;
pub mod wav;

pub use capture::{CaptureDevice, CaptureProvider, CpalCaptureProvider, TARGET_SAMPLE_RATE};
pub use player::{AudioSink, RodioSink};

//! Gespreksbot voice engine.
//!
//! Live voice conversation for the care-training app: the student talks
//! to a simulated persona and hears streamed spoken replies, with
//! barge-in interruption. The engine runs entirely on one tokio runtime
//! and is driven by a host UI over JSON-line IPC (see `src/main.rs`),
//! or embedded directly through [`session::VoiceEngine`].
//!
//! The flow per turn: an utterance source (continuous recognition or
//! segmented microphone capture) produces a finalized
//! [`source::Utterance`];
//! the session streams a persona reply from the chat service, cuts it
//! into sentences as deltas arrive, and plays each sentence's
//! synthesized audio while prefetching the next one. New speech during
//! playback interrupts everything and starts the next turn.

pub mod audio;
pub mod chat;
pub mod config;
pub mod error;
pub mod ipc;
pub mod session;
pub mod source;
pub mod stt;
pub mod tts;
pub mod vad;

pub use error::VoiceError;
pub use session::{Phase, SourceMode, VoiceEngine, VoiceSession};

//! Audio pipeline
//!
//! Capture, wire codec, and gapless playback scheduling. Session routing
//! lives in `session` (see `session::manager`).

mod capture;
pub mod codec;
mod playback;

pub use capture::{
    AudioCapture, CaptureState, DEFAULT_BLOCK_SIZE, DEFAULT_NOISE_GATE, passes_gate,
};
pub use codec::{CAPTURE_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE, decode_pcm16, encode_pcm16};
pub use playback::{AudioPlayback, Timeline};

//! Voicewire - realtime voice client for conversational AI endpoints
//!
//! Streams microphone audio to a bidirectional session over WebSocket and
//! plays back the streamed synthesized speech on a gapless,
//! interruption-aware timeline.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   blocks    ┌───────────────────┐
//! │   Capture     │───encode──▶│                   │──────▶ endpoint
//! │ (cpal, 16kHz) │  (gated)   │  Session Manager  │
//! └──────────────┘            │  (epoch-tagged    │◀────── endpoint
//! ┌──────────────┐   decode    │   dispatcher)     │
//! │   Playback    │◀──enqueue──│                   │
//! │ (cpal, 24kHz) │   flush    └───────────────────┘
//! └──────────────┘                    │
//!                        {connected, speaking, error}
//! ```
//!
//! The observable state surface is a [`session::StateSnapshot`] watch
//! channel; presentation maps it to display states via [`ui::UiState`].

pub mod audio;
pub mod config;
pub mod error;
pub mod session;
pub mod ui;

pub use config::Config;
pub use error::{Error, ErrorCode, Result};
pub use session::{SessionManager, StateSnapshot};

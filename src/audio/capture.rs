//! Microphone capture pipeline
//!
//! Owns the input device and a fixed-size processing tap. Each filled block
//! is peak-gated and, when signal is present, encoded and forwarded to the
//! session fire-and-forget so the audio callback never blocks.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use super::codec::{CAPTURE_SAMPLE_RATE, encode_pcm16, peak_amplitude};
use crate::{Error, Result};

/// Default processing block size in samples (256 ms at 16 kHz)
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Default noise-gate threshold on peak amplitude.
///
/// Policy value, not a protocol constant; blocks below it are dropped to
/// conserve bandwidth. Set to 0.0 to disable gating.
pub const DEFAULT_NOISE_GATE: f32 = 0.005;

/// Lifecycle of the capture pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// No device acquired yet
    Idle,
    /// Device acquired, tap not yet attached
    Armed,
    /// Processing tap running, blocks flowing
    Streaming,
    /// Device and tap released
    TornDown,
}

/// Captures audio from the default input device and emits encoded blocks
pub struct AudioCapture {
    device: Option<Device>,
    config: Option<StreamConfig>,
    stream: Option<Stream>,
    state: CaptureState,
    block_size: usize,
    gate_threshold: f32,
}

impl AudioCapture {
    /// Create a capture pipeline in the idle state
    #[must_use]
    pub const fn new(block_size: usize, gate_threshold: f32) -> Self {
        Self {
            device: None,
            config: None,
            stream: None,
            state: CaptureState::Idle,
            block_size,
            gate_threshold,
        }
    }

    /// Acquire the default input device (`idle → armed`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Capture`] if no input device is available (denied or
    /// absent microphone), [`Error::Audio`] if the audio subsystem has no
    /// compatible 16 kHz mono configuration.
    pub fn arm(&mut self) -> Result<()> {
        if self.state == CaptureState::Armed {
            return Ok(());
        }
        if self.state != CaptureState::Idle {
            return Err(Error::Capture(format!(
                "cannot arm from state {:?}",
                self.state
            )));
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Capture("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(CAPTURE_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(CAPTURE_SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable input config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(CAPTURE_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = CAPTURE_SAMPLE_RATE,
            channels = config.channels,
            "capture armed"
        );

        self.device = Some(device);
        self.config = Some(config);
        self.state = CaptureState::Armed;
        Ok(())
    }

    /// Attach the processing tap and start streaming (`armed → streaming`).
    ///
    /// Each filled block is peak-gated against the configured threshold;
    /// passing blocks are PCM16/base64 encoded and pushed into `tx` without
    /// blocking. A full channel drops the block and logs — the next block
    /// will try again.
    ///
    /// # Errors
    ///
    /// Returns error if the pipeline is not armed or the stream fails to
    /// start.
    pub fn start(&mut self, tx: mpsc::Sender<String>) -> Result<()> {
        if self.state == CaptureState::Streaming {
            return Ok(());
        }
        if self.state != CaptureState::Armed {
            return Err(Error::Capture(format!(
                "cannot start from state {:?}",
                self.state
            )));
        }

        let device = self
            .device
            .as_ref()
            .ok_or_else(|| Error::Capture("no device armed".to_string()))?;
        let config = self
            .config
            .clone()
            .ok_or_else(|| Error::Capture("no config armed".to_string()))?;

        let block_size = self.block_size;
        let gate = self.gate_threshold;
        let mut pending: Vec<f32> = Vec::with_capacity(block_size * 2);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    pending.extend_from_slice(data);

                    while pending.len() >= block_size {
                        let block: Vec<f32> = pending.drain(..block_size).collect();
                        let peak = peak_amplitude(&block);

                        if peak < gate {
                            tracing::trace!(peak, "block below noise gate, dropped");
                            continue;
                        }

                        let encoded = encode_pcm16(&block);
                        if let Err(e) = tx.try_send(encoded) {
                            // No retry: audio is a continuous best-effort stream
                            tracing::debug!(error = %e, "outbound block dropped");
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Capture(e.to_string()))?;

        stream.play().map_err(|e| Error::Capture(e.to_string()))?;
        self.stream = Some(stream);
        self.state = CaptureState::Streaming;

        tracing::debug!(block_size, gate, "capture streaming");
        Ok(())
    }

    /// Detach the tap and release the device (`* → torn_down`).
    ///
    /// Idempotent; safe to call in any state, repeatedly.
    pub fn teardown(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
        }
        self.device = None;
        self.config = None;

        if self.state != CaptureState::TornDown {
            tracing::debug!("capture torn down");
        }
        self.state = CaptureState::TornDown;
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> CaptureState {
        self.state
    }

    /// Check if the tap is currently running
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        matches!(self.state, CaptureState::Streaming)
    }

    /// Configured noise-gate threshold
    #[must_use]
    pub const fn gate_threshold(&self) -> f32 {
        self.gate_threshold
    }
}

/// Decide whether a capture block passes the noise gate.
///
/// Split out of the stream callback so gate policy is testable without
/// audio hardware.
#[must_use]
pub fn passes_gate(block: &[f32], threshold: f32) -> bool {
    peak_amplitude(block) >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_drops_quiet_block() {
        let quiet = vec![0.002f32; 4096];
        assert!(!passes_gate(&quiet, DEFAULT_NOISE_GATE));
    }

    #[test]
    fn test_gate_passes_signal_block() {
        let mut block = vec![0.0f32; 4096];
        block[100] = 0.01;
        assert!(passes_gate(&block, DEFAULT_NOISE_GATE));
    }

    #[test]
    fn test_zero_threshold_disables_gate() {
        let silence = vec![0.0f32; 64];
        assert!(passes_gate(&silence, 0.0));
    }

    #[test]
    fn test_teardown_is_idempotent_from_idle() {
        let mut capture = AudioCapture::new(DEFAULT_BLOCK_SIZE, DEFAULT_NOISE_GATE);
        capture.teardown();
        assert_eq!(capture.state(), CaptureState::TornDown);
        capture.teardown();
        assert_eq!(capture.state(), CaptureState::TornDown);
    }

    #[test]
    fn test_start_requires_armed() {
        let mut capture = AudioCapture::new(DEFAULT_BLOCK_SIZE, DEFAULT_NOISE_GATE);
        let (tx, _rx) = mpsc::channel(8);
        assert!(capture.start(tx).is_err());
    }
}

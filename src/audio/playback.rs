//! Gapless playback scheduling
//!
//! Decoded audio from the session is queued onto a [`Timeline`]: a sample
//! cursor plus a FIFO of scheduled units. Units are scheduled back-to-back
//! with no gaps or overlap, and a server interruption flushes everything
//! in flight immediately. The timeline itself is pure so scheduling
//! behavior is testable without an output device; [`AudioPlayback`] drives
//! it from a cpal output stream.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::sync::watch;

use super::codec::PLAYBACK_SAMPLE_RATE;
use crate::{Error, Result};

/// One decoded buffer scheduled on the output timeline
#[derive(Debug)]
struct PlaybackUnit {
    /// Scheduled start, in samples on the output clock
    start: u64,
    samples: Vec<f32>,
    pos: usize,
}

impl PlaybackUnit {
    fn exhausted(&self) -> bool {
        self.pos >= self.samples.len()
    }
}

/// Output timeline: sample cursor, write cursor, and in-flight units.
///
/// The in-flight set is the authoritative definition of "speaking" —
/// non-empty set means speaking.
#[derive(Debug, Default)]
pub struct Timeline {
    /// Current position of the output clock, in samples
    cursor: u64,
    /// Where the next enqueued unit should begin
    next_start: u64,
    units: VecDeque<PlaybackUnit>,
    speaking: bool,
}

impl Timeline {
    /// Create an empty timeline at clock position zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a decoded buffer for gapless playback.
    ///
    /// Start time is `max(next_start, cursor)`; `next_start` then advances
    /// by the buffer length so consecutive units are exactly adjacent.
    /// Returns the scheduled start. Empty buffers are ignored.
    pub fn enqueue(&mut self, samples: Vec<f32>) -> u64 {
        let start = self.next_start.max(self.cursor);
        if samples.is_empty() {
            return start;
        }

        self.next_start = start + samples.len() as u64;
        self.units.push_back(PlaybackUnit {
            start,
            samples,
            pos: 0,
        });
        self.speaking = true;
        start
    }

    /// Hard interruption: stop every in-flight unit, reset the write
    /// cursor to zero, flip speaking off. Idempotent.
    pub fn flush(&mut self) {
        self.units.clear();
        self.next_start = 0;
        self.speaking = false;
    }

    /// Render the next `out.len() / channels` frames, advancing the clock.
    ///
    /// Exhausted units are removed; when the in-flight set empties,
    /// speaking flips off in the same call.
    pub fn fill(&mut self, out: &mut [f32], channels: usize) {
        for frame in out.chunks_mut(channels.max(1)) {
            self.drop_exhausted();

            let sample = match self.units.front_mut() {
                Some(unit) if self.cursor >= unit.start => {
                    let s = unit.samples[unit.pos];
                    unit.pos += 1;
                    s
                }
                _ => 0.0,
            };

            for slot in frame.iter_mut() {
                *slot = sample;
            }
            self.cursor += 1;
        }

        self.drop_exhausted();
        if self.units.is_empty() {
            self.speaking = false;
        }
    }

    fn drop_exhausted(&mut self) {
        while self.units.front().is_some_and(PlaybackUnit::exhausted) {
            self.units.pop_front();
        }
    }

    /// Number of units currently in flight
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.units.len()
    }

    /// Whether synthesized audio is currently scheduled or playing
    #[must_use]
    pub const fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Current output clock position in samples
    #[must_use]
    pub const fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Where the next unit would be scheduled
    #[must_use]
    pub const fn next_start(&self) -> u64 {
        self.next_start
    }
}

/// Plays the scheduled timeline to the default output device
pub struct AudioPlayback {
    device: Device,
    config: StreamConfig,
    timeline: Arc<Mutex<Timeline>>,
    speaking_tx: watch::Sender<bool>,
    stream: Option<Stream>,
}

impl AudioPlayback {
    /// Acquire the default output device at the playback sample rate
    ///
    /// # Errors
    ///
    /// Returns [`Error::Audio`] if no suitable output device exists.
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: stereo output, same sample on both channels
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        let (speaking_tx, _) = watch::channel(false);

        Ok(Self {
            device,
            config,
            timeline: Arc::new(Mutex::new(Timeline::new())),
            speaking_tx,
            stream: None,
        })
    }

    /// Start the output stream driving the timeline
    ///
    /// # Errors
    ///
    /// Returns error if the stream cannot be built or started.
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let timeline = Arc::clone(&self.timeline);
        let speaking_tx = self.speaking_tx.clone();
        let channels = usize::from(self.config.channels);

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let speaking = if let Ok(mut t) = timeline.lock() {
                        t.fill(data, channels);
                        t.is_speaking()
                    } else {
                        data.fill(0.0);
                        false
                    };

                    speaking_tx.send_if_modified(|current| {
                        if *current == speaking {
                            false
                        } else {
                            *current = speaking;
                            true
                        }
                    });
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("playback stream started");
        Ok(())
    }

    /// Enqueue decoded samples for gapless playback
    pub fn enqueue(&self, samples: Vec<f32>) {
        if let Ok(mut t) = self.timeline.lock() {
            let start = t.enqueue(samples);
            tracing::trace!(start, in_flight = t.in_flight(), "unit scheduled");
            let speaking = t.is_speaking();
            drop(t);
            self.publish_speaking(speaking);
        }
    }

    /// Flush all in-flight units (server interruption or teardown)
    pub fn flush(&self) {
        if let Ok(mut t) = self.timeline.lock() {
            let dropped = t.in_flight();
            t.flush();
            drop(t);
            if dropped > 0 {
                tracing::debug!(dropped, "playback flushed");
            }
            self.publish_speaking(false);
        }
    }

    /// Stop the stream and flush the timeline. Idempotent.
    pub fn teardown(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("playback stream stopped");
        }
        self.flush();
    }

    /// Watch channel that tracks the speaking flag
    #[must_use]
    pub fn subscribe_speaking(&self) -> watch::Receiver<bool> {
        self.speaking_tx.subscribe()
    }

    /// Whether any unit is currently in flight
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.timeline.lock().is_ok_and(|t| t.is_speaking())
    }

    fn publish_speaking(&self, speaking: bool) {
        self.speaking_tx.send_if_modified(|current| {
            if *current == speaking {
                false
            } else {
                *current = speaking;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_back_to_back_units_are_adjacent() {
        let mut timeline = Timeline::new();

        // 0.5 s then 0.3 s at 24 kHz
        let first = timeline.enqueue(vec![0.1; 12000]);
        let second = timeline.enqueue(vec![0.2; 7200]);

        assert_eq!(first, 0);
        assert_eq!(second, first + 12000);
        assert_eq!(timeline.in_flight(), 2);
        assert!(timeline.is_speaking());
    }

    #[test]
    fn test_starts_never_overlap_under_bursty_arrival() {
        let mut timeline = Timeline::new();
        let mut out = vec![0.0f32; 512];
        let durations = [100usize, 5, 2048, 1, 700];
        let mut scheduled = Vec::new();

        for &d in &durations {
            // Simulate the clock running between arrivals
            timeline.fill(&mut out, 1);
            scheduled.push((timeline.enqueue(vec![0.5; d]), d as u64));
        }

        for pair in scheduled.windows(2) {
            let (prev_start, prev_dur) = pair[0];
            let (next_start, _) = pair[1];
            assert!(next_start >= prev_start + prev_dur);
        }
    }

    #[test]
    fn test_enqueue_after_idle_starts_at_cursor() {
        let mut timeline = Timeline::new();
        timeline.enqueue(vec![0.1; 100]);

        let mut out = vec![0.0f32; 400];
        timeline.fill(&mut out, 1);
        assert!(!timeline.is_speaking());

        // Clock has moved past the finished unit; new audio starts now
        let start = timeline.enqueue(vec![0.1; 50]);
        assert_eq!(start, timeline.cursor());
    }

    #[test]
    fn test_flush_clears_everything() {
        let mut timeline = Timeline::new();
        timeline.enqueue(vec![0.1; 1000]);
        timeline.enqueue(vec![0.1; 1000]);
        assert_eq!(timeline.in_flight(), 2);

        timeline.flush();
        assert_eq!(timeline.in_flight(), 0);
        assert!(!timeline.is_speaking());
        assert_eq!(timeline.next_start(), 0);

        // Idempotent, including with zero units in flight
        timeline.flush();
        assert_eq!(timeline.in_flight(), 0);
    }

    #[test]
    fn test_fill_renders_scheduled_samples() {
        let mut timeline = Timeline::new();
        timeline.enqueue(vec![0.25; 8]);

        let mut out = vec![0.0f32; 16];
        timeline.fill(&mut out, 1);

        assert!(out[..8].iter().all(|&s| (s - 0.25).abs() < f32::EPSILON));
        assert!(out[8..].iter().all(|&s| s == 0.0));
        assert!(!timeline.is_speaking());
    }

    #[test]
    fn test_fill_interleaves_stereo() {
        let mut timeline = Timeline::new();
        timeline.enqueue(vec![0.5; 4]);

        let mut out = vec![0.0f32; 8];
        timeline.fill(&mut out, 2);

        // Same sample duplicated across both channels of each frame
        for frame in out.chunks(2) {
            assert!((frame[0] - frame[1]).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn test_speaking_flips_false_only_when_queue_empties() {
        let mut timeline = Timeline::new();
        timeline.enqueue(vec![0.1; 10]);
        timeline.enqueue(vec![0.1; 10]);

        let mut out = vec![0.0f32; 10];
        timeline.fill(&mut out, 1);
        assert!(timeline.is_speaking());

        timeline.fill(&mut out, 1);
        assert!(!timeline.is_speaking());
    }

    #[test]
    fn test_empty_buffer_is_ignored() {
        let mut timeline = Timeline::new();
        timeline.enqueue(Vec::new());
        assert_eq!(timeline.in_flight(), 0);
        assert!(!timeline.is_speaking());
    }
}

use crate::ring_buffer::RingBuffer;
use crate::wavelet::WaveletDenoiser;
use crate::CHANNEL_COUNT;
use log::{debug, info};

/// Bound a raw sample's magnitude to `modulus` while keeping its sign.
pub fn condition(raw: i64, modulus: i64) -> i64 {
    // Rust's `%` truncates toward zero, so the remainder carries the sign of `raw`
    raw % modulus
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    Warming,
    Ready,
}

/// Per-channel warmup that fixes each channel's zero level.
#[derive(Debug, Clone)]
pub struct BaselineCalibrator {
    warmup_samples: usize,
    accumulators: Vec<RingBuffer<i64>>,
    baselines: [f64; CHANNEL_COUNT],
    state: CalibrationState,
}

impl BaselineCalibrator {
    pub fn new(warmup_samples: usize) -> Self {
        Self {
            warmup_samples,
            accumulators: (0..CHANNEL_COUNT)
                .map(|_| RingBuffer::new(warmup_samples))
                .collect(),
            baselines: [0.0; CHANNEL_COUNT],
            state: CalibrationState::Warming,
        }
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == CalibrationState::Ready
    }

    pub fn baseline(&self, channel: usize) -> f64 {
        self.baselines[channel]
    }

    /// Samples collected so far for `channel`.
    pub fn warmup_count(&self, channel: usize) -> usize {
        self.accumulators[channel].len()
    }

    pub fn is_channel_warmed(&self, channel: usize) -> bool {
        self.warmup_count(channel) >= self.warmup_samples
    }

    /// Feed one conditioned value during warmup. Ignored once the calibrator is ready
    /// or the channel already has its baseline.
    pub fn observe(&mut self, channel: usize, value: i64) {
        if self.is_ready() || self.is_channel_warmed(channel) {
            return;
        }

        let accumulator = &mut self.accumulators[channel];
        accumulator.push(value);
        if accumulator.is_full() {
            let sum: f64 = accumulator.iter().map(|&v| v as f64).sum();
            self.baselines[channel] = sum / accumulator.len() as f64;
            debug!(
                "Channel {} baseline fixed at {:.2}",
                channel, self.baselines[channel]
            );
        }
    }

    /// Feed a whole frame of conditioned values and advance the global state.
    pub fn observe_frame(&mut self, values: &[i64; CHANNEL_COUNT]) -> CalibrationState {
        for (channel, &value) in values.iter().enumerate() {
            self.observe(channel, value);
        }
        self.update_state()
    }

    fn update_state(&mut self) -> CalibrationState {
        if self.state == CalibrationState::Warming {
            let min_count = (0..CHANNEL_COUNT)
                .map(|c| self.warmup_count(c))
                .min()
                .unwrap_or(0);
            if min_count >= self.warmup_samples {
                self.state = CalibrationState::Ready;
                info!(
                    "Warmup complete after {} samples per channel, starting acquisition",
                    self.warmup_samples
                );
            }
        }
        self.state
    }

    pub fn reset(&mut self) {
        for accumulator in &mut self.accumulators {
            accumulator.clear();
        }
        self.baselines = [0.0; CHANNEL_COUNT];
        self.state = CalibrationState::Warming;
    }
}

/// Map a conditioned value to [-1, 1] relative to its channel baseline.
pub fn normalize(value: i64, baseline: f64, scaling_factor: f64) -> f64 {
    ((value as f64 - baseline) / scaling_factor).clamp(-1.0, 1.0)
}

/// Sliding window of normalized samples for one channel.
#[derive(Debug, Clone)]
pub struct ChannelWindow {
    samples: RingBuffer<f64>,
}

impl ChannelWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: RingBuffer::new(capacity),
        }
    }

    /// Append a normalized sample and return this tick's output: the raw value until the
    /// window fills, the denoised latest value afterwards.
    pub fn push(&mut self, normalized: f64, denoiser: &WaveletDenoiser) -> f64 {
        self.samples.push(normalized);
        if !self.samples.is_full() {
            return normalized;
        }
        denoiser.denoise(&self.samples.to_vec())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.is_full()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

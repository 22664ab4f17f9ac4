use crate::ring_buffer::RingBuffer;
use log::{debug, trace};
use ndarray::{s, Array1};
use serde::{Deserialize, Serialize};

/// Numerator of the heart-rate conversion, in milliseconds.
///
/// Note this is 6/7 of the usual 60000 ms per minute.
pub const HEART_RATE_NUMERATOR_MS: f64 = 30000.0 * 6.0 / 7.0;

/// Successive RR differences above this many milliseconds count towards pNN50
const NN50_THRESHOLD_MS: f64 = 50.0;

/// Window of neighbouring samples inspected for a local maximum
const PEAK_WINDOW: usize = 3;

/// Time-domain heart rate variability snapshot
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HrvMetrics {
    pub heart_rate: f64,
    #[serde(rename = "SDNN")]
    pub sdnn: f64,
    #[serde(rename = "RMSSD")]
    pub rmssd: f64,
    #[serde(rename = "pNN50")]
    pub pnn50: f64,
    /// RR intervals in the history when the snapshot was taken
    pub rr_count: usize,
}

/// Calculate HRV measures over the most recent `window` RR intervals (ms).
///
/// Fewer than two intervals yield all-zero measures.
pub fn calc_hrv(rr_intervals: &[f64], window: usize) -> HrvMetrics {
    let rr_count = rr_intervals.len();
    if rr_count < 2 {
        return HrvMetrics {
            rr_count,
            ..HrvMetrics::default()
        };
    }

    let latest = rr_intervals[rr_count - 1];
    let heart_rate = if latest > 0.0 {
        HEART_RATE_NUMERATOR_MS / latest
    } else {
        0.0
    };

    let n = rr_count.min(window);
    let recent = Array1::from_iter(rr_intervals[rr_count - n..].iter().copied());

    // Population standard deviation, matching a plain std over the window
    let sdnn = if recent.len() > 1 { recent.std(0.0) } else { 0.0 };

    let (rmssd, pnn50) = if recent.len() > 1 {
        let diffs = &recent.slice(s![1..]) - &recent.slice(s![..-1]);
        let rmssd = diffs.mapv(|d| d * d).mean().unwrap_or(0.0).sqrt();
        let nn50 = diffs.iter().filter(|d| d.abs() > NN50_THRESHOLD_MS).count();
        (rmssd, nn50 as f64 / diffs.len() as f64 * 100.0)
    } else {
        (0.0, 0.0)
    };

    let finite_or_zero = |v: f64| if v.is_finite() { v } else { 0.0 };
    HrvMetrics {
        heart_rate: finite_or_zero(heart_rate),
        sdnn: finite_or_zero(sdnn),
        rmssd: finite_or_zero(rmssd),
        pnn50: finite_or_zero(pnn50),
        rr_count,
    }
}

/// R-peak detector working on one denoised sample at a time.
///
/// A peak is the middle of three consecutive samples when it is strictly above both
/// neighbours and the amplitude threshold. Consecutive peaks produce RR intervals.
#[derive(Debug, Clone)]
pub struct RPeakDetector {
    window: RingBuffer<(u64, f64)>,
    threshold: f64,
    sample_period_ms: f64,
    last_peak: Option<u64>,
    rr_intervals: RingBuffer<f64>,
}

impl RPeakDetector {
    pub fn new(threshold: f64, sample_rate_hz: f64, history_len: usize) -> Self {
        Self {
            window: RingBuffer::new(PEAK_WINDOW),
            threshold,
            sample_period_ms: 1000.0 / sample_rate_hz,
            last_peak: None,
            rr_intervals: RingBuffer::new(history_len),
        }
    }

    /// Feed the sample at `sample_index`; returns the RR interval (ms) it completed, if any.
    pub fn push(&mut self, sample_index: u64, value: f64) -> Option<f64> {
        self.window.push((sample_index, value));
        if !self.window.is_full() {
            return None;
        }

        let (_, prev) = *self.window.get(0)?;
        let (candidate_index, candidate) = *self.window.get(1)?;
        let (_, next) = *self.window.get(2)?;

        if !(candidate > prev && candidate > next && candidate > self.threshold) {
            return None;
        }

        trace!(
            "R-peak at sample {} (amplitude {:.3})",
            candidate_index,
            candidate
        );

        let Some(last_peak) = self.last_peak.replace(candidate_index) else {
            debug!("First R-peak at sample {}", candidate_index);
            return None;
        };

        let rr_ms = candidate_index.saturating_sub(last_peak) as f64 * self.sample_period_ms;
        self.rr_intervals.push(rr_ms);
        debug!(
            "RR interval {:.1} ms (samples {} -> {})",
            rr_ms, last_peak, candidate_index
        );
        Some(rr_ms)
    }

    /// RR interval history in ms, oldest first.
    pub fn rr_intervals(&self) -> Vec<f64> {
        self.rr_intervals.to_vec()
    }

    pub fn last_peak_index(&self) -> Option<u64> {
        self.last_peak
    }

    pub fn hrv(&self, window: usize) -> HrvMetrics {
        calc_hrv(&self.rr_intervals(), window)
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.last_peak = None;
        self.rr_intervals.clear();
    }
}

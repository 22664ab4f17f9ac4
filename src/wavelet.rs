use crate::error::TransformError;
use log::{trace, warn};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Scale factor turning a median absolute deviation into a Gaussian sigma estimate
const MAD_TO_SIGMA: f64 = 1.4826;

/// Magnitude of a clamped normalized sample
const FULL_SCALE: f64 = 1.0;

/// Daubechies reconstruction low-pass filters.
const DB2_REC_LO: [f64; 4] = [
    0.48296291314469025,
    0.836516303737469,
    0.22414386804185735,
    -0.12940952255092145,
];

const DB4_REC_LO: [f64; 8] = [
    0.23037781330885523,
    0.7148465705525415,
    0.6308807679295904,
    -0.02798376941698385,
    -0.18703481171888114,
    0.030841381835986965,
    0.032883011666982945,
    -0.010597401784997278,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Wavelet {
    Db2, // 4 taps
    Db4, // 8 taps
}

impl FromStr for Wavelet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "db2" => Ok(Wavelet::Db2),
            "db4" => Ok(Wavelet::Db4),
            _ => Err(format!(
                "Invalid wavelet: {}. Use db2 (4-tap) or db4 (8-tap)",
                s
            )),
        }
    }
}

impl Wavelet {
    fn rec_lo(&self) -> &'static [f64] {
        match self {
            Wavelet::Db2 => &DB2_REC_LO,
            Wavelet::Db4 => &DB4_REC_LO,
        }
    }

    pub fn filter_len(&self) -> usize {
        self.rec_lo().len()
    }
}

/// Analysis and synthesis filters derived from a wavelet's reconstruction low-pass.
#[derive(Debug, Clone)]
pub struct FilterBank {
    dec_lo: Vec<f64>,
    dec_hi: Vec<f64>,
    rec_lo: Vec<f64>,
    rec_hi: Vec<f64>,
}

impl FilterBank {
    pub fn new(wavelet: Wavelet) -> Self {
        let rec_lo = wavelet.rec_lo().to_vec();
        let dec_lo: Vec<f64> = rec_lo.iter().rev().copied().collect();
        // Quadrature mirror of the low-pass
        let dec_hi: Vec<f64> = rec_lo
            .iter()
            .enumerate()
            .map(|(k, &c)| if k % 2 == 0 { -c } else { c })
            .collect();
        let rec_hi: Vec<f64> = dec_hi.iter().rev().copied().collect();

        Self {
            dec_lo,
            dec_hi,
            rec_lo,
            rec_hi,
        }
    }
}

/// Map an index outside `0..n` back into range by half-sample symmetric reflection.
fn reflect(index: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let i = index.rem_euclid(period) as usize;
    if i >= n {
        2 * n - 1 - i
    } else {
        i
    }
}

/// Convolve with `filter` and keep every second output, extending the signal symmetrically.
///
/// Produces `(n + f - 1) / 2` coefficients.
fn downsampling_convolution(signal: &[f64], filter: &[f64]) -> Vec<f64> {
    let n = signal.len();
    let f = filter.len();

    (1..n + f - 1)
        .step_by(2)
        .map(|i| {
            filter
                .iter()
                .enumerate()
                .map(|(j, &c)| c * signal[reflect(i as isize - j as isize, n)])
                .sum::<f64>()
        })
        .collect()
}

/// Upsample by two and convolve, keeping only outputs where the filter fully overlaps.
///
/// Produces `2 * n - f + 2` samples.
fn upsampling_convolution_valid(coeffs: &[f64], filter: &[f64]) -> Vec<f64> {
    let half = filter.len() / 2;
    let n = coeffs.len();
    if n + 1 < half {
        return Vec::new();
    }

    let mut output = Vec::with_capacity(2 * (n + 1 - half));
    for i in (half - 1)..n {
        let mut even = 0.0;
        let mut odd = 0.0;
        for j in 0..half {
            even += filter[2 * j] * coeffs[i - j];
            odd += filter[2 * j + 1] * coeffs[i - j];
        }
        output.push(even);
        output.push(odd);
    }
    output
}

/// Multilevel discrete wavelet decomposition.
///
/// Returns `[cA_n, cD_n, ..., cD_1]`, i.e. the coarsest approximation first and the
/// finest detail band last.
pub fn wavedec(
    signal: &[f64],
    bank: &FilterBank,
    levels: usize,
) -> Result<Vec<Vec<f64>>, TransformError> {
    if signal.is_empty() {
        return Err(TransformError::EmptyWindow);
    }

    let mut details = Vec::with_capacity(levels);
    let mut approx = signal.to_vec();
    for level in 1..=levels {
        if approx.len() < 2 {
            return Err(TransformError::SignalTooShort {
                len: approx.len(),
                level,
            });
        }
        let detail = downsampling_convolution(&approx, &bank.dec_hi);
        approx = downsampling_convolution(&approx, &bank.dec_lo);
        details.push(detail);
    }

    let mut coeffs = Vec::with_capacity(levels + 1);
    coeffs.push(approx);
    coeffs.extend(details.into_iter().rev());
    Ok(coeffs)
}

/// Inverse of [`wavedec`].
pub fn waverec(coeffs: &[Vec<f64>], bank: &FilterBank) -> Vec<f64> {
    let Some((first, details)) = coeffs.split_first() else {
        return Vec::new();
    };

    let mut approx = first.clone();
    for detail in details {
        // Odd-length inputs leave the approximation one sample longer than its detail band
        if approx.len() == detail.len() + 1 {
            approx.pop();
        }
        let low = upsampling_convolution_valid(&approx, &bank.rec_lo);
        let high = upsampling_convolution_valid(detail, &bank.rec_hi);
        approx = low.iter().zip(high.iter()).map(|(a, d)| a + d).collect();
    }
    approx
}

/// Shrink `value` toward zero by `threshold`, zeroing it when its magnitude is below.
pub fn soft_threshold(value: f64, threshold: f64) -> f64 {
    let magnitude = value.abs();
    // 0/0 yields NaN for exact zeros, which is mapped back to 0
    let shrink = (1.0 - threshold / magnitude).max(0.0);
    let result = value * shrink;
    if result.is_finite() {
        result
    } else {
        0.0
    }
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Universal threshold estimated from the finest detail band.
pub fn universal_threshold(finest_detail: &[f64], window_len: usize) -> f64 {
    let abs: Vec<f64> = finest_detail.iter().map(|c| c.abs()).collect();
    median(&abs) * MAD_TO_SIGMA * (2.0 * (window_len as f64).ln()).sqrt()
}

/// Wavelet shrinkage denoiser applied to each channel's sliding window.
#[derive(Debug, Clone)]
pub struct WaveletDenoiser {
    bank: FilterBank,
    levels: usize,
    outlier_clamp: f64,
}

impl WaveletDenoiser {
    pub fn new(wavelet: Wavelet, levels: usize, outlier_clamp: f64) -> Self {
        Self {
            bank: FilterBank::new(wavelet),
            levels,
            outlier_clamp,
        }
    }

    /// Denoise a full window, returning a reconstruction of the same length.
    pub fn denoise_window(&self, window: &[f64]) -> Result<Vec<f64>, TransformError> {
        if let Some(index) = window.iter().position(|v| !v.is_finite()) {
            return Err(TransformError::NonFiniteInput { index });
        }

        let coeffs = wavedec(window, &self.bank, self.levels)?;
        let finest = coeffs.last().ok_or(TransformError::EmptyWindow)?;
        let threshold = universal_threshold(finest, window.len());
        trace!("Wavelet threshold: {:.6}", threshold);

        let thresholded: Vec<Vec<f64>> = coeffs
            .iter()
            .map(|band| band.iter().map(|&c| soft_threshold(c, threshold)).collect())
            .collect();

        let mut result = waverec(&thresholded, &self.bank);
        result.resize(window.len(), 0.0);

        // Full-scale values are rail hits, dropped even when the clamp is loosened
        for value in result.iter_mut() {
            let magnitude = value.abs();
            if !magnitude.is_finite() || magnitude > self.outlier_clamp || magnitude >= FULL_SCALE {
                *value = 0.0;
            }
        }

        Ok(result)
    }

    /// Denoised value of the most recent sample in `window`.
    ///
    /// Transform failures are logged and yield 0 for this tick.
    pub fn denoise(&self, window: &[f64]) -> f64 {
        match self.denoise_window(window) {
            Ok(result) => result.last().copied().unwrap_or(0.0),
            Err(e) => {
                warn!("Wavelet denoising failed: {}", e);
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_signal(len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| {
                let t = i as f64 / 250.0;
                0.3 * (2.0 * std::f64::consts::PI * 5.0 * t).sin()
                    + 0.1 * (2.0 * std::f64::consts::PI * 17.0 * t).cos()
            })
            .collect()
    }

    #[test]
    fn test_filter_bank_is_orthonormal() {
        for wavelet in [Wavelet::Db2, Wavelet::Db4] {
            let bank = FilterBank::new(wavelet);
            let energy: f64 = bank.dec_lo.iter().map(|c| c * c).sum();
            assert!((energy - 1.0).abs() < 1e-9);
            let dc_gain: f64 = bank.dec_hi.iter().sum();
            assert!(dc_gain.abs() < 1e-9, "high-pass must reject DC");
            assert_eq!(bank.rec_lo.len(), wavelet.filter_len());
        }
    }

    #[test]
    fn test_band_lengths_for_64_sample_window() {
        let signal = test_signal(64);

        let db4 = wavedec(&signal, &FilterBank::new(Wavelet::Db4), 3).unwrap();
        let lengths: Vec<usize> = db4.iter().map(|c| c.len()).collect();
        assert_eq!(lengths, vec![14, 14, 21, 35]);

        let db2 = wavedec(&signal, &FilterBank::new(Wavelet::Db2), 3).unwrap();
        let lengths: Vec<usize> = db2.iter().map(|c| c.len()).collect();
        assert_eq!(lengths, vec![10, 10, 18, 33]);
    }

    #[test]
    fn test_perfect_reconstruction() {
        let signal = test_signal(64);
        for wavelet in [Wavelet::Db2, Wavelet::Db4] {
            let bank = FilterBank::new(wavelet);
            let coeffs = wavedec(&signal, &bank, 3).unwrap();
            let rebuilt = waverec(&coeffs, &bank);
            assert_eq!(rebuilt.len(), signal.len());
            for (a, b) in rebuilt.iter().zip(signal.iter()) {
                assert!((a - b).abs() < 1e-9, "{:?}: {} vs {}", wavelet, a, b);
            }
        }
    }

    #[test]
    fn test_soft_threshold() {
        assert!((soft_threshold(0.5, 0.2) - 0.3).abs() < 1e-12);
        assert!((soft_threshold(-0.5, 0.2) + 0.3).abs() < 1e-12);
        assert_eq!(soft_threshold(0.1, 0.2), 0.0);
        assert_eq!(soft_threshold(-0.1, 0.2), 0.0);
        assert_eq!(soft_threshold(0.0, 0.0), 0.0);
        assert_eq!(soft_threshold(0.0, 0.2), 0.0);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn test_universal_threshold_of_silent_band_is_zero() {
        assert_eq!(universal_threshold(&[0.0; 35], 64), 0.0);
    }

    #[test]
    fn test_outlier_clamp_zeroes_large_values() {
        let denoiser = WaveletDenoiser::new(Wavelet::Db4, 3, 0.7);
        let out = denoiser.denoise_window(&[0.9; 64]).unwrap();
        assert!(out.iter().all(|&v| v == 0.0));

        let loose = WaveletDenoiser::new(Wavelet::Db4, 3, 1.0);
        let out = loose.denoise_window(&[0.9; 64]).unwrap();
        assert!((out[63] - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_full_scale_output_is_dropped_with_loose_clamp() {
        let denoiser = WaveletDenoiser::new(Wavelet::Db4, 3, 5.0);
        let out = denoiser.denoise_window(&[1.5; 64]).unwrap();
        assert!(out.iter().all(|&v| v == 0.0));
        assert_eq!(denoiser.denoise(&[-1.5; 64]), 0.0);
    }

    #[test]
    fn test_isolated_spike_survives_on_silent_window() {
        let mut window = vec![0.0; 64];
        window[63] = 0.6;
        let denoiser = WaveletDenoiser::new(Wavelet::Db4, 3, 0.7);
        let value = denoiser.denoise(&window);
        assert!((value - 0.6).abs() < 1e-6, "got {}", value);
    }

    #[test]
    fn test_non_finite_input_is_rejected_and_zeroed() {
        let mut window = vec![0.1; 64];
        window[10] = f64::NAN;
        let denoiser = WaveletDenoiser::new(Wavelet::Db4, 3, 0.7);
        assert_eq!(
            denoiser.denoise_window(&window),
            Err(TransformError::NonFiniteInput { index: 10 })
        );
        assert_eq!(denoiser.denoise(&window), 0.0);
    }

    #[test]
    fn test_empty_window_is_an_error() {
        let denoiser = WaveletDenoiser::new(Wavelet::Db2, 3, 0.7);
        assert_eq!(denoiser.denoise_window(&[]), Err(TransformError::EmptyWindow));
        assert_eq!(denoiser.denoise(&[]), 0.0);
    }

    #[test]
    fn test_parse_wavelet() {
        assert_eq!("db4".parse::<Wavelet>().unwrap(), Wavelet::Db4);
        assert_eq!("DB2".parse::<Wavelet>().unwrap(), Wavelet::Db2);
        assert!("haar".parse::<Wavelet>().is_err());
    }

    proptest! {
        #[test]
        fn constant_window_is_bounded_and_finite(c in -1.0f64..=1.0) {
            let denoiser = WaveletDenoiser::new(Wavelet::Db4, 3, 0.7);
            let value = denoiser.denoise(&[c; 64]);
            prop_assert!(value.is_finite());
            prop_assert!(value.abs() <= 0.7);
        }

        #[test]
        fn denoised_window_is_bounded(window in proptest::collection::vec(-1.0f64..=1.0, 64)) {
            let denoiser = WaveletDenoiser::new(Wavelet::Db4, 3, 0.7);
            let out = denoiser.denoise_window(&window).unwrap();
            prop_assert_eq!(out.len(), 64);
            prop_assert!(out.iter().all(|v| v.is_finite() && v.abs() <= 0.7));
        }
    }
}

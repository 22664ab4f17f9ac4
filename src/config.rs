use crate::error::ConfigError;
use crate::wavelet::Wavelet;
use crate::CHANNEL_COUNT;
use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tunables for the conditioning and analysis pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Conditioned values collected per channel before its baseline is fixed
    pub warmup_samples: usize,
    /// Raw magnitudes are reduced modulo this value
    pub modulus: i64,
    pub scaling_factor: f64,
    /// Denoising window length per channel
    pub window_len: usize,
    pub wavelet: Wavelet,
    pub levels: usize,
    /// Denoised samples above this magnitude are replaced with 0
    pub outlier_clamp: f64,
    pub peak_threshold: f64,
    pub sample_rate_hz: f64,
    pub rr_history_len: usize,
    /// Number of most recent RR intervals used for SDNN/RMSSD/pNN50
    pub hrv_window: usize,
    pub primary_channel: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            warmup_samples: 100,
            modulus: 100_000,
            scaling_factor: 10_000.0,
            window_len: 64,
            wavelet: Wavelet::Db4,
            levels: 3,
            outlier_clamp: 0.7,
            peak_threshold: 0.4,
            sample_rate_hz: 250.0,
            rr_history_len: 100,
            hrv_window: 10,
            primary_channel: 0,
        }
    }
}

impl PipelineConfig {
    pub fn sample_period_ms(&self) -> f64 {
        1000.0 / self.sample_rate_hz
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                field,
                reason: reason.into(),
            }
        }

        if self.warmup_samples == 0 {
            return Err(invalid("warmup_samples", "must be at least 1"));
        }
        if self.modulus <= 0 {
            return Err(invalid("modulus", "must be positive"));
        }
        if !(self.scaling_factor.is_finite() && self.scaling_factor > 0.0) {
            return Err(invalid("scaling_factor", "must be a positive finite number"));
        }
        if self.window_len == 0 {
            return Err(invalid("window_len", "must be at least 1"));
        }
        if self.levels == 0 {
            return Err(invalid("levels", "must be at least 1"));
        }
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return Err(invalid("sample_rate_hz", "must be a positive finite number"));
        }
        if self.outlier_clamp.is_nan() || self.outlier_clamp < 0.0 {
            return Err(invalid("outlier_clamp", "must be non-negative"));
        }
        if self.peak_threshold.is_nan() {
            return Err(invalid("peak_threshold", "must be a number"));
        }
        if self.rr_history_len == 0 {
            return Err(invalid("rr_history_len", "must be at least 1"));
        }
        if self.hrv_window == 0 {
            return Err(invalid("hrv_window", "must be at least 1"));
        }
        if self.primary_channel >= CHANNEL_COUNT {
            return Err(invalid(
                "primary_channel",
                format!("must be below {}", CHANNEL_COUNT),
            ));
        }
        Ok(())
    }

    /// Load a JSON config file; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: PipelineConfig = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }
}

/// Replay framed 12-lead ECG captures through the conditioning and HRV pipeline
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Capture file, directory of captures, or "-" for stdin
    #[arg(help = "Capture file, directory of captures, or \"-\" for stdin")]
    pub input: PathBuf,

    /// JSON file with pipeline settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// CSV file receiving one row per emitted sample
    #[arg(long)]
    pub csv_output: Option<PathBuf>,

    /// JSON file receiving the final session summary
    #[arg(long)]
    pub summary_json: Option<PathBuf>,

    /// Delay between polls in milliseconds (0 = as fast as possible)
    #[arg(long, default_value = "0")]
    pub tick_ms: u64,

    /// Timestamp of the first emitted sample (format: YYYY-MM-DD HH:MM:SS), defaults to now
    #[arg(long)]
    pub start_time: Option<String>,

    /// Warmup samples per channel
    #[arg(long)]
    pub warmup_samples: Option<usize>,

    /// Denoised magnitude above which samples are rejected
    #[arg(long)]
    pub outlier_clamp: Option<f64>,

    /// Minimum denoised amplitude for an R-peak
    #[arg(long)]
    pub peak_threshold: Option<f64>,

    /// Acquisition rate in Hz
    #[arg(long, env = "ECG_SAMPLE_RATE")]
    pub sample_rate: Option<f64>,

    /// Wavelet filter bank (db2 or db4)
    #[arg(long)]
    pub wavelet: Option<Wavelet>,
}

impl Args {
    /// Resolve the pipeline config: defaults, then the config file, then CLI overrides.
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(warmup) = self.warmup_samples {
            config.warmup_samples = warmup;
        }
        if let Some(clamp) = self.outlier_clamp {
            config.outlier_clamp = clamp;
        }
        if let Some(threshold) = self.peak_threshold {
            config.peak_threshold = threshold;
        }
        if let Some(rate) = self.sample_rate {
            config.sample_rate_hz = rate;
        }
        if let Some(wavelet) = self.wavelet {
            config.wavelet = wavelet;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sample_period_ms(), 4.0);
    }

    #[test]
    fn test_rejects_zero_scaling_factor() {
        let config = PipelineConfig {
            scaling_factor: 0.0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "scaling_factor",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_out_of_range_primary_channel() {
        let config = PipelineConfig {
            primary_channel: CHANNEL_COUNT,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"outlier_clamp": 0.9, "wavelet": "db2"}"#).unwrap();
        assert_eq!(config.outlier_clamp, 0.9);
        assert_eq!(config.wavelet, Wavelet::Db2);
        assert_eq!(config.warmup_samples, 100);
        assert_eq!(config.window_len, 64);
    }

    #[test]
    fn test_cli_overrides_apply() {
        let args = Args::parse_from([
            "ecg-stream",
            "capture.txt",
            "--warmup-samples",
            "20",
            "--wavelet",
            "db2",
        ]);
        let config = args.pipeline_config().unwrap();
        assert_eq!(config.warmup_samples, 20);
        assert_eq!(config.wavelet, Wavelet::Db2);
        assert_eq!(config.peak_threshold, 0.4);
    }
}

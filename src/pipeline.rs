use crate::config::PipelineConfig;
use crate::error::{ConfigError, PipelineError};
use crate::frame_reader::{Frame, FrameReader};
use crate::heart_analysis::{HrvMetrics, RPeakDetector};
use crate::preprocessing::{condition, normalize, BaselineCalibrator, CalibrationState, ChannelWindow};
use crate::wavelet::WaveletDenoiser;
use crate::CHANNEL_COUNT;
use log::{info, trace, warn};
use std::io::{ErrorKind, Read};

/// Bytes requested from the transport per read
const READ_CHUNK: usize = 4096;

/// One normalized (and, once windows are full, denoised) value per channel.
pub type Samples = [f64; CHANNEL_COUNT];

/// Conditioning and analysis state for one acquisition session.
#[derive(Debug, Clone)]
pub struct SignalPipeline {
    config: PipelineConfig,
    calibrator: BaselineCalibrator,
    windows: Vec<ChannelWindow>,
    denoiser: WaveletDenoiser,
    detector: RPeakDetector,
    sample_count: u64,
}

impl SignalPipeline {
    /// Build a pipeline for `config`, rejecting settings it cannot run with.
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            calibrator: BaselineCalibrator::new(config.warmup_samples),
            windows: (0..CHANNEL_COUNT)
                .map(|_| ChannelWindow::new(config.window_len))
                .collect(),
            denoiser: WaveletDenoiser::new(config.wavelet, config.levels, config.outlier_clamp),
            detector: RPeakDetector::new(
                config.peak_threshold,
                config.sample_rate_hz,
                config.rr_history_len,
            ),
            sample_count: 0,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one frame. Returns `None` while the baseline calibration is warming up.
    pub fn process_frame(&mut self, frame: &Frame) -> Option<Samples> {
        let conditioned = frame.values.map(|raw| condition(raw, self.config.modulus));

        if !self.calibrator.is_ready() {
            // The frame that completes warmup is consumed by it as well
            self.calibrator.observe_frame(&conditioned);
            return None;
        }

        let mut samples = [0.0; CHANNEL_COUNT];
        for (channel, (&value, window)) in conditioned.iter().zip(&mut self.windows).enumerate() {
            let normalized = normalize(
                value,
                self.calibrator.baseline(channel),
                self.config.scaling_factor,
            );
            let output = window.push(normalized, &self.denoiser);
            samples[channel] = output;

            // Peak detection only sees denoised output of the primary channel
            if channel == self.config.primary_channel && window.is_full() {
                self.detector.push(self.sample_count, output);
            }
        }

        trace!("Sample {}: {:?}", self.sample_count, samples);
        self.sample_count += 1;
        Some(samples)
    }

    pub fn hrv(&self) -> HrvMetrics {
        self.detector.hrv(self.config.hrv_window)
    }

    pub fn rr_intervals(&self) -> Vec<f64> {
        self.detector.rr_intervals()
    }

    pub fn calibration_state(&self) -> CalibrationState {
        self.calibrator.state()
    }

    pub fn is_ready(&self) -> bool {
        self.calibrator.is_ready()
    }

    /// Samples emitted since calibration completed.
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn reset(&mut self) {
        self.calibrator.reset();
        for window in &mut self.windows {
            window.clear();
        }
        self.detector.reset();
        self.sample_count = 0;
    }
}

enum Connection<R> {
    Open(R),
    /// Holds the failure until it has been reported once
    Failed(Option<std::io::Error>),
    Closed,
}

/// Drives a [`SignalPipeline`] from a byte transport, one line per poll.
pub struct EcgMonitor<R> {
    connection: Connection<R>,
    reader: FrameReader,
    pipeline: SignalPipeline,
    end_of_stream: bool,
}

impl<R: Read> EcgMonitor<R> {
    pub fn new(transport: R, config: PipelineConfig) -> Result<Self, ConfigError> {
        let pipeline = SignalPipeline::new(config)?;
        info!("Transport opened");
        Ok(Self {
            connection: Connection::Open(transport),
            reader: FrameReader::new(),
            pipeline,
            end_of_stream: false,
        })
    }

    /// A monitor whose transport failed to open. The failure is reported by the first poll.
    pub fn disconnected(
        error: std::io::Error,
        config: PipelineConfig,
    ) -> Result<Self, ConfigError> {
        let pipeline = SignalPipeline::new(config)?;
        warn!("Transport failed to open: {}", error);
        Ok(Self {
            connection: Connection::Failed(Some(error)),
            reader: FrameReader::new(),
            pipeline,
            end_of_stream: false,
        })
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.connection, Connection::Open(_))
    }

    /// Process the next available line.
    ///
    /// `Ok(None)` means nothing to emit this tick: no complete line yet, calibration still
    /// warming up, or the monitor is disabled.
    pub fn poll(&mut self) -> Result<Option<Samples>, PipelineError> {
        let transport = match &mut self.connection {
            Connection::Open(transport) => transport,
            Connection::Failed(error) => {
                return match error.take() {
                    Some(e) => Err(PipelineError::ConnectionFailure(e)),
                    None => Ok(None),
                };
            }
            Connection::Closed => return Ok(None),
        };

        if !self.reader.has_complete_line() {
            let mut chunk = [0u8; READ_CHUNK];
            match transport.read(&mut chunk) {
                Ok(0) => self.end_of_stream = true,
                Ok(n) => {
                    self.end_of_stream = false;
                    self.reader.extend(&chunk[..n]);
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) =>
                {
                    return Ok(None);
                }
                Err(e) => {
                    warn!(
                        "Transport read failed, dropping {} buffered bytes: {}",
                        self.reader.pending(),
                        e
                    );
                    self.reader.clear();
                    return Err(PipelineError::Transport(e));
                }
            }
        }

        match self.reader.next_frame() {
            None => Ok(None),
            Some(Ok(frame)) => Ok(self.pipeline.process_frame(&frame)),
            Some(Err(e)) => Err(e.into()),
        }
    }

    pub fn hrv(&self) -> HrvMetrics {
        self.pipeline.hrv()
    }

    pub fn pipeline(&self) -> &SignalPipeline {
        &self.pipeline
    }

    /// True once the transport reported end of stream and no complete line is buffered.
    pub fn is_drained(&self) -> bool {
        match self.connection {
            Connection::Open(_) => self.end_of_stream && !self.reader.has_complete_line(),
            Connection::Failed(_) | Connection::Closed => true,
        }
    }

    /// Release the transport and discard all session state.
    pub fn stop(&mut self) -> Option<R> {
        let previous = std::mem::replace(&mut self.connection, Connection::Closed);
        self.reader.clear();
        self.pipeline.reset();
        self.end_of_stream = false;
        match previous {
            Connection::Open(transport) => {
                info!("Transport closed");
                Some(transport)
            }
            _ => None,
        }
    }
}

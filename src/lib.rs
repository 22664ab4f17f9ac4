pub mod config;
pub mod data_loading;
pub mod error;
pub mod frame_reader;
pub mod heart_analysis;
pub mod output;
pub mod pipeline;
pub mod preprocessing;
pub mod ring_buffer;
pub mod wavelet;

pub use config::PipelineConfig;
pub use error::{ConfigError, FrameParseError, PipelineError, TransformError};
pub use frame_reader::{Frame, FrameReader};
pub use heart_analysis::{calc_hrv, HrvMetrics, RPeakDetector};
pub use pipeline::{EcgMonitor, Samples, SignalPipeline};

/// Number of leads carried by every frame
pub const CHANNEL_COUNT: usize = 12;

/// Lead names in frame order
pub const LEAD_NAMES: [&str; CHANNEL_COUNT] = [
    "I", "II", "III", "aVR", "aVL", "aVF", "V1", "V2", "V3", "V4", "V5", "V6",
];

use crate::heart_analysis::HrvMetrics;
use crate::pipeline::Samples;
use crate::LEAD_NAMES;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes one CSV row per emitted sample: waveform values followed by the HRV snapshot.
pub struct TickWriter<W: Write> {
    writer: csv::Writer<W>,
    rows: usize,
}

impl TickWriter<File> {
    pub fn create(path: &Path) -> Result<Self> {
        let dir = path.parent().unwrap_or(Path::new("."));
        // Create directory if it doesn't exist
        std::fs::create_dir_all(dir)?;

        log::info!("Writing samples to {}", path.display());
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        Self::new(file)
    }
}

impl<W: Write> TickWriter<W> {
    pub fn new(inner: W) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(inner);

        let mut header = vec!["sample_index".to_string(), "timestamp".to_string()];
        header.extend(LEAD_NAMES.iter().map(|lead| lead.to_string()));
        header.extend(
            ["heart_rate", "sdnn", "rmssd", "pnn50"]
                .iter()
                .map(|s| s.to_string()),
        );
        writer.write_record(&header)?;

        Ok(Self { writer, rows: 0 })
    }

    pub fn write_tick(
        &mut self,
        sample_index: u64,
        timestamp: DateTime<Utc>,
        samples: &Samples,
        hrv: &HrvMetrics,
    ) -> Result<()> {
        let mut record = Vec::with_capacity(2 + samples.len() + 4);
        record.push(sample_index.to_string());
        record.push(timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string());
        record.extend(samples.iter().map(|v| format!("{:.6}", v)));
        record.push(format!("{:.0}", hrv.heart_rate));
        record.push(format!("{:.1}", hrv.sdnn));
        record.push(format!("{:.1}", hrv.rmssd));
        record.push(format!("{:.1}", hrv.pnn50));

        self.writer.write_record(&record)?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        self.writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush CSV output: {}", e))
    }
}

/// End-of-run report.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub started_at: DateTime<Utc>,
    pub frames_emitted: u64,
    pub lines_rejected: usize,
    pub transport_errors: usize,
    pub calibrated: bool,
    pub rr_intervals_ms: Vec<f64>,
    pub hrv: HrvMetrics,
}

pub fn write_summary_json(path: &Path, summary: &SessionSummary) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, summary)?;
    Ok(())
}

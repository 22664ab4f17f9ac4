use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use clap::Parser;
use ecg_stream::config::Args;
use ecg_stream::data_loading::open_capture;
use ecg_stream::output::{write_summary_json, SessionSummary, TickWriter};
use ecg_stream::{EcgMonitor, PipelineError, Samples};
use log::{debug, warn};

/// Consecutive transport failures tolerated before giving up on the input
const MAX_TRANSPORT_ERRORS: usize = 3;

/// Run of back-to-back transport failures. Any other poll outcome ends the run.
#[derive(Debug, Default)]
struct TransportErrorStreak {
    current: usize,
}

impl TransportErrorStreak {
    /// Record a poll outcome; returns true once the streak reaches `MAX_TRANSPORT_ERRORS`.
    fn record(&mut self, outcome: &Result<Option<Samples>, PipelineError>) -> bool {
        match outcome {
            Err(PipelineError::Transport(_)) => self.current += 1,
            _ => self.current = 0,
        }
        self.current >= MAX_TRANSPORT_ERRORS
    }
}

fn parse_start_time(value: Option<&str>) -> Result<DateTime<Utc>> {
    match value {
        Some(s) => {
            let dt = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .with_context(|| format!("Invalid start time: {}", s))?;
            Ok(dt.and_utc())
        }
        None => Ok(Utc::now()),
    }
}

fn sample_timestamp(start: DateTime<Utc>, index: u64, period_ms: f64) -> DateTime<Utc> {
    start + Duration::microseconds((index as f64 * period_ms * 1000.0).round() as i64)
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::init();

    let args = Args::parse();
    let config = args.pipeline_config()?;
    let start_time = parse_start_time(args.start_time.as_deref())?;
    let period_ms = config.sample_period_ms();
    debug!("Pipeline config: {:?}", config);

    let mut monitor = match open_capture(&args.input) {
        Ok(stream) => EcgMonitor::new(stream, config)?,
        Err(e) => EcgMonitor::disconnected(e, config)?,
    };

    let mut csv_writer = match &args.csv_output {
        Some(path) => Some(TickWriter::create(path)?),
        None => None,
    };

    let tick = std::time::Duration::from_millis(args.tick_ms);
    let mut lines_rejected = 0;
    let mut transport_errors = 0;
    let mut streak = TransportErrorStreak::default();

    loop {
        let outcome = monitor.poll();
        let give_up = streak.record(&outcome);
        match outcome {
            Ok(Some(samples)) => {
                let index = monitor.pipeline().sample_count() - 1;
                let hrv = monitor.hrv();
                if let Some(writer) = csv_writer.as_mut() {
                    let timestamp = sample_timestamp(start_time, index, period_ms);
                    writer.write_tick(index, timestamp, &samples, &hrv)?;
                }
            }
            Ok(None) => {}
            Err(PipelineError::Frame(e)) => {
                debug!("Skipped line: {}", e);
                lines_rejected += 1;
            }
            Err(e @ PipelineError::Transport(_)) => {
                warn!("{}", e);
                transport_errors += 1;
                if give_up {
                    return Err(e).context("Giving up after repeated transport errors");
                }
            }
            Err(e @ PipelineError::ConnectionFailure(_)) => {
                return Err(e).with_context(|| {
                    format!("Could not open input {}", args.input.display())
                });
            }
        }

        if monitor.is_drained() {
            break;
        }
        if !tick.is_zero() {
            std::thread::sleep(tick);
        }
    }

    if let Some(writer) = csv_writer {
        let rows = writer.rows();
        writer.finish()?;
        println!("Wrote {} samples", rows);
    }

    let pipeline = monitor.pipeline();
    let hrv = monitor.hrv();
    println!(
        "Emitted {} samples, rejected {} lines, {} RR intervals",
        pipeline.sample_count(),
        lines_rejected,
        hrv.rr_count
    );
    println!(
        "Heart rate: {:.0}  SDNN: {:.1}  RMSSD: {:.1}  pNN50: {:.1}",
        hrv.heart_rate, hrv.sdnn, hrv.rmssd, hrv.pnn50
    );

    if let Some(path) = &args.summary_json {
        let summary = SessionSummary {
            started_at: start_time,
            frames_emitted: pipeline.sample_count(),
            lines_rejected,
            transport_errors,
            calibrated: pipeline.is_ready(),
            rr_intervals_ms: pipeline.rr_intervals(),
            hrv,
        };
        write_summary_json(path, &summary)?;
        println!("Wrote summary to {}", path.display());
    }

    monitor.stop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_time() {
        let ts = parse_start_time(Some("2024-03-01 12:30:00")).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T12:30:00+00:00");
        assert!(parse_start_time(Some("yesterday")).is_err());
    }

    fn transport_error() -> Result<Option<Samples>, PipelineError> {
        Err(PipelineError::Transport(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "unplugged",
        )))
    }

    #[test]
    fn test_malformed_line_breaks_transport_error_streak() {
        let mut streak = TransportErrorStreak::default();
        assert!(!streak.record(&transport_error()));
        assert!(!streak.record(&transport_error()));
        let malformed = Err(PipelineError::Frame(ecg_stream::FrameParseError::EmptyLine));
        assert!(!streak.record(&malformed));
        assert!(!streak.record(&transport_error()));
        assert!(!streak.record(&transport_error()));
        assert!(streak.record(&transport_error()));
    }

    #[test]
    fn test_sample_timestamp_uses_sample_period() {
        let start = parse_start_time(Some("2024-03-01 12:30:00")).unwrap();
        let ts = sample_timestamp(start, 250, 4.0);
        assert_eq!(ts.to_rfc3339(), "2024-03-01T12:30:01+00:00");
    }
}

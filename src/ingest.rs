/// The per-sensor read → validate → aggregate → write loop
use log::{debug, error, info, warn};
use time::OffsetDateTime;
use tokio::sync::watch;

use crate::aggregation::{AggregationWindow, WindowEvent};
use crate::error::{FrameError, SensorError};
use crate::models::{Reading, SensorKind};
use crate::serial::LineSource;
use crate::storage::{particulate_record, voc_record, wind_record, RecordSink};
use crate::utils::{format_datetime, LocalClock};
use crate::validation::{decode_line, validate};

/// Result of feeding one raw line through the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// Nothing to process (timeout or blank line)
    Skipped,
    /// Line failed validation and was dropped
    Rejected(FrameError),
    /// Wind sample added to the current window
    Buffered,
    /// Wind window restarted after startup or an outage
    WindowRestarted,
    /// Formatted record ready to be written
    Record(String),
}

/// Decoding, validation and windowing state for one sensor instance
#[derive(Debug, Clone)]
pub struct SensorPipeline {
    kind: SensorKind,
    window: AggregationWindow,
}

impl SensorPipeline {
    pub fn new(kind: SensorKind) -> Self {
        Self::with_window(kind, AggregationWindow::new())
    }

    pub fn with_window(kind: SensorKind, window: AggregationWindow) -> Self {
        Self { kind, window }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn window(&self) -> &AggregationWindow {
        &self.window
    }

    /// Process one raw line received at `now`
    ///
    /// Wind readings go through the aggregation window; VOC and particulate
    /// readings become a record immediately.
    pub fn process_line(&mut self, raw: &[u8], now: OffsetDateTime) -> LineOutcome {
        let line = decode_line(raw, self.kind.decode_policy());
        if line.is_empty() {
            return LineOutcome::Skipped;
        }

        let reading = match validate(self.kind, &line) {
            Ok(reading) => reading,
            Err(FrameError::Empty) => return LineOutcome::Skipped,
            Err(e) => return LineOutcome::Rejected(e),
        };

        match reading {
            Reading::Wind(wind) => match self.window.observe(&wind, now) {
                WindowEvent::Restarted => LineOutcome::WindowRestarted,
                WindowEvent::Accumulated => LineOutcome::Buffered,
                WindowEvent::Flushed(average) => {
                    info!(
                        "Window closed: u_mean={:.2}, wd_mean={:.2}, v_mean={:.2} ({} samples)",
                        average.u, average.wind_direction, average.v, average.samples
                    );
                    LineOutcome::Record(wind_record(&average))
                }
            },
            Reading::Voc(voc) => LineOutcome::Record(voc_record(&voc, &now)),
            Reading::Particulate(particulate) => {
                LineOutcome::Record(particulate_record(&particulate, &now))
            }
        }
    }
}

/// Run one sensor until shutdown is signalled or the device goes away
///
/// # Arguments
/// * `pipeline` - Validation and windowing state for the sensor
/// * `source` - Device to read lines from; closed before returning
/// * `sink` - Destination for formatted records
/// * `clock` - Local wall clock used to timestamp lines
/// * `shutdown` - Flips to `true` (or is dropped) when the process stops
///
/// # Returns
/// `Ok(())` on shutdown, `SensorError::Disconnected` if the stream ended
pub async fn run_sensor<S, K>(
    mut pipeline: SensorPipeline,
    mut source: S,
    mut sink: K,
    clock: LocalClock,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), SensorError>
where
    S: LineSource,
    K: RecordSink,
{
    let kind = pipeline.kind();
    info!("Starting {} logger on {}", kind, source.name());
    let mut failures = ReadFailures::default();

    let result = loop {
        if *shutdown.borrow() {
            break Ok(());
        }

        let read = tokio::select! {
            _ = shutdown.changed() => break Ok(()),
            read = source.read_line() => read,
        };

        let raw = match read {
            Ok(raw) => raw,
            Err(e @ SensorError::Disconnected(_)) => break Err(e),
            Err(e) => {
                if failures.failed() {
                    error!("Read from {} failed: {}", source.name(), e);
                } else {
                    debug!("Read from {} failed again: {}", source.name(), e);
                }
                continue;
            }
        };
        let failed_reads = failures.recovered();
        if failed_reads > 0 {
            info!("{} readable again after {} failed reads", source.name(), failed_reads);
        }

        let now = clock.now();
        if !raw.is_empty() {
            debug!("Received: {}", String::from_utf8_lossy(&raw).trim_end());
        }

        match pipeline.process_line(&raw, now) {
            LineOutcome::Skipped | LineOutcome::Buffered => {}
            LineOutcome::WindowRestarted => {
                info!("Restarting {} window at {}", kind, format_datetime(&now));
            }
            LineOutcome::Rejected(reason) => log_rejection(kind, &raw, &reason),
            LineOutcome::Record(record) => match sink.append(now.date(), &record).await {
                Ok(()) => info!("+ {} {}", kind.log_prefix(), record),
                Err(e) => error!("Failed to write {} record: {}", kind, e),
            },
        }
    };

    source.close().await;
    result
}

/// Log how each sensor instance ended
///
/// # Returns
/// `Ok(())` if at least one instance stopped through shutdown, otherwise the
/// first failure
pub fn summarize_instances(
    results: Vec<(SensorKind, Result<(), SensorError>)>,
) -> Result<(), SensorError> {
    let mut stopped_cleanly = false;
    let mut first_failure = None;

    for (kind, result) in results {
        match result {
            Ok(()) => {
                info!("{} logger stopped", kind);
                stopped_cleanly = true;
            }
            Err(e) => {
                match &e {
                    SensorError::Disconnected(_) => warn!("{} logger stopped: {}", kind, e),
                    _ => error!("{} logger failed: {}", kind, e),
                }
                first_failure.get_or_insert(e);
            }
        }
    }

    match first_failure {
        Some(e) if !stopped_cleanly => Err(e),
        _ => Ok(()),
    }
}

/// Consecutive read failures, so only the first of a run is reported
#[derive(Debug, Default)]
struct ReadFailures {
    consecutive: u32,
}

impl ReadFailures {
    /// Count a failure; true if it starts a new run
    fn failed(&mut self) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        self.consecutive == 1
    }

    /// End the current run, returning how many reads failed in it
    fn recovered(&mut self) -> u32 {
        std::mem::take(&mut self.consecutive)
    }
}

fn log_rejection(kind: SensorKind, raw: &[u8], reason: &FrameError) {
    let line = String::from_utf8_lossy(raw);
    match (kind, reason) {
        // Boot banners and partial status lines are routine
        (SensorKind::Particulate, _) | (_, FrameError::NotDataLine) => {
            debug!("- {} {:?}: {}", kind, line.trim_end(), reason)
        }
        _ => warn!("Dropped {} line {:?}: {}", kind, line.trim_end(), reason),
    }
}

/// Time-windowed averaging of wind readings
use time::OffsetDateTime;

use crate::models::{WindAverage, WindReading};
use crate::utils::{elapsed_seconds, mean};

/// Readings arriving up to this many seconds after the last flush are buffered.
pub const FLUSH_AFTER_SECS: i64 = 60;
/// Past this many seconds the window is considered stale and restarted.
pub const GAP_RESET_SECS: i64 = 70;

/// What a single reading did to the window.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowEvent {
    /// Startup or outage: window restarted, buffer discarded, sample dropped
    Restarted,
    /// Sample appended to the buffer
    Accumulated,
    /// Window closed; the triggering sample is not part of the average
    Flushed(WindAverage),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleBuffer {
    pub u: Vec<f64>,
    pub wind_direction: Vec<f64>,
    pub v: Vec<f64>,
}

impl SampleBuffer {
    fn push(&mut self, reading: &WindReading) {
        self.u.push(reading.u);
        self.wind_direction.push(reading.wind_direction);
        self.v.push(reading.v);
    }

    pub fn len(&self) -> usize {
        self.u.len()
    }

    pub fn is_empty(&self) -> bool {
        self.u.is_empty()
    }

    fn clear(&mut self) {
        self.u.clear();
        self.wind_direction.clear();
        self.v.clear();
    }
}

/// Rolling window driven purely by reading arrival times
///
/// There is no timer: every accepted reading compares its arrival time with
/// the last flush and either restarts the window, flushes it, or is buffered.
#[derive(Debug, Clone)]
pub struct AggregationWindow {
    last_flush: OffsetDateTime,
    buffer: SampleBuffer,
}

impl Default for AggregationWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregationWindow {
    /// Window whose last flush is the Unix epoch, so the first reading restarts it.
    pub fn new() -> Self {
        Self::starting_at(OffsetDateTime::UNIX_EPOCH)
    }

    /// Window that is already open and accumulating since `start`.
    pub fn starting_at(start: OffsetDateTime) -> Self {
        Self {
            last_flush: start,
            buffer: SampleBuffer::default(),
        }
    }

    pub fn last_flush(&self) -> OffsetDateTime {
        self.last_flush
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    /// Feed one accepted reading observed at `now`
    ///
    /// # Arguments
    /// * `reading` - Parsed wind sample
    /// * `now` - Local time the reading was received
    ///
    /// # Returns
    /// The transition taken, carrying the averaged record on a flush
    pub fn observe(&mut self, reading: &WindReading, now: OffsetDateTime) -> WindowEvent {
        let delta = elapsed_seconds(self.last_flush, now);

        // A negative delta means the wall clock stepped back; treat it as an outage.
        if delta > GAP_RESET_SECS || delta < 0 {
            self.buffer.clear();
            self.last_flush = now;
            WindowEvent::Restarted
        } else if delta > FLUSH_AFTER_SECS {
            // The triggering sample is dropped, neither averaged nor carried over.
            let average = WindAverage {
                u: mean(&self.buffer.u),
                wind_direction: mean(&self.buffer.wind_direction),
                v: mean(&self.buffer.v),
                time: now,
                samples: self.buffer.len(),
            };
            self.buffer.clear();
            self.last_flush = now;
            WindowEvent::Flushed(average)
        } else {
            self.buffer.push(reading);
            WindowEvent::Accumulated
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use time::Duration;

    const T0: OffsetDateTime = datetime!(2024-06-01 12:00:00 UTC);

    fn reading(u: f64, wind_direction: f64, v: f64) -> WindReading {
        WindReading {
            device_id: "1".to_string(),
            u,
            wind_direction,
            v,
        }
    }

    fn at(secs: i64) -> OffsetDateTime {
        T0 + Duration::seconds(secs)
    }

    #[test]
    fn first_reading_after_startup_restarts_window() {
        let mut window = AggregationWindow::new();
        assert_eq!(window.observe(&reading(1.0, 2.0, 3.0), T0), WindowEvent::Restarted);
        assert_eq!(window.last_flush(), T0);
        assert!(window.buffer().is_empty());
    }

    #[test]
    fn flush_averages_window() {
        let mut window = AggregationWindow::starting_at(T0);
        assert_eq!(window.observe(&reading(2.0, 90.0, 1.0), at(0)), WindowEvent::Accumulated);
        assert_eq!(window.observe(&reading(4.0, 90.0, 3.0), at(30)), WindowEvent::Accumulated);

        let average = match window.observe(&reading(6.0, 270.0, 5.0), at(65)) {
            WindowEvent::Flushed(average) => average,
            other => panic!("expected flush, got {:?}", other),
        };
        assert_eq!(average.u, 3.0);
        assert_eq!(average.wind_direction, 90.0);
        assert_eq!(average.v, 2.0);
        assert_eq!(average.samples, 2);
        assert_eq!(average.time, at(65));
        assert!(window.buffer().is_empty());
        assert_eq!(window.last_flush(), at(65));
    }

    #[test]
    fn gap_after_flush_restarts_silently() {
        let mut window = AggregationWindow::starting_at(T0);
        window.observe(&reading(2.0, 90.0, 1.0), at(0));
        window.observe(&reading(4.0, 90.0, 3.0), at(30));
        assert!(matches!(
            window.observe(&reading(6.0, 270.0, 5.0), at(65)),
            WindowEvent::Flushed(_)
        ));

        assert_eq!(window.observe(&reading(8.0, 0.0, 8.0), at(140)), WindowEvent::Restarted);
        assert_eq!(window.last_flush(), at(140));
        assert!(window.buffer().is_empty());
    }

    #[test]
    fn gap_discards_buffered_samples() {
        let mut window = AggregationWindow::starting_at(T0);
        window.observe(&reading(1.0, 1.0, 1.0), at(10));
        window.observe(&reading(1.0, 1.0, 1.0), at(20));
        assert_eq!(window.buffer().len(), 2);

        assert_eq!(window.observe(&reading(9.0, 9.0, 9.0), at(71)), WindowEvent::Restarted);
        assert!(window.buffer().is_empty());

        // Clock restarts from the gap event, not from the old window
        assert_eq!(window.observe(&reading(5.0, 5.0, 5.0), at(131)), WindowEvent::Accumulated);
    }

    #[test]
    fn mean_matches_reference_over_many_samples() {
        let mut window = AggregationWindow::starting_at(T0);
        let samples: Vec<(f64, f64, f64)> = (0..60)
            .map(|i| (i as f64 * 0.5, (i * 7 % 360) as f64, -(i as f64)))
            .collect();
        for (i, (u, wd, v)) in samples.iter().enumerate() {
            let event = window.observe(&reading(*u, *wd, *v), at(i as i64));
            assert_eq!(event, WindowEvent::Accumulated);
        }

        let WindowEvent::Flushed(average) = window.observe(&reading(0.0, 0.0, 0.0), at(70)) else {
            panic!("expected flush");
        };
        let n = samples.len() as f64;
        let u_ref = samples.iter().map(|s| s.0).sum::<f64>() / n;
        let wd_ref = samples.iter().map(|s| s.1).sum::<f64>() / n;
        let v_ref = samples.iter().map(|s| s.2).sum::<f64>() / n;
        assert!((average.u - u_ref).abs() < 1e-9);
        assert!((average.wind_direction - wd_ref).abs() < 1e-9);
        assert!((average.v - v_ref).abs() < 1e-9);
        assert_eq!(average.samples, 60);
    }

    #[test]
    fn boundaries_are_inclusive_at_60_and_70() {
        let mut window = AggregationWindow::starting_at(T0);
        assert_eq!(window.observe(&reading(1.0, 1.0, 1.0), at(60)), WindowEvent::Accumulated);
        assert!(matches!(
            window.observe(&reading(1.0, 1.0, 1.0), at(61)),
            WindowEvent::Flushed(_)
        ));

        let mut window = AggregationWindow::starting_at(T0);
        assert!(matches!(
            window.observe(&reading(1.0, 1.0, 1.0), at(70)),
            WindowEvent::Flushed(_)
        ));
    }

    #[test]
    fn empty_window_flushes_zeros() {
        let mut window = AggregationWindow::starting_at(T0);
        let WindowEvent::Flushed(average) = window.observe(&reading(5.0, 5.0, 5.0), at(65)) else {
            panic!("expected flush");
        };
        assert_eq!((average.u, average.wind_direction, average.v), (0.0, 0.0, 0.0));
        assert_eq!(average.samples, 0);
    }

    #[test]
    fn clock_stepping_back_restarts_window() {
        let mut window = AggregationWindow::starting_at(T0);
        window.observe(&reading(1.0, 1.0, 1.0), at(5));
        assert_eq!(window.observe(&reading(1.0, 1.0, 1.0), at(-30)), WindowEvent::Restarted);
        assert_eq!(window.last_flush(), at(-30));
        assert!(window.buffer().is_empty());
    }
}

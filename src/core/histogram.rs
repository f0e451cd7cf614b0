//! Sampling windows.
//!
//! The sensor is read continuously for a fixed window and the raw readings
//! are folded into a frequency histogram. The histogram lives for one window
//! only; it is categorized and dropped.

use crate::hal::{AnalogInput, Clock, HardwareError, StatusIndicator};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// How often the activity indicator toggles while sampling.
pub const INDICATOR_PERIOD: Duration = Duration::from_secs(1);

/// Frequency table of raw readings within one sampling window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Histogram {
    counts: BTreeMap<u16, u64>,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one occurrence of `value`.
    pub fn record(&mut self, value: u16) {
        self.record_n(value, 1);
    }

    pub fn record_n(&mut self, value: u16, count: u64) {
        *self.counts.entry(value).or_insert(0) += count;
    }

    pub fn get(&self, value: u16) -> u64 {
        self.counts.get(&value).copied().unwrap_or(0)
    }

    /// `(value, count)` pairs in ascending value order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, u64)> + '_ {
        self.counts.iter().map(|(value, count)| (*value, *count))
    }

    /// Total number of samples.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Number of distinct readings.
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl FromIterator<(u16, u64)> for Histogram {
    fn from_iter<I: IntoIterator<Item = (u16, u64)>>(iter: I) -> Self {
        let mut histogram = Histogram::new();
        for (value, count) in iter {
            histogram.record_n(value, count);
        }
        histogram
    }
}

/// `value:count` pairs in ascending order, comma separated.
impl std::fmt::Display for Histogram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (value, count)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}:{count}")?;
        }
        Ok(())
    }
}

/// Reads the sensor over a window and blinks the activity indicator.
pub struct SampleAggregator<A, I, C> {
    adc: A,
    indicator: I,
    clock: C,
    /// Monotonic time of the last indicator toggle; carried across windows.
    last_blink: Option<Duration>,
}

impl<A: AnalogInput, I: StatusIndicator, C: Clock> SampleAggregator<A, I, C> {
    pub fn new(adc: A, indicator: I, clock: C) -> Self {
        Self {
            adc,
            indicator,
            clock,
            last_blink: None,
        }
    }

    /// Sample for `window`, sleeping `sample_delay` after each reading.
    ///
    /// The indicator toggles on its own one-second cadence, checked before
    /// every read. A window shorter than the delay yields at most one sample;
    /// an empty histogram is a valid result.
    pub fn collect_window(
        &mut self,
        window: Duration,
        sample_delay: Duration,
    ) -> Result<Histogram, HardwareError> {
        let mut histogram = Histogram::new();
        let start = self.clock.monotonic();

        loop {
            let now = self.clock.monotonic();
            if now.saturating_sub(start) >= window {
                break;
            }

            if self
                .last_blink
                .map_or(true, |last| now.saturating_sub(last) >= INDICATOR_PERIOD)
            {
                self.last_blink = Some(now);
                if let Err(e) = self.indicator.toggle() {
                    tracing::warn!("Could not toggle activity indicator: {e}");
                }
            }

            histogram.record(self.adc.read()?);
            self.clock.sleep(sample_delay);
        }

        tracing::debug!(
            "Window complete: {} samples, {} distinct readings",
            histogram.total(),
            histogram.distinct()
        );
        Ok(histogram)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::sim::{ScriptedAdc, SimClock, SimLed};

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn test_histogram_counts_and_order() {
        let mut histogram = Histogram::new();
        for value in [500, 50, 500, 100, 50, 50] {
            histogram.record(value);
        }

        assert_eq!(histogram.get(50), 3);
        assert_eq!(histogram.get(7), 0);
        assert_eq!(histogram.total(), 6);
        assert_eq!(histogram.distinct(), 3);
        assert_eq!(histogram.to_string(), "50:3, 100:1, 500:2");
    }

    #[test]
    fn test_empty_histogram_display() {
        let histogram = Histogram::new();
        assert!(histogram.is_empty());
        assert_eq!(histogram.to_string(), "");
    }

    #[test]
    fn test_window_sample_count() {
        let clock = SimClock::new(0);
        let adc = ScriptedAdc::new(vec![10, 20]);
        let mut sampler = SampleAggregator::new(adc.clone(), SimLed::new(), clock.clone());

        let histogram = sampler.collect_window(secs(10.0), secs(1.0)).unwrap();

        assert_eq!(histogram.total(), 10);
        assert_eq!(histogram.get(10), 5);
        assert_eq!(histogram.get(20), 5);
        assert_eq!(adc.reads(), 10);
        assert_eq!(clock.monotonic(), secs(10.0));
    }

    #[test]
    fn test_indicator_cadence_independent_of_sample_delay() {
        let clock = SimClock::new(0);
        let led = SimLed::new();
        let mut sampler =
            SampleAggregator::new(ScriptedAdc::new(vec![1]), led.clone(), clock.clone());

        let histogram = sampler.collect_window(secs(10.0), secs(0.25)).unwrap();

        assert_eq!(histogram.total(), 40);
        assert_eq!(led.toggles(), 10);
    }

    #[test]
    fn test_indicator_period_carries_across_windows() {
        let clock = SimClock::new(0);
        let led = SimLed::new();
        let mut sampler =
            SampleAggregator::new(ScriptedAdc::new(vec![1]), led.clone(), clock.clone());

        // Samples at 0.0, 0.75, 1.5 and 2.25; toggles at 0.0 and 1.5
        sampler.collect_window(secs(2.5), secs(0.75)).unwrap();
        assert_eq!(led.toggles(), 2);

        // Starts at 3.0, 1.5s after the last toggle
        sampler.collect_window(secs(0.5), secs(0.25)).unwrap();
        assert_eq!(led.toggles(), 3);

        // Starts at 3.5, only 0.5s after the last toggle
        sampler.collect_window(secs(0.5), secs(0.25)).unwrap();
        assert_eq!(led.toggles(), 3);
    }

    #[test]
    fn test_window_shorter_than_delay_yields_one_sample() {
        let clock = SimClock::new(0);
        let mut sampler =
            SampleAggregator::new(ScriptedAdc::new(vec![42]), SimLed::new(), clock);

        let histogram = sampler.collect_window(secs(0.5), secs(2.0)).unwrap();
        assert_eq!(histogram.total(), 1);
        assert_eq!(histogram.get(42), 1);
    }

    #[test]
    fn test_zero_window_yields_empty_histogram() {
        let clock = SimClock::new(0);
        let adc = ScriptedAdc::new(vec![42]);
        let mut sampler = SampleAggregator::new(adc.clone(), SimLed::new(), clock);

        let histogram = sampler.collect_window(Duration::ZERO, secs(1.0)).unwrap();
        assert!(histogram.is_empty());
        assert_eq!(adc.reads(), 0);
    }

    #[test]
    fn test_sensor_failure_propagates() {
        let clock = SimClock::new(0);
        let mut sampler =
            SampleAggregator::new(ScriptedAdc::new(Vec::new()), SimLed::new(), clock);

        let result = sampler.collect_window(secs(1.0), secs(0.1));
        assert!(matches!(result, Err(HardwareError::InvalidReading(_))));
    }
}

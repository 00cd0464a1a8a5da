use serde::Serialize;

use super::model::Sample;
use super::period::Window;

/// Time-ordered, validated samples for one compressor line and one window.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSamples {
    pub samples: Vec<Sample>,
    pub diagnostics: SampleDiagnostics,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SampleDiagnostics {
    /// Samples kept after validation.
    pub accepted: usize,
    /// Samples dropped for a non-finite or negative current.
    pub rejected: usize,
    /// Samples dropped for falling outside the window.
    pub out_of_window: usize,
}

impl SampleDiagnostics {
    pub fn merge(&mut self, other: &SampleDiagnostics) {
        self.accepted += other.accepted;
        self.rejected += other.rejected;
        self.out_of_window += other.out_of_window;
    }
}

impl NormalizedSamples {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Drop invalid and out-of-window samples and sort the rest by time.
///
/// The sort is stable, so samples sharing a timestamp keep arrival order.
/// A non-finite voltage is treated as a missing voltage reading rather than
/// rejecting the whole sample.
pub fn normalize(raw: &[Sample], window: &Window) -> NormalizedSamples {
    let mut diagnostics = SampleDiagnostics::default();
    let mut samples = Vec::with_capacity(raw.len());

    for sample in raw {
        if !sample.current.is_finite() || sample.current < 0.0 {
            diagnostics.rejected += 1;
            continue;
        }
        if !window.contains(sample.time) {
            diagnostics.out_of_window += 1;
            continue;
        }
        let mut sample = *sample;
        if sample.voltage.is_some_and(|v| !v.is_finite()) {
            sample.voltage = None;
        }
        samples.push(sample);
    }

    samples.sort_by_key(|s| s.time);
    diagnostics.accepted = samples.len();

    if diagnostics.rejected > 0 {
        tracing::debug!(
            rejected = diagnostics.rejected,
            window_start = %window.start,
            "dropped samples with invalid current"
        );
    }

    NormalizedSamples {
        samples,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{at, day_window};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sorts_and_filters() {
        let window = day_window();
        let raw = vec![
            Sample::new(at(0, 10, 0), 12.0),
            Sample::new(at(0, 0, 0), 2.0),
            Sample::new(at(0, 5, 0), f64::NAN),
            Sample::new(at(0, 7, 0), -1.0),
            Sample::new(window.end, 5.0),
            Sample::new(window.start - chrono::Duration::seconds(1), 5.0),
            Sample::new(at(0, 2, 0), f64::INFINITY),
        ];

        let normalized = normalize(&raw, &window);
        let times: Vec<_> = normalized.samples.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![at(0, 0, 0), at(0, 10, 0)]);
        assert_eq!(
            normalized.diagnostics,
            SampleDiagnostics {
                accepted: 2,
                rejected: 3,
                out_of_window: 2,
            }
        );
    }

    #[test]
    fn test_duplicate_timestamps_keep_arrival_order() {
        let window = day_window();
        let raw = vec![
            Sample::new(at(1, 0, 0), 9.0),
            Sample::new(at(0, 30, 0), 1.0),
            Sample::new(at(1, 0, 0), 3.0),
            Sample::new(at(1, 0, 0), 6.0),
        ];

        let currents: Vec<f64> = normalize(&raw, &window)
            .samples
            .iter()
            .map(|s| s.current)
            .collect();
        assert_eq!(currents, vec![1.0, 9.0, 3.0, 6.0]);
    }

    #[test]
    fn test_zero_current_is_valid() {
        let window = day_window();
        let normalized = normalize(&[Sample::new(at(3, 0, 0), 0.0)], &window);
        assert_eq!(normalized.samples.len(), 1);
        assert_eq!(normalized.diagnostics.rejected, 0);
    }

    #[test]
    fn test_non_finite_voltage_becomes_missing() {
        let window = day_window();
        let raw = vec![Sample::new(at(3, 0, 0), 8.0).with_voltage(f64::NAN)];
        let normalized = normalize(&raw, &window);
        assert_eq!(normalized.samples[0].voltage, None);
        assert_eq!(normalized.diagnostics.rejected, 0);
    }

    #[test]
    fn test_empty_input() {
        let normalized = normalize(&[], &day_window());
        assert!(normalized.is_empty());
        assert_eq!(normalized.diagnostics, SampleDiagnostics::default());
    }
}

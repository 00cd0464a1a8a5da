use chrono::{DateTime, Duration, Utc};

use super::model::{round2, IntervalBucket, Measurement, Sample};

/// Pack time-ordered `(time, value)` points into chart buckets of `width`.
///
/// A bucket opens at the time of its first point and takes every following
/// point less than `width` after that. The stretch between a closed bucket
/// and the next point is filled with null buckets `width` apart, the last of
/// which may be shorter, so consecutive bucket starts are never more than
/// `width` apart. When the last bucket ends before `period_end` (with no
/// point exactly at `period_end`) a single null bucket is appended at
/// `period_end` to close the chart axis.
pub fn downsample(
    points: &[(DateTime<Utc>, f64)],
    width: Duration,
    period_end: DateTime<Utc>,
) -> Vec<IntervalBucket> {
    let mut buckets = Vec::new();
    let Some(&(first_time, first_value)) = points.first() else {
        return buckets;
    };

    let mut open = OpenBucket::new(first_time, first_value);
    for &(time, value) in &points[1..] {
        if time - open.start < width {
            open.add(value);
            continue;
        }

        let mut cursor = open.start + width;
        buckets.push(open.close());
        while cursor < time {
            buckets.push(IntervalBucket::empty(cursor));
            cursor += width;
        }
        open = OpenBucket::new(time, value);
    }

    let covered_until = open.start + width;
    buckets.push(open.close());

    let sample_at_end = points.iter().rev().any(|&(time, _)| time == period_end);
    if covered_until < period_end && !sample_at_end {
        buckets.push(IntervalBucket::empty(period_end));
    }

    buckets
}

/// Chart series for one measurement. Samples without a reading for the
/// measurement are skipped.
pub fn series(
    samples: &[Sample],
    measurement: Measurement,
    width: Duration,
    period_end: DateTime<Utc>,
) -> Vec<IntervalBucket> {
    let points: Vec<(DateTime<Utc>, f64)> = samples
        .iter()
        .filter_map(|s| measurement.value_of(s).map(|v| (s.time, v)))
        .collect();
    downsample(&points, width, period_end)
}

struct OpenBucket {
    start: DateTime<Utc>,
    sum: f64,
    count: usize,
}

impl OpenBucket {
    fn new(start: DateTime<Utc>, value: f64) -> Self {
        Self {
            start,
            sum: value,
            count: 1,
        }
    }

    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn close(self) -> IntervalBucket {
        IntervalBucket {
            bucket_start: self.start,
            avg_value: Some(round2(self.sum / self.count as f64)),
            sample_count: self.count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{at, day_window};
    use pretty_assertions::assert_eq;

    fn points_every(start: DateTime<Utc>, step_secs: i64, values: &[f64]) -> Vec<(DateTime<Utc>, f64)> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| (start + Duration::seconds(step_secs * i as i64), v))
            .collect()
    }

    #[test]
    fn test_greedy_packing_from_first_sample() {
        let start = at(8, 0, 7);
        let points = points_every(start, 10, &[1.0, 2.0, 3.0, 10.0, 20.0]);
        let buckets = downsample(&points, Duration::seconds(30), day_window().end);

        assert_eq!(
            buckets,
            vec![
                IntervalBucket {
                    bucket_start: start,
                    avg_value: Some(2.0),
                    sample_count: 3,
                },
                IntervalBucket {
                    bucket_start: start + Duration::seconds(30),
                    avg_value: Some(15.0),
                    sample_count: 2,
                },
                IntervalBucket::empty(day_window().end),
            ]
        );
    }

    #[test]
    fn test_average_rounded_to_two_decimals() {
        let points = points_every(at(0, 0, 0), 5, &[1.0, 1.0, 2.0]);
        let buckets = downsample(&points, Duration::seconds(30), at(0, 0, 15));
        assert_eq!(buckets[0].avg_value, Some(1.33));
    }

    #[test]
    fn test_empty_windows_in_gap_are_null() {
        let mut points = points_every(at(0, 0, 0), 10, &[5.0; 60]);
        points.push((at(0, 15, 0), 7.0));
        let buckets = downsample(&points, Duration::seconds(30), at(0, 15, 10));

        // 20 full buckets for the first 10 minutes, then 10 null windows
        // from 00:10:00 to 00:14:30, then the lone sample at 00:15:00
        assert_eq!(buckets.len(), 31);
        assert!(buckets[..20].iter().all(|b| b.avg_value == Some(5.0)));
        assert!(buckets[20..30].iter().all(|b| b.avg_value.is_none()));
        assert_eq!(buckets[20].bucket_start, at(0, 10, 0));
        assert_eq!(buckets[29].bucket_start, at(0, 14, 30));
        assert_eq!(buckets[30].bucket_start, at(0, 15, 0));
        assert_eq!(buckets[30].avg_value, Some(7.0));
    }

    #[test]
    fn test_no_terminal_bucket_when_axis_already_closed() {
        let points = points_every(at(0, 0, 0), 10, &[1.0, 2.0]);
        // Last bucket covers [00:00:00, 00:00:30), period ends at 00:00:20
        let buckets = downsample(&points, Duration::seconds(30), at(0, 0, 20));
        assert_eq!(buckets.len(), 1);
    }

    #[test]
    fn test_no_terminal_bucket_when_sample_on_end_boundary() {
        let end = at(0, 5, 0);
        let points = vec![(at(0, 0, 0), 1.0), (end, 3.0)];
        let buckets = downsample(&points, Duration::seconds(30), end);
        assert_eq!(buckets.last().unwrap().bucket_start, end);
        assert_eq!(buckets.last().unwrap().avg_value, Some(3.0));
        assert!(buckets.iter().filter(|b| b.bucket_start == end).count() == 1);
    }

    #[test]
    fn test_empty_input_yields_no_buckets() {
        assert!(downsample(&[], Duration::seconds(30), day_window().end).is_empty());
    }

    #[test]
    fn test_idempotent() {
        let points = points_every(at(2, 0, 0), 7, &[3.2, 4.1, 9.9, 0.0, 12.4, 11.1, 5.5, 6.6]);
        let width = Duration::seconds(30);
        let first = downsample(&points, width, day_window().end);
        let second = downsample(&points, width, day_window().end);
        assert_eq!(first, second);
    }

    fn assert_covers(points: &[(DateTime<Utc>, f64)], width: Duration) -> Vec<IntervalBucket> {
        // Period ends on the last sample, so no terminal bucket is appended
        let end = points.last().unwrap().0;
        let buckets = downsample(points, width, end);

        let span = end - points[0].0;
        assert!(
            width * buckets.len() as i32 >= span,
            "{} buckets of {}s do not cover {}s",
            buckets.len(),
            width.num_seconds(),
            span.num_seconds()
        );

        let counted: usize = buckets.iter().map(|b| b.sample_count).sum();
        assert_eq!(counted, points.len());

        for pair in buckets.windows(2) {
            assert!(pair[0].bucket_start < pair[1].bucket_start);
            assert!(pair[1].bucket_start - pair[0].bucket_start <= width);
        }
        buckets
    }

    #[test]
    fn test_coverage_and_no_sample_dropped() {
        let values: Vec<f64> = (0..360).map(|i| (i % 17) as f64).collect();
        let points = points_every(at(6, 0, 0), 10, &values);
        assert_covers(&points, Duration::seconds(30));
    }

    #[test]
    fn test_coverage_with_spacing_between_one_and_two_widths() {
        let points = points_every(at(6, 0, 0), 45, &[4.0; 10]);
        let buckets = assert_covers(&points, Duration::seconds(30));

        // Each sample gets its own bucket, followed by a null bucket for the
        // 15 s without samples before the next one
        assert_eq!(buckets.len(), 19);
        assert_eq!(buckets[1], IntervalBucket::empty(at(6, 0, 30)));
        assert_eq!(buckets[2].bucket_start, at(6, 0, 45));
        assert_eq!(buckets[2].sample_count, 1);
        assert!(buckets
            .iter()
            .filter(|b| b.avg_value.is_none())
            .all(|b| b.sample_count == 0));
    }

    #[test]
    fn test_coverage_with_irregular_gaps() {
        let offsets = [0, 5, 29, 31, 95, 96, 140, 500, 531, 560, 1200];
        let points: Vec<(DateTime<Utc>, f64)> = offsets
            .iter()
            .enumerate()
            .map(|(i, &secs)| (at(9, 0, 0) + Duration::seconds(secs), i as f64))
            .collect();

        assert_covers(&points, Duration::seconds(30));
        assert_covers(&points, Duration::seconds(60));
        assert_covers(&points, Duration::seconds(7));
    }

    #[test]
    fn test_voltage_series_skips_missing_readings() {
        let samples = vec![
            Sample::new(at(0, 0, 0), 10.0).with_voltage(460.0),
            Sample::new(at(0, 0, 10), 10.0),
            Sample::new(at(0, 0, 20), 10.0).with_voltage(470.0),
        ];
        let buckets = series(&samples, Measurement::Voltage, Duration::seconds(30), at(0, 0, 25));
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].avg_value, Some(465.0));
        assert_eq!(buckets[0].sample_count, 2);
    }
}

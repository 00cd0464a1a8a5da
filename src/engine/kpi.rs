//! Derived KPIs: state shares, time in state, cycle rate, energy cost,
//! HP-equivalent and stability indices, plus the advisory comments shown
//! next to them.
//!
//! Advisory thresholds are presentation hints only. They never change a
//! numeric field.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::cycles::{count_cycles, count_transitions, cycles_per_hour};
use super::model::{round2, ClassifiedSample, ClientRecord, OperatingState, Sample};
use crate::error::{AppError, Result};

/// Recommended cycle rate band, cycles per running hour.
pub const CYCLE_RATE_MIN_PER_HOUR: f64 = 6.0;
pub const CYCLE_RATE_MAX_PER_HOUR: f64 = 15.0;
/// HP utilisation below this suggests an oversized compressor.
pub const HP_UTILIZATION_LOW_PCT: f64 = 40.0;
/// HP utilisation above this means running beyond nameplate.
pub const HP_UTILIZATION_HIGH_PCT: f64 = 100.0;
/// NO_LOAD share above this is flagged as wasted idle running.
pub const NOLOAD_SHARE_HIGH_PCT: f64 = 30.0;
/// Kilowatts per mechanical horsepower.
pub const KW_PER_HP: f64 = 0.746;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub load: u64,
    pub no_load: u64,
    pub off: u64,
}

impl StateCounts {
    pub fn add(&mut self, state: OperatingState) {
        match state {
            OperatingState::Load => self.load += 1,
            OperatingState::NoLoad => self.no_load += 1,
            OperatingState::Off => self.off += 1,
        }
    }

    pub fn merge(&mut self, other: &StateCounts) {
        self.load += other.load;
        self.no_load += other.no_load;
        self.off += other.off;
    }

    pub fn total(&self) -> u64 {
        self.load + self.no_load + self.off
    }
}

/// Share of samples in each state. All zero with `no_data` set when there
/// were no samples, which is distinct from a genuine 100 % OFF.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatePercentages {
    #[serde(rename = "LOAD")]
    pub load: f64,
    #[serde(rename = "NO_LOAD")]
    pub no_load: f64,
    #[serde(rename = "OFF")]
    pub off: f64,
    pub no_data: bool,
}

impl StatePercentages {
    pub fn from_counts(counts: &StateCounts) -> Self {
        let total = counts.total();
        if total == 0 {
            return Self {
                load: 0.0,
                no_load: 0.0,
                off: 0.0,
                no_data: true,
            };
        }
        let pct = |n: u64| round2(n as f64 / total as f64 * 100.0);
        Self {
            load: pct(counts.load),
            no_load: pct(counts.no_load),
            off: pct(counts.off),
            no_data: false,
        }
    }

    pub fn sum(&self) -> f64 {
        self.load + self.no_load + self.off
    }
}

/// Count, sum and sum of squares, mergeable across days.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStats {
    count: u64,
    sum: f64,
    sum_sq: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.sum_sq += value * value;
    }

    pub fn merge(&mut self, other: &RunningStats) {
        self.count += other.count;
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Population standard deviation.
    pub fn std_dev(&self) -> Option<f64> {
        let mean = self.mean()?;
        let variance = (self.sum_sq / self.count as f64 - mean * mean).max(0.0);
        Some(variance.sqrt())
    }

    /// Coefficient of variation in percent; undefined for a zero mean.
    pub fn cv_pct(&self) -> Option<f64> {
        let mean = self.mean()?;
        if mean == 0.0 {
            return None;
        }
        Some(self.std_dev()? / mean * 100.0)
    }
}

/// Everything the KPIs need from one window of classified samples, built in
/// one place so that daily tallies can be merged into a weekly one.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OperationTally {
    pub counts: StateCounts,
    pub load_secs: f64,
    pub no_load_secs: f64,
    pub off_secs: f64,
    pub cycles: u64,
    pub transitions: u64,
    pub load_current: RunningStats,
}

impl OperationTally {
    /// `samples` and `classified` must be the same time-ordered window.
    ///
    /// The gap to the next sample is credited to the earlier sample's state;
    /// gaps longer than `max_gap` are treated as missing data.
    pub fn from_window(
        samples: &[Sample],
        classified: &[ClassifiedSample],
        max_gap: Duration,
    ) -> Self {
        debug_assert_eq!(samples.len(), classified.len());

        let mut tally = OperationTally {
            cycles: count_cycles(classified),
            transitions: count_transitions(classified),
            ..Default::default()
        };

        for (i, (sample, c)) in samples.iter().zip(classified).enumerate() {
            tally.counts.add(c.state);
            if c.state == OperatingState::Load {
                tally.load_current.push(sample.current);
            }

            let Some(next) = classified.get(i + 1) else {
                continue;
            };
            let gap = next.time - c.time;
            if gap > max_gap {
                continue;
            }
            let secs = gap.num_milliseconds() as f64 / 1000.0;
            match c.state {
                OperatingState::Load => tally.load_secs += secs,
                OperatingState::NoLoad => tally.no_load_secs += secs,
                OperatingState::Off => tally.off_secs += secs,
            }
        }

        tally
    }

    pub fn merge(&mut self, other: &OperationTally) {
        self.counts.merge(&other.counts);
        self.load_secs += other.load_secs;
        self.no_load_secs += other.no_load_secs;
        self.off_secs += other.off_secs;
        self.cycles += other.cycles;
        self.transitions += other.transitions;
        self.load_current.merge(&other.load_current);
    }

    /// Running time (LOAD + NO_LOAD), unrounded.
    pub fn hours_worked(&self) -> f64 {
        (self.load_secs + self.no_load_secs) / 3600.0
    }

    pub fn percentages(&self) -> StatePercentages {
        StatePercentages::from_counts(&self.counts)
    }

    pub fn operation(&self) -> OperationKpis {
        let hours = self.hours_worked();
        OperationKpis {
            hours_worked: round2(hours),
            load_hours: round2(self.load_secs / 3600.0),
            no_load_hours: round2(self.no_load_secs / 3600.0),
            off_hours: round2(self.off_secs / 3600.0),
            cycles_total: self.cycles,
            cycles_per_hour: round2(cycles_per_hour(self.cycles, hours)),
        }
    }

    pub fn stability(&self) -> StabilityIndex {
        let hours = self.hours_worked();
        StabilityIndex {
            load_current_mean_amp: self.load_current.mean().map(round2),
            load_current_std_dev_amp: self.load_current.std_dev().map(round2),
            load_current_cv_pct: self.load_current.cv_pct().map(round2),
            transitions: self.transitions,
            transitions_per_hour: if hours > 0.0 {
                round2(self.transitions as f64 / hours)
            } else {
                0.0
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OperationKpis {
    pub hours_worked: f64,
    pub load_hours: f64,
    pub no_load_hours: f64,
    pub off_hours: f64,
    pub cycles_total: u64,
    pub cycles_per_hour: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StabilityIndex {
    pub load_current_mean_amp: Option<f64>,
    pub load_current_std_dev_amp: Option<f64>,
    pub load_current_cv_pct: Option<f64>,
    pub transitions: u64,
    pub transitions_per_hour: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    Client,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BillingRate {
    pub usd_per_kwh: f64,
    pub source: RateSource,
}

/// The client's own rate, else the configured fallback. With neither, the
/// rollup cannot be costed and fails as a configuration error.
pub fn resolve_rate(client: &ClientRecord, fallback: Option<f64>) -> Result<BillingRate> {
    match client.rate_usd_per_kwh {
        Some(rate) if rate.is_finite() && rate >= 0.0 => Ok(BillingRate {
            usd_per_kwh: rate,
            source: RateSource::Client,
        }),
        Some(rate) => Err(AppError::Config(format!(
            "client {} has an invalid billing rate: {}",
            client.id, rate
        ))),
        None => fallback
            .map(|rate| BillingRate {
                usd_per_kwh: rate,
                source: RateSource::Fallback,
            })
            .ok_or_else(|| {
                AppError::Config(format!(
                    "client {} has no billing rate and no fallback rate is configured",
                    client.id
                ))
            }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnergyKpis {
    pub kwh: f64,
    pub cost_usd: f64,
    pub rate_usd_per_kwh: f64,
    pub rate_source: RateSource,
}

impl EnergyKpis {
    pub fn new(kwh: f64, rate: BillingRate) -> Self {
        Self {
            kwh: round2(kwh),
            cost_usd: cost_usd(kwh, rate.usd_per_kwh),
            rate_usd_per_kwh: rate.usd_per_kwh,
            rate_source: rate.source,
        }
    }
}

pub fn cost_usd(kwh: f64, rate_usd_per_kwh: f64) -> f64 {
    round2(kwh * rate_usd_per_kwh)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HorsepowerKpis {
    pub hp_equivalent: f64,
    pub hp_nominal: f64,
    pub utilization_pct: f64,
}

impl HorsepowerKpis {
    pub fn new(kwh: f64, hours_worked: f64, hp_nominal: f64) -> Self {
        let hp_eq = hp_equivalent(kwh, hours_worked);
        Self {
            hp_equivalent: hp_eq,
            hp_nominal,
            utilization_pct: hp_utilization_pct(hp_eq, hp_nominal),
        }
    }
}

/// Average electrical power while running, expressed in horsepower.
pub fn hp_equivalent(kwh: f64, hours_worked: f64) -> f64 {
    if hours_worked > 0.0 {
        round2(kwh / hours_worked / KW_PER_HP)
    } else {
        0.0
    }
}

pub fn hp_utilization_pct(hp_equivalent: f64, hp_nominal: f64) -> f64 {
    if hp_nominal > 0.0 {
        round2(hp_equivalent / hp_nominal * 100.0)
    } else {
        0.0
    }
}

pub const NO_DATA_COMMENT: &str = "No data recorded for this period";

pub fn cycle_rate_comment(operation: &OperationKpis) -> String {
    if operation.hours_worked <= 0.0 {
        return "Compressor did not run during this period".to_string();
    }
    let rate = operation.cycles_per_hour;
    if rate < CYCLE_RATE_MIN_PER_HOUR {
        format!(
            "Cycle rate {:.2}/hr is below the recommended {}–{}/hr range",
            rate, CYCLE_RATE_MIN_PER_HOUR, CYCLE_RATE_MAX_PER_HOUR
        )
    } else if rate > CYCLE_RATE_MAX_PER_HOUR {
        format!(
            "Cycle rate {:.2}/hr is above the recommended {}–{}/hr range; check for short cycling",
            rate, CYCLE_RATE_MIN_PER_HOUR, CYCLE_RATE_MAX_PER_HOUR
        )
    } else {
        format!(
            "Cycle rate {:.2}/hr is within the recommended {}–{}/hr range",
            rate, CYCLE_RATE_MIN_PER_HOUR, CYCLE_RATE_MAX_PER_HOUR
        )
    }
}

pub fn horsepower_comment(hp: &HorsepowerKpis) -> Option<String> {
    if hp.hp_nominal <= 0.0 {
        return Some("No nominal HP configured; utilisation not computed".to_string());
    }
    if hp.hp_equivalent <= 0.0 {
        return None;
    }
    if hp.utilization_pct > HP_UTILIZATION_HIGH_PCT {
        Some(format!(
            "Equivalent load {:.2} HP exceeds nominal {:.2} HP ({:.2} %)",
            hp.hp_equivalent, hp.hp_nominal, hp.utilization_pct
        ))
    } else if hp.utilization_pct < HP_UTILIZATION_LOW_PCT {
        Some(format!(
            "Utilisation {:.2} % of nominal HP is low; compressor may be oversized",
            hp.utilization_pct
        ))
    } else {
        None
    }
}

pub fn noload_comment(percentages: &StatePercentages) -> Option<String> {
    (percentages.no_load > NOLOAD_SHARE_HIGH_PCT).then(|| {
        format!(
            "Compressor ran unloaded {:.2} % of the time (above {} %)",
            percentages.no_load, NOLOAD_SHARE_HIGH_PCT
        )
    })
}

pub fn rate_comment(rate: &BillingRate) -> Option<String> {
    (rate.source == RateSource::Fallback).then(|| {
        format!(
            "Client has no billing rate; costed at the fallback rate of {} USD/kWh",
            rate.usd_per_kwh
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::classify::StateClassifier;
    use crate::engine::test_support::{at, profile, samples_every};
    use pretty_assertions::assert_eq;

    fn tally_for(currents: &[f64], step_secs: i64) -> OperationTally {
        let samples = samples_every(at(0, 0, 0), step_secs, currents);
        let classified = StateClassifier::new(&profile()).unwrap().classify(&samples);
        OperationTally::from_window(&samples, &classified, Duration::seconds(900))
    }

    fn client(rate: Option<f64>) -> ClientRecord {
        ClientRecord {
            id: 3,
            name: "Acme Plastics".into(),
            rate_usd_per_kwh: rate,
            mask_energy: false,
        }
    }

    #[test]
    fn test_percentages_close_to_100() {
        let cases = [
            StateCounts { load: 1, no_load: 1, off: 1 },
            StateCounts { load: 2, no_load: 1, off: 0 },
            StateCounts { load: 1, no_load: 5, off: 1 },
            StateCounts { load: 7, no_load: 0, off: 11 },
            StateCounts { load: 12345, no_load: 6789, off: 1011 },
            StateCounts { load: 1, no_load: 0, off: 0 },
        ];
        for counts in cases {
            let pct = StatePercentages::from_counts(&counts);
            assert!((pct.sum() - 100.0).abs() <= 0.01 + 1e-9, "{:?} -> {:?}", counts, pct);
            assert!(!pct.no_data);
        }
    }

    #[test]
    fn test_no_data_is_distinct_from_all_off() {
        let empty = StatePercentages::from_counts(&StateCounts::default());
        let all_off = StatePercentages::from_counts(&StateCounts { load: 0, no_load: 0, off: 12 });

        assert_eq!((empty.load, empty.no_load, empty.off), (0.0, 0.0, 0.0));
        assert!(empty.no_data);
        assert_eq!((all_off.load, all_off.no_load, all_off.off), (0.0, 0.0, 100.0));
        assert!(!all_off.no_data);
        assert_ne!(empty, all_off);
    }

    #[test]
    fn test_time_in_state_credits_earlier_sample() {
        // [OFF, OFF, LOAD, LOAD, OFF] at 5 minute spacing
        let tally = tally_for(&[2.0, 2.0, 12.0, 12.0, 1.0], 300);
        assert_eq!(tally.counts, StateCounts { load: 2, no_load: 0, off: 3 });
        assert_eq!(tally.load_secs, 600.0);
        assert_eq!(tally.off_secs, 600.0);
        assert_eq!(tally.no_load_secs, 0.0);
        assert_eq!(tally.cycles, 0);

        let op = tally.operation();
        assert_eq!(op.hours_worked, 0.17);
        assert_eq!(op.cycles_total, 0);
        assert_eq!(op.cycles_per_hour, 0.0);
    }

    #[test]
    fn test_long_gaps_not_credited() {
        let samples = vec![
            Sample::new(at(0, 0, 0), 12.0),
            Sample::new(at(0, 10, 0), 12.0),
            Sample::new(at(5, 0, 0), 12.0),
        ];
        let classified = StateClassifier::new(&profile()).unwrap().classify(&samples);
        let tally = OperationTally::from_window(&samples, &classified, Duration::seconds(900));
        assert_eq!(tally.load_secs, 600.0);
    }

    #[test]
    fn test_cycle_rate_over_running_hours() {
        // LOAD / NO_LOAD alternating every 10 minutes for 2 hours
        let currents: Vec<f64> = (0..13)
            .map(|i| if i % 2 == 0 { 12.0 } else { 5.0 })
            .collect();
        let tally = tally_for(&currents, 600);
        let op = tally.operation();
        assert_eq!(op.cycles_total, 6);
        assert_eq!(op.hours_worked, 2.0);
        assert_eq!(op.cycles_per_hour, 3.0);
    }

    #[test]
    fn test_merge_matches_single_pass_counts() {
        let mut week = OperationTally::default();
        let day1 = tally_for(&[12.0, 5.0, 12.0, 5.0], 60);
        let day2 = tally_for(&[1.0, 1.0, 12.0], 60);
        week.merge(&day1);
        week.merge(&day2);

        assert_eq!(week.counts, StateCounts { load: 3, no_load: 2, off: 2 });
        assert_eq!(week.cycles, day1.cycles + day2.cycles);
        assert_eq!(week.load_current.count(), 3);
    }

    #[test]
    fn test_cost_rounding() {
        assert_eq!(cost_usd(123.456, 0.17), 20.99);
        let energy = EnergyKpis::new(123.456, BillingRate {
            usd_per_kwh: 0.17,
            source: RateSource::Client,
        });
        assert_eq!(energy.cost_usd, 20.99);
        assert_eq!(energy.kwh, 123.46);
    }

    #[test]
    fn test_resolve_rate() {
        let rate = resolve_rate(&client(Some(0.12)), Some(0.2)).unwrap();
        assert_eq!(rate, BillingRate { usd_per_kwh: 0.12, source: RateSource::Client });

        let rate = resolve_rate(&client(None), Some(0.2)).unwrap();
        assert_eq!(rate, BillingRate { usd_per_kwh: 0.2, source: RateSource::Fallback });
        assert!(rate_comment(&rate).unwrap().contains("fallback"));

        let err = resolve_rate(&client(None), None).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));

        assert!(resolve_rate(&client(Some(-0.1)), Some(0.2)).is_err());
    }

    #[test]
    fn test_horsepower() {
        // 74.6 kWh over 2 running hours is 37.3 kW, i.e. 50 HP
        let hp = HorsepowerKpis::new(74.6, 2.0, 50.0);
        assert_eq!(hp.hp_equivalent, 50.0);
        assert_eq!(hp.utilization_pct, 100.0);
        assert_eq!(horsepower_comment(&hp), None);

        let hp = HorsepowerKpis::new(74.6, 0.0, 50.0);
        assert_eq!(hp.hp_equivalent, 0.0);
        assert_eq!(hp.utilization_pct, 0.0);

        let hp = HorsepowerKpis::new(74.6, 2.0, 0.0);
        assert_eq!(hp.utilization_pct, 0.0);
        assert!(horsepower_comment(&hp).unwrap().contains("No nominal HP"));
    }

    #[test]
    fn test_stability_index() {
        let tally = tally_for(&[10.0, 12.0, 14.0, 12.0], 60);
        let stability = tally.stability();
        assert_eq!(stability.load_current_mean_amp, Some(12.0));
        // population std dev of [10, 12, 14, 12] is sqrt(2)
        assert_eq!(stability.load_current_std_dev_amp, Some(1.41));
        assert_eq!(stability.load_current_cv_pct, Some(11.79));
        assert_eq!(stability.transitions, 0);

        let idle = tally_for(&[1.0, 1.0], 60).stability();
        assert_eq!(idle.load_current_mean_amp, None);
        assert_eq!(idle.transitions_per_hour, 0.0);
    }

    #[test]
    fn test_cycle_rate_comments() {
        let op = |rate: f64, hours: f64| OperationKpis {
            hours_worked: hours,
            load_hours: hours,
            no_load_hours: 0.0,
            off_hours: 0.0,
            cycles_total: 0,
            cycles_per_hour: rate,
        };
        assert!(cycle_rate_comment(&op(3.0, 1.0)).contains("below"));
        assert!(cycle_rate_comment(&op(10.0, 1.0)).contains("within"));
        assert!(cycle_rate_comment(&op(6.0, 1.0)).contains("within"));
        assert!(cycle_rate_comment(&op(15.0, 1.0)).contains("within"));
        assert!(cycle_rate_comment(&op(22.5, 1.0)).contains("above"));
        assert!(cycle_rate_comment(&op(0.0, 0.0)).contains("did not run"));
    }

    #[test]
    fn test_noload_comment() {
        let pct = StatePercentages::from_counts(&StateCounts { load: 1, no_load: 1, off: 0 });
        assert!(noload_comment(&pct).is_some());
        let pct = StatePercentages::from_counts(&StateCounts { load: 9, no_load: 1, off: 0 });
        assert!(noload_comment(&pct).is_none());
    }
}

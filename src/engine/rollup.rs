//! Assembles normalized, classified samples and fetched metadata into daily
//! and weekly rollups.
//!
//! Inputs arrive as [`Section`]s: anything the caller failed to fetch stays
//! unavailable in every output section that depends on it, and the rollup is
//! marked partial. Configuration problems (bad thresholds, no billing rate)
//! abort the whole rollup instead.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::classify::StateClassifier;
use super::downsample;
use super::kpi::{
    self, BillingRate, EnergyKpis, HorsepowerKpis, OperationKpis, OperationTally,
    StabilityIndex, StatePercentages,
};
use super::model::{round2, ClientRecord, CompressorProfile, IntervalBucket, Measurement, Sample};
use super::normalize::{normalize, NormalizedSamples, SampleDiagnostics};
use super::period::{day_windows, fixed_offset, Period, Window};
use super::section::Section;
use crate::config::EngineConfig;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupKey {
    pub client_id: i64,
    pub line: i32,
}

impl std::fmt::Display for RollupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client {} line {}", self.client_id, self.line)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RollupSettings {
    pub offset: FixedOffset,
    pub bucket_width: Duration,
    pub max_sample_gap: Duration,
    pub measurement: Measurement,
    pub fallback_rate_usd_per_kwh: Option<f64>,
}

impl RollupSettings {
    pub fn daily(config: &EngineConfig, measurement: Measurement) -> Result<Self> {
        Ok(Self {
            offset: fixed_offset(config.timezone_offset_hours)?,
            bucket_width: Duration::seconds(i64::from(config.bucket_width_secs)),
            max_sample_gap: Duration::seconds(i64::from(config.max_sample_gap_secs)),
            measurement,
            fallback_rate_usd_per_kwh: config.fallback_rate_usd_per_kwh,
        })
    }

    pub fn weekly(config: &EngineConfig, measurement: Measurement) -> Result<Self> {
        Ok(Self {
            bucket_width: Duration::seconds(i64::from(config.weekly_bucket_width_secs)),
            ..Self::daily(config, measurement)?
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub measurement: Measurement,
    pub bucket_width_secs: i64,
    pub buckets: Vec<IntervalBucket>,
}

/// The sections shared by daily and weekly rollups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupReport {
    /// Samples were fetched and none fell in the period. Distinct from a
    /// period where every sample is OFF.
    pub no_data: bool,
    pub diagnostics: Section<SampleDiagnostics>,
    pub percentages: Section<StatePercentages>,
    pub operation: Section<OperationKpis>,
    pub energy: Section<EnergyKpis>,
    pub horsepower: Section<HorsepowerKpis>,
    pub stability: Section<StabilityIndex>,
    pub series: Section<Series>,
    pub compressor: Section<CompressorProfile>,
    pub client: Section<ClientRecord>,
    pub comments: Vec<String>,
}

impl RollupReport {
    pub fn unavailable_sections(&self) -> Vec<String> {
        [
            ("diagnostics", self.diagnostics.is_available()),
            ("percentages", self.percentages.is_available()),
            ("operation", self.operation.is_available()),
            ("energy", self.energy.is_available()),
            ("horsepower", self.horsepower.is_available()),
            ("stability", self.stability.is_available()),
            ("series", self.series.is_available()),
            ("compressor", self.compressor.is_available()),
            ("client", self.client.is_available()),
        ]
        .into_iter()
        .filter(|(_, available)| !available)
        .map(|(name, _)| name.to_string())
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRollup {
    pub client_id: i64,
    pub line: i32,
    pub period: Period,
    pub window: Window,
    #[serde(flatten)]
    pub report: RollupReport,
    pub partial: bool,
    pub unavailable_sections: Vec<String>,
}

impl DailyRollup {
    pub fn is_no_data(&self) -> bool {
        self.report.no_data
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub no_data: bool,
    pub sample_count: usize,
    pub percentages: StatePercentages,
    pub operation: OperationKpis,
    pub energy: Section<EnergyKpis>,
}

/// Signed % change of this week against the mean of the trailing weeks that
/// had data. `None` where either side is missing or the baseline is zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekComparison {
    pub baseline_weeks: Vec<Period>,
    pub kwh_change_pct: Option<f64>,
    pub cost_change_pct: Option<f64>,
    pub cycles_per_hour_change_pct: Option<f64>,
    pub hp_equivalent_change_pct: Option<f64>,
    pub hours_worked_change_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyRollup {
    pub client_id: i64,
    pub line: i32,
    pub period: Period,
    pub window: Window,
    #[serde(flatten)]
    pub report: RollupReport,
    pub days: Section<Vec<DaySummary>>,
    pub comparison: Section<WeekComparison>,
    pub partial: bool,
    pub unavailable_sections: Vec<String>,
}

impl WeeklyRollup {
    pub fn is_no_data(&self) -> bool {
        self.report.no_data
    }
}

#[derive(Debug, Clone)]
pub struct DailyInputs {
    pub samples: Section<Vec<Sample>>,
    pub compressor: Section<CompressorProfile>,
    pub client: Section<ClientRecord>,
    pub energy_kwh: Section<Option<f64>>,
}

#[derive(Debug, Clone)]
pub struct WeeklyInputs {
    /// Raw samples for the whole week.
    pub samples: Section<Vec<Sample>>,
    /// One energy reading per day, Monday first.
    pub daily_energy_kwh: Vec<Section<Option<f64>>>,
    pub compressor: Section<CompressorProfile>,
    pub client: Section<ClientRecord>,
    pub prior_weeks: Vec<PriorWeekInputs>,
}

#[derive(Debug, Clone)]
pub struct PriorWeekInputs {
    pub period: Period,
    pub samples: Section<Vec<Sample>>,
    pub energy_kwh: Section<Option<f64>>,
}

pub fn compose_daily(
    key: RollupKey,
    date: NaiveDate,
    inputs: DailyInputs,
    settings: &RollupSettings,
) -> Result<DailyRollup> {
    let period = Period::day(date);
    let window = period.window(settings.offset)?;
    let classifier = inputs.compressor.as_ref().try_map(StateClassifier::new)?;
    let rate = resolve_rate(&inputs.client, settings)?;

    let normalized = inputs.samples.map(|raw| normalize(&raw, &window));
    let tally = normalized
        .as_ref()
        .zip(classifier.as_ref())
        .map(|(n, c)| tally_window(&n.samples, c, settings.max_sample_gap));

    let report = ReportParts {
        normalized,
        tally,
        kwh: energy_reading(&inputs.energy_kwh),
        rate,
        compressor: inputs.compressor,
        client: inputs.client,
    }
    .build(window.end, settings);

    let unavailable_sections = report.unavailable_sections();
    Ok(DailyRollup {
        client_id: key.client_id,
        line: key.line,
        period,
        window,
        report,
        partial: !unavailable_sections.is_empty(),
        unavailable_sections,
    })
}

/// Runs the daily pipeline for each day of the week, then recomputes the
/// week's KPIs from the merged day tallies so that days with more samples
/// weigh more.
pub fn compose_weekly(
    key: RollupKey,
    period: Period,
    inputs: WeeklyInputs,
    settings: &RollupSettings,
) -> Result<WeeklyRollup> {
    let window = period.window(settings.offset)?;
    let days = day_windows(&period, settings.offset)?;
    let classifier = inputs.compressor.as_ref().try_map(StateClassifier::new)?;
    let rate = resolve_rate(&inputs.client, settings)?;

    let normalized = inputs.samples.map(|raw| normalize(&raw, &window));
    let day_tallies = normalized
        .as_ref()
        .zip(classifier.as_ref())
        .map(|(n, c)| tally_days(&n.samples, &days, c, settings.max_sample_gap));
    let tally = day_tallies.as_ref().map(|d| merge_days(d));

    let day_kwh: Vec<Section<f64>> = inputs.daily_energy_kwh.iter().map(energy_reading).collect();
    let kwh = week_kwh(&days, &day_kwh);

    let days_section = day_tallies.map(|d| summarize_days(d, &day_kwh, &rate));

    let report = ReportParts {
        normalized,
        tally,
        kwh,
        rate: rate.clone(),
        compressor: inputs.compressor,
        client: inputs.client,
    }
    .build(window.end, settings);

    let comparison = compare_weeks(&report, &inputs.prior_weeks, &classifier, &rate, settings)?;

    let mut unavailable_sections = report.unavailable_sections();
    if !days_section.is_available() {
        unavailable_sections.push("days".to_string());
    }
    if !comparison.is_available() {
        unavailable_sections.push("comparison".to_string());
    }

    Ok(WeeklyRollup {
        client_id: key.client_id,
        line: key.line,
        period,
        window,
        report,
        days: days_section,
        comparison,
        partial: !unavailable_sections.is_empty(),
        unavailable_sections,
    })
}

/// Signed percentage change rounded to two decimals.
pub fn pct_change(current: Option<f64>, baseline: Option<f64>) -> Option<f64> {
    match (current, baseline) {
        (Some(current), Some(baseline)) if baseline != 0.0 => {
            Some(round2((current - baseline) / baseline * 100.0))
        }
        _ => None,
    }
}

fn resolve_rate(
    client: &Section<ClientRecord>,
    settings: &RollupSettings,
) -> Result<Section<BillingRate>> {
    client
        .as_ref()
        .try_map(|c| kpi::resolve_rate(c, settings.fallback_rate_usd_per_kwh))
}

fn energy_reading(reading: &Section<Option<f64>>) -> Section<f64> {
    reading.as_ref().and_then(|kwh| match *kwh {
        Some(kwh) if kwh.is_finite() && kwh >= 0.0 => Section::available(kwh),
        Some(kwh) => Section::unavailable(format!("invalid energy reading: {}", kwh)),
        None => Section::unavailable("no energy measurement for this period"),
    })
}

fn tally_window(samples: &[Sample], classifier: &StateClassifier, max_gap: Duration) -> OperationTally {
    let classified = classifier.classify(samples);
    OperationTally::from_window(samples, &classified, max_gap)
}

struct DayTally {
    date: NaiveDate,
    sample_count: usize,
    tally: OperationTally,
}

/// `samples` must be sorted. Classification restarts at each day boundary.
fn tally_days(
    samples: &[Sample],
    days: &[(NaiveDate, Window)],
    classifier: &StateClassifier,
    max_gap: Duration,
) -> Vec<DayTally> {
    days.iter()
        .map(|(date, window)| {
            let from = samples.partition_point(|s| s.time < window.start);
            let to = samples.partition_point(|s| s.time < window.end);
            let day = &samples[from..to];
            DayTally {
                date: *date,
                sample_count: day.len(),
                tally: tally_window(day, classifier, max_gap),
            }
        })
        .collect()
}

fn merge_days(days: &[DayTally]) -> OperationTally {
    days.iter().fold(OperationTally::default(), |mut acc, day| {
        acc.merge(&day.tally);
        acc
    })
}

fn week_kwh(days: &[(NaiveDate, Window)], readings: &[Section<f64>]) -> Section<f64> {
    if readings.len() != days.len() {
        return Section::unavailable(format!(
            "expected {} daily energy readings, got {}",
            days.len(),
            readings.len()
        ));
    }
    let mut total = 0.0;
    for ((date, _), reading) in days.iter().zip(readings) {
        match reading {
            Section::Available { value } => total += value,
            Section::Unavailable { reason } => {
                return Section::unavailable(format!("{}: {}", date, reason))
            }
        }
    }
    Section::available(total)
}

fn summarize_days(
    days: Vec<DayTally>,
    kwh: &[Section<f64>],
    rate: &Section<BillingRate>,
) -> Vec<DaySummary> {
    days.into_iter()
        .enumerate()
        .map(|(i, day)| {
            let energy = match kwh.get(i) {
                Some(reading) => reading
                    .as_ref()
                    .zip(rate.as_ref())
                    .map(|(kwh, rate)| EnergyKpis::new(*kwh, *rate)),
                None => Section::unavailable("no energy reading for this day"),
            };
            DaySummary {
                date: day.date,
                no_data: day.sample_count == 0,
                sample_count: day.sample_count,
                percentages: day.tally.percentages(),
                operation: day.tally.operation(),
                energy,
            }
        })
        .collect()
}

struct ReportParts {
    normalized: Section<NormalizedSamples>,
    tally: Section<OperationTally>,
    kwh: Section<f64>,
    rate: Section<BillingRate>,
    compressor: Section<CompressorProfile>,
    client: Section<ClientRecord>,
}

impl ReportParts {
    fn build(self, period_end: DateTime<Utc>, settings: &RollupSettings) -> RollupReport {
        let no_data = self
            .normalized
            .value()
            .is_some_and(NormalizedSamples::is_empty);
        let diagnostics = self.normalized.as_ref().map(|n| n.diagnostics);
        let series = self.normalized.as_ref().map(|n| Series {
            measurement: settings.measurement,
            bucket_width_secs: settings.bucket_width.num_seconds(),
            buckets: downsample::series(
                &n.samples,
                settings.measurement,
                settings.bucket_width,
                period_end,
            ),
        });

        let percentages = self.tally.as_ref().map(OperationTally::percentages);
        let operation = self.tally.as_ref().map(OperationTally::operation);
        let stability = self.tally.as_ref().map(OperationTally::stability);
        let energy = self
            .kwh
            .as_ref()
            .zip(self.rate.as_ref())
            .map(|(kwh, rate)| EnergyKpis::new(*kwh, *rate));
        let horsepower = self
            .kwh
            .as_ref()
            .zip(self.tally.as_ref())
            .zip(self.compressor.as_ref())
            .map(|((kwh, tally), profile)| {
                HorsepowerKpis::new(*kwh, tally.hours_worked(), profile.nominal_hp)
            });

        let mut comments = Vec::new();
        if no_data {
            comments.push(kpi::NO_DATA_COMMENT.to_string());
        } else {
            if let Some(op) = operation.value() {
                comments.push(kpi::cycle_rate_comment(op));
            }
            comments.extend(percentages.value().and_then(kpi::noload_comment));
            comments.extend(horsepower.value().and_then(kpi::horsepower_comment));
        }
        comments.extend(self.rate.value().and_then(kpi::rate_comment));

        RollupReport {
            no_data,
            diagnostics,
            percentages,
            operation,
            energy,
            horsepower,
            stability,
            series,
            compressor: self.compressor,
            client: self.client,
            comments,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct WeekFigures {
    kwh: Option<f64>,
    cost_usd: Option<f64>,
    cycles_per_hour: f64,
    hp_equivalent: Option<f64>,
    hours_worked: f64,
}

impl WeekComparison {
    fn new(current: &WeekFigures, baseline: &[(Period, WeekFigures)]) -> Self {
        let mean = |metric: fn(&WeekFigures) -> Option<f64>| -> Option<f64> {
            let values: Vec<f64> = baseline.iter().filter_map(|(_, w)| metric(w)).collect();
            (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
        };
        Self {
            baseline_weeks: baseline.iter().map(|(period, _)| *period).collect(),
            kwh_change_pct: pct_change(current.kwh, mean(|w| w.kwh)),
            cost_change_pct: pct_change(current.cost_usd, mean(|w| w.cost_usd)),
            cycles_per_hour_change_pct: pct_change(
                Some(current.cycles_per_hour),
                mean(|w| Some(w.cycles_per_hour)),
            ),
            hp_equivalent_change_pct: pct_change(current.hp_equivalent, mean(|w| w.hp_equivalent)),
            hours_worked_change_pct: pct_change(
                Some(current.hours_worked),
                mean(|w| Some(w.hours_worked)),
            ),
        }
    }
}

fn compare_weeks(
    current: &RollupReport,
    prior_weeks: &[PriorWeekInputs],
    classifier: &Section<StateClassifier>,
    rate: &Section<BillingRate>,
    settings: &RollupSettings,
) -> Result<Section<WeekComparison>> {
    let operation = match &current.operation {
        Section::Available { value } => value,
        Section::Unavailable { reason } => return Ok(Section::unavailable(reason.clone())),
    };
    let classifier = match classifier {
        Section::Available { value } => value,
        Section::Unavailable { reason } => return Ok(Section::unavailable(reason.clone())),
    };

    let this_week = WeekFigures {
        kwh: current.energy.value().map(|e| e.kwh),
        cost_usd: current.energy.value().map(|e| e.cost_usd),
        cycles_per_hour: operation.cycles_per_hour,
        hp_equivalent: current.horsepower.value().map(|hp| hp.hp_equivalent),
        hours_worked: operation.hours_worked,
    };

    let mut baseline = Vec::with_capacity(prior_weeks.len());
    for prior in prior_weeks {
        match prior_week_figures(prior, classifier, rate.value(), settings)? {
            Section::Available { value: Some(figures) } => baseline.push((prior.period, figures)),
            Section::Available { value: None } => {}
            Section::Unavailable { reason } => {
                return Ok(Section::unavailable(format!("{}: {}", prior.period, reason)))
            }
        }
    }

    Ok(Section::available(WeekComparison::new(&this_week, &baseline)))
}

/// `None` when the prior week has no samples and is left out of the baseline.
/// Prior weeks are costed at the current rate.
fn prior_week_figures(
    prior: &PriorWeekInputs,
    classifier: &StateClassifier,
    rate: Option<&BillingRate>,
    settings: &RollupSettings,
) -> Result<Section<Option<WeekFigures>>> {
    let raw = match &prior.samples {
        Section::Available { value } => value,
        Section::Unavailable { reason } => return Ok(Section::unavailable(reason.clone())),
    };
    let window = prior.period.window(settings.offset)?;
    let days = day_windows(&prior.period, settings.offset)?;

    let normalized = normalize(raw, &window);
    if normalized.is_empty() {
        return Ok(Section::available(None));
    }

    let tally = merge_days(&tally_days(
        &normalized.samples,
        &days,
        classifier,
        settings.max_sample_gap,
    ));
    let operation = tally.operation();
    let kwh = energy_reading(&prior.energy_kwh).into_value();

    Ok(Section::available(Some(WeekFigures {
        kwh: kwh.map(round2),
        cost_usd: kwh.zip(rate).map(|(kwh, rate)| kpi::cost_usd(kwh, rate.usd_per_kwh)),
        cycles_per_hour: operation.cycles_per_hour,
        hp_equivalent: kwh.map(|kwh| kpi::hp_equivalent(kwh, tally.hours_worked())),
        hours_worked: operation.hours_worked,
    })))
}

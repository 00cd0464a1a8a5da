use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::engine::period::{day_windows, fixed_offset};
use crate::engine::{
    compose_daily, compose_weekly, DailyInputs, DailyRollup, Measurement, Period,
    PriorWeekInputs, RollupKey, RollupSettings, Section, WeeklyInputs, WeeklyRollup, Window,
};
use crate::error::{AppError, Result};
use crate::repositories::ReportSource;

/// Fetches the inputs of a rollup concurrently and hands them to the
/// composer. Each fetch runs under its own timeout; a retryable failure or a
/// timeout marks only that section unavailable.
pub struct ReportService {
    source: Arc<dyn ReportSource>,
    engine: EngineConfig,
}

impl ReportService {
    pub fn new(source: Arc<dyn ReportSource>, engine: EngineConfig) -> Self {
        Self { source, engine }
    }

    /// The calendar day before `now` in the configured timezone.
    pub fn default_day(&self, now: DateTime<Utc>) -> Result<NaiveDate> {
        let offset = fixed_offset(self.engine.timezone_offset_hours)?;
        let days = Period::yesterday(now, offset).days()?;
        Ok(days[0])
    }

    /// The ISO week before the one containing `now`.
    pub fn default_week(&self, now: DateTime<Utc>) -> Result<Period> {
        let offset = fixed_offset(self.engine.timezone_offset_hours)?;
        Ok(Period::previous_week(now, offset))
    }

    pub async fn daily(
        &self,
        key: RollupKey,
        date: NaiveDate,
        measurement: Measurement,
    ) -> Result<DailyRollup> {
        let settings = RollupSettings::daily(&self.engine, measurement)?;
        let window = Period::day(date).window(settings.offset)?;
        let RollupKey { client_id, line } = key;

        let (samples, compressor, client, energy) = tokio::join!(
            self.guarded(
                "samples",
                self.source.samples(client_id, line, window.start, window.end)
            ),
            self.guarded("compressor", self.source.compressor(client_id, line)),
            self.guarded("client", self.source.client(client_id)),
            self.guarded(
                "energy",
                self.source.energy_kwh(client_id, line, window.start, window.end)
            ),
        );

        let inputs = DailyInputs {
            samples: samples?,
            compressor: registered(compressor?, || format!("compressor for {}", key))?,
            client: registered(client?, || format!("client {}", client_id))?,
            energy_kwh: energy?,
        };
        ensure_reachable(&[
            inputs.samples.reason(),
            inputs.compressor.reason(),
            inputs.client.reason(),
            inputs.energy_kwh.reason(),
        ])?;

        let rollup = compose_daily(key, date, inputs, &settings)?;
        let diagnostics = rollup.report.diagnostics.value();
        info!(
            client_id,
            line,
            period = %rollup.period,
            samples = diagnostics.map(|d| d.accepted),
            rejected = diagnostics.map(|d| d.rejected),
            no_data = rollup.report.no_data,
            unavailable = ?rollup.unavailable_sections,
            "daily rollup composed"
        );
        Ok(rollup)
    }

    pub async fn weekly(
        &self,
        key: RollupKey,
        period: Period,
        measurement: Measurement,
    ) -> Result<WeeklyRollup> {
        if !matches!(period, Period::Week { .. }) {
            return Err(AppError::InvalidInput(format!("{} is not an ISO week", period)));
        }
        let settings = RollupSettings::weekly(&self.engine, measurement)?;
        let window = period.window(settings.offset)?;
        let days = day_windows(&period, settings.offset)?;
        let prior_periods = (1..=self.engine.comparison_weeks)
            .map(|n| -> Result<(Period, Window)> {
                let prior = period.weeks_before(n)?;
                Ok((prior, prior.window(settings.offset)?))
            })
            .collect::<Result<Vec<(Period, Window)>>>()?;
        let RollupKey { client_id, line } = key;

        let daily_energy = join_all(days.iter().map(|(_, day)| {
            self.guarded(
                "energy",
                self.source.energy_kwh(client_id, line, day.start, day.end),
            )
        }));
        let prior_weeks = join_all(
            prior_periods
                .iter()
                .map(|&(prior, prior_window)| self.prior_week(key, prior, prior_window)),
        );

        let (samples, compressor, client, daily_energy, prior_weeks) = tokio::join!(
            self.guarded(
                "samples",
                self.source.samples(client_id, line, window.start, window.end)
            ),
            self.guarded("compressor", self.source.compressor(client_id, line)),
            self.guarded("client", self.source.client(client_id)),
            daily_energy,
            prior_weeks,
        );

        let inputs = WeeklyInputs {
            samples: samples?,
            daily_energy_kwh: daily_energy.into_iter().collect::<Result<Vec<_>>>()?,
            compressor: registered(compressor?, || format!("compressor for {}", key))?,
            client: registered(client?, || format!("client {}", client_id))?,
            prior_weeks: prior_weeks.into_iter().collect::<Result<Vec<_>>>()?,
        };
        let mut reasons = vec![
            inputs.samples.reason(),
            inputs.compressor.reason(),
            inputs.client.reason(),
        ];
        reasons.extend(inputs.daily_energy_kwh.iter().map(Section::reason));
        ensure_reachable(&reasons)?;

        let rollup = compose_weekly(key, period, inputs, &settings)?;
        let diagnostics = rollup.report.diagnostics.value();
        info!(
            client_id,
            line,
            period = %rollup.period,
            samples = diagnostics.map(|d| d.accepted),
            rejected = diagnostics.map(|d| d.rejected),
            no_data = rollup.report.no_data,
            baseline_weeks = rollup.comparison.value().map(|c| c.baseline_weeks.len()),
            unavailable = ?rollup.unavailable_sections,
            "weekly rollup composed"
        );
        Ok(rollup)
    }

    async fn prior_week(
        &self,
        key: RollupKey,
        period: Period,
        window: Window,
    ) -> Result<PriorWeekInputs> {
        let (samples, energy) = tokio::join!(
            self.guarded(
                "samples",
                self.source
                    .samples(key.client_id, key.line, window.start, window.end)
            ),
            self.guarded(
                "energy",
                self.source
                    .energy_kwh(key.client_id, key.line, window.start, window.end)
            ),
        );
        Ok(PriorWeekInputs {
            period,
            samples: samples?,
            energy_kwh: energy?,
        })
    }

    /// Run one section fetch under the section timeout. Non-retryable errors
    /// (unknown client, bad configuration) still abort the whole rollup.
    async fn guarded<T, F>(&self, section: &'static str, fetch: F) -> Result<Section<T>>
    where
        F: Future<Output = Result<T>>,
    {
        let timeout_ms = self.engine.section_timeout_ms;
        match tokio::time::timeout(Duration::from_millis(timeout_ms), fetch).await {
            Ok(Ok(value)) => Ok(Section::available(value)),
            Ok(Err(e)) if e.is_retryable() => {
                warn!(section, error = %e, "section unavailable");
                Ok(Section::unavailable(format!("{}: {}", section, e)))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(section, timeout_ms, "section timed out");
                Ok(Section::unavailable(format!(
                    "{}: timed out after {} ms",
                    section, timeout_ms
                )))
            }
        }
    }
}

/// A registry lookup that succeeded but found nothing is a not-found
/// condition, never an empty default.
fn registered<T>(section: Section<Option<T>>, what: impl FnOnce() -> String) -> Result<Section<T>> {
    match section {
        Section::Available { value: Some(value) } => Ok(Section::available(value)),
        Section::Available { value: None } => Err(AppError::NotFound(format!("{} not found", what()))),
        Section::Unavailable { reason } => Ok(Section::unavailable(reason)),
    }
}

/// With every section down there is nothing to render; report the upstream
/// failure so the caller can retry.
fn ensure_reachable(reasons: &[Option<&str>]) -> Result<()> {
    if !reasons.is_empty() && reasons.iter().all(Option::is_some) {
        let joined: Vec<&str> = reasons.iter().flatten().copied().collect();
        return Err(AppError::Upstream(joined.join("; ")));
    }
    Ok(())
}

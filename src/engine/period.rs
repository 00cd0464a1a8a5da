//! Reporting periods and the UTC windows they cover.
//!
//! Calendar days and ISO weeks are interpreted in a fixed UTC offset so that
//! bucketing never depends on the server's local timezone.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        time >= self.start && time < self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Period {
    Day { date: NaiveDate },
    Week { year: i32, week: u32 },
}

pub fn fixed_offset(hours: i32) -> Result<FixedOffset> {
    FixedOffset::east_opt(hours * 3600)
        .ok_or_else(|| AppError::Config(format!("invalid timezone offset: {} hours", hours)))
}

fn local_midnight(date: NaiveDate, offset: FixedOffset) -> Result<DateTime<Utc>> {
    date.and_time(NaiveTime::MIN)
        .and_local_timezone(offset)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| AppError::InvalidInput(format!("date {} has no local midnight", date)))
}

impl Period {
    pub fn day(date: NaiveDate) -> Self {
        Period::Day { date }
    }

    /// Validated ISO week.
    pub fn week(year: i32, week: u32) -> Result<Self> {
        NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).ok_or_else(|| {
            AppError::InvalidInput(format!("{} has no ISO week {}", year, week))
        })?;
        Ok(Period::Week { year, week })
    }

    /// The calendar day before `now`, in the given offset.
    pub fn yesterday(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        let today = now.with_timezone(&offset).date_naive();
        Period::Day {
            date: today - Duration::days(1),
        }
    }

    /// The ISO week before the one containing `now`, in the given offset.
    pub fn previous_week(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        let last_week = now.with_timezone(&offset).date_naive() - Duration::days(7);
        let iso = last_week.iso_week();
        Period::Week {
            year: iso.year(),
            week: iso.week(),
        }
    }

    /// Calendar days covered by this period, in order.
    pub fn days(&self) -> Result<Vec<NaiveDate>> {
        match *self {
            Period::Day { date } => Ok(vec![date]),
            Period::Week { year, week } => {
                let monday = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).ok_or_else(
                    || AppError::InvalidInput(format!("{} has no ISO week {}", year, week)),
                )?;
                Ok((0..7).map(|d| monday + Duration::days(d)).collect())
            }
        }
    }

    pub fn window(&self, offset: FixedOffset) -> Result<Window> {
        let days = self.days()?;
        let first = days[0];
        let last = days[days.len() - 1];
        Ok(Window::new(
            local_midnight(first, offset)?,
            local_midnight(last + Duration::days(1), offset)?,
        ))
    }

    /// The same kind of period shifted `n` weeks into the past.
    pub fn weeks_before(&self, n: u32) -> Result<Self> {
        let days = self.days()?;
        let shifted = days[0] - Duration::weeks(i64::from(n));
        Ok(match self {
            Period::Day { .. } => Period::Day { date: shifted },
            Period::Week { .. } => {
                let iso = shifted.iso_week();
                Period::Week {
                    year: iso.year(),
                    week: iso.week(),
                }
            }
        })
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Period::Day { date } => write!(f, "{}", date.format("%Y-%m-%d")),
            Period::Week { year, week } => write!(f, "{}-W{:02}", year, week),
        }
    }
}

/// Daily windows for every day of `period`.
pub fn day_windows(period: &Period, offset: FixedOffset) -> Result<Vec<(NaiveDate, Window)>> {
    period
        .days()?
        .into_iter()
        .map(|date| Ok((date, Period::day(date).window(offset)?)))
        .collect()
}

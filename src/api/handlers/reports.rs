use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};

use super::AppState;
use crate::{
    api::models::{DailyQuery, DataResponse, WeeklyQuery},
    engine::{DailyRollup, Measurement, Period, RollupKey, WeeklyRollup},
    error::{AppError, Result},
};

/// GET /api/v1/clients/{client_id}/lines/{line}/daily
/// Daily rollup; a period without samples is answered with a no-data 404
pub async fn get_daily(
    State(state): State<AppState>,
    Path((client_id, line)): Path<(i64, i32)>,
    Query(query): Query<DailyQuery>,
) -> Result<Json<DataResponse<DailyRollup>>> {
    let measurement = parse_measurement(query.measurement.as_deref())?;
    let date = match query.date.as_deref() {
        Some(raw) => parse_date(raw)?,
        None => state.reports.default_day(Utc::now())?,
    };
    let key = RollupKey { client_id, line };

    let rollup = state.reports.daily(key, date, measurement).await?;
    if rollup.is_no_data() {
        return Err(AppError::NoData(format!("no samples for {} on {}", key, date)));
    }

    Ok(Json(DataResponse { data: rollup }))
}

/// GET /api/v1/clients/{client_id}/lines/{line}/weekly
/// Weekly rollup with per-day breakdown and comparison to trailing weeks
pub async fn get_weekly(
    State(state): State<AppState>,
    Path((client_id, line)): Path<(i64, i32)>,
    Query(query): Query<WeeklyQuery>,
) -> Result<Json<DataResponse<WeeklyRollup>>> {
    let measurement = parse_measurement(query.measurement.as_deref())?;
    let period = match (query.year, query.week) {
        (Some(year), Some(week)) => Period::week(year, week)?,
        (None, None) => state.reports.default_week(Utc::now())?,
        _ => {
            return Err(AppError::InvalidInput(
                "year and week must be given together".to_string(),
            ))
        }
    };
    let key = RollupKey { client_id, line };

    let rollup = state.reports.weekly(key, period, measurement).await?;
    if rollup.is_no_data() {
        return Err(AppError::NoData(format!("no samples for {} in {}", key, period)));
    }

    Ok(Json(DataResponse { data: rollup }))
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::InvalidInput(format!("invalid date '{}', expected YYYY-MM-DD", raw)))
}

fn parse_measurement(raw: Option<&str>) -> Result<Measurement> {
    raw.map_or(Ok(Measurement::default()), str::parse)
}

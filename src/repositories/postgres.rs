use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, FromRow, Row};

use super::source::ReportSource;
use crate::db::DbPool;
use crate::engine::{ClientRecord, CompressorProfile, Sample};
use crate::error::Result;

/// Reads report inputs through the database's reporting functions. The
/// functions own the table layout; this side only knows their result shape.
pub struct PgReportSource {
    pool: DbPool,
}

impl PgReportSource {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

struct SampleRow(Sample);

impl<'r> FromRow<'r, PgRow> for SampleRow {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self(Sample {
            time: row.try_get("ts")?,
            current: row.try_get("current_amp")?,
            voltage: row.try_get("voltage")?,
        }))
    }
}

struct CompressorRow(CompressorProfile);

impl<'r> FromRow<'r, PgRow> for CompressorRow {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self(CompressorProfile {
            id: row.try_get("id")?,
            line: row.try_get("line")?,
            alias: row.try_get("alias")?,
            serial: row.try_get("serial")?,
            voltage: row.try_get("voltage")?,
            nominal_hp: row.try_get("nominal_hp")?,
            load_threshold_amp: row.try_get("load_threshold_amp")?,
            noload_threshold_amp: row.try_get("noload_threshold_amp")?,
            hysteresis_band_amp: row.try_get("hysteresis_band_amp")?,
        }))
    }
}

struct ClientRow(ClientRecord);

impl<'r> FromRow<'r, PgRow> for ClientRow {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self(ClientRecord {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            rate_usd_per_kwh: row.try_get("rate_usd_per_kwh")?,
            mask_energy: row
                .try_get::<Option<bool>, _>("mask_energy")?
                .unwrap_or(false),
        }))
    }
}

#[async_trait]
impl ReportSource for PgReportSource {
    async fn samples(
        &self,
        client_id: i64,
        line: i32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Sample>> {
        let rows = sqlx::query_as::<_, SampleRow>(
            r#"
            SELECT ts, current_amp, voltage
            FROM report_samples($1, $2, $3, $4)
            "#,
        )
        .bind(client_id)
        .bind(line)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|SampleRow(s)| s).collect())
    }

    async fn compressor(&self, client_id: i64, line: i32) -> Result<Option<CompressorProfile>> {
        let row = sqlx::query_as::<_, CompressorRow>(
            r#"
            SELECT id, line, alias, serial, voltage, nominal_hp,
                   load_threshold_amp, noload_threshold_amp, hysteresis_band_amp
            FROM report_compressor($1, $2)
            "#,
        )
        .bind(client_id)
        .bind(line)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|CompressorRow(p)| p))
    }

    async fn client(&self, client_id: i64) -> Result<Option<ClientRecord>> {
        let row = sqlx::query_as::<_, ClientRow>(
            r#"
            SELECT id, name, rate_usd_per_kwh, mask_energy
            FROM report_client($1)
            "#,
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|ClientRow(c)| c))
    }

    async fn energy_kwh(
        &self,
        client_id: i64,
        line: i32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        let kwh: Option<f64> = sqlx::query_scalar(
            r#"
            SELECT report_energy_kwh($1, $2, $3, $4)
            "#,
        )
        .bind(client_id)
        .bind(line)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        Ok(kwh)
    }
}

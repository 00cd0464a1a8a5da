use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::engine::{ClientRecord, CompressorProfile, Sample};
use crate::error::Result;

/// Everything a rollup reads from the outside world.
///
/// Missing registry entries are `Ok(None)`, not errors. Transport failures
/// are returned as retryable errors (`AppError::Upstream` or `AppError::Db`).
#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Raw samples for `[from, to)`, in any order.
    async fn samples(
        &self,
        client_id: i64,
        line: i32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Sample>>;

    async fn compressor(&self, client_id: i64, line: i32) -> Result<Option<CompressorProfile>>;

    async fn client(&self, client_id: i64) -> Result<Option<ClientRecord>>;

    /// Energy integral over `[from, to)`; `None` when the line has no energy
    /// measurement for the window.
    async fn energy_kwh(
        &self,
        client_id: i64,
        line: i32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<f64>>;
}

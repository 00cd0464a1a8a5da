//! Pure, synchronous rollup pipeline:
//! normalize -> classify -> count cycles / downsample -> KPIs -> rollup.

pub mod classify;
pub mod cycles;
pub mod downsample;
pub mod kpi;
pub mod model;
pub mod normalize;
pub mod period;
pub mod rollup;
pub mod section;

pub use model::{
    ClassifiedSample, ClientRecord, CompressorProfile, IntervalBucket, Measurement,
    OperatingState, Sample,
};
pub use period::{Period, Window};
pub use rollup::{
    compose_daily, compose_weekly, DailyInputs, DailyRollup, PriorWeekInputs, RollupKey,
    RollupSettings, WeeklyInputs, WeeklyRollup,
};
pub use section::Section;

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct DailyQuery {
    /// `YYYY-MM-DD`; defaults to yesterday.
    pub date: Option<String>,
    pub measurement: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WeeklyQuery {
    /// ISO week-numbering year. Given together with `week` or not at all.
    pub year: Option<i32>,
    pub week: Option<u32>,
    pub measurement: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

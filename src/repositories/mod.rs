pub mod postgres;
pub mod source;

pub use postgres::PgReportSource;
pub use source::ReportSource;

pub mod health;
pub mod reports;

use std::sync::Arc;

use crate::services::ReportService;

#[derive(Clone)]
pub struct AppState {
    pub reports: Arc<ReportService>,
}

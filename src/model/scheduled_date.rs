use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A calendar date opened for attendance at one sub-warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct ScheduledDate {
    #[schema(example = 31)]
    pub id: u64,
    #[schema(example = "2025-03-01", format = "date", value_type = String)]
    pub calendar_date: NaiveDate,
    #[schema(example = 4)]
    pub sub_warehouse_id: u64,
    pub active: bool,
}

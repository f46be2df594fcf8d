use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A worker lent to another sub-warehouse for a single day.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct WorkerRotation {
    pub id: u64,
    pub worker_id: u64,
    pub sub_warehouse_id: u64,
    #[schema(example = "2025-03-01", format = "date", value_type = String)]
    pub rotation_date: NaiveDate,
}

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Warehouse {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "Central Warehouse")]
    pub name: String,
    #[schema(example = "Main distribution centre", nullable = true)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct SubWarehouse {
    #[schema(example = 4)]
    pub id: u64,
    #[schema(example = "Cold storage A1")]
    pub name: String,
    #[schema(example = 1)]
    pub warehouse_id: u64,
    #[schema(example = "01:00:00", value_type = Option<String>)]
    pub break_duration: Option<NaiveTime>,
    #[schema(example = "08:00:00", value_type = Option<String>)]
    pub shift_duration: Option<NaiveTime>,
}

/// Sub-warehouse joined with the name of its warehouse.
#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct SubWarehouseInfo {
    pub sub_warehouse: String,
    pub warehouse: String,
    #[schema(value_type = Option<String>)]
    pub break_duration: Option<NaiveTime>,
    #[schema(value_type = Option<String>)]
    pub shift_duration: Option<NaiveTime>,
}

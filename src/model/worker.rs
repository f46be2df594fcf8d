use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 12,
    "name": "Juan Perez",
    "national_id": "12345678",
    "sub_warehouse_id": 4,
    "coordinator_id": 3,
    "target_hours": 8,
    "active": true
}))]
pub struct Worker {
    pub id: u64,
    pub name: String,
    pub national_id: String,
    pub sub_warehouse_id: u64,
    pub coordinator_id: Option<u64>,
    pub target_hours: i32,
    pub active: bool,
}

/// The slice of a worker the scheduler needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow, ToSchema)]
pub struct WorkerRef {
    pub id: u64,
    pub name: String,
    pub sub_warehouse_id: u64,
}

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Authorizes a coordinator on one sub-warehouse.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct AccessGrant {
    pub id: u64,
    pub user_id: u64,
    pub sub_warehouse_id: u64,
    #[schema(nullable = true)]
    pub entry_limit: Option<i32>,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct AccessGrantDetail {
    pub id: u64,
    pub user_id: u64,
    pub sub_warehouse_id: u64,
    pub entry_limit: Option<i32>,
    pub sub_warehouse_name: Option<String>,
    pub warehouse_name: Option<String>,
}

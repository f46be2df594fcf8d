use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// User as exposed by the API; the password hash never leaves the database layer.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 3,
    "name": "Coordinator North",
    "email": "coordinator@example.com",
    "role_id": 3,
    "active": true,
    "session_active": false
}))]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub role_id: u8,
    pub active: bool,
    /// Set while the user holds a live session.
    pub session_active: bool,
}

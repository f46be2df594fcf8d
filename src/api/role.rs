use actix_web::{HttpResponse, Responder};
use serde::Serialize;
use strum::IntoEnumIterator;
use utoipa::ToSchema;

use crate::model::role::Role;

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleView {
    pub id: u8,
    pub name: Role,
}

fn all_roles() -> Vec<RoleView> {
    Role::iter()
        .map(|role| RoleView {
            id: role.id(),
            name: role,
        })
        .collect()
}

/// List roles
///
/// Roles are fixed; there are no endpoints to change them.
#[utoipa::path(
    get,
    path = "/api/roles",
    responses((status = 200, description = "Every role", body = [RoleView])),
    tag = "Roles",
    security(("bearer_auth" = []))
)]
pub async fn list_roles() -> impl Responder {
    HttpResponse::Ok().json(all_roles())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_every_role_with_its_id() {
        let roles = all_roles();
        assert_eq!(roles.len(), 3);
        assert!(roles.iter().any(|r| r.id == 3 && r.name == Role::Coordinator));
    }
}

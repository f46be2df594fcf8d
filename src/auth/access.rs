//! Sub-warehouse authorization for coordinators.
//!
//! Admins see everything. Coordinators only see sub-warehouses listed in
//! their access grants. Workers have no back-office access.

use sqlx::MySqlPool;

use crate::auth::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::model::role::Role;

/// Which sub-warehouses a caller may read or write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Only(Vec<u64>),
}

impl Scope {
    pub fn allows(&self, sub_warehouse_id: u64) -> bool {
        match self {
            Scope::All => true,
            Scope::Only(ids) => ids.contains(&sub_warehouse_id),
        }
    }
}

pub async fn granted_sub_warehouses(pool: &MySqlPool, user_id: u64) -> AppResult<Vec<u64>> {
    Ok(sqlx::query_scalar::<_, u64>(
        "SELECT sub_warehouse_id FROM access_grants WHERE user_id = ? ORDER BY sub_warehouse_id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?)
}

pub async fn allowed_sub_warehouses(pool: &MySqlPool, user: &AuthUser) -> AppResult<Scope> {
    match user.role {
        Role::Admin => Ok(Scope::All),
        Role::Coordinator => Ok(Scope::Only(granted_sub_warehouses(pool, user.user_id).await?)),
        Role::Worker => Err(AppError::Forbidden("No access to sub-warehouses".into())),
    }
}

pub fn ensure_in_scope(scope: &Scope, sub_warehouse_id: u64) -> AppResult<()> {
    if scope.allows(sub_warehouse_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "No access to sub-warehouse {}",
            sub_warehouse_id
        )))
    }
}

pub async fn ensure_sub_warehouse_access(
    pool: &MySqlPool,
    user: &AuthUser,
    sub_warehouse_id: u64,
) -> AppResult<()> {
    ensure_in_scope(&allowed_sub_warehouses(pool, user).await?, sub_warehouse_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_membership() {
        assert!(Scope::All.allows(99));
        let only = Scope::Only(vec![1, 4]);
        assert!(only.allows(4));
        assert!(!only.allows(2));
        assert!(!Scope::Only(Vec::new()).allows(1));
    }

    #[test]
    fn out_of_scope_is_forbidden() {
        assert!(ensure_in_scope(&Scope::All, 7).is_ok());
        assert!(ensure_in_scope(&Scope::Only(vec![7]), 7).is_ok());
        assert!(matches!(
            ensure_in_scope(&Scope::Only(vec![1]), 7),
            Err(AppError::Forbidden(_))
        ));
    }
}

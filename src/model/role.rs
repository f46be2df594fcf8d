use serde::Serialize;
use strum::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, ToSchema, Display, AsRefStr, EnumString, EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Worker = 1,
    Admin = 2,
    Coordinator = 3,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Worker),
            2 => Some(Role::Admin),
            3 => Some(Role::Coordinator),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn ids_round_trip() {
        for role in Role::iter() {
            assert_eq!(Role::from_id(role.id()), Some(role));
        }
        assert_eq!(Role::from_id(0), None);
        assert_eq!(Role::from_id(4), None);
    }

    #[test]
    fn names_are_screaming_case() {
        assert_eq!(Role::Coordinator.to_string(), "COORDINATOR");
        assert_eq!(Role::from_str("ADMIN").unwrap(), Role::Admin);
    }
}

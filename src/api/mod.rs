pub mod access_grant;
pub mod attendance;
pub mod dashboard;
pub mod export;
pub mod health;
pub mod notifications;
pub mod role;
pub mod rotation;
pub mod scheduled_date;
pub mod sub_warehouse;
pub mod user;
pub mod warehouse;
pub mod worker;

pub mod access_grant;
pub mod attendance;
pub mod role;
pub mod rotation;
pub mod scheduled_date;
pub mod user;
pub mod warehouse;
pub mod worker;

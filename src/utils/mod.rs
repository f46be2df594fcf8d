pub mod db_utils;
pub mod email_cache;
pub mod email_filter;
pub mod serde_ext;
pub mod time_of_day;

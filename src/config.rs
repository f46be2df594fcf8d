use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use dotenvy::dotenv;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    pub db_max_connections: u32,
    pub run_migrations: bool,
    pub log_dir: String,

    /// Note written into placeholder rows when a date is scheduled.
    pub default_attendance_note: String,
    /// Reject a second login while the user's session flag is set.
    pub single_session: bool,
    pub notify_capacity: usize,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{} must be set", key))
}

fn parsed<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl: parsed("ACCESS_TOKEN_TTL", 900)?, // 15 min
            refresh_token_ttl: parsed("REFRESH_TOKEN_TTL", 604_800)?, // 7 days

            rate_login_per_min: parsed("RATE_LOGIN_PER_MIN", 60)?,
            rate_refresh_per_min: parsed("RATE_REFRESH_PER_MIN", 30)?,
            rate_protected_per_min: parsed("RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),

            db_max_connections: parsed("DB_MAX_CONNECTIONS", 10)?,
            run_migrations: parsed("RUN_MIGRATIONS", true)?,
            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),

            default_attendance_note: env::var("DEFAULT_ATTENDANCE_NOTE")
                .unwrap_or_else(|_| "No incidents".to_string()),
            single_session: parsed("SINGLE_SESSION", true)?,
            notify_capacity: parsed("NOTIFY_CAPACITY", 256)?,
        })
    }

    /// Settings for handler tests; never reads the environment.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            database_url: "mysql://localhost/attendance_test".into(),
            jwt_secret: "test-secret".into(),
            server_addr: "127.0.0.1:0".into(),
            access_token_ttl: 900,
            refresh_token_ttl: 3600,
            rate_login_per_min: 60,
            rate_refresh_per_min: 30,
            rate_protected_per_min: 1000,
            api_prefix: "/api".into(),
            db_max_connections: 1,
            run_migrations: false,
            log_dir: "logs".into(),
            default_attendance_note: "No incidents".into(),
            single_session: true,
            notify_capacity: 16,
        }
    }
}

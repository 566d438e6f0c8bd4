use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub dispatch_queue_size: usize,
    pub event_buffer_size: usize,
    /// Wait before retrying when no courier is free.
    pub dispatch_backoff_secs: u64,
    /// How long a courier has to accept a dispatched offer.
    pub response_timeout_secs: u64,
    /// Highest number per sequence prefix before rollover (A-999 -> B-001).
    pub sequence_ceiling: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            dispatch_queue_size: 1024,
            event_buffer_size: 1024,
            dispatch_backoff_secs: 60,
            response_timeout_secs: 120,
            sequence_ceiling: 999,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            dispatch_queue_size: parse_or_default("DISPATCH_QUEUE_SIZE", defaults.dispatch_queue_size)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            dispatch_backoff_secs: parse_or_default(
                "DISPATCH_BACKOFF_SECS",
                defaults.dispatch_backoff_secs,
            )?,
            response_timeout_secs: parse_or_default(
                "DISPATCH_RESPONSE_TIMEOUT_SECS",
                defaults.response_timeout_secs,
            )?,
            sequence_ceiling: parse_or_default("SEQUENCE_CEILING", defaults.sequence_ceiling)?,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

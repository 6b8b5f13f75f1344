use crate::error::ConfigError;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub db_max_connections: u32,
    pub sse: SseConfig,
    pub seed_default_poll: bool,
}

/// Tuning for the live-update stream.
#[derive(Debug, Clone, Copy)]
pub struct SseConfig {
    /// Interval between keep-alive comment frames on an idle connection.
    pub keepalive_interval: Duration,
    /// Upper bound on a single push to one connection.
    pub push_timeout: Duration,
    /// Frames buffered per connection before pushes start to wait.
    pub channel_capacity: usize,
}

impl Default for SseConfig {
    fn default() -> Self {
        SseConfig {
            keepalive_interval: Duration::from_secs(30),
            push_timeout: Duration::from_millis(2000),
            channel_capacity: 16,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // .env is optional
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let defaults = SseConfig::default();

        let channel_capacity = parse_or(&lookup, "SSE_CHANNEL_CAPACITY", defaults.channel_capacity)?;
        if channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                name: "SSE_CHANNEL_CAPACITY",
                value: "0".to_string(),
            });
        }

        let keepalive_secs: u64 = parse_or(
            &lookup,
            "SSE_KEEPALIVE_SECS",
            defaults.keepalive_interval.as_secs(),
        )?;
        if keepalive_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "SSE_KEEPALIVE_SECS",
                value: "0".to_string(),
            });
        }

        Ok(Config {
            database_url,
            bind_addr: parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 20)?,
            sse: SseConfig {
                keepalive_interval: Duration::from_secs(keepalive_secs),
                push_timeout: Duration::from_millis(parse_or(
                    &lookup,
                    "SSE_PUSH_TIMEOUT_MS",
                    defaults.push_timeout.as_millis() as u64,
                )?),
                channel_capacity,
            },
            seed_default_poll: parse_or(&lookup, "SEED_DEFAULT_POLL", true)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            value: value.clone(),
        }),
        None => Ok(default),
    }
}

//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use autodialer_shared::constants;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:3000`
    pub http_addr: SocketAddr,

    /// A device not seen for this long is swept to `disconnected`.
    /// Env: `DEVICE_TIMEOUT_MS`
    /// Default: `60000`
    pub device_timeout: Duration,

    /// How often the liveness sweep runs.
    /// Env: `SWEEP_INTERVAL_SECS`
    /// Default: `10`
    pub sweep_interval: Duration,

    /// Maximum numbers per conference group.
    /// Env: `MAX_GROUP_SIZE`
    /// Default: `6`
    pub max_group_size: usize,

    /// Retries allowed before a queued message is dropped.
    /// Env: `MAX_MESSAGE_RETRIES`
    /// Default: `3`
    pub max_message_retries: u32,

    /// Minimum digits for a number to be dialable.
    /// Env: `MIN_NUMBER_DIGITS`
    /// Default: `8`
    pub min_number_digits: usize,

    // -- Handed to devices on connect --

    /// Env: `POLLING_INTERVAL_MS`
    pub polling_interval_ms: u64,

    /// Env: `HEARTBEAT_INTERVAL_MS`
    pub heartbeat_interval_ms: u64,

    /// Env: `CLIENT_MAX_RETRIES`
    pub client_max_retries: u32,

    /// SQLite file for the inspection mirror.
    /// Env: `DATABASE_PATH`
    /// Default: unset (mirror disabled).
    pub database_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], constants::DEFAULT_HTTP_PORT).into(),
            device_timeout: Duration::from_millis(constants::DEVICE_TIMEOUT_MS),
            sweep_interval: Duration::from_secs(constants::SWEEP_INTERVAL_SECS),
            max_group_size: constants::MAX_GROUP_SIZE,
            max_message_retries: constants::MAX_MESSAGE_RETRIES,
            min_number_digits: constants::MIN_NUMBER_DIGITS,
            polling_interval_ms: constants::CLIENT_POLLING_INTERVAL_MS,
            heartbeat_interval_ms: constants::CLIENT_HEARTBEAT_INTERVAL_MS,
            client_max_retries: constants::CLIENT_MAX_RETRIES,
            database_path: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(ms) = parse_var::<u64>(&lookup, "DEVICE_TIMEOUT_MS") {
            config.device_timeout = Duration::from_millis(ms);
        }

        if let Some(secs) = parse_var::<u64>(&lookup, "SWEEP_INTERVAL_SECS") {
            if secs > 0 {
                config.sweep_interval = Duration::from_secs(secs);
            } else {
                tracing::warn!("SWEEP_INTERVAL_SECS must be positive, using default");
            }
        }

        if let Some(size) = parse_var::<usize>(&lookup, "MAX_GROUP_SIZE") {
            if size > 0 {
                config.max_group_size = size;
            } else {
                tracing::warn!("MAX_GROUP_SIZE must be positive, using default");
            }
        }

        if let Some(n) = parse_var(&lookup, "MAX_MESSAGE_RETRIES") {
            config.max_message_retries = n;
        }

        if let Some(n) = parse_var(&lookup, "MIN_NUMBER_DIGITS") {
            config.min_number_digits = n;
        }

        if let Some(ms) = parse_var(&lookup, "POLLING_INTERVAL_MS") {
            config.polling_interval_ms = ms;
        }

        if let Some(ms) = parse_var(&lookup, "HEARTBEAT_INTERVAL_MS") {
            config.heartbeat_interval_ms = ms;
        }

        if let Some(n) = parse_var(&lookup, "CLIENT_MAX_RETRIES") {
            config.client_max_retries = n;
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            if !path.trim().is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid numeric setting, using default");
            None
        }
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the [`EscrowConfig`] loaded from
//! them once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding `escrow.redb` | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `SEAL_KEY` | Base64 AES-256 key for sealed credentials | Required |
//! | `MODERATOR_KEY_HASH` | Digest of the console key | Console disabled if unset |
//! | `NOTIFY_WEBHOOK_URL` | Chat bot webhook base URL | Log-only gateway |
//! | `REQUEST_TTL_SECS` | Time an uploader has to answer | `86400` |
//! | `SWEEP_INTERVAL_SECS` | Expiry sweep period | `30` |
//! | `SESSION_TTL_SECS` | Member session lifetime | `7200` |
//! | `PBKDF2_ITERATIONS` | Password hashing work factor | `600000` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use base64ct::{Base64, Encoding};
use url::Url;

use crate::codec::{DEFAULT_PBKDF2_ITERATIONS, SEAL_KEY_LEN};

/// Directory holding the escrow database.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const DEFAULT_DATA_DIR: &str = "/data";
/// Database file name inside `DATA_DIR`.
pub const DB_FILE_NAME: &str = "escrow.redb";

pub const HOST_ENV: &str = "HOST";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const PORT_ENV: &str = "PORT";
pub const DEFAULT_PORT: u16 = 8080;

/// Base64 of the 32-byte key sealing game credentials.
///
/// Losing it makes every vaulted credential unrecoverable.
pub const SEAL_KEY_ENV: &str = "SEAL_KEY";

/// Codec digest of the moderator console key.
pub const MODERATOR_KEY_HASH_ENV: &str = "MODERATOR_KEY_HASH";

pub const NOTIFY_WEBHOOK_URL_ENV: &str = "NOTIFY_WEBHOOK_URL";

pub const REQUEST_TTL_SECS_ENV: &str = "REQUEST_TTL_SECS";
pub const DEFAULT_REQUEST_TTL_SECS: u64 = 24 * 60 * 60;

pub const SWEEP_INTERVAL_SECS_ENV: &str = "SWEEP_INTERVAL_SECS";
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;

pub const SESSION_TTL_SECS_ENV: &str = "SESSION_TTL_SECS";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 2 * 60 * 60;

pub const PBKDF2_ITERATIONS_ENV: &str = "PBKDF2_ITERATIONS";

pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl LogFormat {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "" => Ok(LogFormat::Pretty),
            other => Err(ConfigError::Invalid {
                var: LOG_FORMAT_ENV,
                reason: format!("expected `json` or `pretty`, got `{other}`"),
            }),
        }
    }
}

#[derive(Clone)]
pub struct EscrowConfig {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub seal_key: Vec<u8>,
    pub moderator_key_hash: Option<String>,
    pub notify_webhook_url: Option<Url>,
    pub request_ttl: chrono::Duration,
    pub sweep_interval: Duration,
    pub session_ttl: chrono::Duration,
    pub pbkdf2_iterations: u32,
    pub log_format: LogFormat,
}

impl fmt::Debug for EscrowConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EscrowConfig")
            .field("data_dir", &self.data_dir)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("seal_key", &"<redacted>")
            .field("console_enabled", &self.moderator_key_hash.is_some())
            .field("notify_webhook_url", &self.notify_webhook_url.as_ref().map(Url::as_str))
            .field("request_ttl", &self.request_ttl)
            .field("sweep_interval", &self.sweep_interval)
            .field("session_ttl", &self.session_ttl)
            .field("pbkdf2_iterations", &self.pbkdf2_iterations)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl EscrowConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let seal_key = match get(SEAL_KEY_ENV) {
            Some(raw) => decode_seal_key(&raw)?,
            None => return Err(ConfigError::Missing(SEAL_KEY_ENV)),
        };

        let notify_webhook_url = get(NOTIFY_WEBHOOK_URL_ENV)
            .map(|raw| parse_webhook_url(&raw))
            .transpose()?;

        let port = match get(PORT_ENV) {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                var: PORT_ENV,
                reason: format!("`{raw}` is not a port number"),
            })?,
            None => DEFAULT_PORT,
        };

        let pbkdf2_iterations = positive(
            PBKDF2_ITERATIONS_ENV,
            get(PBKDF2_ITERATIONS_ENV),
            u64::from(DEFAULT_PBKDF2_ITERATIONS),
        )?;
        let pbkdf2_iterations =
            u32::try_from(pbkdf2_iterations).map_err(|_| ConfigError::Invalid {
                var: PBKDF2_ITERATIONS_ENV,
                reason: "too large".into(),
            })?;

        let request_ttl =
            positive(REQUEST_TTL_SECS_ENV, get(REQUEST_TTL_SECS_ENV), DEFAULT_REQUEST_TTL_SECS)?;
        let session_ttl =
            positive(SESSION_TTL_SECS_ENV, get(SESSION_TTL_SECS_ENV), DEFAULT_SESSION_TTL_SECS)?;
        let sweep_interval = positive(
            SWEEP_INTERVAL_SECS_ENV,
            get(SWEEP_INTERVAL_SECS_ENV),
            DEFAULT_SWEEP_INTERVAL_SECS,
        )?;

        Ok(Self {
            data_dir: PathBuf::from(get(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.into())),
            host: get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.into()),
            port,
            seal_key,
            moderator_key_hash: get(MODERATOR_KEY_HASH_ENV).map(|h| h.trim().to_string()),
            notify_webhook_url,
            request_ttl: seconds(REQUEST_TTL_SECS_ENV, request_ttl)?,
            sweep_interval: Duration::from_secs(sweep_interval),
            session_ttl: seconds(SESSION_TTL_SECS_ENV, session_ttl)?,
            pbkdf2_iterations,
            log_format: get(LOG_FORMAT_ENV)
                .map(|raw| LogFormat::parse(&raw))
                .transpose()?
                .unwrap_or_default(),
        })
    }

    /// Path of the redb file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn decode_seal_key(raw: &str) -> Result<Vec<u8>, ConfigError> {
    let key = Base64::decode_vec(raw.trim()).map_err(|_| ConfigError::Invalid {
        var: SEAL_KEY_ENV,
        reason: "not valid base64".into(),
    })?;
    if key.len() != SEAL_KEY_LEN {
        return Err(ConfigError::Invalid {
            var: SEAL_KEY_ENV,
            reason: format!("expected {SEAL_KEY_LEN} bytes, got {}", key.len()),
        });
    }
    Ok(key)
}

fn parse_webhook_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::Invalid {
        var: NOTIFY_WEBHOOK_URL_ENV,
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            var: NOTIFY_WEBHOOK_URL_ENV,
            reason: format!("unsupported scheme `{}`", url.scheme()),
        });
    }
    Ok(url)
}

fn positive(var: &'static str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => Err(ConfigError::Invalid {
            var,
            reason: format!("expected a positive integer, got `{raw}`"),
        }),
        Ok(value) => Ok(value),
    }
}

fn seconds(var: &'static str, secs: u64) -> Result<chrono::Duration, ConfigError> {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or(ConfigError::Invalid {
            var,
            reason: "out of range".into(),
        })
}

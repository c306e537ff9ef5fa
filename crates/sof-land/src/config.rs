//! Environment-driven configuration for the ledger client, relay client, and engines.

use std::time::Duration;

use thiserror::Error;

use crate::{bundle::RelayRpcConfig, confirm::ConfirmConfig, ledger::LedgerRpcConfig};

/// Ledger JSON-RPC endpoint.
pub const RPC_URL_ENV: &str = "SOF_LAND_RPC_URL";
/// Comma-separated block-engine endpoints, primary first.
pub const BLOCK_ENGINE_URLS_ENV: &str = "SOF_LAND_BLOCK_ENGINE_URLS";
/// Overall confirmation timeout in seconds.
pub const CONFIRM_TIMEOUT_SECS_ENV: &str = "SOF_LAND_CONFIRM_TIMEOUT_SECS";
/// Rebroadcast cadence in milliseconds.
pub const REBROADCAST_INTERVAL_MS_ENV: &str = "SOF_LAND_REBROADCAST_INTERVAL_MS";
/// Status poll cadence in milliseconds.
pub const POLL_INTERVAL_MS_ENV: &str = "SOF_LAND_POLL_INTERVAL_MS";
/// Re-sign-and-resend cadence in milliseconds.
pub const RESUBMIT_INTERVAL_MS_ENV: &str = "SOF_LAND_RESUBMIT_INTERVAL_MS";
/// Whether `sendTransaction` skips preflight.
pub const SKIP_PREFLIGHT_ENV: &str = "SOF_LAND_SKIP_PREFLIGHT";
/// Commitment level for ledger queries.
pub const COMMITMENT_ENV: &str = "SOF_LAND_COMMITMENT";
/// Per-request HTTP timeout in milliseconds.
pub const HTTP_TIMEOUT_MS_ENV: &str = "SOF_LAND_HTTP_TIMEOUT_MS";

/// Default overall confirmation timeout.
const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors returned while reading configuration.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ConfigError {
    /// Required variable was unset or blank.
    #[error("required environment variable {name} is not set")]
    Missing {
        /// Variable name.
        name: &'static str,
    },
    /// Variable did not hold a positive integer.
    #[error("environment variable {name} must be a positive integer, got {value:?}")]
    InvalidNumber {
        /// Variable name.
        name: &'static str,
        /// Raw value.
        value: String,
    },
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LandConfig {
    /// Ledger JSON-RPC endpoint.
    pub rpc_url: String,
    /// Ledger client tuning.
    pub ledger: LedgerRpcConfig,
    /// Relay client tuning.
    pub relay: RelayRpcConfig,
    /// Confirmation engine tuning.
    pub confirm: ConfirmConfig,
    /// Overall confirmation timeout.
    pub confirm_timeout: Duration,
}

impl LandConfig {
    /// Reads configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the RPC URL is missing or a numeric variable is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the RPC URL is missing or a numeric variable is invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let rpc_url = read(RPC_URL_ENV).ok_or(ConfigError::Missing { name: RPC_URL_ENV })?;

        let mut ledger = LedgerRpcConfig::default();
        ledger.skip_preflight = read_bool(&read, SKIP_PREFLIGHT_ENV, ledger.skip_preflight);
        if let Some(commitment) = read(COMMITMENT_ENV) {
            ledger.commitment = commitment;
        }
        if let Some(millis) = read_millis(&read, HTTP_TIMEOUT_MS_ENV)? {
            ledger.request_timeout = millis;
        }

        let mut relay = RelayRpcConfig {
            request_timeout: ledger.request_timeout,
            ..RelayRpcConfig::default()
        };
        if let Some(urls) = read(BLOCK_ENGINE_URLS_ENV) {
            let endpoints: Vec<String> = urls
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_owned)
                .collect();
            if !endpoints.is_empty() {
                relay.endpoints = endpoints;
            }
        }

        let mut confirm = ConfirmConfig::default();
        if let Some(interval) = read_millis(&read, REBROADCAST_INTERVAL_MS_ENV)? {
            confirm.rebroadcast_interval = interval;
        }
        if let Some(interval) = read_millis(&read, POLL_INTERVAL_MS_ENV)? {
            confirm.poll_interval = interval;
        }
        if let Some(interval) = read_millis(&read, RESUBMIT_INTERVAL_MS_ENV)? {
            confirm.resubmit_interval = interval;
        }

        let confirm_timeout = read_positive(&read, CONFIRM_TIMEOUT_SECS_ENV)?
            .map_or(DEFAULT_CONFIRM_TIMEOUT, Duration::from_secs);

        Ok(Self {
            rpc_url,
            ledger,
            relay,
            confirm: confirm.normalized(),
            confirm_timeout,
        })
    }
}

/// Parses a boolean flag; unrecognized text falls back to `default`.
fn read_bool(read: &impl Fn(&str) -> Option<String>, name: &str, default: bool) -> bool {
    read(name)
        .map(|value| match value.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => true,
            "0" | "false" | "FALSE" | "no" | "NO" => false,
            _ => default,
        })
        .unwrap_or(default)
}

/// Parses a positive integer when the variable is set.
fn read_positive(
    read: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<u64>, ConfigError> {
    let Some(value) = read(name) else {
        return Ok(None);
    };
    match value.parse::<u64>() {
        Ok(parsed) if parsed > 0 => Ok(Some(parsed)),
        _ => Err(ConfigError::InvalidNumber { name, value }),
    }
}

/// Parses a positive millisecond count when the variable is set.
fn read_millis(
    read: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    Ok(read_positive(read, name)?.map(Duration::from_millis))
}

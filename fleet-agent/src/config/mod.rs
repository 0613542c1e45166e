//! Agent configuration.
//!
//! Configuration is read once at startup from the process environment (after
//! loading a `.env` file if one exists). Nothing here is reconfigurable at runtime.

use std::time::Duration;

use crate::logging::DEFAULT_LOG_FILTER;
use crate::reporter::DEFAULT_QUEUE_THRESHOLD;
use crate::{Error, Result};

pub const ENV_FLEET_URL: &str = "FLEET_URL";
pub const ENV_API_KEY: &str = "FLEET_ACCESS_API_KEY";
pub const ENV_AGENT_ID: &str = "FLEET_AGENT_ID";
pub const ENV_CHECKIN_INTERVAL_MS: &str = "FLEET_CHECKIN_INTERVAL_MS";
pub const ENV_CHECKIN_JITTER_MS: &str = "FLEET_CHECKIN_JITTER_MS";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "FLEET_REQUEST_TIMEOUT_MS";
pub const ENV_QUEUE_THRESHOLD: &str = "FLEET_EVENT_QUEUE_THRESHOLD";
pub const ENV_LOG_FILTER: &str = "RUST_LOG";

/// Default spacing between check-ins.
pub const DEFAULT_CHECKIN_INTERVAL: Duration = Duration::from_secs(1);

/// Default upper bound of the random delay added to each check-in.
pub const DEFAULT_CHECKIN_JITTER: Duration = Duration::from_secs(1);

/// Default request timeout for the control plane client.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Cadence of the gateway's check-in loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewaySettings {
    /// Base spacing between two check-ins.
    pub interval: Duration,
    /// Upper bound (exclusive) of the random delay added to every spacing.
    pub jitter: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_CHECKIN_INTERVAL,
            jitter: DEFAULT_CHECKIN_JITTER,
        }
    }
}

impl GatewaySettings {
    pub fn new(interval: Duration, jitter: Duration) -> Self {
        Self { interval, jitter }
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::config("check-in interval must be greater than zero"));
        }
        Ok(())
    }
}

/// Everything the agent binary needs to run.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub fleet_url: String,
    pub api_key: String,
    pub agent_id: String,
    pub request_timeout: Duration,
    pub queue_threshold: usize,
    pub log_filter: String,
    pub gateway: GatewaySettings,
}

impl AgentConfig {
    /// Load the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let fleet_url = required(&lookup, ENV_FLEET_URL)?;
        let api_key = required(&lookup, ENV_API_KEY)?;
        let agent_id = optional(&lookup, ENV_AGENT_ID)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        if !fleet_api::is_valid_agent_id(&agent_id) {
            return Err(Error::config(format!(
                "{} {:?} must only contain ASCII letters, digits, '-', '_', '.' or '~'",
                ENV_AGENT_ID, agent_id
            )));
        }

        let interval =
            millis(&lookup, ENV_CHECKIN_INTERVAL_MS)?.unwrap_or(DEFAULT_CHECKIN_INTERVAL);
        let jitter = millis(&lookup, ENV_CHECKIN_JITTER_MS)?.unwrap_or(DEFAULT_CHECKIN_JITTER);
        let request_timeout =
            millis(&lookup, ENV_REQUEST_TIMEOUT_MS)?.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let queue_threshold = match optional(&lookup, ENV_QUEUE_THRESHOLD) {
            Some(raw) => raw.parse::<usize>().map_err(|e| {
                Error::config(format!(
                    "{} must be a number, got {:?}: {}",
                    ENV_QUEUE_THRESHOLD, raw, e
                ))
            })?,
            None => DEFAULT_QUEUE_THRESHOLD,
        };
        if queue_threshold == 0 {
            return Err(Error::config(format!(
                "{} must be greater than zero",
                ENV_QUEUE_THRESHOLD
            )));
        }

        let log_filter =
            optional(&lookup, ENV_LOG_FILTER).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let gateway = GatewaySettings::new(interval, jitter);
        gateway.validate()?;

        Ok(Self {
            fleet_url,
            api_key,
            agent_id,
            request_timeout,
            queue_threshold,
            log_filter,
            gateway,
        })
    }
}

fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, key).ok_or_else(|| Error::config(format!("{} is not set", key)))
}

fn millis<F>(lookup: &F, key: &str) -> Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, key)
        .map(|raw| {
            raw.parse::<u64>().map(Duration::from_millis).map_err(|e| {
                Error::config(format!("{} must be milliseconds, got {:?}: {}", key, raw, e))
            })
        })
        .transpose()
}

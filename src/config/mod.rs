//! # Configuration Management Module
//!
//! The orchestrator is configured entirely from the process environment (see
//! `spec.md` §6's "Config surface"), not from a config file — there is no
//! interactive setup wizard here, just a process that is handed its
//! collaborators' addresses and started. [`AppConfig::from_env`] reads every
//! variable, applies defaults where the spec allows one, and validates the
//! result once at startup so a misconfigured deployment fails fast instead of
//! surfacing as a confusing runtime error hours later.
//!
//! ## Sections
//!
//! - [`StoreConfig`] — where the embedded Atomic Store lives on disk.
//! - [`FabricConfig`] — Call Fabric (realtime voice/SIP platform) address.
//! - [`LlmConfig`] — LLM adapter credentials and endpoint.
//! - [`EmailConfig`] — outbound email adapter credentials and endpoint.
//! - [`WorkerConfig`] — tick interval, batch size, concurrency, timeouts.
//!
//! ## Validation
//!
//! - `SIP_OUTBOUND_TRUNK_ID` must match one of the known trunk-id prefixes
//!   (`trunk_`, `sip-trunk-`); this is the one field the spec calls out
//!   explicitly (§6) as needing to match a known trunk prefix.
//! - Numeric fields fall back to their documented defaults on parse failure,
//!   with a warning, rather than aborting startup over a typo'd env var.

use std::env;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while assembling [`AppConfig`] from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {field}: {value:?} ({reason})")]
    Invalid {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Known SIP outbound trunk id prefixes. A deployment's `SIP_OUTBOUND_TRUNK_ID`
/// must start with one of these or [`AppConfig::from_env`] rejects it outright
/// — a malformed trunk id would otherwise only fail once the first outbound
/// call is attempted.
const KNOWN_TRUNK_PREFIXES: &[&str] = &["trunk_", "sip-trunk-"];

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Filesystem path to the embedded sled database directory backing the
    /// Atomic Store. The spec's `STORE_URL` is interpreted as this path
    /// rather than a network address — there is no separate store process.
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct FabricConfig {
    pub base_url: String,
    pub sip_outbound_trunk_id: String,
    pub agent_name: String,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub base_url: String,
    pub api_key: String,
    pub from_address: String,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub tick_interval: Duration,
    pub max_batch: usize,
    pub concurrency: usize,
    pub call_timeout: Duration,
    pub drain_timeout: Duration,
    /// Grace period added to `call_timeout` before the orphan reaper
    /// (`spec.md` §9) reclaims a stuck `InProgress` item.
    pub reaper_grace: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub fabric: FabricConfig,
    pub llm: LlmConfig,
    pub email: EmailConfig,
    pub worker: WorkerConfig,
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn env_var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_duration_secs_or(name: &'static str, default_secs: u64) -> Duration {
    match env::var(name) {
        Ok(raw) => match raw.parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(_) => {
                log::warn!("{name}={raw:?} is not a valid integer, using default {default_secs}s");
                Duration::from_secs(default_secs)
            }
        },
        Err(_) => Duration::from_secs(default_secs),
    }
}

fn env_usize_or(name: &'static str, default: usize) -> usize {
    match env::var(name) {
        Ok(raw) => match raw.parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => {
                log::warn!("{name}={raw:?} is not a positive integer, using default {default}");
                default
            }
        },
        Err(_) => default,
    }
}

impl AppConfig {
    /// Assemble configuration from the process environment, applying the
    /// defaults named in `spec.md` §6 and rejecting a handful of values that
    /// cannot be fixed up with a default (missing credentials, a trunk id
    /// that doesn't look like a trunk id).
    pub fn from_env() -> Result<Self, ConfigError> {
        let sip_outbound_trunk_id = env_var("SIP_OUTBOUND_TRUNK_ID")?;
        if !KNOWN_TRUNK_PREFIXES
            .iter()
            .any(|prefix| sip_outbound_trunk_id.starts_with(prefix))
        {
            return Err(ConfigError::Invalid {
                field: "SIP_OUTBOUND_TRUNK_ID",
                value: sip_outbound_trunk_id,
                reason: "must start with a known trunk prefix (trunk_, sip-trunk-)",
            });
        }

        let store = StoreConfig {
            path: env_var_or("STORE_URL", "data/postop-store"),
        };
        let fabric = FabricConfig {
            base_url: env_var("CALL_FABRIC_URL")?,
            sip_outbound_trunk_id,
            agent_name: env_var_or("AGENT_NAME", "postop-followup-agent"),
        };
        let llm = LlmConfig {
            api_key: env_var("LLM_API_KEY")?,
            base_url: env_var_or("LLM_API_URL", "https://api.anthropic.com/v1"),
            model: env_var_or("LLM_MODEL", "claude-3-5-sonnet-latest"),
        };
        let email = EmailConfig {
            base_url: env_var("EMAIL_API_URL")?,
            api_key: env_var("EMAIL_API_KEY")?,
            from_address: env_var_or("EMAIL_FROM_ADDRESS", "care-team@postop.example"),
        };
        let call_timeout = env_duration_secs_or("CALL_TIMEOUT_S", 300);
        let worker = WorkerConfig {
            tick_interval: env_duration_secs_or("TICK_INTERVAL_S", 60),
            max_batch: env_usize_or("MAX_BATCH", 50),
            concurrency: env_usize_or("WORKER_CONCURRENCY", 4),
            call_timeout,
            drain_timeout: env_duration_secs_or("DRAIN_TIMEOUT_S", 60),
            reaper_grace: Duration::from_secs(30),
        };

        Ok(Self {
            store,
            fabric,
            llm,
            email,
            worker,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_trunk_prefix() {
        let err = validate_trunk("not-a-trunk");
        assert!(err.is_err());
    }

    #[test]
    fn accepts_known_trunk_prefixes() {
        assert!(validate_trunk("trunk_main").is_ok());
        assert!(validate_trunk("sip-trunk-east").is_ok());
    }

    fn validate_trunk(id: &str) -> Result<(), ConfigError> {
        if KNOWN_TRUNK_PREFIXES.iter().any(|p| id.starts_with(p)) {
            Ok(())
        } else {
            Err(ConfigError::Invalid {
                field: "SIP_OUTBOUND_TRUNK_ID",
                value: id.to_string(),
                reason: "must start with a known trunk prefix",
            })
        }
    }
}

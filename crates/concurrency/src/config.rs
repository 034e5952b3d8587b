//! Controller configuration via `lockstep.toml`
//!
//! Selects the protocol and, for strict 2PL, how lock waits are bounded.
//! Timestamp protocols never wait, so the deadlock settings are ignored there.

use crate::controller::{ConcurrencyController, Protocol};
use crate::deadlock::{CycleDetection, DeadlockPolicy, TimeoutPolicy, WaitDie, WaitIndefinitely};
use crate::events::EventSink;
use crate::strict2pl::Strict2PLController;
use crate::timestamp::{BasicWriteRule, ThomasTimestampController, TimestampController};
use lockstep_core::{Error, ItemKey, Result, Storage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Config file name used by convention.
pub const CONFIG_FILE_NAME: &str = "lockstep.toml";

/// How strict 2PL handles waits that may never end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeadlockStrategy {
    /// Wait as long as it takes
    None,
    /// Abort a waiter after `lock_timeout_ms`
    Timeout,
    /// Wait-die by registration timestamp
    WaitDie,
    /// Abort a requester that would close a wait-for cycle
    #[default]
    Detect,
}

impl fmt::Display for DeadlockStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeadlockStrategy::None => f.write_str("none"),
            DeadlockStrategy::Timeout => f.write_str("timeout"),
            DeadlockStrategy::WaitDie => f.write_str("wait-die"),
            DeadlockStrategy::Detect => f.write_str("detect"),
        }
    }
}

/// Controller configuration loaded from `lockstep.toml`.
///
/// # Example
///
/// ```toml
/// protocol = "strict-2pl"
/// deadlock = "timeout"
/// lock_timeout_ms = 250
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerConfig {
    /// `"strict-2pl"`, `"timestamp"` or `"timestamp-twr"`.
    #[serde(default)]
    pub protocol: Protocol,
    /// `"none"`, `"timeout"`, `"wait-die"` or `"detect"`.
    #[serde(default)]
    pub deadlock: DeadlockStrategy,
    /// Maximum lock wait in milliseconds; required by `"timeout"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_timeout_ms: Option<u64>,
}

impl ControllerConfig {
    /// Config for `protocol` with the remaining settings at their defaults
    pub fn for_protocol(protocol: Protocol) -> Self {
        ControllerConfig {
            protocol,
            ..Self::default()
        }
    }

    /// Check settings that parse but cannot be used.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `deadlock = "timeout"` lacks a positive
    /// `lock_timeout_ms`.
    pub fn validate(&self) -> Result<()> {
        match (self.deadlock, self.lock_timeout_ms) {
            (DeadlockStrategy::Timeout, None) => Err(Error::InvalidConfig(
                "deadlock = \"timeout\" requires lock_timeout_ms".to_string(),
            )),
            (_, Some(0)) => Err(Error::InvalidConfig(
                "lock_timeout_ms must be greater than zero".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Deadlock policy for lock-based protocols.
    ///
    /// # Errors
    ///
    /// Same as [`validate`](Self::validate).
    pub fn deadlock_policy(&self) -> Result<Arc<dyn DeadlockPolicy>> {
        self.validate()?;
        Ok(match self.deadlock {
            DeadlockStrategy::None => Arc::new(WaitIndefinitely),
            DeadlockStrategy::Timeout => Arc::new(TimeoutPolicy::new(Duration::from_millis(
                self.lock_timeout_ms.unwrap_or_default(),
            ))),
            DeadlockStrategy::WaitDie => Arc::new(WaitDie),
            DeadlockStrategy::Detect => Arc::new(CycleDetection),
        })
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Lockstep concurrency control configuration
#
# Protocol: "strict-2pl" (default), "timestamp" or "timestamp-twr"
#   "strict-2pl"    = shared/exclusive locks held until commit or rollback
#   "timestamp"     = timestamp ordering, late accesses abort
#   "timestamp-twr" = timestamp ordering with the Thomas write rule
protocol = "strict-2pl"

# Deadlock handling for strict-2pl: "none", "timeout", "wait-die" or "detect" (default)
deadlock = "detect"

# Maximum lock wait, required when deadlock = "timeout"
# lock_timeout_ms = 500
"#
    }

    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the document does not parse or fails validation.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ControllerConfig = toml::from_str(content)
            .map_err(|e| Error::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate config from a file path.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::InvalidConfig(msg) => {
                Error::InvalidConfig(format!("{} ({})", msg, path.display()))
            }
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::InvalidConfig(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::InvalidConfig(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::InvalidConfig(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

/// Build the controller `config` selects over `storage`.
///
/// # Errors
///
/// `InvalidConfig` if the config fails validation.
pub fn build_controller<K, V, S>(
    config: &ControllerConfig,
    storage: S,
    sink: Arc<dyn EventSink>,
) -> Result<Box<dyn ConcurrencyController<K, V>>>
where
    K: ItemKey,
    V: 'static,
    S: Storage<K, V> + 'static,
{
    config.validate()?;
    let controller: Box<dyn ConcurrencyController<K, V>> = match config.protocol {
        Protocol::Strict2pl => Box::new(Strict2PLController::<K, V, S>::with_policy(
            storage,
            config.deadlock_policy()?,
            sink,
        )),
        Protocol::Timestamp => Box::new(
            TimestampController::<K, V, S, BasicWriteRule>::with_sink(storage, sink),
        ),
        Protocol::TimestampTwr => Box::new(ThomasTimestampController::<K, V, S>::with_sink(
            storage, sink,
        )),
    };
    Ok(controller)
}

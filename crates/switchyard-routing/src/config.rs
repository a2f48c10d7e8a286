//! Configuration for a router node

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchyard_core::RouterIdentity;

use crate::error::{RoutingError, RoutingResult};

/// Credit granted to every incoming link on attach
pub const DEFAULT_INITIAL_CREDIT: u32 = 32;

/// Interval between maintenance timer firings
pub const DEFAULT_TIMER_INTERVAL_MS: u64 = 1000;

/// Configuration for a [`RouterNode`](crate::RouterNode)
///
/// Missing fields in a TOML file fall back to the defaults.
///
/// ```toml
/// area = "east"
/// router_id = "r1"
/// initial_credit = 64
/// max_queue_depth = 10000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Area this router belongs to
    pub area: String,
    /// Router id within the area
    pub router_id: String,
    /// Credit granted to incoming links on attach
    pub initial_credit: u32,
    /// Maintenance timer interval in milliseconds
    pub timer_interval_ms: u64,
    /// Maximum messages queued per outgoing link (unbounded if `None`)
    pub max_queue_depth: Option<usize>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            area: "area0".to_string(),
            router_id: "router0".to_string(),
            initial_credit: DEFAULT_INITIAL_CREDIT,
            timer_interval_ms: DEFAULT_TIMER_INTERVAL_MS,
            max_queue_depth: None,
        }
    }
}

impl RouterConfig {
    /// Create a configuration for the given area and router id
    pub fn new(area: impl Into<String>, router_id: impl Into<String>) -> Self {
        Self {
            area: area.into(),
            router_id: router_id.into(),
            ..Self::default()
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> RoutingResult<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> RoutingResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Check the configuration for values the router cannot run with
    pub fn validate(&self) -> RoutingResult<()> {
        self.identity()?;
        if self.initial_credit == 0 {
            return Err(RoutingError::Config(
                "initial_credit must be greater than zero".to_string(),
            ));
        }
        if self.timer_interval_ms == 0 {
            return Err(RoutingError::Config(
                "timer_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_queue_depth == Some(0) {
            return Err(RoutingError::Config(
                "max_queue_depth must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }

    /// The router identity used for address classification
    pub fn identity(&self) -> RoutingResult<RouterIdentity> {
        RouterIdentity::new(self.area.clone(), self.router_id.clone())
            .map_err(|e| RoutingError::Config(e.to_string()))
    }

    /// Maintenance timer interval
    pub fn timer_interval(&self) -> Duration {
        Duration::from_millis(self.timer_interval_ms)
    }

    /// Set the initial credit for incoming links
    pub fn with_initial_credit(mut self, credit: u32) -> Self {
        self.initial_credit = credit;
        self
    }

    /// Set the maintenance timer interval
    pub fn with_timer_interval(mut self, interval: Duration) -> Self {
        self.timer_interval_ms = interval.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    /// Bound the per-link outbound queue
    pub fn with_max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = Some(depth);
        self
    }
}

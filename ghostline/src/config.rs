//! Exchange strategy selection.
//!
//! The strategy is picked once at startup, from code, a JSON document or the
//! environment:
//!
//! ```text
//! GHOSTLINE_STRATEGY=persistent   # or "probing" (default)
//! GHOSTLINE_YIELD=true            # yield the CPU between probe sweeps
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ExchangeError, ExchangeResult};

/// Environment variable selecting the strategy.
pub const STRATEGY_ENV: &str = "GHOSTLINE_STRATEGY";

/// Environment variable enabling yields between probe sweeps.
pub const YIELD_ENV: &str = "GHOSTLINE_YIELD";

/// How inbound message sizes are discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Probe for each inbound message every round and allocate to fit.
    #[default]
    Probing,
    /// Negotiate sizes once, then restart bound requests every round.
    Persistent,
}

impl Strategy {
    /// Lower-case name, as accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Probing => "probing",
            Strategy::Persistent => "persistent",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "probing" | "probe" => Ok(Strategy::Probing),
            "persistent" => Ok(Strategy::Persistent),
            other => Err(ExchangeError::Config {
                message: format!("unknown strategy {other:?} (expected probing or persistent)"),
            }),
        }
    }
}

/// Configuration for [`Engine::from_config`](crate::Engine::from_config).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Strategy used for every package.
    pub strategy: Strategy,

    /// Yield the thread between probe sweeps instead of spinning.
    ///
    /// Only read by the probing strategy. Useful when ranks outnumber cores.
    pub yield_between_sweeps: bool,
}

impl ExchangeConfig {
    /// Configuration for the probing strategy.
    pub fn probing() -> Self {
        Self::default()
    }

    /// Configuration for the persistent strategy.
    pub fn persistent() -> Self {
        Self {
            strategy: Strategy::Persistent,
            ..Self::default()
        }
    }

    /// Set whether to yield between probe sweeps.
    pub fn with_yield_between_sweeps(mut self, yield_between_sweeps: bool) -> Self {
        self.yield_between_sweeps = yield_between_sweeps;
        self
    }

    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> ExchangeResult<Self> {
        serde_json::from_str(json).map_err(|e| ExchangeError::Config {
            message: e.to_string(),
        })
    }

    /// Read [`STRATEGY_ENV`] and [`YIELD_ENV`]; unset variables keep defaults.
    pub fn from_env() -> ExchangeResult<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> ExchangeResult<Self> {
        let mut config = Self::default();
        if let Some(strategy) = lookup(STRATEGY_ENV) {
            config.strategy = strategy.parse()?;
        }
        if let Some(value) = lookup(YIELD_ENV) {
            config.yield_between_sweeps = parse_flag(YIELD_ENV, &value)?;
        }
        Ok(config)
    }
}

fn parse_flag(name: &str, value: &str) -> ExchangeResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ExchangeError::Config {
            message: format!("{name}={other:?} is not a boolean"),
        }),
    }
}

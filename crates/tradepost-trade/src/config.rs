//! Engine configuration.
//!
//! Loaded from an optional TOML file, then overridden by `TRADEPOST__*`
//! environment variables (e.g. `TRADEPOST__REFUND_FRACTION=0.8`).

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tradepost_economics::credit::DEFAULT_CREDIT_RATE_PERCENT;
use tradepost_economics::guard::{
    DEFAULT_ACCEPT_COOLDOWN_SECS, DEFAULT_COUNTERPARTY_CAP_FRACTION, DEFAULT_PREMIUM_ACCEPT_COOLDOWN_SECS,
};
use tradepost_economics::{CreditPolicy, GuardPolicy};

pub const ENV_PREFIX: &str = "TRADEPOST";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub player_id: String,
    /// Display hash other players see
    pub player_hash: String,
    pub player_name: String,
    /// Proof of the player's right to trade, attached to every order
    pub capability_token: String,
    pub premium: bool,
    /// Share of a cancelled sell order's resource that is returned
    pub refund_fraction: f64,
    /// Market-cap credit quota, percent of total valuation
    pub credit_rate_percent: f64,
    pub counterparty_cap_fraction: f64,
    pub accept_cooldown_secs: i64,
    pub premium_accept_cooldown_secs: i64,
    /// Smallest post-tax amount an accept may settle
    pub min_fill_amount: f64,
    pub first_trade_bonus_points: f64,
    pub auto_claim: bool,
    pub remote_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            player_id: String::new(),
            player_hash: String::new(),
            player_name: String::new(),
            capability_token: String::new(),
            premium: false,
            refund_fraction: 0.9,
            credit_rate_percent: DEFAULT_CREDIT_RATE_PERCENT,
            counterparty_cap_fraction: DEFAULT_COUNTERPARTY_CAP_FRACTION,
            accept_cooldown_secs: DEFAULT_ACCEPT_COOLDOWN_SECS,
            premium_accept_cooldown_secs: DEFAULT_PREMIUM_ACCEPT_COOLDOWN_SECS,
            min_fill_amount: 1.0,
            first_trade_bonus_points: 5.0,
            auto_claim: true,
            remote_timeout_ms: 10_000,
        }
    }
}

impl EngineConfig {
    /// Load from `path` (if given and present) layered with environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }
        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true))
            .build()?;
        let config: EngineConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a TOML string, without environment overrides
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.player_id.is_empty() {
            return Err(ConfigError::Invalid("player_id must be set".to_string()));
        }
        if !(self.refund_fraction > 0.0 && self.refund_fraction <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "refund_fraction must be in (0, 1], got {}",
                self.refund_fraction
            )));
        }
        if !(self.min_fill_amount.is_finite() && self.min_fill_amount > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "min_fill_amount must be positive, got {}",
                self.min_fill_amount
            )));
        }
        if self.remote_timeout_ms == 0 {
            return Err(ConfigError::Invalid("remote_timeout_ms must be positive".to_string()));
        }
        if self.first_trade_bonus_points < 0.0 {
            return Err(ConfigError::Invalid("first_trade_bonus_points cannot be negative".to_string()));
        }
        self.credit_policy()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.guard_policy()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }

    pub fn credit_policy(&self) -> CreditPolicy {
        CreditPolicy {
            credit_rate_percent: self.credit_rate_percent,
        }
    }

    pub fn guard_policy(&self) -> GuardPolicy {
        GuardPolicy {
            counterparty_cap_fraction: self.counterparty_cap_fraction,
            accept_cooldown_secs: self.accept_cooldown_secs,
            premium_accept_cooldown_secs: self.premium_accept_cooldown_secs,
        }
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

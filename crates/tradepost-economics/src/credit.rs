/// TAX CREDIT POOLS
///
/// Two independently replenishing exemption buckets:
/// - production credit, per resource, earned by producing the good yourself
/// - market-cap credit, a single quota proportional to total valuation
///
/// The tracker owns only the "used" counters. They grow monotonically within
/// an epoch and are advanced exactly once per acknowledged trade.

use crate::catalog::ResourceKind;
use crate::production::ProductionState;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Default market-cap credit quota (percent of total valuation)
pub const DEFAULT_CREDIT_RATE_PERCENT: f64 = 1.0;

/// Credit currently available for a prospective trade, in currency
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AvailableCredit {
    pub production: f64,
    pub market_cap: f64,
}

impl AvailableCredit {
    pub fn total(&self) -> f64 {
        self.production + self.market_cap
    }
}

/// What a single `consume` call drained
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CreditConsumption {
    /// Production credit drained, in currency
    pub production_value: f64,
    /// Same amount expressed in resource units
    pub production_units: f64,
    /// Market-cap credit drained, in currency
    pub market_cap_value: f64,
    /// Trade value that no credit covered
    pub uncovered_value: f64,
}

/// Snapshot of the "used" counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreditUsage {
    /// Production credit consumed per resource, in resource units
    pub production_used: BTreeMap<ResourceKind, f64>,
    /// Market-cap credit consumed, in currency
    pub market_cap_used: f64,
}

impl CreditUsage {
    pub fn production_used(&self, resource: ResourceKind) -> f64 {
        self.production_used.get(&resource).copied().unwrap_or(0.0)
    }
}

/// Credit pool parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditPolicy {
    /// Market-cap credit quota as a percentage of total valuation
    pub credit_rate_percent: f64,
}

impl CreditPolicy {
    pub fn new() -> Self {
        CreditPolicy {
            credit_rate_percent: DEFAULT_CREDIT_RATE_PERCENT,
        }
    }

    pub fn validate(&self) -> Result<(), CreditError> {
        if !self.credit_rate_percent.is_finite() || self.credit_rate_percent < 0.0 {
            return Err(CreditError::InvalidPolicy(format!(
                "credit_rate_percent must be a non-negative number, got {}",
                self.credit_rate_percent
            )));
        }
        Ok(())
    }
}

impl Default for CreditPolicy {
    fn default() -> Self {
        CreditPolicy::new()
    }
}

/// Credit pool tracker for the local player
pub struct CreditPoolTracker {
    production: Arc<dyn ProductionState>,
    policy: CreditPolicy,
    usage: Mutex<CreditUsage>,
}

impl CreditPoolTracker {
    pub fn new(production: Arc<dyn ProductionState>, policy: CreditPolicy) -> Result<Self, CreditError> {
        policy.validate()?;
        Ok(CreditPoolTracker {
            production,
            policy,
            usage: Mutex::new(CreditUsage::default()),
        })
    }

    pub fn policy(&self) -> &CreditPolicy {
        &self.policy
    }

    /// Credit available for trading `resource` at `price`. No side effects.
    pub fn available(&self, resource: ResourceKind, price: f64) -> AvailableCredit {
        let usage = self.usage.lock();
        self.available_with(&usage, resource, price)
    }

    fn available_with(&self, usage: &CreditUsage, resource: ResourceKind, price: f64) -> AvailableCredit {
        let unit_value = price * self.production.regional_multiplier(resource);
        let remaining_units =
            (self.production.production_accrued(resource) - usage.production_used(resource)).max(0.0);
        let production = if unit_value.is_finite() && unit_value > 0.0 {
            remaining_units * unit_value
        } else {
            0.0
        };

        let quota = self.production.total_valuation() * self.policy.credit_rate_percent / 100.0;
        let market_cap = (quota - usage.market_cap_used).max(0.0);

        AvailableCredit {
            production: production.max(0.0),
            market_cap,
        }
    }

    /// Drain credit for an acknowledged trade of `amount` units at `price`.
    ///
    /// Production credit for the resource is drained first; the remainder goes
    /// to market-cap credit. Value beyond both pools is left uncovered since the
    /// corresponding tax was already charged when the trade was assessed.
    pub fn consume(&self, resource: ResourceKind, amount: f64, price: f64) -> CreditConsumption {
        let value = amount * price;
        if !value.is_finite() || value <= 0.0 {
            return CreditConsumption::default();
        }

        let mut usage = self.usage.lock();
        let available = self.available_with(&usage, resource, price);

        let production_value = value.min(available.production);
        let unit_value = price * self.production.regional_multiplier(resource);
        let production_units = if production_value > 0.0 && unit_value > 0.0 {
            production_value / unit_value
        } else {
            0.0
        };
        if production_units > 0.0 {
            *usage.production_used.entry(resource).or_insert(0.0) += production_units;
        }

        let remainder = value - production_value;
        let market_cap_value = remainder.min(available.market_cap).max(0.0);
        usage.market_cap_used += market_cap_value;

        let consumption = CreditConsumption {
            production_value,
            production_units,
            market_cap_value,
            uncovered_value: (remainder - market_cap_value).max(0.0),
        };
        log::debug!(
            "Consumed credit for {} x{} @ {}: production={} market_cap={} uncovered={}",
            resource,
            amount,
            price,
            consumption.production_value,
            consumption.market_cap_value,
            consumption.uncovered_value
        );
        consumption
    }

    /// Current "used" counters
    pub fn usage(&self) -> CreditUsage {
        self.usage.lock().clone()
    }

    /// Start a new accrual epoch
    pub fn reset_epoch(&self) {
        let mut usage = self.usage.lock();
        *usage = CreditUsage::default();
        log::info!("Credit pool usage reset for new epoch");
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CreditError {
    #[error("Invalid credit policy: {0}")]
    InvalidPolicy(String),
}

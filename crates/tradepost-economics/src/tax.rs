/// TRADE TAX ENGINE
///
/// Tax owed on a prospective trade. Available credit is subtracted from the
/// gross value first; whatever is left is taxed at a rate that grows with the
/// deviation of the posted price from the local reference price.
///
/// Rate curve over d = |price - local| / local, clamped to [0, 1]:
///   d <= 0.50        rate = 0.5 * d
///   0.50 < d <= 0.75 rate = 0.25 + (d - 0.5)
///   d > 0.75         rate = 0.5 + 2 * (d - 0.75), capped at 1.0
///
/// Near-market trades are nearly tax-free; far-off-market trades are taxed
/// away entirely.

use crate::catalog::{Catalog, CatalogError, ResourceKind};
use crate::credit::{AvailableCredit, CreditPoolTracker};
use crate::oracle::PriceOracle;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Full breakdown of a tax computation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaxAssessment {
    pub resource: ResourceKind,
    pub amount: f64,
    pub price: f64,
    pub local_price: f64,
    /// Relative price deviation after clamping
    pub deviation: f64,
    pub credit_available: AvailableCredit,
    pub production_credit_used: f64,
    pub market_cap_credit_used: f64,
    pub gross_value: f64,
    pub taxable_value: f64,
    /// Curve rate applied to the taxable value
    pub rate: f64,
    /// Tax as a share of the gross value
    pub effective_rate: f64,
    /// Tax in currency
    pub tax_payable: f64,
    /// Tax in resource units
    pub tax_payable_units: f64,
    pub amount_after_tax: f64,
}

impl TaxAssessment {
    pub fn credit_used(&self) -> f64 {
        self.production_credit_used + self.market_cap_credit_used
    }
}

/// Relative deviation of `price` from `local_price`, clamped to [0, 1]
pub fn price_deviation(price: f64, local_price: f64) -> f64 {
    ((price - local_price).abs() / local_price).clamp(0.0, 1.0)
}

/// Piecewise-linear tax rate for a clamped deviation
pub fn deviation_rate(deviation: f64) -> f64 {
    let d = deviation.clamp(0.0, 1.0);
    if d <= 0.5 {
        0.5 * d
    } else if d <= 0.75 {
        0.25 + (d - 0.5)
    } else {
        (0.5 + 2.0 * (d - 0.75)).min(1.0)
    }
}

/// Pure tax assessment from explicit inputs
pub fn assess(
    resource: ResourceKind,
    amount: f64,
    price: f64,
    local_price: f64,
    credit: AvailableCredit,
) -> Result<TaxAssessment, TaxError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(TaxError::InvalidArgument(format!("price must be positive, got {}", price)));
    }
    if !amount.is_finite() || amount < 0.0 {
        return Err(TaxError::InvalidArgument(format!(
            "amount must be non-negative, got {}",
            amount
        )));
    }
    if !local_price.is_finite() || local_price <= 0.0 {
        return Err(TaxError::InvalidArgument(format!(
            "reference price for {} must be positive, got {}",
            resource, local_price
        )));
    }

    let gross_value = amount * price;
    let production_credit_used = credit.production.max(0.0).min(gross_value);
    let market_cap_credit_used = credit.market_cap.max(0.0).min(gross_value - production_credit_used);
    let taxable_value = (gross_value - production_credit_used - market_cap_credit_used).max(0.0);

    let deviation = price_deviation(price, local_price);
    let rate = deviation_rate(deviation);
    let tax_payable = rate * taxable_value;
    let effective_rate = if tax_payable > 0.0 && gross_value > 0.0 {
        tax_payable / gross_value
    } else {
        0.0
    };

    Ok(TaxAssessment {
        resource,
        amount,
        price,
        local_price,
        deviation,
        credit_available: credit,
        production_credit_used,
        market_cap_credit_used,
        gross_value,
        taxable_value,
        rate,
        effective_rate,
        tax_payable,
        tax_payable_units: tax_payable / price,
        amount_after_tax: ((gross_value - tax_payable) / price).max(0.0),
    })
}

/// Tax engine bound to the live catalog, oracle and credit pools
pub struct TaxEngine {
    catalog: Arc<Catalog>,
    oracle: Arc<dyn PriceOracle>,
    credits: Arc<CreditPoolTracker>,
}

impl TaxEngine {
    pub fn new(catalog: Arc<Catalog>, oracle: Arc<dyn PriceOracle>, credits: Arc<CreditPoolTracker>) -> Self {
        TaxEngine { catalog, oracle, credits }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn credits(&self) -> &Arc<CreditPoolTracker> {
        &self.credits
    }

    /// Tax on trading `amount` of `resource` at `price`. Reads state only.
    pub fn compute_tax(&self, resource: ResourceKind, amount: f64, price: f64) -> Result<TaxAssessment, TaxError> {
        self.catalog.ensure_tradable(resource)?;
        if !price.is_finite() || price <= 0.0 {
            return Err(TaxError::InvalidArgument(format!("price must be positive, got {}", price)));
        }
        let local_price = self.oracle.current_price(resource);
        let credit = self.credits.available(resource, price);
        let assessment = assess(resource, amount, price, local_price, credit)?;

        log::debug!(
            "Tax for {} x{} @ {} (local {}): rate={:.4} taxable={:.4} tax={:.4} after={:.4}",
            resource,
            amount,
            price,
            local_price,
            assessment.rate,
            assessment.taxable_value,
            assessment.tax_payable,
            assessment.amount_after_tax
        );
        Ok(assessment)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TaxError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

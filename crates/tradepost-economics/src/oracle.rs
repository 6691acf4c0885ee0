/// PRICE ORACLE
///
/// Supplies the current local reference price for a resource. The engine only
/// reads prices; whoever owns the market feed updates them.

use crate::catalog::ResourceKind;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Fallback reference price for resources that were never quoted
pub const DEFAULT_REFERENCE_PRICE: f64 = 1.0;

/// Read access to local reference prices
pub trait PriceOracle: Send + Sync {
    /// Current reference price; always positive
    fn current_price(&self, resource: ResourceKind) -> f64;
}

/// In-memory oracle fed by the market subsystem
#[derive(Debug, Default)]
pub struct StaticPriceOracle {
    prices: RwLock<BTreeMap<ResourceKind, f64>>,
}

impl StaticPriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prices<I>(prices: I) -> Self
    where
        I: IntoIterator<Item = (ResourceKind, f64)>,
    {
        let oracle = Self::new();
        for (resource, price) in prices {
            oracle.set_price(resource, price);
        }
        oracle
    }

    /// Update a quote. Non-positive or non-finite quotes are ignored.
    pub fn set_price(&self, resource: ResourceKind, price: f64) {
        if !(price.is_finite() && price > 0.0) {
            log::warn!("Ignoring invalid reference price {} for {}", price, resource);
            return;
        }
        self.prices.write().insert(resource, price);
    }
}

impl PriceOracle for StaticPriceOracle {
    fn current_price(&self, resource: ResourceKind) -> f64 {
        self.prices
            .read()
            .get(&resource)
            .copied()
            .unwrap_or(DEFAULT_REFERENCE_PRICE)
    }
}

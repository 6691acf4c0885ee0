/// TRADEPOST ECONOMICS
///
/// Local economic rules applied to player trades before the remote authority
/// sees them:
/// - Tax is charged on value not covered by credit, scaled by price deviation
/// - Credit pools replenish from production and valuation
/// - Counterparty concentration and accept frequency are capped
///
/// Nothing here talks to the network; the trade crate drives these rules.

pub mod catalog;
pub mod oracle;
pub mod production;
pub mod credit;
pub mod tax;
pub mod guard;

// Re-export key types for easy access
pub use catalog::{Catalog, CatalogError, ResourceCategory, ResourceInfo, ResourceKind};

pub use oracle::{PriceOracle, StaticPriceOracle};

pub use production::{ProductionState, StaticProductionState};

pub use credit::{
    AvailableCredit, CreditConsumption, CreditError, CreditPolicy, CreditPoolTracker, CreditUsage,
};

pub use tax::{assess, deviation_rate, price_deviation, TaxAssessment, TaxEngine, TaxError};

pub use guard::{Admission, GuardPolicy, GuardRejection, RateGuard};

/// Economic system integrator (wires catalog, pools, tax and guard together)
pub mod integration {
    use crate::*;
    use std::sync::Arc;

    pub struct TradeEconomics {
        pub catalog: Arc<Catalog>,
        pub oracle: Arc<dyn PriceOracle>,
        pub production: Arc<dyn ProductionState>,
        pub credits: Arc<CreditPoolTracker>,
        pub tax: TaxEngine,
        pub guard: RateGuard,
    }

    impl TradeEconomics {
        pub fn new(
            catalog: Arc<Catalog>,
            oracle: Arc<dyn PriceOracle>,
            production: Arc<dyn ProductionState>,
            credit_policy: CreditPolicy,
            guard_policy: GuardPolicy,
        ) -> Result<Self, EconomicError> {
            let credits = Arc::new(CreditPoolTracker::new(production.clone(), credit_policy)?);
            let tax = TaxEngine::new(catalog.clone(), oracle.clone(), credits.clone());
            let guard = RateGuard::new(guard_policy)?;

            log::info!(
                "Trade economics ready: {} tradable resources",
                catalog.tradable().count()
            );

            Ok(TradeEconomics {
                catalog,
                oracle,
                production,
                credits,
                tax,
                guard,
            })
        }

        /// Start a new production epoch
        pub fn begin_epoch(&self) {
            self.credits.reset_epoch();
        }
    }

    #[derive(Debug, thiserror::Error, Clone, PartialEq)]
    pub enum EconomicError {
        #[error("Credit pool error: {0}")]
        Credit(#[from] credit::CreditError),
        #[error("Guard error: {0}")]
        Guard(#[from] guard::GuardRejection),
        #[error("Tax error: {0}")]
        Tax(#[from] tax::TaxError),
    }
}

#[cfg(test)]
mod tests {
    use super::integration::*;
    use super::*;
    use std::sync::Arc;

    fn economics() -> TradeEconomics {
        TradeEconomics::new(
            Arc::new(Catalog::standard()),
            Arc::new(StaticPriceOracle::with_prices([(ResourceKind::Iron, 10.0)])),
            Arc::new(StaticProductionState::new(1_000.0)),
            CreditPolicy::new(),
            GuardPolicy::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_integration_wiring() {
        let econ = economics();
        let tax = econ.tax.compute_tax(ResourceKind::Iron, 1.0, 10.0).unwrap();
        assert_eq!(tax.credit_available.market_cap, 10.0);
    }

    #[test]
    fn test_begin_epoch_resets_pools() {
        let econ = economics();
        econ.credits.consume(ResourceKind::Iron, 1.0, 10.0);
        assert_eq!(econ.credits.available(ResourceKind::Iron, 10.0).market_cap, 0.0);
        econ.begin_epoch();
        assert_eq!(econ.credits.available(ResourceKind::Iron, 10.0).market_cap, 10.0);
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let result = TradeEconomics::new(
            Arc::new(Catalog::standard()),
            Arc::new(StaticPriceOracle::new()),
            Arc::new(StaticProductionState::new(0.0)),
            CreditPolicy { credit_rate_percent: f64::NAN },
            GuardPolicy::new(),
        );
        assert!(matches!(result, Err(EconomicError::Credit(_))));
    }
}

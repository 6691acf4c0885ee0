/// PRODUCTION / VALUATION STATE
///
/// Externally owned accrual and valuation figures that replenish the tax
/// credit pools, plus the hook used to grant the first-trade research bonus.

use crate::catalog::ResourceKind;
use parking_lot::RwLock;
use std::collections::BTreeMap;

pub trait ProductionState: Send + Sync {
    /// Units of `resource` produced this epoch
    fn production_accrued(&self, resource: ResourceKind) -> f64;

    /// Regional price multiplier applied to production credit
    fn regional_multiplier(&self, _resource: ResourceKind) -> f64 {
        1.0
    }

    /// Total valuation of the local player's holdings, in currency
    fn total_valuation(&self) -> f64;

    /// Grant bonus research points
    fn grant_bonus_research(&self, points: f64);
}

#[derive(Debug, Default)]
struct ProductionFigures {
    accrued: BTreeMap<ResourceKind, f64>,
    multipliers: BTreeMap<ResourceKind, f64>,
    total_valuation: f64,
    research_points: f64,
}

/// In-memory production state, updated by the simulation tick
#[derive(Debug, Default)]
pub struct StaticProductionState {
    figures: RwLock<ProductionFigures>,
}

impl StaticProductionState {
    pub fn new(total_valuation: f64) -> Self {
        let state = Self::default();
        state.set_total_valuation(total_valuation);
        state
    }

    pub fn set_accrued(&self, resource: ResourceKind, amount: f64) {
        self.figures.write().accrued.insert(resource, amount.max(0.0));
    }

    pub fn set_regional_multiplier(&self, resource: ResourceKind, multiplier: f64) {
        self.figures.write().multipliers.insert(resource, multiplier.max(0.0));
    }

    pub fn set_total_valuation(&self, valuation: f64) {
        self.figures.write().total_valuation = valuation.max(0.0);
    }

    /// Research points granted so far
    pub fn research_points(&self) -> f64 {
        self.figures.read().research_points
    }
}

impl ProductionState for StaticProductionState {
    fn production_accrued(&self, resource: ResourceKind) -> f64 {
        self.figures.read().accrued.get(&resource).copied().unwrap_or(0.0)
    }

    fn regional_multiplier(&self, resource: ResourceKind) -> f64 {
        self.figures.read().multipliers.get(&resource).copied().unwrap_or(1.0)
    }

    fn total_valuation(&self) -> f64 {
        self.figures.read().total_valuation
    }

    fn grant_bonus_research(&self, points: f64) {
        if points <= 0.0 {
            return;
        }
        self.figures.write().research_points += points;
        log::info!("Granted {} bonus research points", points);
    }
}

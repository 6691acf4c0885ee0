/// TRADEPOST
///
/// Player trade & taxation engine. Wires the economics crate (tax, credit
/// pools, guard) and the trade crate (order controller, reconciler) into one
/// engine per player session.

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub use tradepost_economics as economics;
pub use tradepost_trade as trade;

use economics::integration::TradeEconomics;
use economics::{Catalog, PriceOracle, ProductionState};
use trade::{Collaborators, EngineConfig, Holdings, OrderController, Reconciler, TradeNotifier, TradeSnapshot};

/// Install the global tracing subscriber, honouring `RUST_LOG`.
/// Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Session-scoped collaborators owned by the host game
pub struct EngineParts {
    pub catalog: Arc<Catalog>,
    pub oracle: Arc<dyn PriceOracle>,
    pub production: Arc<dyn ProductionState>,
    pub holdings: Arc<Holdings>,
    pub collaborators: Collaborators,
    pub notifier: Arc<dyn TradeNotifier>,
}

pub struct Engine {
    pub controller: Arc<OrderController>,
    pub reconciler: Arc<Reconciler>,
}

impl Engine {
    pub fn new(config: EngineConfig, parts: EngineParts) -> anyhow::Result<Self> {
        config.validate().context("engine configuration rejected")?;
        let economics = TradeEconomics::new(
            parts.catalog,
            parts.oracle,
            parts.production,
            config.credit_policy(),
            config.guard_policy(),
        )
        .context("failed to set up trade economics")?;

        info!(player = %config.player_id, auto_claim = config.auto_claim, "trade engine ready");

        let controller = Arc::new(OrderController::new(config, economics, parts.holdings, parts.collaborators));
        let reconciler = Arc::new(Reconciler::new(controller.clone(), parts.notifier));
        Ok(Engine { controller, reconciler })
    }

    /// Load configuration from `path` plus `TRADEPOST__*` overrides
    pub fn from_config_file(path: Option<&Path>, parts: EngineParts) -> anyhow::Result<Self> {
        let config = EngineConfig::load(path).context("failed to load engine configuration")?;
        Self::new(config, parts)
    }

    /// Start reconciling pushed "my trades" snapshots
    pub fn start_reconciler(&self, updates: mpsc::Receiver<TradeSnapshot>) -> JoinHandle<()> {
        self.reconciler.clone().spawn(updates)
    }
}

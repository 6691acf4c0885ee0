//! Trade notification reconciler.
//!
//! Turns the difference between two pushed "my trades" snapshots into either
//! a single auto-claim or a one-shot notification. Claiming causes another
//! push, so repeated passes drain the claimable queue one order at a time.

use crate::controller::{ClaimOutcome, OrderController};
use crate::error::TradeError;
use crate::order::{Order, OrderId, OrderStatus, TradeSnapshot};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// User-facing notification sink
pub trait TradeNotifier: Send + Sync {
    fn notify_claimable(&self, count: usize);
}

/// Notifier that only writes to the log
pub struct LogNotifier;

impl TradeNotifier for LogNotifier {
    fn notify_claimable(&self, count: usize) {
        info!(count, "trades ready to claim");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Claimed(OrderId),
    /// Nothing left to claim on an order the pass picked
    AlreadyClaimed(OrderId),
    Notified { claimable: usize },
    Idle,
}

pub struct Reconciler {
    controller: Arc<OrderController>,
    notifier: Arc<dyn TradeNotifier>,
    auto_claim: bool,
}

/// Entries of `current` that are new or whose status moved
pub fn changed<'a>(previous: &'a TradeSnapshot, current: &'a TradeSnapshot) -> impl Iterator<Item = &'a Order> + 'a {
    current.values().filter(move |order| {
        previous
            .get(&order.id)
            .map(|before| before.status != order.status)
            .unwrap_or(true)
    })
}

impl Reconciler {
    pub fn new(controller: Arc<OrderController>, notifier: Arc<dyn TradeNotifier>) -> Self {
        let auto_claim = controller.config().auto_claim;
        Reconciler { controller, notifier, auto_claim }
    }

    pub fn with_auto_claim(mut self, auto_claim: bool) -> Self {
        self.auto_claim = auto_claim;
        self
    }

    fn claimable(&self, order: &Order) -> bool {
        order.status == OrderStatus::Filled && order.is_owned_by(&self.controller.config().player_id)
    }

    fn locally_closed(&self, id: &OrderId) -> bool {
        self.controller
            .my_trades()
            .get(id)
            .map(|order| order.status.is_terminal())
            .unwrap_or(false)
    }

    fn claimable_count(&self, snapshot: &TradeSnapshot) -> usize {
        snapshot.values().filter(|order| self.claimable(order)).count()
    }

    /// Run one pass over a pushed update
    pub async fn reconcile(
        &self,
        previous: &TradeSnapshot,
        current: &TradeSnapshot,
    ) -> Result<ReconcileOutcome, TradeError> {
        self.controller.my_trades().refresh(current);

        if !self.auto_claim {
            let before = self.claimable_count(previous);
            let now = self.claimable_count(current);
            if now > before {
                self.notifier.notify_claimable(now);
                return Ok(ReconcileOutcome::Notified { claimable: now });
            }
            return Ok(ReconcileOutcome::Idle);
        }

        let changed: Vec<&Order> = changed(previous, current).collect();
        if changed.is_empty() {
            return Ok(ReconcileOutcome::Idle);
        }
        // Changed entries first, then anything still waiting from earlier passes
        let pending = |order: &&Order| self.claimable(order) && !self.locally_closed(&order.id);
        let next = changed
            .iter()
            .copied()
            .find(pending)
            .or_else(|| current.values().find(pending));
        let Some(order) = next else {
            return Ok(ReconcileOutcome::Idle);
        };

        debug!(order_id = %order.id, "auto-claiming filled order");
        match self.controller.claim_order(order).await? {
            ClaimOutcome::Claimed { .. } => Ok(ReconcileOutcome::Claimed(order.id.clone())),
            ClaimOutcome::AlreadyClaimed => Ok(ReconcileOutcome::AlreadyClaimed(order.id.clone())),
        }
    }

    /// Consume pushed snapshots until the sender is dropped
    pub fn spawn(self: Arc<Self>, mut updates: mpsc::Receiver<TradeSnapshot>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut previous = TradeSnapshot::new();
            while let Some(current) = updates.recv().await {
                match self.reconcile(&previous, &current).await {
                    Ok(ReconcileOutcome::Idle) => {}
                    Ok(outcome) => debug!(?outcome, "reconcile pass finished"),
                    Err(err) => warn!(%err, key = err.message_key(), "reconcile pass failed"),
                }
                previous = current;
            }
            debug!("trade update channel closed, reconciler stopping");
        })
    }
}

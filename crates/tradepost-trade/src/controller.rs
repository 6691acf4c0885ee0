//! Order lifecycle controller.
//!
//! Every operation follows the same shape: check preconditions, reserve local
//! balances, send to the remote authority, then either commit (keep the
//! debit, credit the other side, consume tax credit) or release the
//! reservation and surface the remote error. Credit pools are only touched
//! after an acknowledgment.
//!
//! Operations on one order id are serialized by a per-order async mutex.

use crate::clock::SyncClock;
use crate::config::EngineConfig;
use crate::error::TradeError;
use crate::holdings::{Asset, Holdings, Reservation};
use crate::order::{MyTrades, Order, OrderDraft, OrderId, OrderStatus, Side};
use crate::remote::{Ack, RemoteAuthority, RemoteError, TradeOp, TradePayload};
use crate::signing::OrderSigner;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use tradepost_economics::integration::TradeEconomics;
use tradepost_economics::{ResourceKind, TaxAssessment};

/// External collaborators the controller calls out to
#[derive(Clone)]
pub struct Collaborators {
    pub remote: Arc<dyn RemoteAuthority>,
    pub signer: Arc<dyn OrderSigner>,
    pub clock: Arc<dyn SyncClock>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedOrder {
    pub order: Order,
    pub tax: TaxAssessment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedOrder {
    pub order: Order,
    pub tax: TaxAssessment,
    /// What the acceptor received on acknowledgment
    pub received: (Asset, f64),
    pub first_trade_with_counterparty: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    Claimed { asset: Asset, amount: f64 },
    /// Order was already closed; nothing credited
    AlreadyClaimed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CancelledOrder {
    pub order: Order,
    pub refunded: (Asset, f64),
}

/// Held for the whole of one operation on an order. The table entry is
/// dropped with the last holder, so the lock table only tracks live orders.
struct OrderLock<'a> {
    locks: &'a DashMap<OrderId, Arc<Mutex<()>>>,
    id: OrderId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for OrderLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // Waiters hold a clone, so the entry survives while anyone is queued
        self.locks.remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

pub struct OrderController {
    config: EngineConfig,
    economics: TradeEconomics,
    holdings: Arc<Holdings>,
    my_trades: Arc<MyTrades>,
    collaborators: Collaborators,
    order_locks: DashMap<OrderId, Arc<Mutex<()>>>,
}

impl OrderController {
    pub fn new(
        config: EngineConfig,
        economics: TradeEconomics,
        holdings: Arc<Holdings>,
        collaborators: Collaborators,
    ) -> Self {
        OrderController {
            config,
            economics,
            holdings,
            my_trades: Arc::new(MyTrades::new()),
            collaborators,
            order_locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn economics(&self) -> &TradeEconomics {
        &self.economics
    }

    pub fn holdings(&self) -> &Arc<Holdings> {
        &self.holdings
    }

    pub fn my_trades(&self) -> &Arc<MyTrades> {
        &self.my_trades
    }

    /// Post a new order. The stored amount is the post-tax amount.
    pub async fn create_order(&self, draft: OrderDraft) -> Result<CreatedOrder, TradeError> {
        let tax = self
            .economics
            .tax
            .compute_tax(draft.resource, draft.amount, draft.price)?;
        let amount = tax.amount_after_tax;
        if !(amount > 0.0) {
            return Err(TradeError::InvalidAmount(amount));
        }

        let reservation = self.reserve(draft.side, draft.resource, amount, draft.price)?;

        let mut order = Order {
            id: OrderId::generate(),
            owner_id: self.config.player_id.clone(),
            owner_hash: self.config.player_hash.clone(),
            side: draft.side,
            resource: draft.resource,
            amount,
            price: draft.price,
            status: OrderStatus::Open,
            created_at: self.collaborators.clock.now(),
            filled_by: None,
            capability_token: self.config.capability_token.clone(),
            signature: String::new(),
        };
        order.signature = self.collaborators.signer.sign(&order);

        if let Err(err) = self.submit(TradeOp::Create, &order).await {
            reservation.release();
            warn!(order_id = %order.id, %err, "create rejected, reservation released");
            return Err(TradeError::CreateOrderFailed(Box::new(err)));
        }
        reservation.commit();

        self.economics.credits.consume(order.resource, amount, order.price);
        self.my_trades.upsert(order.clone());
        info!(
            order_id = %order.id,
            side = ?order.side,
            resource = %order.resource,
            amount,
            price = order.price,
            tax = tax.tax_payable,
            "order created"
        );
        Ok(CreatedOrder { order, tax })
    }

    /// Accept another player's open order, taking the opposite side
    pub async fn accept_order(&self, order: &Order) -> Result<AcceptedOrder, TradeError> {
        let _lock = self.lock_order(&order.id).await;

        if order.status != OrderStatus::Open {
            return Err(TradeError::OrderNotOpen(order.id.clone()));
        }
        if order.is_mine(&self.config.player_id, &self.my_trades) {
            if order.is_owned_by(&self.config.player_id) {
                return Err(TradeError::InvalidArgument(format!(
                    "cannot accept own order {}",
                    order.id
                )));
            }
            return Err(TradeError::AlreadyTracked(order.id.clone()));
        }

        let tax = self
            .economics
            .tax
            .compute_tax(order.resource, order.amount, order.price)?;
        let fill = tax.amount_after_tax;
        if !(fill >= self.config.min_fill_amount) {
            return Err(TradeError::InvalidAmount(fill));
        }

        let now = self.collaborators.clock.now();
        let value = fill * order.price;
        // Booked now so overlapping accepts count against the cooldown and cap
        let admission = self.economics.guard.try_admit(
            &order.owner_hash,
            value,
            self.economics.production.total_valuation(),
            now,
            self.config.premium,
        )?;

        let my_side = order.side.opposite();
        let reservation = self.reserve(my_side, order.resource, fill, order.price)?;

        let mut filled = order
            .transitioned(OrderStatus::Filled)
            .ok_or_else(|| TradeError::OrderNotOpen(order.id.clone()))?;
        filled.filled_by = Some(self.filler_name());

        if let Err(err) = self.submit(TradeOp::Accept, &filled).await {
            reservation.release();
            admission.rollback();
            warn!(order_id = %order.id, %err, "accept rejected, reservation released");
            return Err(err);
        }
        reservation.commit();
        let first_trade = admission.commit();

        let received = match my_side {
            Side::Buy => (Asset::Resource(order.resource), fill),
            Side::Sell => (Asset::Cash, value),
        };
        self.holdings.credit(received.0, received.1)?;

        self.economics.credits.consume(order.resource, fill, order.price);
        if first_trade && self.config.first_trade_bonus_points > 0.0 {
            self.economics
                .production
                .grant_bonus_research(self.config.first_trade_bonus_points);
        }
        self.my_trades.upsert(filled.clone());

        info!(
            order_id = %filled.id,
            counterparty = %order.owner_hash,
            fill,
            first_trade,
            "order accepted"
        );
        Ok(AcceptedOrder {
            order: filled,
            tax,
            received,
            first_trade_with_counterparty: first_trade,
        })
    }

    /// Collect the proceeds of one of the player's filled orders.
    ///
    /// Claiming an order that is already closed is a no-op.
    pub async fn claim_order(&self, order: &Order) -> Result<ClaimOutcome, TradeError> {
        let _lock = self.lock_order(&order.id).await;

        if !order.is_owned_by(&self.config.player_id) {
            return Err(TradeError::NotOwner(order.id.clone()));
        }

        let local = self.my_trades.get(&order.id);
        let locally_closed = local
            .as_ref()
            .map(|o| o.status == OrderStatus::Closed)
            .unwrap_or(false);
        if locally_closed || order.status == OrderStatus::Closed {
            if !locally_closed && local.is_some() {
                self.my_trades.upsert(order.clone());
            }
            debug!(order_id = %order.id, "claim skipped, order already closed");
            return Ok(ClaimOutcome::AlreadyClaimed);
        }

        let local = local.ok_or_else(|| TradeError::OrderNotFilled(order.id.clone()))?;
        // The pushed copy may be fresher than the cache
        let current = if order.status == OrderStatus::Filled { order.clone() } else { local };
        let closed = current
            .transitioned(OrderStatus::Closed)
            .filter(|_| current.status == OrderStatus::Filled)
            .ok_or_else(|| TradeError::OrderNotFilled(order.id.clone()))?;

        self.submit(TradeOp::Claim, &closed).await?;

        let (asset, amount) = match closed.side {
            Side::Sell => (Asset::Cash, closed.value()),
            Side::Buy => (Asset::Resource(closed.resource), closed.amount),
        };
        self.holdings.credit(asset, amount)?;
        self.my_trades.upsert(closed.clone());

        info!(order_id = %closed.id, %asset, amount, "order claimed");
        Ok(ClaimOutcome::Claimed { asset, amount })
    }

    /// Withdraw one of the player's open orders and refund the escrow
    pub async fn cancel_order(&self, order: &Order) -> Result<CancelledOrder, TradeError> {
        let _lock = self.lock_order(&order.id).await;

        if !order.is_owned_by(&self.config.player_id) {
            return Err(TradeError::NotOwner(order.id.clone()));
        }
        let current = self.my_trades.get(&order.id).unwrap_or_else(|| order.clone());
        if current.status != OrderStatus::Open || order.status != OrderStatus::Open {
            return Err(TradeError::OrderNotOpen(order.id.clone()));
        }
        let closed = current
            .transitioned(OrderStatus::Closed)
            .ok_or_else(|| TradeError::OrderNotOpen(order.id.clone()))?;

        self.submit(TradeOp::Cancel, &closed).await?;

        let refunded = match closed.side {
            Side::Sell => (
                Asset::Resource(closed.resource),
                closed.amount * self.config.refund_fraction,
            ),
            Side::Buy => (Asset::Cash, closed.value()),
        };
        self.holdings.credit(refunded.0, refunded.1)?;
        self.my_trades.upsert(closed.clone());

        info!(order_id = %closed.id, asset = %refunded.0, amount = refunded.1, "order cancelled");
        Ok(CancelledOrder { order: closed, refunded })
    }

    fn reserve(&self, side: Side, resource: ResourceKind, amount: f64, price: f64) -> Result<Reservation, TradeError> {
        let reservation = match side {
            Side::Sell => self.holdings.reserve(Asset::Resource(resource), amount)?,
            Side::Buy => self.holdings.reserve(Asset::Cash, amount * price)?,
        };
        Ok(reservation)
    }

    fn filler_name(&self) -> String {
        if self.config.player_name.is_empty() {
            self.config.player_id.clone()
        } else {
            self.config.player_name.clone()
        }
    }

    async fn lock_order(&self, id: &OrderId) -> OrderLock<'_> {
        let lock = self.order_locks.entry(id.clone()).or_default().clone();
        OrderLock {
            locks: &self.order_locks,
            id: id.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    async fn submit(&self, op: TradeOp, order: &Order) -> Result<Ack, TradeError> {
        let payload = TradePayload { op, order: order.clone() };
        let timeout = self.config.remote_timeout();
        debug!(order_id = %order.id, ?op, "sending to remote authority");
        match tokio::time::timeout(timeout, self.collaborators.remote.send(payload)).await {
            Ok(Ok(ack)) => Ok(ack),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(RemoteError::Timeout(timeout.as_millis() as u64).into()),
        }
    }
}

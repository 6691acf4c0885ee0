//! Order model: identity, economic terms, provenance and the status machine.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tradepost_economics::ResourceKind;

/// Opaque, globally unique order identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn generate() -> Self {
        OrderId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(id: &str) -> Self {
        OrderId(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The side a counterparty takes when accepting
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Filled,
    Closed,
}

impl OrderStatus {
    /// Allowed edges: Open -> Filled -> Closed, and Open -> Closed
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Open, OrderStatus::Filled)
                | (OrderStatus::Filled, OrderStatus::Closed)
                | (OrderStatus::Open, OrderStatus::Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == OrderStatus::Closed
    }
}

/// What a player submits before tax and signing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub side: Side,
    pub resource: ResourceKind,
    pub amount: f64,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub owner_id: String,
    pub owner_hash: String,
    pub side: Side,
    pub resource: ResourceKind,
    /// Post-tax amount in resource units
    pub amount: f64,
    pub price: f64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    /// Counterparty name, set when filled
    pub filled_by: Option<String>,
    pub capability_token: String,
    pub signature: String,
}

impl Order {
    /// Currency value of the order at its own price
    pub fn value(&self) -> f64 {
        self.amount * self.price
    }

    pub fn is_owned_by(&self, player_id: &str) -> bool {
        self.owner_id == player_id
    }

    /// Owned locally, or tracked in "my trades" (covers accepted orders)
    pub fn is_mine(&self, player_id: &str, my_trades: &MyTrades) -> bool {
        self.is_owned_by(player_id) || my_trades.contains(&self.id)
    }

    /// Copy of this order moved to `next`, or None if the edge is illegal
    pub fn transitioned(&self, next: OrderStatus) -> Option<Order> {
        if !self.status.can_transition_to(next) {
            return None;
        }
        let mut order = self.clone();
        order.status = next;
        Some(order)
    }

    /// Bytes covered by the signature (signature field excluded)
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut unsigned = self.clone();
        unsigned.signature.clear();
        serde_json::to_vec(&unsigned).unwrap_or_default()
    }
}

/// Snapshot of "my trades" keyed by order id, as pushed by the remote authority
pub type TradeSnapshot = std::collections::BTreeMap<OrderId, Order>;

/// Local read cache of the player's trades
#[derive(Debug, Default)]
pub struct MyTrades {
    orders: DashMap<OrderId, Order>,
}

impl MyTrades {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &OrderId) -> bool {
        self.orders.contains_key(id)
    }

    pub fn get(&self, id: &OrderId) -> Option<Order> {
        self.orders.get(id).map(|entry| entry.value().clone())
    }

    pub fn upsert(&self, order: Order) {
        self.orders.insert(order.id.clone(), order);
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Merge a pushed snapshot. Pushes can arrive out of order, so a cached
    /// copy only moves forward along the status machine.
    pub fn refresh(&self, snapshot: &TradeSnapshot) {
        for (id, incoming) in snapshot {
            match self.orders.get_mut(id) {
                Some(mut local) => {
                    let forward = incoming.status == local.status
                        || local.status.can_transition_to(incoming.status);
                    if !forward {
                        continue;
                    }
                    *local = incoming.clone();
                }
                None => {
                    self.orders.insert(id.clone(), incoming.clone());
                }
            }
        }
    }

    pub fn snapshot(&self) -> TradeSnapshot {
        self.orders
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

//! Local cash and resource balances with reservation handles.
//!
//! Each asset is a single logical account. Debits are check-and-set under
//! the account's map shard lock, so concurrent reservations against the same
//! account serialize. A [`Reservation`] is the only way to debit for a
//! pending remote operation; it is either committed or released, and a
//! dropped reservation releases itself.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use tradepost_economics::ResourceKind;

/// Amounts below this are treated as zero when comparing balances
const BALANCE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Asset {
    Cash,
    Resource(ResourceKind),
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Cash => f.write_str("cash"),
            Asset::Resource(kind) => write!(f, "{}", kind),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HoldingsError {
    #[error("Insufficient {asset}: needed {needed}, available {available}")]
    Insufficient { asset: Asset, needed: f64, available: f64 },
    #[error("Invalid amount {0}")]
    InvalidAmount(f64),
}

#[derive(Debug, Default)]
pub struct Holdings {
    balances: DashMap<Asset, f64>,
}

impl Holdings {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_balances<I>(balances: I) -> Arc<Self>
    where
        I: IntoIterator<Item = (Asset, f64)>,
    {
        let holdings = Self::default();
        for (asset, amount) in balances {
            holdings.balances.insert(asset, amount.max(0.0));
        }
        Arc::new(holdings)
    }

    pub fn balance(&self, asset: Asset) -> f64 {
        self.balances.get(&asset).map(|b| *b).unwrap_or(0.0)
    }

    pub fn cash(&self) -> f64 {
        self.balance(Asset::Cash)
    }

    pub fn resource(&self, kind: ResourceKind) -> f64 {
        self.balance(Asset::Resource(kind))
    }

    /// Add to a balance (claims, refunds, settlement)
    pub fn credit(&self, asset: Asset, amount: f64) -> Result<(), HoldingsError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(HoldingsError::InvalidAmount(amount));
        }
        *self.balances.entry(asset).or_insert(0.0) += amount;
        debug!(%asset, amount, "credited");
        Ok(())
    }

    fn debit(&self, asset: Asset, amount: f64) -> Result<(), HoldingsError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(HoldingsError::InvalidAmount(amount));
        }
        let mut balance = self.balances.entry(asset).or_insert(0.0);
        if *balance + BALANCE_EPSILON < amount {
            return Err(HoldingsError::Insufficient {
                asset,
                needed: amount,
                available: *balance,
            });
        }
        *balance = (*balance - amount).max(0.0);
        Ok(())
    }

    /// Debit `amount` of `asset` pending a remote acknowledgment
    pub fn reserve(self: &Arc<Self>, asset: Asset, amount: f64) -> Result<Reservation, HoldingsError> {
        self.debit(asset, amount)?;
        debug!(%asset, amount, "reserved");
        Ok(Reservation {
            holdings: Arc::clone(self),
            asset,
            amount,
            settled: false,
        })
    }
}

/// Debited funds awaiting the outcome of a remote operation
#[must_use = "a reservation must be committed or released"]
#[derive(Debug)]
pub struct Reservation {
    holdings: Arc<Holdings>,
    asset: Asset,
    amount: f64,
    settled: bool,
}

impl Reservation {
    pub fn asset(&self) -> Asset {
        self.asset
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// Keep the debit; the remote authority accepted the operation
    pub fn commit(mut self) {
        self.settled = true;
        debug!(asset = %self.asset, amount = self.amount, "reservation committed");
    }

    /// Return the debited amount
    pub fn release(mut self) {
        self.settled = true;
        self.refund();
    }

    fn refund(&self) {
        if let Err(err) = self.holdings.credit(self.asset, self.amount) {
            warn!(asset = %self.asset, amount = self.amount, %err, "failed to release reservation");
        } else {
            debug!(asset = %self.asset, amount = self.amount, "reservation released");
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.settled {
            warn!(asset = %self.asset, amount = self.amount, "reservation dropped unsettled, releasing");
            self.refund();
        }
    }
}

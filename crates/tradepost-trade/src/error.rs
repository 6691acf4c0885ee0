use crate::holdings::{Asset, HoldingsError};
use crate::order::OrderId;
use crate::remote::RemoteError;
use thiserror::Error;
use tradepost_economics::{CatalogError, GuardRejection, TaxError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TradeError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Insufficient resources: needed {needed}, available {available}")]
    InsufficientResources { needed: f64, available: f64 },
    #[error("Insufficient cash: needed {needed}, available {available}")]
    InsufficientCash { needed: f64, available: f64 },
    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),
    #[error("Order {0} is not open")]
    OrderNotOpen(OrderId),
    #[error("Order {0} is not filled")]
    OrderNotFilled(OrderId),
    #[error("Order {0} is not owned by the local player")]
    NotOwner(OrderId),
    #[error("Order {0} is already tracked in my trades")]
    AlreadyTracked(OrderId),
    #[error("Rate limited: {0}")]
    RateLimited(GuardRejection),
    #[error("Remote authority rejected the operation: {0}")]
    RemoteRejected(String),
    #[error("Remote authority unreachable: {0}")]
    RemoteUnreachable(String),
    #[error("Order creation failed: {0}")]
    CreateOrderFailed(Box<TradeError>),
}

impl TradeError {
    /// Remote failures are the only errors raised after an optimistic mutation
    pub fn is_remote_failure(&self) -> bool {
        match self {
            TradeError::RemoteRejected(_) | TradeError::RemoteUnreachable(_) => true,
            TradeError::CreateOrderFailed(cause) => cause.is_remote_failure(),
            _ => false,
        }
    }

    /// Localization key for the short user-facing message
    pub fn message_key(&self) -> &'static str {
        match self {
            TradeError::InvalidArgument(_) => "trade.error.invalid_argument",
            TradeError::InsufficientResources { .. } => "trade.error.insufficient_resources",
            TradeError::InsufficientCash { .. } => "trade.error.insufficient_cash",
            TradeError::InvalidAmount(_) => "trade.error.invalid_amount",
            TradeError::OrderNotOpen(_) => "trade.error.order_not_open",
            TradeError::OrderNotFilled(_) => "trade.error.order_not_filled",
            TradeError::NotOwner(_) => "trade.error.not_owner",
            TradeError::AlreadyTracked(_) => "trade.error.already_tracked",
            TradeError::RateLimited(GuardRejection::Cooldown { .. }) => "trade.error.cooldown",
            TradeError::RateLimited(_) => "trade.error.counterparty_cap",
            TradeError::RemoteRejected(_) => "trade.error.remote_rejected",
            TradeError::RemoteUnreachable(_) => "trade.error.remote_unreachable",
            TradeError::CreateOrderFailed(_) => "trade.error.create_failed",
        }
    }
}

impl From<TaxError> for TradeError {
    fn from(err: TaxError) -> Self {
        TradeError::InvalidArgument(err.to_string())
    }
}

impl From<CatalogError> for TradeError {
    fn from(err: CatalogError) -> Self {
        TradeError::InvalidArgument(err.to_string())
    }
}

impl From<GuardRejection> for TradeError {
    fn from(err: GuardRejection) -> Self {
        TradeError::RateLimited(err)
    }
}

impl From<RemoteError> for TradeError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Rejected(reason) => TradeError::RemoteRejected(reason),
            RemoteError::Unreachable(_) | RemoteError::Timeout(_) => {
                TradeError::RemoteUnreachable(err.to_string())
            }
        }
    }
}

impl From<HoldingsError> for TradeError {
    fn from(err: HoldingsError) -> Self {
        match err {
            HoldingsError::Insufficient { asset: Asset::Cash, needed, available } => {
                TradeError::InsufficientCash { needed, available }
            }
            HoldingsError::Insufficient { asset: Asset::Resource(_), needed, available } => {
                TradeError::InsufficientResources { needed, available }
            }
            HoldingsError::InvalidAmount(amount) => TradeError::InvalidAmount(amount),
        }
    }
}

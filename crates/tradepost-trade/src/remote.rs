//! Remote authority channel.
//!
//! The authority owns order existence and status. The engine proposes
//! operations through [`RemoteAuthority::send`] and treats delivery as
//! at-most-once; retries and deduplication belong to the transport.

use crate::order::{Order, OrderId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeOp {
    Create,
    Accept,
    Claim,
    Cancel,
}

/// Structurally-typed trade object handed to the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePayload {
    pub op: TradeOp,
    pub order: Order,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub order_id: OrderId,
    pub server_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RemoteError {
    #[error("rejected by authority: {0}")]
    Rejected(String),
    #[error("authority unreachable: {0}")]
    Unreachable(String),
    #[error("timed out after {0}ms")]
    Timeout(u64),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    async fn send(&self, payload: TradePayload) -> Result<Ack, RemoteError>;
}

//! Player order lifecycle against a remote authoritative ledger.
//!
//! The [`OrderController`] applies local economics (tax, credit, guard) and
//! optimistic balance reservations, then confirms with the remote authority.
//! The [`Reconciler`] reacts to pushed "my trades" snapshots.

pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod holdings;
pub mod order;
pub mod reconciler;
pub mod remote;
pub mod signing;

pub use clock::{ManualClock, ServerSyncedClock, SyncClock};
pub use config::{ConfigError, EngineConfig};
pub use controller::{AcceptedOrder, CancelledOrder, ClaimOutcome, Collaborators, CreatedOrder, OrderController};
pub use error::TradeError;
pub use holdings::{Asset, Holdings, HoldingsError, Reservation};
pub use order::{MyTrades, Order, OrderDraft, OrderId, OrderStatus, Side, TradeSnapshot};
pub use reconciler::{LogNotifier, ReconcileOutcome, Reconciler, TradeNotifier};
pub use remote::{Ack, RemoteAuthority, RemoteError, TradeOp, TradePayload};
pub use signing::{DigestSigner, OrderSigner};

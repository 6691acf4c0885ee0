/// ORDER LIFECYCLE INTEGRATION TESTS
///
/// These tests verify:
/// - Balance conservation across create and cancel
/// - Claim idempotency
/// - Rollback when the authority rejects or never answers
/// - Reconciler auto-claim and notification modes
/// - Cooldown, counterparty cap and first-trade bonus through accept

use approx::assert_relative_eq;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tradepost_economics::integration::TradeEconomics;
use tradepost_economics::{Catalog, GuardRejection, ResourceKind, StaticPriceOracle, StaticProductionState};
use tradepost_trade::*;

/// Authority that answers from a script, acknowledging once the script runs out
#[derive(Default)]
struct ScriptedAuthority {
    script: Mutex<VecDeque<Result<(), RemoteError>>>,
    delay: Option<Duration>,
    sent: Mutex<Vec<TradePayload>>,
}

impl ScriptedAuthority {
    fn failing_once(err: RemoteError) -> Self {
        let authority = Self::default();
        authority.script.lock().push_back(Err(err));
        authority
    }

    fn stalled() -> Self {
        Self::delayed(Duration::from_secs(60))
    }

    fn delayed(delay: Duration) -> Self {
        ScriptedAuthority { delay: Some(delay), ..Self::default() }
    }

    fn ops(&self) -> Vec<TradeOp> {
        self.sent.lock().iter().map(|p| p.op).collect()
    }
}

#[async_trait]
impl RemoteAuthority for ScriptedAuthority {
    async fn send(&self, payload: TradePayload) -> Result<Ack, RemoteError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let order_id = payload.order.id.clone();
        self.sent.lock().push(payload);
        match self.script.lock().pop_front() {
            Some(Err(err)) => Err(err),
            _ => Ok(Ack { order_id, server_time: None }),
        }
    }
}

#[derive(Default)]
struct CountingNotifier {
    calls: AtomicUsize,
    last: AtomicUsize,
}

impl TradeNotifier for CountingNotifier {
    fn notify_claimable(&self, count: usize) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last.store(count, Ordering::SeqCst);
    }
}

struct Harness {
    controller: Arc<OrderController>,
    authority: Arc<ScriptedAuthority>,
    production: Arc<StaticProductionState>,
}

fn harness(authority: ScriptedAuthority) -> Harness {
    harness_with(authority, |_| {})
}

fn harness_with(authority: ScriptedAuthority, configure: impl FnOnce(&mut EngineConfig)) -> Harness {
    let mut config = EngineConfig {
        player_id: "me".into(),
        player_hash: "hash-me".into(),
        player_name: "Me".into(),
        capability_token: "cap-token".into(),
        ..EngineConfig::default()
    };
    configure(&mut config);
    let production = Arc::new(StaticProductionState::new(10_000.0));
    let economics = TradeEconomics::new(
        Arc::new(Catalog::standard()),
        Arc::new(StaticPriceOracle::with_prices([(ResourceKind::Iron, 10.0)])),
        production.clone(),
        config.credit_policy(),
        config.guard_policy(),
    )
    .unwrap();
    let holdings = Holdings::with_balances([
        (Asset::Cash, 1_000.0),
        (Asset::Resource(ResourceKind::Iron), 100.0),
    ]);
    let authority = Arc::new(authority);
    let collaborators = Collaborators {
        remote: authority.clone(),
        signer: Arc::new(DigestSigner::new("session-key")),
        clock: Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap())),
    };
    Harness {
        controller: Arc::new(OrderController::new(config, economics, holdings, collaborators)),
        authority,
        production,
    }
}

fn sell(amount: f64, price: f64) -> OrderDraft {
    OrderDraft { side: Side::Sell, resource: ResourceKind::Iron, amount, price }
}

/// Open sell order posted by another player
fn peer_sell(owner: &str, amount: f64, price: f64) -> Order {
    Order {
        id: OrderId::generate(),
        owner_id: owner.to_string(),
        owner_hash: format!("hash-{owner}"),
        side: Side::Sell,
        resource: ResourceKind::Iron,
        amount,
        price,
        status: OrderStatus::Open,
        created_at: Utc.with_ymd_and_hms(2026, 3, 1, 11, 0, 0).unwrap(),
        filled_by: None,
        capability_token: "peer-cap".into(),
        signature: "peer-sig".into(),
    }
}

fn no_cooldown(config: &mut EngineConfig) {
    config.accept_cooldown_secs = 0;
    config.premium_accept_cooldown_secs = 0;
}

fn filled_by_peer(order: &Order) -> Order {
    let mut filled = order.transitioned(OrderStatus::Filled).unwrap();
    filled.filled_by = Some("Peer".into());
    filled
}

#[tokio::test]
async fn test_sell_create_then_cancel_conserves_resource() {
    let h = harness(ScriptedAuthority::default());
    let created = h.controller.create_order(sell(40.0, 10.0)).await.unwrap();
    assert_relative_eq!(h.controller.holdings().resource(ResourceKind::Iron), 60.0);

    let cancelled = h.controller.cancel_order(&created.order).await.unwrap();
    let refund_fraction = h.controller.config().refund_fraction;
    assert_relative_eq!(cancelled.refunded.1, created.order.amount * refund_fraction);
    assert_relative_eq!(
        h.controller.holdings().resource(ResourceKind::Iron),
        100.0 - created.order.amount + created.order.amount * refund_fraction
    );
    assert_eq!(h.authority.ops(), vec![TradeOp::Create, TradeOp::Cancel]);
}

#[tokio::test]
async fn test_second_claim_is_noop() {
    let h = harness(ScriptedAuthority::default());
    let created = h.controller.create_order(sell(40.0, 10.0)).await.unwrap();
    let filled = filled_by_peer(&created.order);

    let first = h.controller.claim_order(&filled).await.unwrap();
    assert_eq!(first, ClaimOutcome::Claimed { asset: Asset::Cash, amount: 400.0 });
    assert_relative_eq!(h.controller.holdings().cash(), 1_400.0);

    let second = h.controller.claim_order(&filled).await.unwrap();
    assert_eq!(second, ClaimOutcome::AlreadyClaimed);
    assert_relative_eq!(h.controller.holdings().cash(), 1_400.0);
    assert_eq!(h.authority.ops(), vec![TradeOp::Create, TradeOp::Claim]);
}

#[tokio::test]
async fn test_concurrent_claims_credit_once() {
    let h = harness(ScriptedAuthority::default());
    let created = h.controller.create_order(sell(40.0, 10.0)).await.unwrap();
    let filled = filled_by_peer(&created.order);

    let (a, b) = tokio::join!(h.controller.claim_order(&filled), h.controller.claim_order(&filled));
    let outcomes = [a.unwrap(), b.unwrap()];
    assert_eq!(outcomes.iter().filter(|o| **o == ClaimOutcome::AlreadyClaimed).count(), 1);
    assert_relative_eq!(h.controller.holdings().cash(), 1_400.0);
}

#[tokio::test]
async fn test_failed_create_leaves_state_untouched() {
    let h = harness(ScriptedAuthority::failing_once(RemoteError::Unreachable("socket closed".into())));
    let before = h.controller.economics().credits.usage();

    let err = h.controller.create_order(sell(40.0, 10.0)).await.unwrap_err();
    assert!(matches!(err, TradeError::CreateOrderFailed(_)));
    assert_eq!(err.message_key(), "trade.error.create_failed");
    assert_relative_eq!(h.controller.holdings().resource(ResourceKind::Iron), 100.0);
    assert_relative_eq!(h.controller.holdings().cash(), 1_000.0);
    assert_eq!(h.controller.economics().credits.usage(), before);
    assert!(h.controller.my_trades().is_empty());

    // Script exhausted, the retry goes through
    h.controller.create_order(sell(40.0, 10.0)).await.unwrap();
    assert_relative_eq!(h.controller.holdings().resource(ResourceKind::Iron), 60.0);
}

#[tokio::test]
async fn test_abandoned_create_releases_reservation() {
    let h = harness(ScriptedAuthority::stalled());
    let controller = h.controller.clone();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        controller.create_order(sell(40.0, 10.0)),
    )
    .await;
    assert!(abandoned.is_err());
    assert_relative_eq!(h.controller.holdings().resource(ResourceKind::Iron), 100.0);
    assert!(h.controller.my_trades().is_empty());
}

#[tokio::test]
async fn test_reconciler_claims_one_per_pass() {
    let h = harness(ScriptedAuthority::default());
    let a = h.controller.create_order(sell(10.0, 10.0)).await.unwrap().order;
    let b = h.controller.create_order(sell(20.0, 10.0)).await.unwrap().order;
    let reconciler = Reconciler::new(h.controller.clone(), Arc::new(CountingNotifier::default()));

    let open = h.controller.my_trades().snapshot();
    let mut both_filled = open.clone();
    both_filled.insert(a.id.clone(), filled_by_peer(&a));
    both_filled.insert(b.id.clone(), filled_by_peer(&b));

    let first = reconciler.reconcile(&open, &both_filled).await.unwrap();
    assert!(matches!(first, ReconcileOutcome::Claimed(_)));
    assert_eq!(h.authority.ops().iter().filter(|op| **op == TradeOp::Claim).count(), 1);

    // Authority pushes the claimed order as closed; the other one is drained next
    let after_claim = h.controller.my_trades().snapshot();
    let second = reconciler.reconcile(&both_filled, &after_claim).await.unwrap();
    assert!(matches!(second, ReconcileOutcome::Claimed(_)));
    assert_ne!(first, second);
    assert_relative_eq!(h.controller.holdings().cash(), 1_300.0);

    let settled = h.controller.my_trades().snapshot();
    assert_eq!(reconciler.reconcile(&after_claim, &settled).await.unwrap(), ReconcileOutcome::Idle);
}

#[tokio::test]
async fn test_reconciler_notifies_when_auto_claim_off() {
    let h = harness(ScriptedAuthority::default());
    let a = h.controller.create_order(sell(10.0, 10.0)).await.unwrap().order;
    let notifier = Arc::new(CountingNotifier::default());
    let reconciler = Reconciler::new(h.controller.clone(), notifier.clone()).with_auto_claim(false);

    let open = h.controller.my_trades().snapshot();
    let mut filled = open.clone();
    filled.insert(a.id.clone(), filled_by_peer(&a));

    assert_eq!(
        reconciler.reconcile(&open, &filled).await.unwrap(),
        ReconcileOutcome::Notified { claimable: 1 }
    );
    assert_eq!(reconciler.reconcile(&filled, &filled).await.unwrap(), ReconcileOutcome::Idle);
    assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    assert_eq!(notifier.last.load(Ordering::SeqCst), 1);
    assert_relative_eq!(h.controller.holdings().cash(), 1_000.0);
}

#[tokio::test]
async fn test_spawned_reconciler_drains_channel() {
    let h = harness(ScriptedAuthority::default());
    let a = h.controller.create_order(sell(10.0, 10.0)).await.unwrap().order;
    let reconciler = Arc::new(Reconciler::new(h.controller.clone(), Arc::new(LogNotifier)));

    let (tx, rx) = tokio::sync::mpsc::channel(4);
    let handle = reconciler.spawn(rx);

    let mut pushed = TradeSnapshot::new();
    pushed.insert(a.id.clone(), filled_by_peer(&a));
    tx.send(pushed).await.unwrap();
    drop(tx);
    handle.await.unwrap();

    assert_eq!(h.controller.my_trades().get(&a.id).unwrap().status, OrderStatus::Closed);
    assert_relative_eq!(h.controller.holdings().cash(), 1_100.0);
}

#[tokio::test]
async fn test_overlapping_accepts_share_cooldown() {
    let h = harness(ScriptedAuthority::delayed(Duration::from_millis(20)));
    let first = peer_sell("peer", 10.0, 10.0);
    let second = peer_sell("other", 10.0, 10.0);

    let (a, b) = tokio::join!(h.controller.accept_order(&first), h.controller.accept_order(&second));
    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let err = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(err.message_key(), "trade.error.cooldown");
    assert_relative_eq!(h.controller.holdings().cash(), 900.0);
    assert_eq!(h.authority.ops(), vec![TradeOp::Accept]);
}

#[tokio::test]
async fn test_overlapping_accepts_share_counterparty_cap() {
    // cap is 5% of 10_000 = 500
    let h = harness_with(ScriptedAuthority::delayed(Duration::from_millis(20)), |config| {
        no_cooldown(config);
        config.counterparty_cap_fraction = 0.05;
    });
    let first = peer_sell("peer", 40.0, 10.0);
    let second = peer_sell("peer", 40.0, 10.0);

    let (a, b) = tokio::join!(h.controller.accept_order(&first), h.controller.accept_order(&second));
    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(TradeError::RateLimited(GuardRejection::CounterpartyCap { .. })))));
    assert_relative_eq!(h.controller.economics().guard.traded_with("hash-peer"), 400.0);
    assert_relative_eq!(h.controller.holdings().cash(), 600.0);
}

#[tokio::test]
async fn test_counterparty_cap_through_accept() {
    let h = harness_with(ScriptedAuthority::default(), |config| {
        no_cooldown(config);
        config.counterparty_cap_fraction = 0.05;
    });
    h.controller.accept_order(&peer_sell("peer", 40.0, 10.0)).await.unwrap();

    let err = h.controller.accept_order(&peer_sell("peer", 20.0, 10.0)).await.unwrap_err();
    assert_eq!(err.message_key(), "trade.error.counterparty_cap");
    match err {
        TradeError::RateLimited(GuardRejection::CounterpartyCap { traded, cap, .. }) => {
            assert_relative_eq!(traded, 400.0);
            assert_relative_eq!(cap, 500.0);
        }
        other => panic!("expected counterparty cap, got {other:?}"),
    }
    assert_relative_eq!(h.controller.holdings().cash(), 600.0);

    // another partner still has room
    h.controller.accept_order(&peer_sell("other", 20.0, 10.0)).await.unwrap();
}

#[tokio::test]
async fn test_research_bonus_only_on_first_trade_with_partner() {
    let h = harness_with(ScriptedAuthority::default(), no_cooldown);
    let bonus = h.controller.config().first_trade_bonus_points;

    let first = h.controller.accept_order(&peer_sell("peer", 10.0, 10.0)).await.unwrap();
    assert!(first.first_trade_with_counterparty);
    assert_relative_eq!(h.production.research_points(), bonus);

    let repeat = h.controller.accept_order(&peer_sell("peer", 10.0, 10.0)).await.unwrap();
    assert!(!repeat.first_trade_with_counterparty);
    assert_relative_eq!(h.production.research_points(), bonus);

    let other = h.controller.accept_order(&peer_sell("other", 10.0, 10.0)).await.unwrap();
    assert!(other.first_trade_with_counterparty);
    assert_relative_eq!(h.production.research_points(), 2.0 * bonus);
}

#[tokio::test]
async fn test_refused_accept_keeps_partner_new() {
    let h = harness(ScriptedAuthority::failing_once(RemoteError::Rejected("stale order".into())));
    let order = peer_sell("peer", 10.0, 10.0);

    assert!(h.controller.accept_order(&order).await.is_err());
    assert_eq!(h.controller.economics().guard.traded_with("hash-peer"), 0.0);

    // no cooldown was started and the partner still counts as new
    let retried = h.controller.accept_order(&order).await.unwrap();
    assert!(retried.first_trade_with_counterparty);
    assert_relative_eq!(h.production.research_points(), h.controller.config().first_trade_bonus_points);
}

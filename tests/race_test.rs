mod common;

use async_trait::async_trait;
use rand::Rng;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use subrecon::application::checkout::{CheckoutService, CheckoutStart};
use subrecon::application::poller::PollOutcome;
use subrecon::application::signal::Settlement;
use subrecon::config::ReconcileConfig;
use subrecon::domain::payment::OrderId;
use subrecon::domain::ports::VerificationClient;
use subrecon::domain::purchase::{PaymentSession, PurchaseReceipt};
use subrecon::domain::state::GuardState;
use subrecon::error::Result;
use subrecon::infrastructure::in_memory::{
    InMemoryGuardStore, RecordingActivator, ScriptedWindowOpener, StaticPurchaseGateway,
    WindowScript,
};

/// Answers `paid` for every order after a random delay.
struct JitteryPaidClient {
    max_jitter_ms: u64,
}

#[async_trait]
impl VerificationClient for JitteryPaidClient {
    async fn verify_payment(&self, order_id: &OrderId) -> Result<Value> {
        let jitter = rand::thread_rng().gen_range(0..=self.max_jitter_ms);
        tokio::time::sleep(Duration::from_millis(jitter)).await;
        Ok(json!({"result": [{"orderid": order_id.as_str(), "statuspay": "paid", "sum": "150"}]}))
    }
}

#[tokio::test]
async fn test_concurrent_paths_activate_each_order_once() {
    let activator = RecordingActivator::new().with_delay(Duration::from_millis(5));
    let coordinator = common::coordinator(
        Box::new(InMemoryGuardStore::new()),
        Box::new(JitteryPaidClient { max_jitter_ms: 10 }),
        Box::new(activator.clone()),
    );

    let orders: Vec<OrderId> = (0..20).map(|i| OrderId::new(format!("o{i}"))).collect();
    for order in &orders {
        let session = PaymentSession::from_receipt(&PurchaseReceipt {
            order_id: order.clone(),
            payment_url: Some(format!("https://pay/{order}")),
            amount: None,
            requires_payment: true,
        })
        .unwrap();
        coordinator.register(session, common::draft("t1")).await;
    }

    let mut handles = Vec::new();
    for order in &orders {
        for path in 0..3 {
            let coordinator = Arc::clone(&coordinator);
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                match path {
                    0 => coordinator.on_window_closed(&order).await.map(|_| ()),
                    1 => coordinator.check_now(&order).await.map(|_| ()),
                    _ => match coordinator.check(&order).await {
                        Ok(Some(record)) => coordinator.apply(&order, record).await,
                        Ok(None) => Ok(()),
                        Err(e) => Err(e),
                    },
                }
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let requests = activator.requests().await;
    assert_eq!(requests.len(), orders.len());
    for order in &orders {
        assert_eq!(
            coordinator.guard(order).await.unwrap(),
            Some(GuardState::Activated)
        );
        assert_eq!(coordinator.session(order).await, None);
    }
}

#[tokio::test]
async fn test_checkouts_with_random_window_closures() {
    let timings = ReconcileConfig {
        waiting_after_ms: 20,
        checking_after_ms: 10,
        attempt_interval_ms: 10,
        error_reset_ms: 10,
        window_inspect_interval_ms: 5,
        ..ReconcileConfig::default()
    };
    let activator = RecordingActivator::new().with_delay(Duration::from_millis(3));
    let coordinator = common::coordinator(
        Box::new(InMemoryGuardStore::new()),
        Box::new(JitteryPaidClient { max_jitter_ms: 8 }),
        Box::new(activator.clone()),
    );

    let mut handles = Vec::new();
    for i in 0..10 {
        let closes_after = rand::thread_rng().gen_range(0..40);
        let service = CheckoutService::new(
            Box::new(StaticPurchaseGateway::new(PurchaseReceipt {
                order_id: OrderId::new(format!("c{i}")),
                payment_url: Some(format!("https://pay/c{i}")),
                amount: None,
                requires_payment: true,
            })),
            Box::new(ScriptedWindowOpener::new(WindowScript {
                closes_after: Some(Duration::from_millis(closes_after)),
                ..WindowScript::default()
            })),
            Arc::clone(&coordinator),
            timings.clone(),
        );
        match service.start(common::draft("t2")).await.unwrap() {
            CheckoutStart::Reconciling(handle) => handles.push(handle),
            CheckoutStart::Completed(_) => panic!("expected a payment session"),
        }
    }

    for handle in handles {
        assert_eq!(
            handle.finished().await.unwrap(),
            PollOutcome::Settled(Settlement::Activated)
        );
    }
    let requests = activator.requests().await;
    assert_eq!(requests.len(), 10);
    assert!(requests.iter().all(|r| r.tariff.id == "t2"));
}

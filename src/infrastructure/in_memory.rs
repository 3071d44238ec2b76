use crate::domain::payment::OrderId;
use crate::domain::ports::{
    GuardStore, PurchaseGateway, SubscriptionActivator, TariffCatalog, VerificationClient,
    WindowHandle, WindowHandleBox, WindowOpener, WindowInspectError,
};
use crate::domain::purchase::{PurchaseDraft, PurchaseReceipt};
use crate::domain::state::GuardState;
use crate::domain::tariff::{ActivationRequest, SubscriptionResult, Tariff};
use crate::error::{ReconcileError, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

/// A thread-safe in-memory reconciliation guard.
///
/// Uses `Arc<RwLock<HashMap<OrderId, GuardState>>>`; claims take the write lock so
/// check-and-set is atomic.
#[derive(Default, Clone)]
pub struct InMemoryGuardStore {
    guards: Arc<RwLock<HashMap<OrderId, GuardState>>>,
}

impl InMemoryGuardStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GuardStore for InMemoryGuardStore {
    async fn try_claim(&self, order_id: &OrderId, state: GuardState) -> Result<bool> {
        let mut guards = self.guards.write().await;
        if guards.contains_key(order_id) {
            return Ok(false);
        }
        guards.insert(order_id.clone(), state);
        Ok(true)
    }

    async fn set(&self, order_id: &OrderId, state: GuardState) -> Result<()> {
        let mut guards = self.guards.write().await;
        guards.insert(order_id.clone(), state);
        Ok(())
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<GuardState>> {
        let guards = self.guards.read().await;
        Ok(guards.get(order_id).copied())
    }
}

/// One scripted answer of the verification workflow.
#[derive(Debug, Clone)]
pub struct ScriptedVerification {
    pub delay: Duration,
    pub outcome: std::result::Result<Value, String>,
}

impl ScriptedVerification {
    pub fn respond(value: Value) -> Self {
        Self::respond_after(Duration::ZERO, value)
    }

    pub fn respond_after(delay: Duration, value: Value) -> Self {
        Self {
            delay,
            outcome: Ok(value),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Err(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerificationCall {
    pub order_id: OrderId,
    pub at: Instant,
}

#[derive(Debug)]
enum Responder {
    /// Answers in order; the last answer repeats once the script runs out.
    Script {
        pending: VecDeque<ScriptedVerification>,
        last: Option<ScriptedVerification>,
    },
    /// Reports every order as paid.
    PaidForAny { delay: Duration },
}

/// Verification client that replays canned workflow responses.
#[derive(Clone)]
pub struct ScriptedVerificationClient {
    responder: Arc<Mutex<Responder>>,
    calls: Arc<Mutex<Vec<VerificationCall>>>,
}

impl ScriptedVerificationClient {
    pub fn new(script: Vec<ScriptedVerification>) -> Self {
        Self::with_responder(Responder::Script {
            pending: script.into(),
            last: None,
        })
    }

    pub fn paid_for_any(delay: Duration) -> Self {
        Self::with_responder(Responder::PaidForAny { delay })
    }

    fn with_responder(responder: Responder) -> Self {
        Self {
            responder: Arc::new(Mutex::new(responder)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn calls(&self) -> Vec<VerificationCall> {
        self.calls.lock().await.clone()
    }

    async fn next_step(&self, order_id: &OrderId) -> Option<ScriptedVerification> {
        let mut responder = self.responder.lock().await;
        match &mut *responder {
            Responder::Script { pending, last } => {
                if let Some(step) = pending.pop_front() {
                    *last = Some(step);
                }
                last.clone()
            }
            Responder::PaidForAny { delay } => Some(ScriptedVerification::respond_after(
                *delay,
                json!({"result": [{"orderid": order_id.as_str(), "statuspay": "paid"}]}),
            )),
        }
    }
}

#[async_trait]
impl VerificationClient for ScriptedVerificationClient {
    async fn verify_payment(&self, order_id: &OrderId) -> Result<Value> {
        self.calls.lock().await.push(VerificationCall {
            order_id: order_id.clone(),
            at: Instant::now(),
        });

        let Some(step) = self.next_step(order_id).await else {
            return Ok(Value::Null);
        };
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        step.outcome.map_err(ReconcileError::Transport)
    }
}

/// Subscription activator that records every request it receives.
#[derive(Clone, Default)]
pub struct RecordingActivator {
    requests: Arc<Mutex<Vec<ActivationRequest>>>,
    failure: Option<String>,
    delay: Duration,
}

impl RecordingActivator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub async fn requests(&self) -> Vec<ActivationRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl SubscriptionActivator for RecordingActivator {
    async fn create_subscription(&self, request: ActivationRequest) -> Result<SubscriptionResult> {
        let number = {
            let mut requests = self.requests.lock().await;
            requests.push(request);
            requests.len()
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(ReconcileError::Storage(message.clone()));
        }
        Ok(SubscriptionResult {
            subscription_id: format!("sub-{number}"),
            config: Some(format!("vpn://config/{number}")),
        })
    }
}

#[derive(Clone, Default)]
pub struct StaticTariffCatalog {
    tariffs: Vec<Tariff>,
}

impl StaticTariffCatalog {
    pub fn new(tariffs: Vec<Tariff>) -> Self {
        Self { tariffs }
    }
}

#[async_trait]
impl TariffCatalog for StaticTariffCatalog {
    async fn tariffs(&self) -> Result<Vec<Tariff>> {
        Ok(self.tariffs.clone())
    }
}

/// Purchase gateway that always hands back the same receipt.
#[derive(Clone)]
pub struct StaticPurchaseGateway {
    receipt: PurchaseReceipt,
    drafts: Arc<Mutex<Vec<PurchaseDraft>>>,
    failure: Option<String>,
}

impl StaticPurchaseGateway {
    pub fn new(receipt: PurchaseReceipt) -> Self {
        Self {
            receipt,
            drafts: Arc::new(Mutex::new(Vec::new())),
            failure: None,
        }
    }

    pub fn failing(receipt: PurchaseReceipt, message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::new(receipt)
        }
    }

    pub async fn drafts(&self) -> Vec<PurchaseDraft> {
        self.drafts.lock().await.clone()
    }
}

#[async_trait]
impl PurchaseGateway for StaticPurchaseGateway {
    async fn create_purchase(&self, draft: &PurchaseDraft) -> Result<PurchaseReceipt> {
        self.drafts.lock().await.push(draft.clone());
        match &self.failure {
            Some(message) => Err(ReconcileError::Purchase(message.clone())),
            None => Ok(self.receipt.clone()),
        }
    }
}

/// How a scripted payment window behaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowScript {
    /// `None` keeps the window open forever.
    pub closes_after: Option<Duration>,
    /// Probing an open window raises a cross-origin error.
    pub cross_origin: bool,
    /// The host refuses to open the window at all.
    pub blocked: bool,
}

#[derive(Clone, Default)]
pub struct ScriptedWindowOpener {
    script: WindowScript,
    inspections: Arc<AtomicU32>,
}

impl ScriptedWindowOpener {
    pub fn new(script: WindowScript) -> Self {
        Self {
            script,
            inspections: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Number of times any opened window has been inspected.
    pub fn inspections(&self) -> u32 {
        self.inspections.load(Ordering::SeqCst)
    }
}

impl WindowOpener for ScriptedWindowOpener {
    fn open(&self, _url: &str) -> Option<WindowHandleBox> {
        if self.script.blocked {
            return None;
        }
        Some(Box::new(ScriptedWindow {
            opened_at: Instant::now(),
            script: self.script,
            inspections: Arc::clone(&self.inspections),
        }))
    }
}

struct ScriptedWindow {
    opened_at: Instant,
    script: WindowScript,
    inspections: Arc<AtomicU32>,
}

impl WindowHandle for ScriptedWindow {
    fn is_closed(&self) -> std::result::Result<bool, WindowInspectError> {
        self.inspections.fetch_add(1, Ordering::SeqCst);
        let closed = self
            .script
            .closes_after
            .is_some_and(|after| self.opened_at.elapsed() >= after);
        if !closed && self.script.cross_origin {
            return Err(WindowInspectError::CrossOrigin);
        }
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_claim_is_exclusive() {
        let store = InMemoryGuardStore::new();
        let order = OrderId::from("o1");

        assert!(store.try_claim(&order, GuardState::Activating).await.unwrap());
        assert!(!store.try_claim(&order, GuardState::Rejected).await.unwrap());
        assert_eq!(store.get(&order).await.unwrap(), Some(GuardState::Activating));

        store.set(&order, GuardState::Activated).await.unwrap();
        assert_eq!(store.get(&order).await.unwrap(), Some(GuardState::Activated));
        assert_eq!(store.get(&OrderId::from("o2")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let store = InMemoryGuardStore::new();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .try_claim(&OrderId::from("o1"), GuardState::Activating)
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_script_repeats_last_answer() {
        let client = ScriptedVerificationClient::new(vec![
            ScriptedVerification::fail("timeout"),
            ScriptedVerification::respond(json!({"result": []})),
        ]);
        let order = OrderId::from("o1");

        assert!(client.verify_payment(&order).await.is_err());
        assert_eq!(client.verify_payment(&order).await.unwrap(), json!({"result": []}));
        assert_eq!(client.verify_payment(&order).await.unwrap(), json!({"result": []}));
        assert_eq!(client.calls().await.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_script_is_inconclusive() {
        let client = ScriptedVerificationClient::new(Vec::new());
        assert_eq!(client.verify_payment(&OrderId::from("o1")).await.unwrap(), Value::Null);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_window_closes_on_schedule() {
        let opener = ScriptedWindowOpener::new(WindowScript {
            closes_after: Some(Duration::from_secs(2)),
            cross_origin: true,
            blocked: false,
        });
        let window = opener.open("https://pay/x").unwrap();

        assert_eq!(window.is_closed(), Err(WindowInspectError::CrossOrigin));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(window.is_closed(), Ok(true));
        assert_eq!(opener.inspections(), 2);
    }

    #[test]
    fn test_blocked_window_is_not_opened() {
        let opener = ScriptedWindowOpener::new(WindowScript {
            blocked: true,
            ..WindowScript::default()
        });
        assert!(opener.open("https://pay/x").is_none());
    }

    #[tokio::test]
    async fn test_recording_activator_failure() {
        let activator = RecordingActivator::failing("store unavailable");
        let request = ActivationRequest {
            tariff: Tariff {
                id: "t1".to_string(),
                name: "Basic".to_string(),
                price: Default::default(),
            },
            devices: 1,
            period_months: 1,
            test_period: false,
            payment_mode: Default::default(),
            discount: Default::default(),
        };
        assert!(activator.create_subscription(request).await.is_err());
        assert_eq!(activator.requests().await.len(), 1);
    }
}

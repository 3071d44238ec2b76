use super::signal::{OrderControl, Settlement};
use super::verification::VerificationService;
use crate::domain::payment::{OrderId, PaymentRecord, PaymentStatus};
use crate::domain::ports::{GuardStoreBox, SubscriptionActivatorBox, TariffCatalogBox};
use crate::domain::purchase::{PaymentMode, PaymentSession, PurchaseDraft};
use crate::domain::state::{CheckoutEvent, GuardState, ProcessingState};
use crate::domain::tariff::{
    ActivationRequest, FallbackContext, SubscriptionContext, SubscriptionResult, Tariff,
};
use crate::error::{ReconcileError, Result};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, error, info, instrument, warn};

const EVENT_CAPACITY: usize = 256;

/// What a call to [`ReconciliationCoordinator::resolve`] ended up doing.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Activated(SubscriptionResult),
    /// Another path already claimed the order.
    AlreadyResolved(GuardState),
    /// The record was not `paid`; nothing to do.
    NotPaid(PaymentStatus),
}

/// Result of a user-triggered payment check.
#[derive(Debug, Clone, PartialEq)]
pub enum ManualCheck {
    Activated(SubscriptionResult),
    NotYetPaid,
    Rejected(PaymentStatus),
    AlreadyResolved(GuardState),
}

/// Outcome of trying to take the guard for an order.
enum Claim {
    Won,
    Held(GuardState),
    /// An `activating` guard nobody in this process is working on. It has been
    /// turned into `activation_failed`.
    Stale,
}

struct OrderEntry {
    context: FallbackContext,
    session: Option<PaymentSession>,
    /// `None` once the automatic paths for the order have stopped.
    control: Option<OrderControl>,
}

/// Owns the reconciliation guard and is the only path to subscription activation.
///
/// The window observer, the staged poller and manual checks all funnel through
/// here. The guard is claimed before activation is awaited, so concurrent paid
/// confirmations for the same order activate it once. Every claim that wins or
/// fails settles the order, so no waiting task is left behind.
pub struct ReconciliationCoordinator {
    guards: GuardStoreBox,
    verifier: VerificationService,
    activator: SubscriptionActivatorBox,
    catalog: TariffCatalogBox,
    current_subscription: Option<SubscriptionContext>,
    orders: Mutex<HashMap<OrderId, OrderEntry>>,
    /// Orders whose activation is running in this process. Claims go through this lock.
    in_flight: Mutex<HashSet<OrderId>>,
    events: broadcast::Sender<CheckoutEvent>,
}

impl ReconciliationCoordinator {
    pub fn new(
        guards: GuardStoreBox,
        verifier: VerificationService,
        activator: SubscriptionActivatorBox,
        catalog: TariffCatalogBox,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            guards,
            verifier,
            activator,
            catalog,
            current_subscription: None,
            orders: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            events,
        }
    }

    /// Subscription fields of the signed-in user, used when the order carries none.
    pub fn with_current_subscription(mut self, subscription: Option<SubscriptionContext>) -> Self {
        self.current_subscription = subscription;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CheckoutEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: CheckoutEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub fn emit_state(&self, order_id: &OrderId, state: ProcessingState) {
        debug!(order_id = %order_id, %state, message = state.message(), "processing state");
        self.emit(CheckoutEvent::StateChanged {
            order_id: order_id.clone(),
            state,
        });
    }

    /// Starts tracking a payment session and returns the signals for its tasks.
    pub async fn register(&self, session: PaymentSession, draft: PurchaseDraft) -> OrderControl {
        let order_id = session.order_id.clone();
        let context = FallbackContext::for_order(order_id.clone())
            .with_amount(session.amount)
            .with_draft(draft)
            .with_subscription(self.current_subscription.clone());
        let control = OrderControl::new();

        let mut orders = self.orders.lock().await;
        orders.insert(
            order_id,
            OrderEntry {
                context,
                session: Some(session.clone()),
                control: Some(control.clone()),
            },
        );
        drop(orders);

        self.emit(CheckoutEvent::SessionOpened(session));
        control
    }

    pub async fn session(&self, order_id: &OrderId) -> Option<PaymentSession> {
        let orders = self.orders.lock().await;
        orders.get(order_id).and_then(|entry| entry.session.clone())
    }

    /// Whether the coordinator still holds any state for `order_id`.
    pub async fn is_tracking(&self, order_id: &OrderId) -> bool {
        self.orders.lock().await.contains_key(order_id)
    }

    pub async fn guard(&self, order_id: &OrderId) -> Result<Option<GuardState>> {
        self.guards.get(order_id).await
    }

    async fn context(&self, order_id: &OrderId) -> FallbackContext {
        let orders = self.orders.lock().await;
        match orders.get(order_id) {
            Some(entry) => entry.context.clone(),
            None => FallbackContext::for_order(order_id.clone())
                .with_subscription(self.current_subscription.clone()),
        }
    }

    /// One verification round trip for `order_id`, normalized.
    pub async fn check(&self, order_id: &OrderId) -> Result<Option<PaymentRecord>> {
        let context = self.context(order_id).await;
        self.verifier.check(order_id, &context).await
    }

    /// Signals the running tasks; once they are gone, a final settlement also
    /// forgets the order.
    async fn settle(&self, order_id: &OrderId, settlement: Settlement) {
        let mut orders = self.orders.lock().await;
        let Some(entry) = orders.get(order_id) else {
            return;
        };
        match &entry.control {
            Some(control) => {
                control.settled.set(settlement);
            }
            None if settlement != Settlement::Exhausted => {
                orders.remove(order_id);
            }
            None => {}
        }
    }

    async fn clear_session(&self, order_id: &OrderId) {
        let mut orders = self.orders.lock().await;
        let cleared = orders
            .get_mut(order_id)
            .and_then(|entry| entry.session.take())
            .is_some();
        drop(orders);
        if cleared {
            self.emit(CheckoutEvent::SessionCleared {
                order_id: order_id.clone(),
            });
        }
    }

    /// Takes the guard for `order_id`, or reports who holds it.
    async fn claim(&self, order_id: &OrderId, state: GuardState) -> Result<Claim> {
        let mut in_flight = self.in_flight.lock().await;
        if self.guards.try_claim(order_id, state).await? {
            if state == GuardState::Activating {
                in_flight.insert(order_id.clone());
            }
            return Ok(Claim::Won);
        }
        match self.guards.get(order_id).await? {
            Some(GuardState::Activating) | None if !in_flight.contains(order_id) => {
                self.guards
                    .set(order_id, GuardState::ActivationFailed)
                    .await?;
                Ok(Claim::Stale)
            }
            Some(existing) => Ok(Claim::Held(existing)),
            None => Ok(Claim::Held(GuardState::Activating)),
        }
    }

    /// Reports a paid order that could not be activated and settles it.
    async fn fail_resolution(
        &self,
        order_id: &OrderId,
        error: ReconcileError,
        record_guard: bool,
    ) -> ReconcileError {
        error!(order_id = %order_id, error = %error, "payment confirmed but activation failed; manual intervention required");
        if record_guard {
            if let Err(e) = self.guards.set(order_id, GuardState::ActivationFailed).await {
                error!(order_id = %order_id, error = %e, "failed activation could not be recorded");
            }
        }
        self.emit(CheckoutEvent::ResolutionFailed {
            order_id: order_id.clone(),
            reason: error.to_string(),
            reload_recommended: true,
        });
        self.settle(order_id, Settlement::ActivationFailed).await;
        error
    }

    async fn fail_stale_claim(&self, order_id: &OrderId) {
        let error = ReconcileError::Activation {
            order_id: order_id.to_string(),
            message: "activation started in an earlier session never finished".to_string(),
        };
        self.fail_resolution(order_id, error, false).await;
    }

    /// Activates the subscription for a confirmed payment, at most once per order.
    ///
    /// Activation failures leave the guard set; they are never retried here.
    #[instrument(skip_all, fields(order_id = %order_id))]
    pub async fn resolve(&self, order_id: &OrderId, record: PaymentRecord) -> Result<Resolution> {
        if !record.is_paid() {
            return Ok(Resolution::NotPaid(record.status));
        }
        match self.claim(order_id, GuardState::Activating).await {
            Ok(Claim::Won) => {}
            Ok(Claim::Held(state)) => {
                debug!(?state, "order already claimed");
                if let Some(settlement) = settlement_for(state) {
                    self.settle(order_id, settlement).await;
                }
                return Ok(Resolution::AlreadyResolved(state));
            }
            Ok(Claim::Stale) => {
                self.fail_stale_claim(order_id).await;
                return Ok(Resolution::AlreadyResolved(GuardState::ActivationFailed));
            }
            Err(e) => return Err(self.fail_resolution(order_id, e, false).await),
        }
        info!(amount = %record.amount, "payment confirmed, activating subscription");

        let result = self.activate(order_id, &record).await;
        self.in_flight.lock().await.remove(order_id);
        result
    }

    async fn activate(&self, order_id: &OrderId, record: &PaymentRecord) -> Result<Resolution> {
        let context = self.context(order_id).await;
        let outcome = match self.activation_request(order_id, record, &context).await {
            Ok(request) => self.activator.create_subscription(request).await.map_err(|e| {
                ReconcileError::Activation {
                    order_id: order_id.to_string(),
                    message: e.to_string(),
                }
            }),
            Err(e) => Err(e),
        };

        let subscription = match outcome {
            Ok(subscription) => subscription,
            Err(e) => return Err(self.fail_resolution(order_id, e, true).await),
        };
        if let Err(e) = self.guards.set(order_id, GuardState::Activated).await {
            let error = ReconcileError::Activation {
                order_id: order_id.to_string(),
                message: format!(
                    "subscription {} was created but could not be recorded: {e}",
                    subscription.subscription_id
                ),
            };
            return Err(self.fail_resolution(order_id, error, false).await);
        }

        info!(subscription_id = %subscription.subscription_id, "subscription activated");
        self.clear_session(order_id).await;
        self.emit(CheckoutEvent::Activated {
            order_id: order_id.clone(),
            subscription: subscription.clone(),
        });
        self.emit(CheckoutEvent::ResyncRequested);
        self.settle(order_id, Settlement::Activated).await;
        Ok(Resolution::Activated(subscription))
    }

    async fn activation_request(
        &self,
        order_id: &OrderId,
        record: &PaymentRecord,
        context: &FallbackContext,
    ) -> Result<ActivationRequest> {
        let tariffs = self
            .catalog
            .tariffs()
            .await
            .map_err(|e| ReconcileError::Activation {
                order_id: order_id.to_string(),
                message: format!("tariff catalog unavailable: {e}"),
            })?;
        let tariff = resolve_tariff(&tariffs, record, context).ok_or_else(|| {
            ReconcileError::TariffUnresolved {
                order_id: order_id.to_string(),
            }
        })?;

        // A confirmed payment always activates as pay-now, whatever mode the draft had.
        Ok(ActivationRequest {
            tariff,
            devices: record.devices.or_else(|| context.devices()).unwrap_or(1),
            period_months: record
                .period_months
                .or_else(|| context.period_months())
                .unwrap_or(1),
            test_period: false,
            payment_mode: PaymentMode::PayNow,
            discount: record
                .discount
                .or_else(|| context.discount())
                .unwrap_or(Decimal::ZERO),
        })
    }

    /// Records a gateway decline. The order is closed and never activated.
    ///
    /// A guard that cannot be written is reported, but the decline still ends the
    /// checkout.
    #[instrument(skip_all, fields(order_id = %order_id))]
    pub async fn reject(&self, order_id: &OrderId, status: PaymentStatus) -> Result<bool> {
        match self.claim(order_id, GuardState::Rejected).await {
            Ok(Claim::Won) => {
                self.finish_rejection(order_id, status).await;
                Ok(true)
            }
            Ok(Claim::Held(state)) => {
                if let Some(settlement) = settlement_for(state) {
                    self.settle(order_id, settlement).await;
                }
                Ok(false)
            }
            Ok(Claim::Stale) => {
                self.fail_stale_claim(order_id).await;
                Ok(false)
            }
            Err(e) => {
                error!(error = %e, "declined payment could not be recorded");
                self.finish_rejection(order_id, status).await;
                Err(e)
            }
        }
    }

    async fn finish_rejection(&self, order_id: &OrderId, status: PaymentStatus) {
        warn!(%status, "payment declined by gateway");
        self.clear_session(order_id).await;
        self.emit(CheckoutEvent::Rejected {
            order_id: order_id.clone(),
            status,
        });
        self.settle(order_id, Settlement::Rejected).await;
    }

    /// The poller gave up. The session is discarded but the guard stays clear, so
    /// a manual check can still succeed with the order's context.
    pub async fn exhaust(&self, order_id: &OrderId) {
        warn!(order_id = %order_id, "no conclusive payment status within the attempt budget");
        self.clear_session(order_id).await;
        self.emit(CheckoutEvent::Exhausted {
            order_id: order_id.clone(),
        });
        self.settle(order_id, Settlement::Exhausted).await;
    }

    /// Acts on a verification result obtained by any automatic path.
    pub async fn apply(&self, order_id: &OrderId, record: PaymentRecord) -> Result<()> {
        if record.is_paid() {
            self.resolve(order_id, record).await?;
        } else if record.status.is_terminal_negative() {
            self.reject(order_id, record.status).await?;
        }
        Ok(())
    }

    /// Runs the immediate check that follows the payment window closing.
    ///
    /// Inconclusive answers are left to the poller.
    #[instrument(skip_all, fields(order_id = %order_id))]
    pub async fn on_window_closed(&self, order_id: &OrderId) -> Result<()> {
        if self.guards.get(order_id).await?.is_some() {
            return Ok(());
        }
        match self.check(order_id).await {
            Ok(Some(record)) => self.apply(order_id, record).await,
            Ok(None) => Ok(()),
            Err(e) if e.is_inconclusive() => {
                debug!(error = %e, "closure check inconclusive");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// A single user-triggered check, with no staging and no retry budget.
    #[instrument(skip_all, fields(order_id = %order_id))]
    pub async fn check_now(&self, order_id: &OrderId) -> Result<ManualCheck> {
        if let Some(state) = self.guards.get(order_id).await? {
            return Ok(ManualCheck::AlreadyResolved(state));
        }
        let Some(record) = self.check(order_id).await? else {
            return Ok(ManualCheck::NotYetPaid);
        };
        match record.status {
            PaymentStatus::Paid => match self.resolve(order_id, record).await? {
                Resolution::Activated(subscription) => Ok(ManualCheck::Activated(subscription)),
                Resolution::AlreadyResolved(state) => Ok(ManualCheck::AlreadyResolved(state)),
                Resolution::NotPaid(_) => Ok(ManualCheck::NotYetPaid),
            },
            status if status.is_terminal_negative() => {
                self.reject(order_id, status).await?;
                Ok(ManualCheck::Rejected(status))
            }
            _ => Ok(ManualCheck::NotYetPaid),
        }
    }

    /// The automatic paths for `order_id` have stopped.
    ///
    /// An exhausted order keeps its context so a manual check can still complete
    /// it; any other order is forgotten.
    pub async fn release(&self, order_id: &OrderId) {
        let mut orders = self.orders.lock().await;
        let Some(entry) = orders.get_mut(order_id) else {
            return;
        };
        let settlement = entry.control.take().and_then(|control| control.settled.get());
        if settlement != Some(Settlement::Exhausted) {
            orders.remove(order_id);
        }
        debug!(order_id = %order_id, ?settlement, "order released");
    }

    /// Tears down every task working on `order_id` and forgets its session.
    pub async fn unmount(&self, order_id: &OrderId) {
        let entry = self.orders.lock().await.remove(order_id);
        if let Some(control) = entry.and_then(|entry| entry.control) {
            control.unmount.set(());
            debug!(order_id = %order_id, "order unmounted");
        }
    }
}

/// Settlement implied by a guard some other path already holds. An in-flight
/// activation settles the order itself.
fn settlement_for(state: GuardState) -> Option<Settlement> {
    match state {
        GuardState::Activating => None,
        GuardState::Activated => Some(Settlement::Activated),
        GuardState::ActivationFailed => Some(Settlement::ActivationFailed),
        GuardState::Rejected => Some(Settlement::Rejected),
    }
}

/// Picks the tariff to activate: by id, then by name, then from the caller's
/// context. There is deliberately no "any tariff" fallback.
pub fn resolve_tariff(
    tariffs: &[Tariff],
    record: &PaymentRecord,
    context: &FallbackContext,
) -> Option<Tariff> {
    let by_id = |id: Option<String>| {
        let id = id?;
        tariffs.iter().find(|t| t.id == id).cloned()
    };
    let by_name = |name: Option<String>| {
        let name = name?.trim().to_lowercase();
        tariffs
            .iter()
            .find(|t| t.name.trim().to_lowercase() == name)
            .cloned()
    };

    by_id(record.tariff_id.clone())
        .or_else(|| by_name(record.tariff_name.clone()))
        .or_else(|| by_id(context.tariff_id()))
        .or_else(|| by_name(context.tariff_name()))
}

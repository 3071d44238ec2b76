use super::coordinator::{ManualCheck, ReconciliationCoordinator};
use super::observer::WindowObserver;
use super::poller::{PollOutcome, StagedPoller};
use crate::config::ReconcileConfig;
use crate::domain::payment::OrderId;
use crate::domain::ports::{PurchaseGatewayBox, WindowOpenerBox};
use crate::domain::purchase::{PaymentSession, PurchaseDraft, PurchaseReceipt};
use crate::error::{ReconcileError, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// Outcome of starting a checkout.
pub enum CheckoutStart {
    /// The purchase needed no payment; the reconciliation workflow is not involved.
    Completed(PurchaseReceipt),
    Reconciling(ReconciliationHandle),
}

/// Handle to the background tasks reconciling one order.
pub struct ReconciliationHandle {
    session: PaymentSession,
    coordinator: Arc<ReconciliationCoordinator>,
    poller: JoinHandle<PollOutcome>,
    observer: Option<JoinHandle<()>>,
}

impl ReconciliationHandle {
    pub fn session(&self) -> &PaymentSession {
        &self.session
    }

    pub fn order_id(&self) -> &OrderId {
        &self.session.order_id
    }

    /// The hosting view is going away: stop every timer for this order.
    pub async fn unmount(&self) {
        self.coordinator.unmount(self.order_id()).await;
    }

    /// Waits for the poller and the window observer to stop.
    pub async fn finished(self) -> Result<PollOutcome> {
        let outcome = self.poller.await?;
        if let Some(observer) = self.observer {
            observer.await?;
        }
        Ok(outcome)
    }
}

/// Entry point of the purchase flow: creates the payment and starts reconciling it.
pub struct CheckoutService {
    purchases: PurchaseGatewayBox,
    windows: WindowOpenerBox,
    coordinator: Arc<ReconciliationCoordinator>,
    config: ReconcileConfig,
}

impl CheckoutService {
    pub fn new(
        purchases: PurchaseGatewayBox,
        windows: WindowOpenerBox,
        coordinator: Arc<ReconciliationCoordinator>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            purchases,
            windows,
            coordinator,
            config,
        }
    }

    pub fn coordinator(&self) -> &Arc<ReconciliationCoordinator> {
        &self.coordinator
    }

    /// Requests the purchase and, if it needs a payment, opens the payment window
    /// and starts the window observer and the staged poller.
    #[instrument(skip_all, fields(tariff_id = %draft.tariff_id))]
    pub async fn start(&self, draft: PurchaseDraft) -> Result<CheckoutStart> {
        let receipt = self.purchases.create_purchase(&draft).await?;
        if !receipt.requires_payment {
            info!(order_id = %receipt.order_id, "purchase completed without payment");
            return Ok(CheckoutStart::Completed(receipt));
        }
        let session = PaymentSession::from_receipt(&receipt).ok_or_else(|| {
            ReconcileError::Purchase(format!(
                "order {} requires payment but has no payment URL",
                receipt.order_id
            ))
        })?;
        let order_id = session.order_id.clone();
        info!(order_id = %order_id, amount = ?session.amount, "payment session opened");

        let control = self.coordinator.register(session.clone(), draft).await;

        let observer = match self.windows.open(&session.payment_url) {
            Some(window) => {
                let observer = WindowObserver::new(window, self.config.window_inspect_interval());
                let coordinator = Arc::clone(&self.coordinator);
                let control = control.clone();
                let order_id = order_id.clone();
                Some(tokio::spawn(async move {
                    if observer.closed(&control).await {
                        info!(order_id = %order_id, "payment window closed, checking payment");
                        if let Err(e) = coordinator.on_window_closed(&order_id).await {
                            warn!(order_id = %order_id, error = %e, "closure check failed");
                        }
                    }
                }))
            }
            None => {
                warn!(order_id = %order_id, "payment window was blocked; relying on polling");
                None
            }
        };

        let poller = StagedPoller::new(Arc::clone(&self.coordinator), self.config.clone());
        let coordinator = Arc::clone(&self.coordinator);
        let poller = tokio::spawn(async move {
            let outcome = poller.run(order_id.clone(), control).await;
            coordinator.release(&order_id).await;
            outcome
        });

        Ok(CheckoutStart::Reconciling(ReconciliationHandle {
            session,
            coordinator: Arc::clone(&self.coordinator),
            poller,
            observer,
        }))
    }

    pub async fn check_now(&self, order_id: &OrderId) -> Result<ManualCheck> {
        self.coordinator.check_now(order_id).await
    }
}

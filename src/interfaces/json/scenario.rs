use crate::application::checkout::{CheckoutService, CheckoutStart};
use crate::application::coordinator::{ManualCheck, ReconciliationCoordinator};
use crate::application::poller::PollOutcome;
use crate::application::verification::VerificationService;
use crate::config::ReconcileConfig;
use crate::domain::ports::GuardStoreBox;
use crate::domain::purchase::{PurchaseDraft, PurchaseReceipt};
use crate::domain::state::CheckoutEvent;
use crate::domain::tariff::{SubscriptionContext, Tariff};
use crate::error::Result;
use crate::infrastructure::in_memory::{
    RecordingActivator, ScriptedVerification, ScriptedVerificationClient, ScriptedWindowOpener,
    StaticPurchaseGateway, StaticTariffCatalog, WindowScript,
};
use serde::Deserialize;
use serde_json::Value;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{info, warn};

/// One answer of the scripted verification workflow.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationStep {
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub response: Value,
    /// Simulates a transport failure instead of answering.
    #[serde(default)]
    pub error: Option<String>,
}

impl From<VerificationStep> for ScriptedVerification {
    fn from(step: VerificationStep) -> Self {
        let delay = Duration::from_millis(step.delay_ms);
        match step.error {
            Some(message) => ScriptedVerification {
                delay,
                outcome: Err(message),
            },
            None => ScriptedVerification::respond_after(delay, step.response),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WindowSettings {
    pub closes_after_ms: Option<u64>,
    pub blocked: bool,
    pub cross_origin: bool,
}

impl From<WindowSettings> for WindowScript {
    fn from(window: WindowSettings) -> Self {
        WindowScript {
            closes_after: window.closes_after_ms.map(Duration::from_millis),
            cross_origin: window.cross_origin,
            blocked: window.blocked,
        }
    }
}

/// A scripted checkout: the purchase, the gateway's answers and the window's behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub draft: PurchaseDraft,
    pub purchase: PurchaseReceipt,
    #[serde(default)]
    pub tariffs: Vec<Tariff>,
    #[serde(default)]
    pub subscription: Option<SubscriptionContext>,
    #[serde(default)]
    pub verifications: Vec<VerificationStep>,
    #[serde(default)]
    pub window: WindowSettings,
    /// Makes the subscription activator fail with this message.
    #[serde(default)]
    pub activation_error: Option<String>,
    #[serde(default)]
    pub timings: Option<ReconcileConfig>,
    /// Runs one manual check after the automatic paths stop.
    #[serde(default)]
    pub manual_check: bool,
}

/// What happened while a scenario ran.
#[derive(Debug)]
pub struct ScenarioReport {
    pub events: Vec<CheckoutEvent>,
    /// `None` when the purchase needed no payment.
    pub outcome: Option<PollOutcome>,
    pub manual: Option<ManualCheck>,
}

impl Scenario {
    pub fn from_reader<R: Read>(source: R) -> Result<Self> {
        Ok(serde_json::from_reader(source)?)
    }

    /// Timings embedded in the scenario win over `base`.
    pub fn config(&self, base: &ReconcileConfig) -> Result<ReconcileConfig> {
        let config = self.timings.clone().unwrap_or_else(|| base.clone());
        config.validate()?;
        Ok(config)
    }

    /// Runs the whole checkout against scripted collaborators.
    pub async fn run(self, base: &ReconcileConfig, guards: GuardStoreBox) -> Result<ScenarioReport> {
        let config = self.config(base)?;
        let client = ScriptedVerificationClient::new(
            self.verifications.into_iter().map(Into::into).collect(),
        );
        let activator = match self.activation_error {
            Some(message) => RecordingActivator::failing(message),
            None => RecordingActivator::new(),
        };
        let coordinator = ReconciliationCoordinator::new(
            guards,
            VerificationService::new(Box::new(client), config.verify_timeout()),
            Box::new(activator),
            Box::new(StaticTariffCatalog::new(self.tariffs)),
        )
        .with_current_subscription(self.subscription);
        let coordinator = Arc::new(coordinator);
        let mut events = coordinator.subscribe();

        let service = CheckoutService::new(
            Box::new(StaticPurchaseGateway::new(self.purchase)),
            Box::new(ScriptedWindowOpener::new(self.window.into())),
            Arc::clone(&coordinator),
            config,
        );

        let mut report = ScenarioReport {
            events: Vec::new(),
            outcome: None,
            manual: None,
        };
        let order_id = match service.start(self.draft).await? {
            CheckoutStart::Completed(receipt) => {
                info!(order_id = %receipt.order_id, "no payment required");
                return Ok(report);
            }
            CheckoutStart::Reconciling(handle) => {
                let order_id = handle.order_id().clone();
                report.outcome = Some(handle.finished().await?);
                order_id
            }
        };

        if self.manual_check {
            match service.check_now(&order_id).await {
                Ok(manual) => report.manual = Some(manual),
                Err(e) => warn!(order_id = %order_id, error = %e, "manual check failed"),
            }
        }

        loop {
            match events.try_recv() {
                Ok(event) => report.events.push(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "event log lagged");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::signal::Settlement;
    use crate::domain::state::ProcessingState;
    use crate::infrastructure::in_memory::InMemoryGuardStore;

    const PAID: &str = r#"{
        "draft": {"tariffId": "t1", "devices": 2, "periodMonths": 1, "paymentMode": "pay_later"},
        "purchase": {"orderId": "o1", "paymentUrl": "https://pay/x", "amount": 150, "requiresPayment": true},
        "tariffs": [{"id": "t1", "name": "Basic", "price": 150}],
        "verifications": [
            {"error": "connection reset"},
            {"response": {"result": [{"orderid": "o1", "statuspay": "Оплачено", "sum": "150"}]}}
        ],
        "timings": {"waitingAfterMs": 30, "checkingAfterMs": 20, "attemptIntervalMs": 30, "errorResetMs": 30}
    }"#;

    #[test]
    fn test_parse_scenario() {
        let scenario = Scenario::from_reader(PAID.as_bytes()).unwrap();
        assert_eq!(scenario.purchase.order_id.as_str(), "o1");
        assert_eq!(scenario.verifications.len(), 2);
        assert!(scenario.verifications[0].error.is_some());

        let config = scenario.config(&ReconcileConfig::default()).unwrap();
        assert_eq!(config.waiting_after_ms, 30);
        assert_eq!(config.max_attempts, 6);
    }

    #[test]
    fn test_invalid_timings_rejected() {
        let mut scenario = Scenario::from_reader(PAID.as_bytes()).unwrap();
        scenario.timings = Some(ReconcileConfig {
            max_attempts: 0,
            ..ReconcileConfig::default()
        });
        assert!(scenario.config(&ReconcileConfig::default()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_paid_scenario() {
        let scenario = Scenario::from_reader(PAID.as_bytes()).unwrap();
        let report = scenario
            .run(&ReconcileConfig::default(), Box::new(InMemoryGuardStore::new()))
            .await
            .unwrap();

        assert_eq!(report.outcome, Some(PollOutcome::Settled(Settlement::Activated)));
        let activations = report
            .events
            .iter()
            .filter(|e| matches!(e, CheckoutEvent::Activated { .. }))
            .count();
        assert_eq!(activations, 1);
        assert!(matches!(
            report.events.last(),
            Some(CheckoutEvent::StateChanged {
                state: ProcessingState::Success,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_run_without_payment() {
        let scenario: Scenario = serde_json::from_str(
            r#"{
                "draft": {"tariffId": "t1", "devices": 1, "periodMonths": 1},
                "purchase": {"orderId": "o2", "requiresPayment": false}
            }"#,
        )
        .unwrap();
        let report = scenario
            .run(&ReconcileConfig::default(), Box::new(InMemoryGuardStore::new()))
            .await
            .unwrap();

        assert!(report.outcome.is_none());
        assert!(report.events.is_empty());
    }
}

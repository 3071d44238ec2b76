use super::payment::OrderId;
use super::purchase::{PurchaseDraft, PurchaseReceipt};
use super::state::GuardState;
use super::tariff::{ActivationRequest, SubscriptionResult, Tariff};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Creates the payment record server-side and hands back where to pay.
#[async_trait]
pub trait PurchaseGateway: Send + Sync {
    async fn create_purchase(&self, draft: &PurchaseDraft) -> Result<PurchaseReceipt>;
}

/// Asks the automation workflow what it knows about an order.
///
/// Must be safe to call repeatedly for the same order.
#[async_trait]
pub trait VerificationClient: Send + Sync {
    async fn verify_payment(&self, order_id: &OrderId) -> Result<Value>;
}

#[async_trait]
pub trait SubscriptionActivator: Send + Sync {
    async fn create_subscription(&self, request: ActivationRequest) -> Result<SubscriptionResult>;
}

#[async_trait]
pub trait TariffCatalog: Send + Sync {
    async fn tariffs(&self) -> Result<Vec<Tariff>>;
}

/// Storage for the per-order reconciliation guard.
#[async_trait]
pub trait GuardStore: Send + Sync {
    /// Atomically sets `state` for `order_id` if no state exists yet.
    ///
    /// Returns `true` when this call won the claim.
    async fn try_claim(&self, order_id: &OrderId, state: GuardState) -> Result<bool>;
    async fn set(&self, order_id: &OrderId, state: GuardState) -> Result<()>;
    async fn get(&self, order_id: &OrderId) -> Result<Option<GuardState>>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowInspectError {
    /// The window navigated to another origin and refuses inspection.
    #[error("cross-origin window refused inspection")]
    CrossOrigin,
}

/// A payment window opened by us but owned by the host platform.
pub trait WindowHandle: Send + Sync {
    fn is_closed(&self) -> std::result::Result<bool, WindowInspectError>;
}

pub trait WindowOpener: Send + Sync {
    /// Returns `None` when the host refused to open the window.
    fn open(&self, url: &str) -> Option<WindowHandleBox>;
}

pub type PurchaseGatewayBox = Box<dyn PurchaseGateway>;
pub type VerificationClientBox = Box<dyn VerificationClient>;
pub type SubscriptionActivatorBox = Box<dyn SubscriptionActivator>;
pub type TariffCatalogBox = Box<dyn TariffCatalog>;
pub type GuardStoreBox = Box<dyn GuardStore>;
pub type WindowHandleBox = Box<dyn WindowHandle>;
pub type WindowOpenerBox = Box<dyn WindowOpener>;

use super::payment::OrderId;
use super::purchase::{PaymentMode, PurchaseDraft};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tariff {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub price: Decimal,
}

/// Subscription fields the current user already has on record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionContext {
    #[serde(default)]
    pub tariff_id: Option<String>,
    #[serde(default)]
    pub tariff_name: Option<String>,
    #[serde(default)]
    pub devices: Option<u32>,
    #[serde(default)]
    pub period_months: Option<u32>,
}

/// Everything the caller knows about an order besides what the gateway reports.
///
/// Vendor records rarely carry tariff metadata, so a paid record is completed from
/// the draft first and from the existing subscription second.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FallbackContext {
    pub order_id: Option<OrderId>,
    pub amount: Option<Decimal>,
    pub draft: Option<PurchaseDraft>,
    pub subscription: Option<SubscriptionContext>,
}

impl FallbackContext {
    pub fn for_order(order_id: OrderId) -> Self {
        Self {
            order_id: Some(order_id),
            ..Self::default()
        }
    }

    pub fn with_draft(mut self, draft: PurchaseDraft) -> Self {
        self.draft = Some(draft);
        self
    }

    pub fn with_amount(mut self, amount: Option<Decimal>) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_subscription(mut self, subscription: Option<SubscriptionContext>) -> Self {
        self.subscription = subscription;
        self
    }

    pub fn tariff_id(&self) -> Option<String> {
        self.draft
            .as_ref()
            .map(|d| d.tariff_id.clone())
            .or_else(|| self.subscription.as_ref()?.tariff_id.clone())
    }

    pub fn tariff_name(&self) -> Option<String> {
        self.subscription.as_ref()?.tariff_name.clone()
    }

    pub fn devices(&self) -> Option<u32> {
        self.draft
            .as_ref()
            .map(|d| d.devices)
            .or_else(|| self.subscription.as_ref()?.devices)
    }

    pub fn period_months(&self) -> Option<u32> {
        self.draft
            .as_ref()
            .map(|d| d.period_months)
            .or_else(|| self.subscription.as_ref()?.period_months)
    }

    pub fn discount(&self) -> Option<Decimal> {
        self.draft.as_ref().map(|d| d.discount)
    }
}

/// Parameters handed to the subscription-creation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationRequest {
    pub tariff: Tariff,
    pub devices: u32,
    pub period_months: u32,
    pub test_period: bool,
    pub payment_mode: PaymentMode,
    pub discount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResult {
    pub subscription_id: String,
    #[serde(default)]
    pub config: Option<String>,
}

use super::payment::OrderId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    #[default]
    PayNow,
    PayLater,
}

/// What the user confirmed in the tariff picker.
///
/// Immutable once built; consumed by a single purchase request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseDraft {
    pub tariff_id: String,
    pub devices: u32,
    pub period_months: u32,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub payment_mode: PaymentMode,
}

/// Response of the purchase request collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceipt {
    pub order_id: OrderId,
    #[serde(default)]
    pub payment_url: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    pub requires_payment: bool,
}

/// An order that is waiting for an external payment to clear.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSession {
    pub order_id: OrderId,
    pub payment_url: String,
    pub amount: Option<Decimal>,
    pub created_at: SystemTime,
}

impl PaymentSession {
    /// Builds a session from a receipt, if the receipt actually asks for a payment.
    pub fn from_receipt(receipt: &PurchaseReceipt) -> Option<Self> {
        if !receipt.requires_payment {
            return None;
        }
        let payment_url = receipt.payment_url.clone()?;
        Some(Self {
            order_id: receipt.order_id.clone(),
            payment_url,
            amount: receipt.amount,
            created_at: SystemTime::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_receipt_deserialization() {
        let json = r#"{"orderId":"o1","paymentUrl":"https://pay/x","amount":"150","requiresPayment":true}"#;
        let receipt: PurchaseReceipt = serde_json::from_str(json).unwrap();
        assert_eq!(receipt.order_id, OrderId::from("o1"));
        assert_eq!(receipt.amount, Some(dec!(150)));

        let session = PaymentSession::from_receipt(&receipt).unwrap();
        assert_eq!(session.payment_url, "https://pay/x");
    }

    #[test]
    fn test_no_session_without_payment() {
        let receipt = PurchaseReceipt {
            order_id: OrderId::from("o2"),
            payment_url: None,
            amount: None,
            requires_payment: false,
        };
        assert!(PaymentSession::from_receipt(&receipt).is_none());
    }

    #[test]
    fn test_draft_defaults_to_pay_now() {
        let json = r#"{"tariffId":"t1","devices":2,"periodMonths":3}"#;
        let draft: PurchaseDraft = serde_json::from_str(json).unwrap();
        assert_eq!(draft.payment_mode, PaymentMode::PayNow);
        assert_eq!(draft.discount, Decimal::ZERO);

        let json = r#"{"tariffId":"t1","devices":2,"periodMonths":3,"paymentMode":"pay_later"}"#;
        let draft: PurchaseDraft = serde_json::from_str(json).unwrap();
        assert_eq!(draft.payment_mode, PaymentMode::PayLater);
    }
}

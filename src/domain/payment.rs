use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a single purchase attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for OrderId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

const PAID_SYNONYMS: [&str; 5] = ["paid", "completed", "оплачено", "оплачен", "успешно"];
const FAILED_SYNONYMS: [&str; 2] = ["failed", "rejected"];
const CANCELLED_SYNONYMS: [&str; 1] = ["cancelled"];

/// Canonical payment status after folding vendor and localized spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    /// Folds a raw status string into one of the canonical values.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace. Anything not
    /// in a known synonym set is `Pending`.
    pub fn fold(raw: &str) -> Self {
        let status = raw.trim().to_lowercase();
        if PAID_SYNONYMS.contains(&status.as_str()) {
            PaymentStatus::Paid
        } else if FAILED_SYNONYMS.contains(&status.as_str()) {
            PaymentStatus::Failed
        } else if CANCELLED_SYNONYMS.contains(&status.as_str()) {
            PaymentStatus::Cancelled
        } else {
            PaymentStatus::Pending
        }
    }

    /// Gateway reported the payment will never clear.
    pub fn is_terminal_negative(self) -> bool {
        matches!(self, PaymentStatus::Failed | PaymentStatus::Cancelled)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Canonical view of a payment, produced only by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub order_id: OrderId,
    pub status: PaymentStatus,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tariff_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tariff_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub devices: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_months: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount: Option<Decimal>,
}

impl PaymentRecord {
    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Paid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paid_synonyms_fold_to_paid() {
        for raw in ["оплачено", "оплачен", "paid", "completed", "успешно"] {
            assert_eq!(PaymentStatus::fold(raw), PaymentStatus::Paid, "{raw}");
        }
    }

    #[test]
    fn test_fold_ignores_case_and_whitespace() {
        assert_eq!(PaymentStatus::fold("  Оплачено "), PaymentStatus::Paid);
        assert_eq!(PaymentStatus::fold("COMPLETED"), PaymentStatus::Paid);
        assert_eq!(PaymentStatus::fold(" Rejected"), PaymentStatus::Failed);
    }

    #[test]
    fn test_negative_synonyms_are_terminal() {
        for raw in ["failed", "cancelled", "rejected"] {
            assert!(PaymentStatus::fold(raw).is_terminal_negative(), "{raw}");
        }
        assert_eq!(PaymentStatus::fold("cancelled"), PaymentStatus::Cancelled);
    }

    #[test]
    fn test_unknown_status_is_pending() {
        for raw in ["", "waiting", "в обработке", "paid out", "refunded"] {
            assert_eq!(PaymentStatus::fold(raw), PaymentStatus::Pending, "{raw}");
        }
    }

    #[test]
    fn test_order_id_serializes_transparently() {
        let id = OrderId::from("o1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"o1\"");
        assert_eq!(id.to_string(), "o1");
    }
}

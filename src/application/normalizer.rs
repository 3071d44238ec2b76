use crate::domain::payment::{OrderId, PaymentRecord, PaymentStatus};
use crate::domain::tariff::FallbackContext;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;

/// Payment fields pulled out of whichever payload shape the workflow returned.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawPayment {
    pub order_id: Option<String>,
    pub status: Option<String>,
    pub amount: Option<Decimal>,
    pub tariff_id: Option<String>,
    pub tariff_name: Option<String>,
    pub devices: Option<u32>,
    pub period_months: Option<u32>,
    pub discount: Option<Decimal>,
}

/// The payload shapes the verification workflow is known to produce.
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationShape {
    /// `{"payment": {"orderId", "status", "amount", ...}}`
    Direct(RawPayment),
    /// `{"result": [{"orderid", "statuspay", "sum", "uuid"}, ...]}`
    VendorArray(RawPayment),
    /// `{"result": {"orderid", "statuspay", "sum", "uuid"}}`
    VendorObject(RawPayment),
}

impl VerificationShape {
    /// Recognizes the shape of a raw verification result.
    ///
    /// A top-level array is unwrapped to its first element first; the workflow
    /// sometimes returns its items list as-is.
    pub fn classify(raw: &Value) -> Option<Self> {
        let obj = match raw {
            Value::Array(items) => return items.first().and_then(Self::classify),
            Value::Object(obj) => obj,
            _ => return None,
        };

        // A still-pending direct status does not hide a vendor record next to it.
        if let Some(Value::Object(payment)) = obj.get("payment") {
            let fields = RawPayment::from_direct(payment);
            let recognized = match fields.status.as_deref() {
                Some(status) => {
                    PaymentStatus::fold(status) != PaymentStatus::Pending
                        || !obj.contains_key("result")
                }
                None => false,
            };
            if recognized {
                return Some(VerificationShape::Direct(fields));
            }
        }

        match obj.get("result") {
            Some(Value::Array(items)) => match items.first() {
                Some(Value::Object(record)) => {
                    Some(VerificationShape::VendorArray(RawPayment::from_vendor(record)))
                }
                _ => None,
            },
            Some(Value::Object(record)) => {
                Some(VerificationShape::VendorObject(RawPayment::from_vendor(record)))
            }
            _ => None,
        }
    }

    pub fn into_fields(self) -> RawPayment {
        match self {
            VerificationShape::Direct(fields)
            | VerificationShape::VendorArray(fields)
            | VerificationShape::VendorObject(fields) => fields,
        }
    }
}

impl RawPayment {
    fn from_direct(obj: &Map<String, Value>) -> Self {
        Self {
            order_id: text(obj, &["orderId", "order_id"]),
            status: text(obj, &["status"]),
            amount: decimal(obj, &["amount", "sum"]),
            ..Self::tariff_fields(obj)
        }
    }

    fn from_vendor(obj: &Map<String, Value>) -> Self {
        Self {
            order_id: text(obj, &["orderid", "orderId", "order_id"]),
            status: text(obj, &["statuspay", "status"]),
            amount: decimal(obj, &["sum", "amount"]),
            ..Self::tariff_fields(obj)
        }
    }

    fn tariff_fields(obj: &Map<String, Value>) -> Self {
        Self {
            tariff_id: text(obj, &["tariffId", "tariff_id", "tariffid"]),
            tariff_name: text(obj, &["tariffName", "tariff_name", "tariffname"]),
            devices: count(obj, &["devices"]),
            period_months: count(obj, &["periodMonths", "period_months", "period"]),
            discount: decimal(obj, &["discount"]),
            ..Self::default()
        }
    }
}

/// Converts any verification result into a canonical [`PaymentRecord`].
///
/// Returns `None` when the payload is not recognizable or belongs to a different
/// order; callers treat that as "not known yet". Paid records are completed with
/// tariff data from `fallback`.
pub fn normalize(raw: &Value, fallback: &FallbackContext) -> Option<PaymentRecord> {
    let fields = VerificationShape::classify(raw)?.into_fields();

    let order_id = match (fields.order_id, &fallback.order_id) {
        (Some(found), Some(expected)) if found.trim() != expected.as_str() => return None,
        (Some(found), _) => OrderId::new(found.trim()),
        (None, Some(expected)) => expected.clone(),
        (None, None) => return None,
    };
    let status = PaymentStatus::fold(fields.status.as_deref().unwrap_or_default());

    let mut record = PaymentRecord {
        order_id,
        status,
        amount: fields.amount.or(fallback.amount).unwrap_or(Decimal::ZERO),
        tariff_id: fields.tariff_id,
        tariff_name: fields.tariff_name,
        devices: fields.devices,
        period_months: fields.period_months,
        discount: fields.discount,
    };

    if record.is_paid() {
        record.tariff_id = record.tariff_id.or_else(|| fallback.tariff_id());
        record.tariff_name = record.tariff_name.or_else(|| fallback.tariff_name());
        record.devices = record.devices.or_else(|| fallback.devices());
        record.period_months = record.period_months.or_else(|| fallback.period_months());
        record.discount = record.discount.or_else(|| fallback.discount());
    }

    Some(record)
}

fn first<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find(|value| !value.is_null())
}

fn text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    match first(obj, keys)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn decimal(obj: &Map<String, Value>, keys: &[&str]) -> Option<Decimal> {
    let raw = match first(obj, keys)? {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().replace(' ', "").replace(',', "."),
        _ => return None,
    };
    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .ok()
}

fn count(obj: &Map<String, Value>, keys: &[&str]) -> Option<u32> {
    match first(obj, keys)? {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

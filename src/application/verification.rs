use super::normalizer::normalize;
use crate::domain::payment::{OrderId, PaymentRecord};
use crate::domain::ports::VerificationClientBox;
use crate::domain::tariff::FallbackContext;
use crate::error::{ReconcileError, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

/// Wraps the external verification call with a deadline and the normalizer.
pub struct VerificationService {
    client: VerificationClientBox,
    timeout: Duration,
}

impl VerificationService {
    pub fn new(client: VerificationClientBox, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Performs one verification call.
    ///
    /// A call that outlives the deadline is reported as a transport error so the
    /// caller can treat it like any other network blip.
    #[instrument(skip_all, fields(order_id = %order_id))]
    pub async fn verify(&self, order_id: &OrderId) -> Result<Value> {
        match tokio::time::timeout(self.timeout, self.client.verify_payment(order_id)).await {
            Ok(result) => result,
            Err(_) => Err(ReconcileError::Transport(format!(
                "verification timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }

    /// Verifies and normalizes. `Ok(None)` means the answer is not known yet.
    pub async fn check(
        &self,
        order_id: &OrderId,
        fallback: &FallbackContext,
    ) -> Result<Option<PaymentRecord>> {
        let raw = self.verify(order_id).await?;
        let record = normalize(&raw, fallback);
        debug!(order_id = %order_id, status = ?record.as_ref().map(|r| r.status), "verification normalized");
        Ok(record)
    }
}

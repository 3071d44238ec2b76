use crate::domain::payment::OrderId;
use crate::domain::ports::VerificationClient;
use crate::error::{ReconcileError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, instrument};

/// Calls the payment-verification workflow over HTTP.
///
/// The workflow is POSTed `{"orderId": ...}` and answers with one of the shapes
/// understood by the normalizer. Non-2xx responses and unparsable bodies are
/// transport errors; an empty body is an inconclusive `null`.
#[derive(Clone)]
pub struct HttpVerificationClient {
    client: Client,
    url: String,
}

impl HttpVerificationClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl VerificationClient for HttpVerificationClient {
    #[instrument(skip_all, fields(order_id = %order_id, url = %self.url))]
    async fn verify_payment(&self, order_id: &OrderId) -> Result<Value> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "orderId": order_id.as_str() }))
            .send()
            .await
            .map_err(|e| ReconcileError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReconcileError::Transport(format!(
                "verification workflow answered {status}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ReconcileError::Transport(e.to_string()))?;
        debug!(bytes = body.len(), "verification response received");
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body)
            .map_err(|e| ReconcileError::Transport(format!("unreadable verification body: {e}")))
    }
}

use super::payment::{OrderId, PaymentStatus};
use super::purchase::PaymentSession;
use super::tariff::SubscriptionResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// User-facing progress of a checkout.
///
/// Only drives messaging; reconciliation never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingState {
    #[default]
    Idle,
    Processing,
    Waiting,
    Checking,
    Success,
    Error,
}

impl ProcessingState {
    pub fn message(self) -> &'static str {
        match self {
            ProcessingState::Idle => "",
            ProcessingState::Processing => "Creating your payment",
            ProcessingState::Waiting => "Complete the payment in the opened window",
            ProcessingState::Checking => "Checking payment status",
            ProcessingState::Success => "Payment confirmed, subscription activated",
            ProcessingState::Error => "Payment not completed",
        }
    }
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessingState::Idle => "idle",
            ProcessingState::Processing => "processing",
            ProcessingState::Waiting => "waiting",
            ProcessingState::Checking => "checking",
            ProcessingState::Success => "success",
            ProcessingState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Per-order reconciliation guard.
///
/// Once an order has any guard state, subscription activation is never invoked for
/// it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardState {
    /// Claimed; activation is in flight.
    Activating,
    Activated,
    /// Paid but activation failed. Needs a human.
    ActivationFailed,
    /// Gateway declined or the user cancelled.
    Rejected,
}

/// Notifications for the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutEvent {
    SessionOpened(PaymentSession),
    StateChanged {
        order_id: OrderId,
        state: ProcessingState,
    },
    Activated {
        order_id: OrderId,
        subscription: SubscriptionResult,
    },
    Rejected {
        order_id: OrderId,
        status: PaymentStatus,
    },
    Exhausted {
        order_id: OrderId,
    },
    ResolutionFailed {
        order_id: OrderId,
        reason: String,
        reload_recommended: bool,
    },
    SessionCleared {
        order_id: OrderId,
    },
    ResyncRequested,
}

impl CheckoutEvent {
    pub fn order_id(&self) -> Option<&OrderId> {
        match self {
            CheckoutEvent::SessionOpened(session) => Some(&session.order_id),
            CheckoutEvent::StateChanged { order_id, .. }
            | CheckoutEvent::Activated { order_id, .. }
            | CheckoutEvent::Rejected { order_id, .. }
            | CheckoutEvent::Exhausted { order_id }
            | CheckoutEvent::ResolutionFailed { order_id, .. }
            | CheckoutEvent::SessionCleared { order_id } => Some(order_id),
            CheckoutEvent::ResyncRequested => None,
        }
    }

    /// Short machine-readable name.
    pub fn kind(&self) -> &'static str {
        match self {
            CheckoutEvent::SessionOpened(_) => "session_opened",
            CheckoutEvent::StateChanged { .. } => "state",
            CheckoutEvent::Activated { .. } => "activated",
            CheckoutEvent::Rejected { .. } => "rejected",
            CheckoutEvent::Exhausted { .. } => "exhausted",
            CheckoutEvent::ResolutionFailed { .. } => "resolution_failed",
            CheckoutEvent::SessionCleared { .. } => "session_cleared",
            CheckoutEvent::ResyncRequested => "resync",
        }
    }

    pub fn detail(&self) -> String {
        match self {
            CheckoutEvent::SessionOpened(session) => session.payment_url.clone(),
            CheckoutEvent::StateChanged { state, .. } => state.to_string(),
            CheckoutEvent::Activated { subscription, .. } => subscription.subscription_id.clone(),
            CheckoutEvent::Rejected { status, .. } => status.to_string(),
            CheckoutEvent::ResolutionFailed { reason, .. } => reason.clone(),
            CheckoutEvent::Exhausted { .. }
            | CheckoutEvent::SessionCleared { .. }
            | CheckoutEvent::ResyncRequested => String::new(),
        }
    }

    /// Text shown to the user, if any.
    pub fn message(&self) -> &'static str {
        match self {
            CheckoutEvent::SessionOpened(_) => "Payment window opened",
            CheckoutEvent::StateChanged { state, .. } => state.message(),
            CheckoutEvent::Activated { .. } => "Subscription activated",
            CheckoutEvent::Rejected { .. } => "Payment was declined",
            CheckoutEvent::Exhausted { .. } => "Payment not confirmed yet. Check again later",
            CheckoutEvent::ResolutionFailed { .. } => {
                "Payment received but activation failed. Reload the page"
            }
            CheckoutEvent::SessionCleared { .. } | CheckoutEvent::ResyncRequested => "",
        }
    }
}

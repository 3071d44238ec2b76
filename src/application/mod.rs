//! Application layer: the reconciliation workflow.
//!
//! [`checkout::CheckoutService`] opens a payment session and spawns two tasks per
//! order, the [`observer::WindowObserver`] and the [`poller::StagedPoller`]. Both
//! report conclusive verification results to the
//! [`coordinator::ReconciliationCoordinator`], which owns the reconciliation guard
//! and activates each paid order exactly once.

pub mod checkout;
pub mod coordinator;
pub mod normalizer;
pub mod observer;
pub mod poller;
pub mod signal;
pub mod verification;

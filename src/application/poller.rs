use super::coordinator::ReconciliationCoordinator;
use super::signal::{OrderControl, Settlement};
use crate::config::ReconcileConfig;
use crate::domain::payment::OrderId;
use crate::domain::state::ProcessingState;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where the poller is in its timetable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Processing,
    Waiting,
    Checking { attempt: u32 },
    /// Handed a conclusive record to the coordinator; waiting for it to settle.
    Handoff,
    Settled(Settlement),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Settled(Settlement),
    /// The hosting view went away first.
    Cancelled,
}

enum Wake {
    Elapsed,
    Settled(Settlement),
    Unmounted,
}

/// Drives the processing messages and the bounded verification attempts of one
/// order.
///
/// Every delay is a single `select!` over the timer and the order's signals, so
/// settling or unmounting the order stops the poller at its next suspension
/// point. An activation already handed to the coordinator is never interrupted.
pub struct StagedPoller {
    coordinator: Arc<ReconciliationCoordinator>,
    config: ReconcileConfig,
}

impl StagedPoller {
    pub fn new(coordinator: Arc<ReconciliationCoordinator>, config: ReconcileConfig) -> Self {
        Self {
            coordinator,
            config,
        }
    }

    pub async fn run(&self, order_id: OrderId, control: OrderControl) -> PollOutcome {
        let mut stage = Stage::Processing;
        loop {
            debug!(order_id = %order_id, ?stage, "poller stage");
            stage = match stage {
                Stage::Processing => {
                    self.show(&order_id, ProcessingState::Processing);
                    match self.pause(self.config.waiting_after(), &control).await {
                        Wake::Elapsed => Stage::Waiting,
                        Wake::Settled(settlement) => Stage::Settled(settlement),
                        Wake::Unmounted => return PollOutcome::Cancelled,
                    }
                }
                Stage::Waiting => {
                    self.show(&order_id, ProcessingState::Waiting);
                    match self.pause(self.config.checking_after(), &control).await {
                        Wake::Elapsed => Stage::Checking { attempt: 1 },
                        Wake::Settled(settlement) => Stage::Settled(settlement),
                        Wake::Unmounted => return PollOutcome::Cancelled,
                    }
                }
                Stage::Checking { attempt } => {
                    if attempt == 1 {
                        self.show(&order_id, ProcessingState::Checking);
                    }
                    match self.attempt(&order_id, attempt, &control).await {
                        Some(next) => next,
                        None => return PollOutcome::Cancelled,
                    }
                }
                Stage::Handoff => {
                    tokio::select! {
                        _ = control.unmount.wait() => return PollOutcome::Cancelled,
                        settlement = control.settled.wait() => Stage::Settled(settlement),
                    }
                }
                Stage::Settled(settlement) => return self.finish(&order_id, settlement, &control).await,
            };
        }
    }

    /// One verification attempt. `None` means the view unmounted.
    async fn attempt(&self, order_id: &OrderId, attempt: u32, control: &OrderControl) -> Option<Stage> {
        let checked = tokio::select! {
            _ = control.unmount.wait() => return None,
            settlement = control.settled.wait() => return Some(Stage::Settled(settlement)),
            checked = self.coordinator.check(order_id) => checked,
        };

        match checked {
            Ok(Some(record)) if record.is_paid() || record.status.is_terminal_negative() => {
                let applied = self.coordinator.apply(order_id, record).await;
                if let Some(settlement) = control.settled.get() {
                    return Some(Stage::Settled(settlement));
                }
                return match applied {
                    Ok(()) => Some(Stage::Handoff),
                    Err(e) => {
                        warn!(order_id = %order_id, error = %e, "conclusive payment could not be applied");
                        Some(Stage::Settled(Settlement::ActivationFailed))
                    }
                };
            }
            Ok(_) => debug!(order_id = %order_id, attempt, "payment not confirmed yet"),
            Err(e) => debug!(order_id = %order_id, attempt, error = %e, "verification failed, will retry"),
        }

        if attempt >= self.config.max_attempts {
            self.coordinator.exhaust(order_id).await;
            return Some(Stage::Settled(Settlement::Exhausted));
        }
        match self.pause(self.config.attempt_interval(), control).await {
            Wake::Elapsed => Some(Stage::Checking {
                attempt: attempt + 1,
            }),
            Wake::Settled(settlement) => Some(Stage::Settled(settlement)),
            Wake::Unmounted => None,
        }
    }

    async fn finish(
        &self,
        order_id: &OrderId,
        settlement: Settlement,
        control: &OrderControl,
    ) -> PollOutcome {
        if settlement == Settlement::Activated {
            self.show(order_id, ProcessingState::Success);
            return PollOutcome::Settled(settlement);
        }

        info!(order_id = %order_id, ?settlement, "checkout ended without activation");
        self.show(order_id, ProcessingState::Error);
        tokio::select! {
            _ = control.unmount.wait() => return PollOutcome::Cancelled,
            _ = tokio::time::sleep(self.config.error_reset()) => {}
        }
        self.show(order_id, ProcessingState::Idle);
        PollOutcome::Settled(settlement)
    }

    async fn pause(&self, delay: Duration, control: &OrderControl) -> Wake {
        tokio::select! {
            biased;
            _ = control.unmount.wait() => Wake::Unmounted,
            settlement = control.settled.wait() => Wake::Settled(settlement),
            _ = tokio::time::sleep(delay) => Wake::Elapsed,
        }
    }

    fn show(&self, order_id: &OrderId, state: ProcessingState) {
        self.coordinator.emit_state(order_id, state);
    }
}

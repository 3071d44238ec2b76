use super::signal::OrderControl;
use crate::domain::ports::{WindowHandleBox, WindowInspectError};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Watches an externally opened payment window until it closes.
///
/// Close events are not observable across windows, so the handle is inspected on a
/// fixed interval. The observer is consumed by [`WindowObserver::closed`], which
/// makes a second closure signal impossible.
pub struct WindowObserver {
    handle: WindowHandleBox,
    interval: Duration,
}

impl WindowObserver {
    pub fn new(handle: WindowHandleBox, interval: Duration) -> Self {
        Self { handle, interval }
    }

    /// Inspects the window once. A cross-origin refusal counts as "still open".
    pub fn inspect(&self) -> bool {
        match self.handle.is_closed() {
            Ok(closed) => closed,
            Err(WindowInspectError::CrossOrigin) => false,
        }
    }

    /// Resolves to `true` when the window closes, or `false` if the order settles
    /// or the view unmounts first. Probing stops either way.
    pub async fn closed(self, control: &OrderControl) -> bool {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = control.done() => {
                    debug!("window observer stopped before closure");
                    return false;
                }
                _ = ticker.tick() => {
                    if self.inspect() {
                        debug!("payment window closed");
                        return true;
                    }
                }
            }
        }
    }
}

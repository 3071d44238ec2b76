use crate::domain::state::CheckoutEvent;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct EventRow<'a> {
    order_id: &'a str,
    event: &'static str,
    detail: String,
    message: &'static str,
}

/// Writes checkout events as `order_id,event,detail,message` CSV rows.
pub struct EventWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> EventWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes every event and flushes. Events without an order (resync requests)
    /// get an empty `order_id`.
    pub fn write_events<'a, I>(&mut self, events: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a CheckoutEvent>,
    {
        for event in events {
            self.writer.serialize(EventRow {
                order_id: event.order_id().map(|id| id.as_str()).unwrap_or_default(),
                event: event.kind(),
                detail: event.detail(),
                message: event.message(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::{OrderId, PaymentStatus};
    use crate::domain::state::ProcessingState;

    #[test]
    fn test_write_events() {
        let events = vec![
            CheckoutEvent::StateChanged {
                order_id: OrderId::from("o1"),
                state: ProcessingState::Checking,
            },
            CheckoutEvent::Rejected {
                order_id: OrderId::from("o1"),
                status: PaymentStatus::Failed,
            },
            CheckoutEvent::ResyncRequested,
        ];

        let mut out = Vec::new();
        EventWriter::new(&mut out).write_events(&events).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "order_id,event,detail,message\n\
             o1,state,checking,Checking payment status\n\
             o1,rejected,failed,Payment was declined\n\
             ,resync,,\n"
        );
    }
}

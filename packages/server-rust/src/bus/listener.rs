//! Bus-side transport adapter.
//!
//! Subscribes to every subject under the service name and forwards each
//! delivery to the dispatch engine. The operation name is the subject
//! suffix after `"{service_name}."`, mirroring how the HTTP adapter takes
//! the last path segment. Responses go to the delivery's reply subject;
//! deliveries without one are handled and their response dropped.

use std::sync::Arc;

use crossbar_core::DispatchEngine;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use super::{Bus, Delivery};

/// Forwards bus deliveries for one service to the dispatch engine.
pub struct BusListener {
    bus: Arc<Bus>,
    engine: Arc<DispatchEngine>,
    subject_prefix: String,
}

impl BusListener {
    #[must_use]
    pub fn new(bus: Arc<Bus>, engine: Arc<DispatchEngine>, service_name: &str) -> Self {
        Self {
            bus,
            engine,
            subject_prefix: format!("{service_name}."),
        }
    }

    /// Consumes deliveries until `shutdown` flips to true or the bus closes.
    ///
    /// Each delivery dispatches on its own task so a slow operation cannot
    /// stall the subscription and force lag drops.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let pattern = format!("{}>", self.subject_prefix);
        let mut deliveries = self.bus.subscribe(&pattern);
        debug!(pattern, "bus listener subscribed");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("bus listener stopping");
                        return;
                    }
                }
                delivery = deliveries.recv() => match delivery {
                    Ok(delivery) => self.dispatch(delivery),
                    Err(broadcast::error::RecvError::Lagged(dropped)) => {
                        warn!(dropped, "bus listener lagged; deliveries lost");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                },
            }
        }
    }

    fn dispatch(&self, delivery: Delivery) {
        let Some(oper_name) = delivery
            .subject
            .strip_prefix(&self.subject_prefix)
            .map(str::to_string)
        else {
            // Cannot happen for deliveries matched by our own pattern.
            return;
        };

        let bus = Arc::clone(&self.bus);
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            let response = engine.handle_raw(&oper_name, &delivery.payload);
            match delivery.reply {
                Some(reply) => {
                    bus.publish(&reply, response.into());
                }
                None => debug!(oper_name, "delivery carried no reply subject"),
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

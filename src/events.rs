//! In-process publish/subscribe bus between the services

use crate::driver::ChargingStatus;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Events exchanged between the control loop, the planner and status sinks
#[derive(Debug, Clone)]
pub enum BusEvent {
    /// Published once per control cycle
    Status(Arc<ChargingStatus>),
    /// Run a control cycle now instead of waiting for the interval
    ForceRefresh { correlation_id: Option<String> },
    /// The planner wrote new control variables
    PlanUpdated {
        correlation_id: String,
        summary: String,
    },
}

impl BusEvent {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::ForceRefresh { .. } => "force_refresh",
            Self::PlanUpdated { .. } => "plan_updated",
        }
    }

    /// Correlation id carried by the event, if any
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Self::Status(status) => status.correlation_id.as_deref(),
            Self::ForceRefresh { correlation_id } => correlation_id.as_deref(),
            Self::PlanUpdated { correlation_id, .. } => Some(correlation_id),
        }
    }
}

/// Cloneable handle on a broadcast channel
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to all current subscribers. Returns how many received it;
    /// publishing without subscribers is not an error.
    pub fn publish(&self, event: BusEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

//! Control loop driver for Ladewerk
//!
//! Every cycle reads a telemetry snapshot, lets the [`ChargingStrategy`]
//! decide, writes the wallbox limit (unless Manual or safe mode), and
//! publishes a [`ChargingStatus`]. The loop runs at a fixed interval and
//! wakes early for force-refresh commands and plan updates. A failing cycle
//! is logged and the next one proceeds.

use crate::config::{Config, parse_hhmm};
use crate::controls::{ChargeMode, ChargingStrategy};
use crate::events::EventBus;
use crate::logging::StructuredLogger;
use crate::persistence::PersistenceManager;
use crate::session::OvernightTracker;
use crate::telemetry::TelemetryGateway;
use chrono::NaiveTime;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};

mod commands;
mod cycle;
mod readings;
mod runtime;
mod types;

pub use cycle::round_to_step;
pub use types::{ChargingStatus, CycleStats, DriverCommand, DriverState};

/// Main driver for the charging control loop
pub struct ChargeDriver {
    config: Config,
    tz: chrono_tz::Tz,

    gateway: Arc<dyn TelemetryGateway>,
    bus: EventBus,

    /// Hysteresis state lives here and nowhere else
    strategy: ChargingStrategy,
    overnight: OvernightTracker,
    persistence: Option<PersistenceManager>,

    logger: StructuredLogger,
    state: watch::Sender<DriverState>,
    status_tx: watch::Sender<Option<Arc<ChargingStatus>>>,
    commands_rx: mpsc::UnboundedReceiver<DriverCommand>,

    default_departure: NaiveTime,
    /// Used when the mode selector is unavailable
    last_mode: ChargeMode,
    last_sent_w: Option<u32>,
    last_write_at: Option<Instant>,
    safe_mode_override: Option<bool>,
    stats: CycleStats,
}

impl ChargeDriver {
    pub fn state_receiver(&self) -> watch::Receiver<DriverState> {
        self.state.subscribe()
    }

    /// Receiver for the most recent status
    pub fn status_receiver(&self) -> watch::Receiver<Option<Arc<ChargingStatus>>> {
        self.status_tx.subscribe()
    }

    pub const fn stats(&self) -> &CycleStats {
        &self.stats
    }

    pub const fn strategy(&self) -> &ChargingStrategy {
        &self.strategy
    }

    pub const fn overnight(&self) -> &OvernightTracker {
        &self.overnight
    }

    fn default_departure(config: &Config) -> NaiveTime {
        parse_hhmm(&config.planner.default_departure)
            .unwrap_or_else(|_| NaiveTime::from_hms_opt(7, 30, 0).unwrap_or(NaiveTime::MIN))
    }

    fn current_state(&self) -> DriverState {
        self.state.borrow().clone()
    }

    fn set_state(&self, state: DriverState) {
        self.state.send_replace(state);
    }
}

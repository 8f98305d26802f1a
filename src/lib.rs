//! # Ladewerk - EV charging decision engine
//!
//! Decides every ~30 seconds how much power the wallbox may draw, from live
//! grid/PV/battery telemetry, a user-selected mode and a multi-day trip and
//! energy forecast with a "full by morning" deadline.
//!
//! ## Architecture
//!
//! - `telemetry`: read/write contract towards the home automation system
//! - `controls`: charging strategy state machine (PV surplus, deadline, ramp)
//! - `trips`: calendar and commute based trip prediction
//! - `planner`: day-by-day charging recommendations and the planning task
//! - `driver`: control loop running the strategy at a fixed interval
//! - `events`: publish/subscribe bus between the services
//! - `session`: overnight energy bookkeeping
//! - `persistence`: learned state across restarts
//! - `config`, `logging`, `error`: ambient plumbing

pub mod config;
pub mod controls;
pub mod driver;
pub mod error;
pub mod events;
pub mod logging;
pub mod persistence;
pub mod planner;
pub mod session;
pub mod telemetry;
pub mod trips;

// Re-export commonly used types
pub use config::Config;
pub use controls::{ChargeMode, ChargingContext, ChargingDecision, ChargingStrategy};
pub use driver::{ChargeDriver, ChargingStatus, DriverCommand};
pub use error::{LadewerkError, Result};
pub use events::{BusEvent, EventBus};
pub use planner::{ChargingPlan, ChargingPlanner, DayChargingRecommendation};
pub use telemetry::{ControlValue, InMemoryGateway, Reading, TelemetryGateway};
pub use trips::{DayPlan, Trip, TripPredictor};

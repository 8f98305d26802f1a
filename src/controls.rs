//! Charging strategy for Ladewerk
//!
//! This module contains the real-time decision logic that turns one
//! [`ChargingContext`] into one [`ChargingDecision`]: mode handling, PV-surplus
//! tracking with start/stop hysteresis, optional home-battery assist, deadline
//! escalation for full-by-morning sessions and ramp limiting.
//!
//! The only state kept between cycles is the previous setpoint and whether a
//! session was running. It is owned by the control loop task.

use crate::config::{BatteryAssistConfig, Config, StrategyConfig, WallboxConfig};
use crate::error::{LadewerkError, Result};
use crate::logging::get_logger;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod context;

pub use context::{ChargingContext, ChargingDecision, VehicleState, WallboxState};

/// Charging mode enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeMode {
    /// Never charge
    Off,

    /// Charge from exported PV only
    PvSurplus,

    /// PV surplus, escalating to grid power as the departure approaches
    Smart,

    /// Fixed moderate power
    Eco,

    /// Maximum power
    Fast,

    /// Wallbox controlled by someone else; never written
    Manual,
}

impl ChargeMode {
    /// Label used by the mode selector control variable
    pub const fn label(self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::PvSurplus => "PV Surplus",
            Self::Smart => "Smart",
            Self::Eco => "Eco",
            Self::Fast => "Fast",
            Self::Manual => "Manual",
        }
    }

    pub const fn all() -> &'static [Self] {
        &[
            Self::Off,
            Self::PvSurplus,
            Self::Smart,
            Self::Eco,
            Self::Fast,
            Self::Manual,
        ]
    }

    /// Modes driven by the surplus algorithm (and thus eligible for deadline escalation)
    pub const fn follows_surplus(self) -> bool {
        matches!(self, Self::PvSurplus | Self::Smart)
    }
}

impl fmt::Display for ChargeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ChargeMode {
    type Err = LadewerkError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match normalized.as_str() {
            "off" | "stop" => Ok(Self::Off),
            "pvsurplus" | "pv" | "surplus" | "solar" | "pvonly" => Ok(Self::PvSurplus),
            "smart" => Ok(Self::Smart),
            "eco" => Ok(Self::Eco),
            "fast" | "boost" | "max" => Ok(Self::Fast),
            "manual" => Ok(Self::Manual),
            _ => Err(LadewerkError::validation("charge_mode", s)),
        }
    }
}

/// Limits and tuning the strategy works with, all in W
#[derive(Debug, Clone)]
pub struct StrategyLimits {
    pub max_power_w: u32,
    pub min_power_w: u32,
    pub eco_power_w: u32,
    pub grid_reserve_w: u32,
    pub start_hysteresis_w: u32,
    pub ramp_step_w: u32,
    pub deadline_safety_factor: f64,
    pub battery_assist: BatteryAssistConfig,
}

impl StrategyLimits {
    pub fn from_config(
        wallbox: &WallboxConfig,
        strategy: &StrategyConfig,
        battery_assist: &BatteryAssistConfig,
    ) -> Self {
        Self {
            max_power_w: wallbox.max_power_w,
            min_power_w: wallbox.min_power_w,
            eco_power_w: wallbox.eco_power_w,
            grid_reserve_w: strategy.grid_reserve_w,
            start_hysteresis_w: strategy.start_hysteresis_w,
            ramp_step_w: strategy.ramp_step_w,
            deadline_safety_factor: strategy.deadline_safety_factor,
            battery_assist: battery_assist.clone(),
        }
    }

    /// Clamp to the wallbox range; anything below the minimum collapses to 0
    pub fn clamp_power(&self, watts: f64) -> u32 {
        if !(watts >= f64::from(self.min_power_w)) {
            return 0;
        }
        watts.min(f64::from(self.max_power_w)).round() as u32
    }
}

/// Charging strategy state machine
#[derive(Debug, Clone)]
pub struct ChargingStrategy {
    limits: StrategyLimits,
    last_target_w: u32,
    was_pv_charging: bool,
    /// Battery charge power already diverted to the EV, and therefore
    /// already part of the surplus reading
    redirect_in_use_w: u32,
    logger: crate::logging::StructuredLogger,
}

/// Battery contribution for one cycle
struct BatteryAssist {
    /// Added on top of the surplus reading
    added_w: u32,
    /// Power still counted as part of the surplus reading
    embedded_w: u32,
    /// Redirect total to remember for the next cycle
    redirect_total_w: u32,
    reason: String,
}

impl BatteryAssist {
    fn none(reason: impl Into<String>) -> Self {
        Self {
            added_w: 0,
            embedded_w: 0,
            redirect_total_w: 0,
            reason: reason.into(),
        }
    }
}

impl ChargingStrategy {
    /// Create a strategy from the application configuration
    pub fn new(config: &Config) -> Self {
        Self::with_limits(StrategyLimits::from_config(
            &config.wallbox,
            &config.strategy,
            &config.battery_assist,
        ))
    }

    pub fn with_limits(limits: StrategyLimits) -> Self {
        Self {
            limits,
            last_target_w: 0,
            was_pv_charging: false,
            redirect_in_use_w: 0,
            logger: get_logger("strategy"),
        }
    }

    pub const fn limits(&self) -> &StrategyLimits {
        &self.limits
    }

    pub const fn last_target_w(&self) -> u32 {
        self.last_target_w
    }

    pub const fn was_pv_charging(&self) -> bool {
        self.was_pv_charging
    }

    /// Forget the previous setpoint
    pub fn reset(&mut self) {
        self.last_target_w = 0;
        self.was_pv_charging = false;
        self.redirect_in_use_w = 0;
    }

    /// Compute the setpoint for this cycle
    pub fn decide(&mut self, ctx: &ChargingContext) -> ChargingDecision {
        match ctx.mode {
            ChargeMode::Off => {
                self.reset();
                return ChargingDecision::pause("Charging off");
            }
            ChargeMode::Manual => {
                return ChargingDecision {
                    skip_control: true,
                    ..ChargingDecision::pause("Manual mode, wallbox left untouched")
                };
            }
            _ => {}
        }

        if !ctx.wallbox.vehicle_connected() {
            self.reset();
            return ChargingDecision::pause("No vehicle connected");
        }

        let remaining_kwh = ctx.remaining_to_target_kwh();
        if ctx.full_by_morning && ctx.session_energy_kwh() >= ctx.target_energy_kwh {
            self.reset();
            return ChargingDecision::pause(format!(
                "Target reached ({:.1} of {:.1} kWh)",
                ctx.session_energy_kwh(),
                ctx.target_energy_kwh
            ));
        }

        let mut decision = ChargingDecision::pause("");
        decision.energy_remaining_kwh = remaining_kwh;

        let (base_w, base_reason) = match ctx.mode {
            ChargeMode::Fast | ChargeMode::Eco => {
                self.redirect_in_use_w = 0;
                self.fixed_power(ctx.mode)
            }
            _ => self.pv_surplus(ctx, remaining_kwh, &mut decision),
        };
        decision.target_power_w = base_w;
        decision.reason = base_reason;

        if ctx.full_by_morning && ctx.mode.follows_surplus() {
            self.escalate_for_deadline(ctx, remaining_kwh, &mut decision);
        }

        self.apply_ramp(&mut decision);
        if decision.target_power_w == 0 {
            self.redirect_in_use_w = 0;
        }

        self.last_target_w = decision.target_power_w;
        self.was_pv_charging = decision.target_power_w > 0;
        self.logger.debug(&format!(
            "mode={} target={} W surplus={} W assist={} W reason={}",
            ctx.mode,
            decision.target_power_w,
            decision.pv_surplus_w,
            decision.battery_assist_w,
            decision.reason
        ));
        decision
    }

    fn fixed_power(&self, mode: ChargeMode) -> (u32, String) {
        match mode {
            ChargeMode::Fast => (
                self.limits.max_power_w,
                format!("Fast charging at {} W", self.limits.max_power_w),
            ),
            _ => (
                self.limits.eco_power_w,
                format!("Eco charging at {} W", self.limits.eco_power_w),
            ),
        }
    }

    /// Surplus tracking with start/continue hysteresis.
    ///
    /// grid = house + ev + battery_charge - pv, so ev - grid is the power left
    /// after the house and battery; this self-corrects for whatever the EV
    /// draws already.
    fn pv_surplus(
        &mut self,
        ctx: &ChargingContext,
        remaining_kwh: f64,
        decision: &mut ChargingDecision,
    ) -> (u32, String) {
        let available =
            ctx.wallbox.power_w - ctx.grid_power_w - f64::from(self.limits.grid_reserve_w);
        decision.pv_surplus_w = available.round() as i32;

        let assist = self.battery_assist(ctx, remaining_kwh);
        self.redirect_in_use_w = assist.redirect_total_w;
        let assist_w = assist.added_w;
        decision.battery_assist_w = assist_w;
        decision.battery_assist_reason = assist.reason;

        let usable = available - f64::from(assist.embedded_w) + f64::from(assist.added_w);
        let min = f64::from(self.limits.min_power_w);
        let assist_note = if assist_w > 0 {
            format!(" incl. {} W battery assist", assist_w)
        } else {
            String::new()
        };

        if self.was_pv_charging {
            if usable >= min {
                let target = self.limits.clamp_power(usable);
                (
                    target,
                    format!(
                        "PV surplus {:.0} W{}, continuing at {} W",
                        usable, assist_note, target
                    ),
                )
            } else {
                (
                    0,
                    format!(
                        "PV surplus {:.0} W{} below minimum {} W, stopping",
                        usable, assist_note, self.limits.min_power_w
                    ),
                )
            }
        } else {
            let start = min + f64::from(self.limits.start_hysteresis_w);
            if usable >= start {
                let target = self.limits.clamp_power(usable);
                (
                    target,
                    format!(
                        "PV surplus {:.0} W{}, starting at {} W",
                        usable, assist_note, target
                    ),
                )
            } else {
                (
                    0,
                    format!(
                        "Waiting for surplus ({:.0} W{} < {:.0} W start threshold)",
                        usable, assist_note, start
                    ),
                )
            }
        }
    }

    /// Extra power the home battery may contribute, never more than
    /// `max_assist_w` in total. Never granted at or below the SoC floor.
    ///
    /// Whatever the battery already gives up for the EV shows in the surplus
    /// reading, so only the unused part of the budget is added.
    fn battery_assist(&self, ctx: &ChargingContext, remaining_kwh: f64) -> BatteryAssist {
        let cfg = &self.limits.battery_assist;
        if !cfg.enabled {
            return BatteryAssist::none("Battery assist disabled");
        }
        let Some(soc) = ctx.battery_soc_pct else {
            return BatteryAssist::none("Battery SoC unknown");
        };
        if soc <= cfg.min_soc_pct {
            return BatteryAssist::none(format!(
                "Battery at {:.0}%, not above {:.0}% floor",
                soc, cfg.min_soc_pct
            ));
        }
        let cap = f64::from(cfg.max_assist_w);

        if ctx.battery_power_w > 0.0 && soc >= cfg.priority_soc_pct {
            // While exporting the battery takes all it can, nothing is diverted.
            // At zero grid the reserve left over ends up in the battery as well.
            let embedded = if ctx.grid_power_w < 0.0 {
                0
            } else {
                self.redirect_in_use_w
                    .saturating_sub(self.limits.grid_reserve_w)
            };
            let natural_charge = ctx.battery_power_w + f64::from(embedded);
            let total = natural_charge.min(cap).round() as u32;
            let added = total.saturating_sub(embedded);
            return BatteryAssist {
                added_w: added,
                embedded_w: embedded.saturating_sub(total),
                redirect_total_w: total,
                reason: format!(
                    "Battery at {:.0}% (>= {:.0}%), redirecting {} W of its charge power",
                    soc, cfg.priority_soc_pct, total
                ),
            };
        }

        if ctx.full_by_morning && remaining_kwh > 0.0 {
            let discharging = (-ctx.battery_power_w).max(0.0);
            let added = (cap - discharging).max(0.0).round() as u32;
            return BatteryAssist {
                added_w: added,
                embedded_w: 0,
                redirect_total_w: 0,
                reason: format!(
                    "Deadline pending, {} W more discharge allowed ({:.0} W of {} W in use, {:.0}% floor)",
                    added, discharging, cfg.max_assist_w, cfg.min_soc_pct
                ),
            };
        }
        BatteryAssist::none("No battery assist needed")
    }

    /// Raise (never lower) the setpoint so the target energy is reached by departure
    fn escalate_for_deadline(
        &self,
        ctx: &ChargingContext,
        remaining_kwh: f64,
        decision: &mut ChargingDecision,
    ) {
        if remaining_kwh <= 0.0 {
            return;
        }
        let hours_left = ctx.hours_until_departure();
        decision.deadline_hours_left = Some(hours_left);

        if hours_left <= 0.0 {
            decision.deadline_active = true;
            decision.target_power_w = self.limits.max_power_w;
            decision.reason = format!(
                "Deadline: past departure, fast-charging remaining {:.1} kWh",
                remaining_kwh
            );
            return;
        }

        let required =
            remaining_kwh / hours_left * 1000.0 * self.limits.deadline_safety_factor;
        decision.deadline_required_w = Some(required.round() as u32);
        if required <= f64::from(decision.target_power_w) {
            return;
        }

        let clamped = self.limits.clamp_power(required);
        if clamped == 0 {
            // Required power below the wallbox minimum: plenty of time left
            return;
        }

        let escalated = decision.target_power_w.max(clamped);
        decision.deadline_active = true;
        decision.reason = format!(
            "Deadline: {:.1} kWh in {:.1} h needs {:.0} W, charging at {} W ({})",
            remaining_kwh, hours_left, required, escalated, decision.reason
        );
        decision.target_power_w = escalated;
    }

    fn apply_ramp(&self, decision: &mut ChargingDecision) {
        let step = self.limits.ramp_step_w;
        let prev = self.last_target_w;
        let target = decision.target_power_w;
        if step == 0 || prev == 0 || target == 0 || prev.abs_diff(target) <= step {
            return;
        }
        let ramped = if target > prev {
            prev + step
        } else {
            prev - step
        };
        decision.reason = format!(
            "{} (ramping {} -> {} W, target {} W)",
            decision.reason, prev, ramped, target
        );
        decision.target_power_w = ramped;
    }
}

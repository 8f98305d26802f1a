use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::controls::{ChargingContext, ChargingDecision};
use crate::error::Result;
use crate::events::BusEvent;
use crate::telemetry::ControlValue;

use super::readings::{read_context, read_safe_mode};
use super::types::ChargingStatus;

/// Round a setpoint to the wallbox step, keeping it inside
/// `[min_w, max_w]`. Zero stays zero.
pub fn round_to_step(watts: u32, step_w: u32, min_w: u32, max_w: u32) -> u32 {
    if watts == 0 {
        return 0;
    }
    if step_w == 0 {
        return watts.clamp(min_w, max_w);
    }
    let rounded = ((f64::from(watts) / f64::from(step_w)).round() as u32) * step_w;
    if rounded > max_w {
        (max_w / step_w) * step_w
    } else if rounded < min_w {
        min_w.div_ceil(step_w) * step_w
    } else {
        rounded
    }
}

struct ApplyOutcome {
    commanded_w: Option<u32>,
    written: bool,
}

impl super::ChargeDriver {
    /// Read, decide, apply and publish once
    pub async fn run_cycle(&mut self, correlation_id: Option<String>) -> Result<Arc<ChargingStatus>> {
        let logger = self.logger.with_correlation_id(correlation_id.as_deref());
        let now = Utc::now().with_timezone(&self.tz).naive_local();

        let mut ctx = read_context(
            self.gateway.as_ref(),
            &self.config,
            now,
            self.default_departure,
            self.last_mode,
        )
        .await;
        self.last_mode = ctx.mode;
        let window_before = self.overnight.get_state().current.map(|s| s.id);
        ctx.overnight_kwh =
            self.overnight
                .update(now, ctx.session_energy_kwh(), ctx.wallbox.power_w);
        if self.overnight.get_state().current.map(|s| s.id) != window_before {
            self.save_overnight();
        }

        let mut decision = self.strategy.decide(&ctx);
        let safe_mode =
            read_safe_mode(self.gateway.as_ref(), &self.config, self.safe_mode_override).await;
        let outcome = self.apply(&mut decision, safe_mode).await;

        logger.debug(&format!(
            "{}: {} W ({})",
            ctx.mode, decision.target_power_w, decision.reason
        ));

        let status = Arc::new(self.build_status(
            &ctx,
            decision,
            &outcome,
            safe_mode,
            correlation_id,
        ));
        self.bus.publish(BusEvent::Status(Arc::clone(&status)));
        self.status_tx.send_replace(Some(Arc::clone(&status)));
        self.touch_liveness().await;
        Ok(status)
    }

    fn should_send_update(&self, commanded_w: u32) -> bool {
        let Some(last) = self.last_sent_w else {
            return true;
        };
        if last != commanded_w {
            return true;
        }
        self.last_write_at.is_none_or(|at| {
            at.elapsed().as_secs() >= self.config.control.reassert_seconds
        })
    }

    async fn apply(&mut self, decision: &mut ChargingDecision, safe_mode: bool) -> ApplyOutcome {
        if decision.skip_control {
            return ApplyOutcome {
                commanded_w: None,
                written: false,
            };
        }
        let wallbox = &self.config.wallbox;
        let commanded = round_to_step(
            decision.target_power_w,
            wallbox.power_step_w,
            wallbox.min_power_w,
            wallbox.max_power_w,
        );

        if safe_mode {
            self.stats.suppressed_writes = self.stats.suppressed_writes.saturating_add(1);
            decision.reason = format!(
                "Safe mode: would set {} W ({})",
                commanded, decision.reason
            );
            return ApplyOutcome {
                commanded_w: Some(commanded),
                written: false,
            };
        }

        if !self.should_send_update(commanded) {
            return ApplyOutcome {
                commanded_w: Some(commanded),
                written: false,
            };
        }

        let entity = self.config.entities.wallbox_power_limit.clone();
        match self
            .gateway
            .write(&entity, ControlValue::Power(commanded))
            .await
        {
            Ok(()) => {
                if self.last_sent_w != Some(commanded) {
                    self.logger.info(&format!(
                        "Wallbox limit set to {} W ({})",
                        commanded, decision.reason
                    ));
                }
                self.last_sent_w = Some(commanded);
                self.last_write_at = Some(Instant::now());
                self.stats.wallbox_writes = self.stats.wallbox_writes.saturating_add(1);
                ApplyOutcome {
                    commanded_w: Some(commanded),
                    written: true,
                }
            }
            Err(e) => {
                self.stats.failed_writes = self.stats.failed_writes.saturating_add(1);
                self.logger
                    .warn(&format!("Failed to write wallbox limit: {}", e));
                ApplyOutcome {
                    commanded_w: Some(commanded),
                    written: false,
                }
            }
        }
    }

    fn build_status(
        &self,
        ctx: &ChargingContext,
        decision: ChargingDecision,
        outcome: &ApplyOutcome,
        safe_mode: bool,
        correlation_id: Option<String>,
    ) -> ChargingStatus {
        ChargingStatus {
            timestamp: Utc::now().to_rfc3339(),
            correlation_id,
            driver_state: self.current_state().as_str().to_string(),
            mode: ctx.mode,
            vehicle_state: ctx.wallbox.vehicle_state,
            target_power_w: decision.target_power_w,
            commanded_power_w: outcome.commanded_w,
            actual_power_w: ctx.wallbox.power_w,
            session_energy_kwh: ctx.session_energy_kwh(),
            energy_needed_kwh: ctx.energy_needed_kwh(),
            energy_remaining_kwh: decision.energy_remaining_kwh,
            overnight_kwh: ctx.overnight_kwh,
            grid_power_w: ctx.grid_power_w,
            pv_power_w: ctx.pv_power_w,
            house_power_w: ctx.house_power_w,
            battery_power_w: ctx.battery_power_w,
            battery_soc_pct: ctx.battery_soc_pct,
            ev_soc_pct: ctx.ev_soc_pct,
            ev_target_soc_pct: ctx.ev_target_soc_pct,
            pv_forecast_today_kwh: ctx.pv_forecast_today_kwh,
            pv_forecast_tomorrow_kwh: ctx.pv_forecast_tomorrow_kwh,
            full_by_morning: ctx.full_by_morning,
            departure_time: ctx.departure_time.format("%H:%M").to_string(),
            reason: decision.reason.clone(),
            safe_mode,
            written: outcome.written,
            reasoning: reasoning_trace(ctx, &decision, outcome, safe_mode),
            decision,
            stats: self.stats.clone(),
        }
    }

    async fn touch_liveness(&self) {
        let Some(path) = &self.config.control.liveness_file else {
            return;
        };
        if let Err(e) = tokio::fs::write(path, Utc::now().to_rfc3339()).await {
            self.logger
                .warn(&format!("Failed to touch liveness file {}: {}", path, e));
        }
    }
}

/// Human-readable account of one decision
fn reasoning_trace(
    ctx: &ChargingContext,
    decision: &ChargingDecision,
    outcome: &ApplyOutcome,
    safe_mode: bool,
) -> Vec<String> {
    let mut lines = vec![
        format!("Mode: {}", ctx.mode.label()),
        format!(
            "Vehicle: {}, wallbox {:.0} W, session {:.2} kWh",
            ctx.wallbox.vehicle_state.as_str(),
            ctx.wallbox.power_w,
            ctx.session_energy_kwh()
        ),
        format!(
            "Grid {:+.0} W ({}), PV {:.0} W, house {:.0} W, battery {:+.0} W",
            ctx.grid_power_w,
            if ctx.grid_power_w > 0.0 { "import" } else { "export" },
            ctx.pv_power_w,
            ctx.house_power_w,
            ctx.battery_power_w
        ),
    ];
    if ctx.mode.follows_surplus() {
        lines.push(format!("PV surplus: {} W", decision.pv_surplus_w));
    }
    if decision.battery_assist_w > 0 {
        lines.push(format!(
            "Battery assist: {} W ({})",
            decision.battery_assist_w, decision.battery_assist_reason
        ));
    }
    if decision.deadline_active {
        lines.push(format!(
            "Deadline: {:.1} h left, {:.1} kWh remaining, {} W required",
            decision.deadline_hours_left.unwrap_or(0.0),
            decision.energy_remaining_kwh,
            decision.deadline_required_w.unwrap_or(0)
        ));
    }
    lines.push(format!(
        "Decision: {} W ({})",
        decision.target_power_w, decision.reason
    ));
    if decision.skip_control {
        lines.push("Manual: wallbox left untouched".to_string());
    } else if safe_mode {
        lines.push("Safe mode: write suppressed".to_string());
    } else if let Some(w) = outcome.commanded_w {
        lines.push(if outcome.written {
            format!("Wallbox limit written: {} W", w)
        } else {
            format!("Wallbox limit unchanged at {} W", w)
        });
    }
    lines
}

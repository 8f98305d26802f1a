//! Home Assistant REST adapter for the telemetry contract

use super::{ControlValue, Reading, TelemetryGateway};
use crate::config::HomeAssistantConfig;
use crate::error::{LadewerkError, Result};
use crate::logging::get_logger;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct EntityState {
    state: String,
}

/// Reads `/api/states/<entity>` and calls services for writes
pub struct HomeAssistantGateway {
    client: reqwest::Client,
    base_url: String,
    token: String,
    logger: crate::logging::StructuredLogger,
}

impl HomeAssistantGateway {
    pub fn new(config: &HomeAssistantConfig) -> Result<Self> {
        let token = if config.token.trim().is_empty() {
            std::env::var("LADEWERK_HA_TOKEN").unwrap_or_default()
        } else {
            config.token.clone()
        };
        if token.trim().is_empty() {
            return Err(LadewerkError::config(
                "Home Assistant token missing (home_assistant.token or LADEWERK_HA_TOKEN)",
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds.max(1)))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
            logger: get_logger("home_assistant"),
        })
    }

    /// Service call for a write, derived from the entity domain
    fn service_call(name: &str, value: &ControlValue) -> Result<(String, serde_json::Value)> {
        let domain = name.split('.').next().unwrap_or_default();
        let call = match (domain, value) {
            ("number" | "input_number", ControlValue::Power(w)) => {
                ("set_value", json!({ "entity_id": name, "value": w }))
            }
            ("number" | "input_number", ControlValue::Number(v)) => {
                ("set_value", json!({ "entity_id": name, "value": v }))
            }
            ("input_boolean" | "switch", ControlValue::Bool(on)) => (
                if *on { "turn_on" } else { "turn_off" },
                json!({ "entity_id": name }),
            ),
            ("input_select" | "select", ControlValue::Option(option)) => (
                "select_option",
                json!({ "entity_id": name, "option": option }),
            ),
            ("input_datetime", ControlValue::Time(t)) => (
                "set_datetime",
                json!({ "entity_id": name, "time": t.format("%H:%M:%S").to_string() }),
            ),
            _ => {
                return Err(LadewerkError::telemetry(format!(
                    "No service mapping for {} with {:?}",
                    name, value
                )));
            }
        };
        Ok((format!("{}/{}", domain, call.0), call.1))
    }
}

#[async_trait]
impl TelemetryGateway for HomeAssistantGateway {
    async fn read(&self, name: &str) -> Result<Reading> {
        let url = format!("{}/api/states/{}", self.base_url, name);
        let resp = self
            .client
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(Reading::Unavailable);
        }
        if !resp.status().is_success() {
            return Err(LadewerkError::telemetry(format!(
                "GET {} returned {}",
                name,
                resp.status()
            )));
        }
        let state: EntityState = resp.json().await?;
        Ok(Reading::from_state(&state.state))
    }

    async fn write(&self, name: &str, value: ControlValue) -> Result<()> {
        let (service, body) = Self::service_call(name, &value)?;
        let url = format!("{}/api/services/{}", self.base_url, service);
        let resp = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(LadewerkError::telemetry(format!(
                "{} for {} returned {}",
                service,
                name,
                resp.status()
            )));
        }
        self.logger
            .debug(&format!("Called {} for {} ({:?})", service, name, value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    #[test]
    fn maps_writes_to_services() {
        let (svc, body) =
            HomeAssistantGateway::service_call("number.wallbox_power_limit", &ControlValue::Power(6000))
                .unwrap();
        assert_eq!(svc, "number/set_value");
        assert_eq!(body["value"], 6000);

        let (svc, _) =
            HomeAssistantGateway::service_call("input_boolean.full", &ControlValue::Bool(false))
                .unwrap();
        assert_eq!(svc, "input_boolean/turn_off");

        let (svc, body) = HomeAssistantGateway::service_call(
            "input_datetime.departure",
            &ControlValue::Time(NaiveTime::from_hms_opt(7, 30, 0).unwrap()),
        )
        .unwrap();
        assert_eq!(svc, "input_datetime/set_datetime");
        assert_eq!(body["time"], "07:30:00");

        assert!(
            HomeAssistantGateway::service_call("sensor.grid", &ControlValue::Number(1.0)).is_err()
        );
    }
}

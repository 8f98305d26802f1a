use super::*;

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/ladewerk.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for WallboxConfig {
    fn default() -> Self {
        Self {
            max_power_w: 11000,
            min_power_w: 4200,
            eco_power_w: 5000,
            power_step_w: 60,
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            grid_reserve_w: 200,
            start_hysteresis_w: 300,
            ramp_step_w: 1000,
            deadline_safety_factor: 1.1,
        }
    }
}

impl Default for BatteryAssistConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_soc_pct: 20.0,
            priority_soc_pct: 90.0,
            max_assist_w: 1500,
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 30,
            safe_mode: false,
            reassert_seconds: 300,
            liveness_file: Some("/tmp/ladewerk.alive".to_string()),
            overnight_start_hour: 18,
            overnight_end_hour: 8,
        }
    }
}

impl Default for EntitiesConfig {
    fn default() -> Self {
        Self {
            grid_power: "sensor.grid_power".to_string(),
            pv_power: "sensor.pv_power".to_string(),
            house_power: "sensor.house_power".to_string(),
            battery_power: "sensor.battery_power".to_string(),
            battery_soc: "sensor.battery_soc".to_string(),
            pv_forecast_today_remaining: "sensor.pv_forecast_remaining_today".to_string(),
            pv_forecast_tomorrow: "sensor.pv_forecast_tomorrow".to_string(),
            wallbox_state: "sensor.wallbox_vehicle_state".to_string(),
            wallbox_power: "sensor.wallbox_power".to_string(),
            wallbox_session_energy: "sensor.wallbox_session_energy".to_string(),
            wallbox_power_limit: "number.wallbox_power_limit".to_string(),
            ev_soc: "sensor.ev_soc".to_string(),
            ev_target_soc: "number.ev_target_soc".to_string(),
            ev_capacity: "sensor.ev_battery_capacity".to_string(),
            ev_mileage: "sensor.ev_mileage".to_string(),
            charge_mode: "input_select.ev_charge_mode".to_string(),
            full_by_morning: "input_boolean.ev_full_by_morning".to_string(),
            departure_time: "input_datetime.ev_departure_time".to_string(),
            target_energy: "input_number.ev_target_energy".to_string(),
            safe_mode: "input_boolean.ems_safe_mode".to_string(),
        }
    }
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            capacity_kwh: 77.0,
            default_target_soc_pct: 80.0,
            consumption_kwh_per_100km: 22.0,
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            horizon_days: 3,
            interval_minutes: 30,
            buffer_kwh: 5.0,
            min_arrival_kwh: 8.0,
            pv_share: 0.6,
            ample_hours: 3.0,
            imminent_hours: 2.0,
            fast_deficit_kwh: 15.0,
            early_departure_hour: 9,
            default_departure: "07:30".to_string(),
        }
    }
}

impl Default for TripsConfig {
    fn default() -> Self {
        let known_destinations = [("aachen", 80.0), ("köln", 70.0), ("düsseldorf", 85.0)]
            .into_iter()
            .map(|(name, km)| (name.to_string(), km))
            .collect();
        let words = |list: &[&str]| list.iter().map(|w| (*w).to_string()).collect::<Vec<_>>();
        Self {
            home_latitude: 50.7753,
            home_longitude: 6.0839,
            road_factor: 1.3,
            known_destinations,
            default_distance_km: 50.0,
            local_activity_km: 5.0,
            suspicious_distance_km: 150.0,
            filler_words: words(&[
                "nach", "zum", "zur", "bei", "beim", "in", "im", "am", "an", "mit", "von", "to",
                "at", "the", "visit", "besuch", "termin", "treffen", "meeting", "fahrt", "trip",
            ]),
            activity_words: words(&[
                "sport", "training", "gym", "fitness", "schwimmen", "einkaufen", "shopping",
                "arzt", "zahnarzt", "doctor", "friseur", "yoga",
            ]),
            drivers: vec![
                DriverConfig {
                    prefix: "H".to_string(),
                    name: "H".to_string(),
                    train_threshold_km: Some(350.0),
                    clarification_band_km: Some(200.0),
                    commute: Some(CommuteConfig {
                        destination: "Office".to_string(),
                        distance_km: 30.0,
                        weekdays: vec![0, 1, 2, 3, 4],
                        departure: "07:30".to_string(),
                        return_time: "17:30".to_string(),
                    }),
                },
                DriverConfig {
                    prefix: "N".to_string(),
                    name: "N".to_string(),
                    train_threshold_km: None,
                    clarification_band_km: None,
                    commute: None,
                },
            ],
            geocoder: GeocoderConfig::default(),
        }
    }
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: "ladewerk/0.4 (home energy planner)".to_string(),
            timeout_seconds: 10,
        }
    }
}

impl Default for ConsumptionConfig {
    fn default() -> Self {
        Self {
            min_segment_km: 5.0,
            plausible_min: 10.0,
            plausible_max: 40.0,
            clamp_min: 12.0,
            clamp_max: 35.0,
            max_samples: 20,
            trust_samples: 5,
        }
    }
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            file: Some("/data/ladewerk_calendar.yaml".to_string()),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_file: "/data/ladewerk_state.json".to_string(),
            driver_state_file: "/data/ladewerk_driver.json".to_string(),
        }
    }
}

impl Default for HomeAssistantConfig {
    fn default() -> Self {
        Self {
            base_url: "http://homeassistant.local:8123".to_string(),
            token: String::new(),
            timeout_seconds: 10,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            timezone: "Europe/Berlin".to_string(),
            wallbox: WallboxConfig::default(),
            strategy: StrategyConfig::default(),
            battery_assist: BatteryAssistConfig::default(),
            control: ControlConfig::default(),
            entities: EntitiesConfig::default(),
            vehicle: VehicleConfig::default(),
            planner: PlannerConfig::default(),
            trips: TripsConfig::default(),
            consumption: ConsumptionConfig::default(),
            calendar: CalendarConfig::default(),
            persistence: PersistenceConfig::default(),
            home_assistant: HomeAssistantConfig::default(),
        }
    }
}

use anyhow::Result;
use ladewerk::config::Config;
use ladewerk::driver::{ChargeDriver, DriverCommand};
use ladewerk::events::EventBus;
use ladewerk::persistence::PersistenceManager;
use ladewerk::planner::service::PlanningService;
use ladewerk::telemetry::TelemetryGateway;
use ladewerk::trips::{CalendarSource, Geocoder, StaticCalendar, YamlCalendar};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

fn build_gateway(config: &Config) -> Result<Arc<dyn TelemetryGateway>> {
    #[cfg(feature = "homeassistant")]
    {
        let gateway =
            ladewerk::telemetry::home_assistant::HomeAssistantGateway::new(&config.home_assistant)?;
        Ok(Arc::new(gateway))
    }
    #[cfg(not(feature = "homeassistant"))]
    {
        let _ = config;
        tracing::warn!("Built without Home Assistant support, running against an in-memory gateway");
        Ok(Arc::new(ladewerk::telemetry::InMemoryGateway::new()))
    }
}

fn build_geocoder(config: &Config) -> Result<Option<Arc<dyn Geocoder>>> {
    if !config.trips.geocoder.enabled {
        return Ok(None);
    }
    #[cfg(feature = "geocoding")]
    {
        let geocoder = ladewerk::trips::geocoding::NominatimGeocoder::new(&config.trips.geocoder)?;
        Ok(Some(Arc::new(geocoder)))
    }
    #[cfg(not(feature = "geocoding"))]
    {
        tracing::warn!("Geocoding enabled in config but not compiled in");
        Ok(None)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    config.validate()?;
    ladewerk::logging::init_logging(&config.logging)?;

    info!("Ladewerk {} starting up", env!("LADEWERK_VERSION"));

    let gateway = build_gateway(&config)?;
    let calendar: Arc<dyn CalendarSource> = match &config.calendar.file {
        Some(path) => Arc::new(YamlCalendar::new(path)),
        None => Arc::new(StaticCalendar::default()),
    };
    let geocoder = build_geocoder(&config)?;
    let bus = EventBus::default();
    let persistence = PersistenceManager::new(&config.persistence.state_file);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<DriverCommand>();

    let planning = PlanningService::new(
        config.clone(),
        Arc::clone(&gateway),
        calendar,
        geocoder,
        bus.clone(),
        persistence,
    )?;
    let planner_task = tokio::spawn(planning.run(shutdown_rx.clone()));

    let driver_state = PersistenceManager::new(&config.persistence.driver_state_file);
    let mut driver =
        ChargeDriver::new(config, gateway, bus, cmd_rx)?.with_persistence(driver_state);
    let driver_shutdown = shutdown_rx.clone();
    let driver_task = tokio::spawn(async move { driver.run(driver_shutdown).await });

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, shutting down");
    shutdown_tx.send_replace(true);

    match driver_task.await {
        Ok(Ok(())) => info!("Driver shutdown complete"),
        Ok(Err(e)) => error!("Driver failed with error: {}", e),
        Err(e) => error!("Driver task panicked: {}", e),
    }
    match planner_task.await {
        Ok(Ok(())) => info!("Planner shutdown complete"),
        Ok(Err(e)) => error!("Planner failed with error: {}", e),
        Err(e) => error!("Planner task panicked: {}", e),
    }
    drop(cmd_tx);
    Ok(())
}

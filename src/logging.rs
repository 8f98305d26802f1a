//! Structured logging and tracing for Ladewerk
//!
//! Console and daily-rotated file output through `tracing-subscriber`, plus a
//! small component-scoped logger used by the strategy, planner and driver.

use crate::config::LoggingConfig;
use crate::error::{LadewerkError, Result};
use std::path::Path;
use tracing::{Level, info};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub mod level;
mod state;
pub mod structured;

pub use level::parse_log_level;
pub use structured::{LogContext, StructuredLogger, get_logger, get_logger_with_context};

use state::{INIT_ERROR, INIT_ONCE, LOG_GUARD};

/// Initialize logging system based on configuration
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    INIT_ONCE.call_once(|| {
        let init_result = (|| -> Result<()> {
            let level = parse_log_level(&config.level)?;
            let filter = build_env_filter(level);

            if should_use_console_only() {
                init_console_only_logging(filter, config.json_format, level);
                return Ok(());
            }

            init_file_logging(config, filter, level)
        })();

        if let Err(e) = init_result {
            let _ = INIT_ERROR.set(e.to_string());
        }
    });

    if let Some(err) = INIT_ERROR.get() {
        return Err(LadewerkError::config(err.clone()));
    }
    Ok(())
}

fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("ladewerk={},reqwest=warn,hyper=warn", level).into())
}

fn should_use_console_only() -> bool {
    cfg!(test) || std::env::var_os("LADEWERK_DISABLE_FILE_LOG").is_some()
}

fn console_layer<S>(json_format: bool, level: Level) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);
    if json_format {
        layer
            .json()
            .with_filter(LevelFilter::from_level(level))
            .boxed()
    } else {
        layer.with_filter(LevelFilter::from_level(level)).boxed()
    }
}

fn init_console_only_logging(filter: EnvFilter, json_format: bool, level: Level) {
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer(json_format, level))
        .try_init();

    info!("Logging initialized - level: {:?}, console-only", level);
}

fn init_file_logging(config: &LoggingConfig, filter: EnvFilter, level: Level) -> Result<()> {
    let file_appender = rolling::Builder::new()
        .rotation(rolling::Rotation::DAILY)
        .filename_prefix("ladewerk")
        .filename_suffix("log")
        .max_log_files(config.backup_count.max(1) as usize)
        .build({
            // A file path logs into its parent directory; anything else is a directory
            let p = Path::new(&config.file);
            if p.extension().is_some() {
                p.parent().unwrap_or(p)
            } else {
                p
            }
        })
        .map_err(|e| LadewerkError::io(format!("Failed to create log file appender: {}", e)))?;

    let (non_blocking_appender, guard) = non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    let file_layer = {
        let base = fmt::layer()
            .with_writer(non_blocking_appender)
            .with_target(false)
            .with_thread_ids(false)
            .with_ansi(false)
            .with_file(false);
        if config.json_format {
            base.json().with_filter(LevelFilter::from_level(level)).boxed()
        } else {
            base.with_filter(LevelFilter::from_level(level)).boxed()
        }
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(file_layer);
    let init = if config.console_output {
        subscriber
            .with(console_layer(config.json_format, level))
            .try_init()
    } else {
        subscriber.try_init()
    };
    init.map_err(|e| LadewerkError::config(format!("Failed to install subscriber: {}", e)))?;

    info!(
        "Logging initialized - level: {:?}, file: {}",
        level, config.file
    );
    Ok(())
}

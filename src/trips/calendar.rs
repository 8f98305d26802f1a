//! Calendar sources feeding the trip predictor

use super::types::CalendarEvent;
use crate::error::{LadewerkError, Result};
use crate::logging::get_logger;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::PathBuf;

/// Provider of calendar events
#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// Events touching the inclusive date range
    async fn events(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<CalendarEvent>>;
}

fn in_range(event: &CalendarEvent, from: NaiveDate, to: NaiveDate) -> bool {
    event.start.date() <= to && event.last_day() >= from
}

/// Fixed list of events
#[derive(Debug, Clone, Default)]
pub struct StaticCalendar {
    events: Vec<CalendarEvent>,
}

impl StaticCalendar {
    pub const fn new(events: Vec<CalendarEvent>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl CalendarSource for StaticCalendar {
    async fn events(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<CalendarEvent>> {
        Ok(self
            .events
            .iter()
            .filter(|e| in_range(e, from, to))
            .cloned()
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct CalendarFile {
    #[serde(default)]
    events: Vec<CalendarEvent>,
}

/// YAML file with an `events:` list, re-read on every call so that an
/// external sync job can rewrite it
#[derive(Debug, Clone)]
pub struct YamlCalendar {
    path: PathBuf,
}

impl YamlCalendar {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CalendarSource for YamlCalendar {
    async fn events(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<CalendarEvent>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                get_logger("calendar").debug(&format!(
                    "Calendar file {} not found, no events",
                    self.path.display()
                ));
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        let file: CalendarFile = serde_yaml::from_str(&contents).map_err(|e| {
            LadewerkError::calendar(format!("{}: {}", self.path.display(), e))
        })?;
        Ok(file
            .events
            .into_iter()
            .filter(|e| in_range(e, from, to))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn yaml_calendar_filters_range() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("calendar.yaml");
        std::fs::write(
            &path,
            r#"
events:
  - id: a
    summary: "H: Aachen"
    start: 2026-10-20T08:00:00
    end: 2026-10-20T17:00:00
  - id: b
    summary: "N: Urlaub"
    start: 2026-10-30T00:00:00
    end: 2026-11-02T00:00:00
    all_day: true
"#,
        )
        .unwrap();

        let cal = YamlCalendar::new(&path);
        let from = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let to = NaiveDate::from_ymd_opt(2026, 10, 21).unwrap();
        let events = cal.events(from, to).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "a");
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let cal = YamlCalendar::new(dir.path().join("nope.yaml"));
        let d = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert!(cal.events(d, d).await.unwrap().is_empty());
    }
}

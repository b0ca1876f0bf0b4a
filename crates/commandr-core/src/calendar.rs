//! Calendar events and the adapters that hand them to the host calendar.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use uuid::Uuid;

use crate::error::PersistenceError;

pub const DEFAULT_EVENT_TITLE: &str = "New Event";
pub const DEFAULT_DURATION_MINUTES: u32 = 30;
pub const MIN_DURATION_MINUTES: u32 = 1;
pub const MAX_DURATION_MINUTES: u32 = 480;

/// A fully resolved event that has not been persisted yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarEventCandidate {
    title: String,
    date: NaiveDate,
    time: NaiveTime,
    duration_minutes: u32,
}

impl CalendarEventCandidate {
    /// Blank titles fall back to the placeholder and the duration is
    /// clamped to 1..=480 minutes.
    pub fn new(title: &str, date: NaiveDate, time: NaiveTime, duration_minutes: u32) -> Self {
        let title = title.trim();
        Self {
            title: if title.is_empty() {
                DEFAULT_EVENT_TITLE.to_string()
            } else {
                title.to_string()
            },
            date,
            time,
            duration_minutes: duration_minutes.clamp(MIN_DURATION_MINUTES, MAX_DURATION_MINUTES),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn time(&self) -> NaiveTime {
        self.time
    }

    pub fn duration_minutes(&self) -> u32 {
        self.duration_minutes
    }

    /// Start as a floating local timestamp
    pub fn start(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    /// Confirmation shown in the chat once the event is stored
    pub fn confirmation(&self) -> String {
        format!(
            "Meeting scheduled successfully!\nTitle: {}\nDate: {}\nTime: {}\nDuration: {} minutes",
            self.title,
            self.date.format("%Y-%m-%d"),
            self.time.format("%H:%M"),
            self.duration_minutes
        )
    }
}

/// Somewhere a validated event can be written. Failures are reported to the
/// caller and never retried.
pub trait CalendarSink: Send + Sync {
    fn persist(&self, event: &CalendarEventCandidate) -> Result<(), PersistenceError>;
}

/// Drops one `.ics` file per event into a directory watched by the host
/// calendar application.
#[derive(Debug, Clone)]
pub struct IcsFileSink {
    dir: PathBuf,
}

impl IcsFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `~/Library/Calendars` on macOS, the app data dir elsewhere
    pub fn default_dir() -> PathBuf {
        let base = if cfg!(target_os = "macos") {
            dirs::home_dir().map(|home| home.join("Library").join("Calendars"))
        } else {
            dirs::data_dir().map(|data| data.join("commandr").join("calendar"))
        };
        base.unwrap_or_else(|| PathBuf::from("calendar"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the event and return the file it landed in
    pub fn write(&self, event: &CalendarEventCandidate) -> Result<PathBuf, PersistenceError> {
        fs::create_dir_all(&self.dir).map_err(|source| PersistenceError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.dir.join(file_name(event));
        let body = render_ics(event, Utc::now(), &Uuid::new_v4().to_string());
        fs::write(&path, body).map_err(|source| PersistenceError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

impl CalendarSink for IcsFileSink {
    fn persist(&self, event: &CalendarEventCandidate) -> Result<(), PersistenceError> {
        let path = self.write(event)?;
        tracing::info!(path = %path.display(), "calendar event written");
        Ok(())
    }
}

fn file_name(event: &CalendarEventCandidate) -> String {
    let stem: String = event
        .title
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("{}_{}.ics", stem, event.start().format("%Y%m%dT%H%M"))
}

/// RFC 5545 calendar with a single event
pub fn render_ics(event: &CalendarEventCandidate, stamp: DateTime<Utc>, uid: &str) -> String {
    let lines = [
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "PRODID:-//commandr//EN".to_string(),
        "BEGIN:VEVENT".to_string(),
        format!("UID:{}@commandr", uid),
        format!("DTSTAMP:{}", stamp.format("%Y%m%dT%H%M%SZ")),
        format!("DTSTART:{}", event.start().format("%Y%m%dT%H%M%S")),
        format!("DURATION:PT{}M", event.duration_minutes),
        format!("SUMMARY:{}", escape_text(&event.title)),
        "END:VEVENT".to_string(),
        "END:VCALENDAR".to_string(),
    ];
    let mut out = lines.join("\r\n");
    out.push_str("\r\n");
    out
}

fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Creates the event directly in Calendar.app through `osascript`.
#[derive(Debug, Clone)]
pub struct AppleScriptSink {
    calendar: String,
}

impl Default for AppleScriptSink {
    fn default() -> Self {
        Self::new("Calendar")
    }
}

impl AppleScriptSink {
    pub fn new(calendar: impl Into<String>) -> Self {
        Self {
            calendar: calendar.into(),
        }
    }

    pub fn script_for(&self, event: &CalendarEventCandidate) -> String {
        use chrono::{Datelike, Timelike};

        format!(
            r#"set startDate to current date
set day of startDate to 1
set year of startDate to {year}
set month of startDate to {month}
set day of startDate to {day}
set time of startDate to ({hour} * hours + {minute} * minutes)
tell application "Calendar"
    tell calendar "{calendar}"
        make new event at end with properties {{summary:"{title}", start date:startDate, end date:startDate + ({duration} * minutes)}}
    end tell
end tell"#,
            year = event.date.year(),
            month = event.date.month(),
            day = event.date.day(),
            hour = event.time.hour(),
            minute = event.time.minute(),
            calendar = escape_applescript(&self.calendar),
            title = escape_applescript(&event.title),
            duration = event.duration_minutes,
        )
    }
}

impl CalendarSink for AppleScriptSink {
    fn persist(&self, event: &CalendarEventCandidate) -> Result<(), PersistenceError> {
        let output = Command::new("osascript")
            .arg("-e")
            .arg(self.script_for(event))
            .output()
            .map_err(|e| PersistenceError::Script(format!("could not run osascript: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PersistenceError::Script(stderr.trim().to_string()));
        }

        tracing::info!(calendar = %self.calendar, "calendar event created via osascript");
        Ok(())
    }
}

fn escape_applescript(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

//! Natural-language event extraction.
//!
//! Each field is resolved independently against the same original text,
//! first match wins. Date and time are required; duration and title fall
//! back to defaults. All patterns are case-insensitive and run on the
//! original string, so match offsets can be used to slice out the title.

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveTime, Weekday};
use regex::{Captures, Regex};
use std::ops::Range;
use std::sync::LazyLock;

use crate::calendar::{
    CalendarEventCandidate, DEFAULT_DURATION_MINUTES, MAX_DURATION_MINUTES, MIN_DURATION_MINUTES,
};
use crate::error::ExtractionError;

const MONTH: &str = "jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?";

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").expect("valid regex"));

static TOMORROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\btomorrow\b").expect("valid regex"));

static NEXT_WEEKDAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bnext\s+(monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tues?|wed|thu(?:rs?)?|fri|sat|sun)\b",
    )
    .expect("valid regex")
});

static TODAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\btoday\b").expect("valid regex"));

// "June 14", "Jun 14th", "June 14, 2024"
static MONTH_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?P<month>{MONTH})\.?\s+(?P<day>\d{{1,2}})(?:st|nd|rd|th)?\b(?:,?\s+(?P<year>\d{{4}})\b)?"
    ))
    .expect("valid regex")
});

// "14 June", "14th of June 2024"
static DAY_MONTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?P<day>\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?(?P<month>{MONTH})\b\.?(?:,?\s+(?P<year>\d{{4}})\b)?"
    ))
    .expect("valid regex")
});

static TIME_12H: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?P<hour>\d{1,2})(?::(?P<minute>\d{2}))?\s*(?P<meridiem>[ap])\.?m\b\.?")
        .expect("valid regex")
});

static TIME_24H: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?P<hour>\d{1,2}):(?P<minute>\d{2})\b").expect("valid regex")
});

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?P<amount>\d+)\s*(?P<unit>hours?|hrs?|minutes?|mins?)\b")
        .expect("valid regex")
});

/// A resolved value and where its token sits in the original text
struct Resolved<T> {
    value: T,
    span: Range<usize>,
}

/// Extract an event, resolving relative dates against the local date
pub fn extract(text: &str) -> Result<CalendarEventCandidate, ExtractionError> {
    extract_with_reference(text, Local::now().date_naive())
}

/// Extract an event, resolving relative dates against `today`
pub fn extract_with_reference(
    text: &str,
    today: NaiveDate,
) -> Result<CalendarEventCandidate, ExtractionError> {
    let date = resolve_date(text, today)?;
    let time = resolve_time(text)?;
    let duration = resolve_duration(text);

    tracing::debug!(
        date = %date.value,
        time = %time.value,
        duration = ?duration.as_ref().map(|d| d.value),
        "resolved event fields"
    );

    let title_end = title_boundary(text).unwrap_or(date.span.start.min(time.span.start));
    let title = text[..title_end].trim();

    Ok(CalendarEventCandidate::new(
        title,
        date.value,
        time.value,
        duration.map_or(DEFAULT_DURATION_MINUTES, |d| d.value),
    ))
}

fn resolve_date(text: &str, today: NaiveDate) -> Result<Resolved<NaiveDate>, ExtractionError> {
    if let Some(m) = ISO_DATE.find(text) {
        let date = NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d").map_err(|_| {
            ExtractionError::UnparsableDate {
                token: m.as_str().to_string(),
            }
        })?;
        return Ok(Resolved {
            value: date,
            span: m.range(),
        });
    }

    if let Some(m) = TOMORROW.find(text) {
        return Ok(Resolved {
            value: today + Duration::days(1),
            span: m.range(),
        });
    }

    if let Some(caps) = NEXT_WEEKDAY.captures(text) {
        let span = whole(&caps);
        let target = parse_weekday(&caps[1]).ok_or_else(|| ExtractionError::UnparsableDate {
            token: text[span.clone()].to_string(),
        })?;
        return Ok(Resolved {
            value: next_weekday(today, target),
            span,
        });
    }

    if let Some(m) = TODAY.find(text) {
        return Ok(Resolved {
            value: today,
            span: m.range(),
        });
    }

    for pattern in [&*MONTH_DAY, &*DAY_MONTH] {
        if let Some(caps) = pattern.captures(text) {
            let span = whole(&caps);
            let date = long_form_date(&caps, today).ok_or_else(|| {
                ExtractionError::UnparsableDate {
                    token: text[span.clone()].to_string(),
                }
            })?;
            return Ok(Resolved { value: date, span });
        }
    }

    Err(ExtractionError::NoDateFound {
        text: text.to_string(),
    })
}

/// Next occurrence of `target` strictly after `today` (1..=7 days ahead)
fn next_weekday(today: NaiveDate, target: Weekday) -> NaiveDate {
    let from = today.weekday().num_days_from_monday();
    let to = target.num_days_from_monday();
    let ahead = match (to + 7 - from) % 7 {
        0 => 7,
        n => n,
    };
    today + Duration::days(i64::from(ahead))
}

fn long_form_date(caps: &Captures, today: NaiveDate) -> Option<NaiveDate> {
    let month = month_number(caps.name("month")?.as_str())?;
    let day: u32 = caps.name("day")?.as_str().parse().ok()?;

    if let Some(year) = caps.name("year") {
        let year: i32 = year.as_str().parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    // No year: the next occurrence on or after today
    match NaiveDate::from_ymd_opt(today.year(), month, day) {
        Some(date) if date >= today => Some(date),
        _ => NaiveDate::from_ymd_opt(today.year() + 1, month, day),
    }
}

fn resolve_time(text: &str) -> Result<Resolved<NaiveTime>, ExtractionError> {
    if let Some(caps) = TIME_12H.captures(text) {
        let span = whole(&caps);
        let unparsable = || ExtractionError::UnparsableTime {
            token: text[span.clone()].to_string(),
        };
        let hour: u32 = caps["hour"].parse().map_err(|_| unparsable())?;
        let minute: u32 = match caps.name("minute") {
            Some(m) => m.as_str().parse().map_err(|_| unparsable())?,
            None => 0,
        };
        if !(1..=12).contains(&hour) {
            return Err(unparsable());
        }
        let pm = caps["meridiem"].eq_ignore_ascii_case("p");
        let hour = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, false) => h,
            (h, true) => h + 12,
        };
        let time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(unparsable)?;
        return Ok(Resolved { value: time, span });
    }

    if let Some(caps) = TIME_24H.captures(text) {
        let span = whole(&caps);
        let unparsable = || ExtractionError::UnparsableTime {
            token: text[span.clone()].to_string(),
        };
        let hour: u32 = caps["hour"].parse().map_err(|_| unparsable())?;
        let minute: u32 = caps["minute"].parse().map_err(|_| unparsable())?;
        let time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(unparsable)?;
        return Ok(Resolved { value: time, span });
    }

    Err(ExtractionError::NoTimeFound {
        text: text.to_string(),
    })
}

fn resolve_duration(text: &str) -> Option<Resolved<u32>> {
    let caps = DURATION.captures(text)?;
    // Anything too large for u32 is far past the cap anyway
    let amount: u32 = caps["amount"].parse().unwrap_or(u32::MAX);
    let unit = caps["unit"].to_lowercase();
    let minutes = if unit.starts_with('h') {
        amount.saturating_mul(60)
    } else {
        amount
    };
    Some(Resolved {
        value: minutes.clamp(MIN_DURATION_MINUTES, MAX_DURATION_MINUTES),
        span: whole(&caps),
    })
}

/// Start of the earliest date, time or duration token of any accepted form
fn title_boundary(text: &str) -> Option<usize> {
    [
        &*ISO_DATE,
        &*TOMORROW,
        &*NEXT_WEEKDAY,
        &*TODAY,
        &*MONTH_DAY,
        &*DAY_MONTH,
        &*TIME_12H,
        &*TIME_24H,
        &*DURATION,
    ]
    .into_iter()
    .filter_map(|pattern| pattern.find(text).map(|m| m.start()))
    .min()
}

fn whole(caps: &Captures) -> Range<usize> {
    caps.get(0).map(|m| m.range()).unwrap_or_default()
}

fn parse_weekday(value: &str) -> Option<Weekday> {
    match value.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" | "tues" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" | "thur" | "thurs" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

fn month_number(value: &str) -> Option<u32> {
    let prefix: String = value.chars().take(3).collect::<String>().to_ascii_lowercase();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::DEFAULT_EVENT_TITLE;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    // 2024-06-10 is a Monday
    fn monday() -> NaiveDate {
        date(2024, 6, 10)
    }

    #[test]
    fn test_team_sync_scenario() {
        let event =
            extract_with_reference("Schedule team sync tomorrow at 2pm for 1 hour", monday())
                .unwrap();
        assert_eq!(event.title(), "Schedule team sync");
        assert_eq!(event.date(), date(2024, 6, 11));
        assert_eq!(event.time(), time(14, 0));
        assert_eq!(event.duration_minutes(), 60);
    }

    #[test]
    fn test_next_friday_scenario() {
        let event = extract_with_reference("next friday 9am", monday()).unwrap();
        assert_eq!(event.date(), date(2024, 6, 14));
        assert_eq!(event.time(), time(9, 0));
        assert_eq!(event.duration_minutes(), 30);
        assert_eq!(event.title(), DEFAULT_EVENT_TITLE);
    }

    #[test]
    fn test_iso_date_defaults_duration() {
        let event = extract_with_reference("Dentist 2024-07-01 at 15:30", monday()).unwrap();
        assert_eq!(event.title(), "Dentist");
        assert_eq!(event.date(), date(2024, 7, 1));
        assert_eq!(event.time(), time(15, 30));
        assert_eq!(event.duration_minutes(), DEFAULT_DURATION_MINUTES);
    }

    #[test]
    fn test_tomorrow_every_weekday() {
        for offset in 0..7 {
            let today = monday() + Duration::days(offset);
            let event = extract_with_reference("standup tomorrow 10am", today).unwrap();
            assert_eq!(event.date(), today + Duration::days(1));
        }
    }

    #[test]
    fn test_next_weekday_never_today() {
        let event = extract_with_reference("next monday at 10am", monday()).unwrap();
        assert_eq!(event.date(), date(2024, 6, 17));

        // Sunday reference: next monday is the following day
        let event = extract_with_reference("next mon 10am", date(2024, 6, 16)).unwrap();
        assert_eq!(event.date(), date(2024, 6, 17));
    }

    #[test]
    fn test_thursday_abbreviations() {
        for prompt in ["next thu 9am", "next thur 9am", "next thurs 9am"] {
            let event = extract_with_reference(prompt, monday()).unwrap();
            assert_eq!(event.date(), date(2024, 6, 13), "{}", prompt);
        }
    }

    #[test]
    fn test_non_weekday_after_next_falls_through() {
        let event = extract_with_reference("review next thus june 14 at 3pm", monday()).unwrap();
        assert_eq!(event.date(), date(2024, 6, 14));
        assert_eq!(event.time(), time(15, 0));
    }

    #[test]
    fn test_today() {
        let event = extract_with_reference("Call mom today at 18:45", monday()).unwrap();
        assert_eq!(event.date(), monday());
        assert_eq!(event.time(), time(18, 45));
        assert_eq!(event.title(), "Call mom");
    }

    #[test]
    fn test_durations_and_clamping() {
        let hours = extract_with_reference("today 9am for 2 hours", monday()).unwrap();
        let minutes = extract_with_reference("today 9am for 120 minutes", monday()).unwrap();
        assert_eq!(hours.duration_minutes(), 120);
        assert_eq!(minutes.duration_minutes(), 120);

        let long = extract_with_reference("today 9am for 10 hours", monday()).unwrap();
        assert_eq!(long.duration_minutes(), MAX_DURATION_MINUTES);

        let zero = extract_with_reference("today 9am for 0 min", monday()).unwrap();
        assert_eq!(zero.duration_minutes(), MIN_DURATION_MINUTES);

        let huge = extract_with_reference("today 9am for 99999999999 mins", monday()).unwrap();
        assert_eq!(huge.duration_minutes(), MAX_DURATION_MINUTES);

        let short = extract_with_reference("today 9am 45min", monday()).unwrap();
        assert_eq!(short.duration_minutes(), 45);

        let hr = extract_with_reference("today 9am 3 hrs", monday()).unwrap();
        assert_eq!(hr.duration_minutes(), 180);
    }

    #[test]
    fn test_missing_time_fails() {
        let err = extract_with_reference("lunch with Ana tomorrow", monday()).unwrap_err();
        assert!(matches!(err, ExtractionError::NoTimeFound { .. }));
        assert_eq!(err.field(), "time");
    }

    #[test]
    fn test_missing_date_fails() {
        let err = extract_with_reference("lunch at 1pm", monday()).unwrap_err();
        assert!(matches!(err, ExtractionError::NoDateFound { .. }));
    }

    #[test]
    fn test_unparsable_tokens() {
        let err = extract_with_reference("review 2024-02-30 at 10am", monday()).unwrap_err();
        assert_eq!(
            err,
            ExtractionError::UnparsableDate {
                token: "2024-02-30".to_string()
            }
        );

        let err = extract_with_reference("tomorrow at 13pm", monday()).unwrap_err();
        assert!(matches!(err, ExtractionError::UnparsableTime { .. }));

        let err = extract_with_reference("tomorrow at 25:00", monday()).unwrap_err();
        assert!(matches!(err, ExtractionError::UnparsableTime { .. }));

        let err = extract_with_reference("party February 30 8pm", monday()).unwrap_err();
        assert!(matches!(err, ExtractionError::UnparsableDate { .. }));
    }

    #[test]
    fn test_twelve_hour_edges() {
        let midnight = extract_with_reference("today 12am", monday()).unwrap();
        assert_eq!(midnight.time(), time(0, 0));

        let noon = extract_with_reference("today 12:30 pm", monday()).unwrap();
        assert_eq!(noon.time(), time(12, 30));

        let dotted = extract_with_reference("today at 7 p.m.", monday()).unwrap();
        assert_eq!(dotted.time(), time(19, 0));

        let upper = extract_with_reference("TOMORROW 8:15AM", monday()).unwrap();
        assert_eq!(upper.time(), time(8, 15));
        assert_eq!(upper.date(), date(2024, 6, 11));
    }

    #[test]
    fn test_long_form_dates() {
        let event =
            extract_with_reference("Review on June 14, 2024 at 10:15", monday()).unwrap();
        assert_eq!(event.date(), date(2024, 6, 14));
        assert_eq!(event.title(), "Review on");

        let event = extract_with_reference("Party 3rd of July 8pm", monday()).unwrap();
        assert_eq!(event.date(), date(2024, 7, 3));
        assert_eq!(event.time(), time(20, 0));

        // Already passed this year: roll to next year
        let event = extract_with_reference("Call Jan 5 9am", monday()).unwrap();
        assert_eq!(event.date(), date(2025, 1, 5));

        let event = extract_with_reference("Trip Sept 2nd 6am", monday()).unwrap();
        assert_eq!(event.date(), date(2024, 9, 2));
    }

    #[test]
    fn test_first_match_wins_for_date() {
        let event =
            extract_with_reference("tomorrow, or rather 2024-06-20 at 9am", monday()).unwrap();
        assert_eq!(event.date(), date(2024, 6, 20));
        assert_eq!(event.title(), DEFAULT_EVENT_TITLE);
    }

    #[test]
    fn test_title_stops_at_earliest_token() {
        let event =
            extract_with_reference("  Board review 3pm tomorrow for 90 minutes", monday())
                .unwrap();
        assert_eq!(event.title(), "Board review");
        assert_eq!(event.duration_minutes(), 90);
    }

    #[test]
    fn test_title_with_unicode_prefix() {
        let event = extract_with_reference("Café con Íñigo tomorrow 4pm", monday()).unwrap();
        assert_eq!(event.title(), "Café con Íñigo");
    }
}

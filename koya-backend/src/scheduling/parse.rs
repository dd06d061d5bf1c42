//! Parsing the dates and times callers say, and formatting them back for speech

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

static ISO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").unwrap());
static SLASH_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})(?:/(\d{2}|\d{4}))?$").unwrap());
static MONTH_DAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-z]+)\.?\s+(\d{1,2})(?:st|nd|rd|th)?(?:,?\s+(\d{4}))?$").unwrap());
static CLOCK_24H: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,2}):(\d{2})(?::\d{2})?$").unwrap());
static CLOCK_12H: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})(?::(\d{2}))?\s*([ap])\.?\s*m?\.?$").unwrap());

const MONTHS: [&str; 12] = [
    "january", "february", "march", "april", "may", "june", "july", "august", "september", "october", "november",
    "december",
];

fn month_from_word(word: &str) -> Option<u32> {
    if word.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|m| m.starts_with(word))
        .map(|idx| idx as u32 + 1)
}

/// Next date falling on `weekday`, counting `today` unless `skip_today` is set
fn next_weekday(today: NaiveDate, weekday: Weekday, skip_today: bool) -> NaiveDate {
    let current = today.weekday().num_days_from_monday() as i64;
    let target = weekday.num_days_from_monday() as i64;
    let mut ahead = (target - current).rem_euclid(7);
    if ahead == 0 && skip_today {
        ahead = 7;
    }
    today + Duration::days(ahead)
}

/// A month/day without a year means its next occurrence
fn upcoming(today: NaiveDate, month: u32, day: u32, year: Option<i32>) -> Option<NaiveDate> {
    match year {
        Some(y) => NaiveDate::from_ymd_opt(y, month, day),
        None => {
            let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
            if this_year < today {
                NaiveDate::from_ymd_opt(today.year() + 1, month, day)
            } else {
                Some(this_year)
            }
        }
    }
}

/// Parse a spoken or ISO date relative to the business's local `today`.
///
/// Accepts `YYYY-MM-DD`, `M/D[/YYYY]`, `today`, `tomorrow`, weekday names
/// (optionally prefixed with "this" or "next") and `Month D[, YYYY]`.
pub fn parse_date(input: &str, today: NaiveDate) -> Option<NaiveDate> {
    let text = input.trim().to_lowercase();
    let text = text.strip_prefix("on ").unwrap_or(&text).trim();

    match text {
        "today" | "tonight" => return Some(today),
        "tomorrow" => return Some(today + Duration::days(1)),
        "day after tomorrow" | "the day after tomorrow" => return Some(today + Duration::days(2)),
        _ => {}
    }

    if let Some(caps) = ISO_DATE.captures(text) {
        return NaiveDate::from_ymd_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?);
    }

    if let Some(caps) = SLASH_DATE.captures(text) {
        let year = caps.get(3).and_then(|y| y.as_str().parse::<i32>().ok()).map(|y| if y < 100 { 2000 + y } else { y });
        return upcoming(today, caps[1].parse().ok()?, caps[2].parse().ok()?, year);
    }

    let (skip_today, day_word) = if let Some(rest) = text.strip_prefix("next ") {
        (true, rest.trim())
    } else if let Some(rest) = text.strip_prefix("this ") {
        (false, rest.trim())
    } else {
        (false, text)
    };
    if let Ok(weekday) = day_word.parse::<Weekday>() {
        return Some(next_weekday(today, weekday, skip_today));
    }

    if let Some(caps) = MONTH_DAY.captures(text) {
        let month = month_from_word(&caps[1])?;
        let year = caps.get(3).and_then(|y| y.as_str().parse().ok());
        return upcoming(today, month, caps[2].parse().ok()?, year);
    }

    None
}

/// Parse a spoken time: `14:30`, `2:30 pm`, `2pm`, `9 a.m.` or `noon`
pub fn parse_time(input: &str) -> Option<NaiveTime> {
    let text = input.trim().to_lowercase();
    match text.as_str() {
        "noon" | "midday" | "12 noon" => return NaiveTime::from_hms_opt(12, 0, 0),
        _ => {}
    }

    if let Some(caps) = CLOCK_12H.captures(&text) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
        if !(1..=12).contains(&hour) {
            return None;
        }
        let hour = match (&caps[3], hour) {
            ("a", 12) => 0,
            ("a", h) => h,
            ("p", 12) => 12,
            (_, h) => h + 12,
        };
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }

    if let Some(caps) = CLOCK_24H.captures(&text) {
        return NaiveTime::from_hms_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, 0);
    }

    None
}

/// "Tuesday, March 5"
pub fn format_spoken_date(date: NaiveDate) -> String {
    date.format("%A, %B %-d").to_string()
}

/// "10:00 AM"
pub fn format_spoken_time(local: &DateTime<Tz>) -> String {
    local.format("%-I:%M %p").to_string()
}

/// "Tuesday, March 5 at 10:00 AM"
pub fn format_spoken(local: &DateTime<Tz>) -> String {
    format!("{} at {}", format_spoken_date(local.date_naive()), format_spoken_time(local))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_relative_dates() {
        // A Tuesday
        let today = d(2030, 3, 5);
        assert_eq!(parse_date("Today", today), Some(today));
        assert_eq!(parse_date("tomorrow", today), Some(d(2030, 3, 6)));
        assert_eq!(parse_date("tuesday", today), Some(today));
        assert_eq!(parse_date("next tuesday", today), Some(d(2030, 3, 12)));
        assert_eq!(parse_date("Friday", today), Some(d(2030, 3, 8)));
        assert_eq!(parse_date("on monday", today), Some(d(2030, 3, 11)));
    }

    #[test]
    fn test_absolute_dates() {
        let today = d(2030, 3, 5);
        assert_eq!(parse_date("2030-04-01", today), Some(d(2030, 4, 1)));
        assert_eq!(parse_date("March 20th", today), Some(d(2030, 3, 20)));
        assert_eq!(parse_date("mar 20", today), Some(d(2030, 3, 20)));
        // Already passed this year, so it means next year
        assert_eq!(parse_date("January 3", today), Some(d(2031, 1, 3)));
        assert_eq!(parse_date("June 1, 2031", today), Some(d(2031, 6, 1)));
        assert_eq!(parse_date("4/2", today), Some(d(2030, 4, 2)));
        assert_eq!(parse_date("February 30", today), None);
        assert_eq!(parse_date("someday", today), None);
    }

    #[test]
    fn test_times() {
        assert_eq!(parse_time("14:30"), Some(t(14, 30)));
        assert_eq!(parse_time("2:30 pm"), Some(t(14, 30)));
        assert_eq!(parse_time("2pm"), Some(t(14, 0)));
        assert_eq!(parse_time("9 a.m."), Some(t(9, 0)));
        assert_eq!(parse_time("12am"), Some(t(0, 0)));
        assert_eq!(parse_time("12:15 PM"), Some(t(12, 15)));
        assert_eq!(parse_time("Noon"), Some(t(12, 0)));
        assert_eq!(parse_time("13pm"), None);
        assert_eq!(parse_time("25:00"), None);
        assert_eq!(parse_time("after lunch"), None);
    }

    #[test]
    fn test_spoken_format() {
        let local = chrono_tz::America::Denver.with_ymd_and_hms(2030, 3, 5, 10, 0, 0).unwrap();
        assert_eq!(format_spoken(&local), "Tuesday, March 5 at 10:00 AM");
        let afternoon = chrono_tz::America::Denver.with_ymd_and_hms(2030, 3, 5, 15, 30, 0).unwrap();
        assert_eq!(format_spoken_time(&afternoon), "3:30 PM");
    }
}

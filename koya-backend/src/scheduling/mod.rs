//! Timezone-aware scheduling: business hours, slot search and booking validation.
//!
//! All stored instants are UTC. Business hours and caller-facing dates are local to
//! the business's IANA timezone, so every conversion goes through `chrono-tz`.

pub mod parse;
pub mod slots;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

pub use parse::{format_spoken, format_spoken_date, format_spoken_time, parse_date, parse_time};
pub use slots::{
    candidate_slots, day_window, free_slots, hours_for_date, local_to_utc, validate_booking, BookingRejection, Slot,
};

/// Slot search step
pub const SLOT_INCREMENT_MINUTES: i64 = 30;
/// Appointment length when no service is named
pub const DEFAULT_DURATION_MINUTES: i64 = 60;
/// Furthest ahead a booking may be made
pub const MAX_BOOKING_DAYS_AHEAD: i64 = 90;

/// Half-open time interval [start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Caller's preferred part of the day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PreferredTime {
    Morning,
    Afternoon,
    Evening,
    Any,
}

impl PreferredTime {
    /// Whether a local hour-of-day falls in this part of the day
    pub fn matches_hour(&self, hour: u32) -> bool {
        match self {
            PreferredTime::Morning => hour < 12,
            PreferredTime::Afternoon => (12..17).contains(&hour),
            PreferredTime::Evening => hour >= 17,
            PreferredTime::Any => true,
        }
    }
}

/// Parse a business timezone, falling back to UTC
pub fn business_tz(name: &str) -> Tz {
    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            log::warn!("[scheduling] Unknown timezone '{}', using UTC", name);
            Tz::UTC
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 3, 5, h, m, 0).unwrap()
    }

    #[test]
    fn test_overlap_is_half_open() {
        let ten_to_eleven = Interval::new(at(10, 0), at(11, 0));
        assert!(ten_to_eleven.overlaps(&Interval::new(at(10, 30), at(11, 30))));
        assert!(ten_to_eleven.overlaps(&Interval::new(at(9, 0), at(12, 0))));
        // Touching ends do not overlap
        assert!(!ten_to_eleven.overlaps(&Interval::new(at(11, 0), at(12, 0))));
        assert!(!ten_to_eleven.overlaps(&Interval::new(at(9, 0), at(10, 0))));
    }

    #[test]
    fn test_preferred_time_boundaries() {
        assert!(PreferredTime::Morning.matches_hour(11));
        assert!(!PreferredTime::Morning.matches_hour(12));
        assert!(PreferredTime::Afternoon.matches_hour(12));
        assert!(!PreferredTime::Afternoon.matches_hour(17));
        assert!(PreferredTime::Evening.matches_hour(17));
        assert_eq!("Morning".parse::<PreferredTime>().unwrap(), PreferredTime::Morning);
    }

    #[test]
    fn test_unknown_timezone_falls_back_to_utc() {
        assert_eq!(business_tz("America/Chicago"), chrono_tz::America::Chicago);
        assert_eq!(business_tz("Mars/Olympus"), Tz::UTC);
    }
}

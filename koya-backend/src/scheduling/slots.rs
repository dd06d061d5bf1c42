use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use super::{Interval, PreferredTime, MAX_BOOKING_DAYS_AHEAD, SLOT_INCREMENT_MINUTES};
use crate::models::BusinessHours;

/// A bookable interval aligned to the slot increment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub local_start: DateTime<Tz>,
}

impl Slot {
    pub fn interval(&self) -> Interval {
        Interval::new(self.start, self.end)
    }
}

/// Why a requested booking time was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BookingRejection {
    #[error("appointment time is in the past")]
    InPast,
    #[error("appointments can only be booked up to 90 days ahead")]
    TooFarAhead,
    #[error("the business is closed that day")]
    Closed,
    #[error("appointment falls outside business hours")]
    OutsideHours,
    #[error("that time overlaps another appointment")]
    Conflict,
}

/// Open hours for the weekday of a local date. Closed days return None.
pub fn hours_for_date(hours: &[BusinessHours], date: NaiveDate) -> Option<&BusinessHours> {
    let weekday = date.weekday().num_days_from_sunday() as u8;
    hours
        .iter()
        .find(|h| h.day_of_week == weekday)
        .filter(|h| !h.is_closed && h.open_time < h.close_time)
}

/// Convert a local wall-clock time to UTC. Times skipped by a DST jump return None;
/// times repeated by a DST fall-back resolve to the earlier instant.
pub fn local_to_utc(tz: &Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// UTC window from opening to closing on a local date
pub fn day_window(tz: &Tz, hours: &[BusinessHours], date: NaiveDate) -> Option<Interval> {
    let day = hours_for_date(hours, date)?;
    let shift = Duration::hours(1);
    let open = local_to_utc(tz, date, day.open_time).or_else(|| local_to_utc(tz, date, day.open_time + shift))?;
    let close = local_to_utc(tz, date, day.close_time).or_else(|| local_to_utc(tz, date, day.close_time + shift))?;
    Some(Interval::new(open, close))
}

/// Every slot of the given length that fits inside the day's opening hours
pub fn candidate_slots(tz: &Tz, hours: &[BusinessHours], date: NaiveDate, duration_minutes: i64) -> Vec<Slot> {
    let Some(day) = hours_for_date(hours, date) else {
        return Vec::new();
    };
    let duration = Duration::minutes(duration_minutes);
    let step = Duration::minutes(SLOT_INCREMENT_MINUTES);
    let close = date.and_time(day.close_time);

    let mut slots = Vec::new();
    let mut local = date.and_time(day.open_time);
    while local + duration <= close {
        if let Some(start) = tz.from_local_datetime(&local).earliest() {
            let start_utc = start.with_timezone(&Utc);
            slots.push(Slot {
                start: start_utc,
                end: start_utc + duration,
                local_start: start,
            });
        }
        local += step;
    }
    slots
}

/// Slots on a local date that start after `now`, avoid every busy interval and
/// match the preferred part of the day
pub fn free_slots(
    tz: &Tz,
    hours: &[BusinessHours],
    date: NaiveDate,
    duration_minutes: i64,
    busy: &[Interval],
    now: DateTime<Utc>,
    preferred: Option<PreferredTime>,
) -> Vec<Slot> {
    candidate_slots(tz, hours, date, duration_minutes)
        .into_iter()
        .filter(|slot| slot.start > now)
        .filter(|slot| !busy.iter().any(|b| b.overlaps(&slot.interval())))
        .filter(|slot| preferred.map_or(true, |p| p.matches_hour(slot.local_start.hour())))
        .collect()
}

/// Check a requested booking against time bounds, opening hours and busy intervals,
/// in that order
pub fn validate_booking(
    tz: &Tz,
    hours: &[BusinessHours],
    start: DateTime<Utc>,
    duration_minutes: i64,
    busy: &[Interval],
    now: DateTime<Utc>,
) -> Result<(), BookingRejection> {
    if start <= now {
        return Err(BookingRejection::InPast);
    }
    if start > now + Duration::days(MAX_BOOKING_DAYS_AHEAD) {
        return Err(BookingRejection::TooFarAhead);
    }

    let end = start + Duration::minutes(duration_minutes);
    let local_start = start.with_timezone(tz);
    let local_end = end.with_timezone(tz);
    let date = local_start.date_naive();
    let day = hours_for_date(hours, date).ok_or(BookingRejection::Closed)?;

    if local_start.time() < day.open_time || local_end.date_naive() != date || local_end.time() > day.close_time {
        return Err(BookingRejection::OutsideHours);
    }

    let requested = Interval::new(start, end);
    if busy.iter().any(|b| b.overlaps(&requested)) {
        return Err(BookingRejection::Conflict);
    }
    Ok(())
}

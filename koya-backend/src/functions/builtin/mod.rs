mod availability;
mod booking;
mod call_control;
mod commerce;
mod messaging;
mod payments;
mod reservations;

pub use availability::{CheckAvailabilityFunction, FindNextAvailableFunction};
pub use booking::{BookAppointmentFunction, CancelAppointmentFunction};
pub use call_control::{EndCallFunction, TransferCallFunction};
pub use commerce::{CheckInventoryFunction, CheckOrderStatusFunction, CreateLeadFunction};
pub use messaging::{SendEmailFunction, SendSmsFunction, TakeMessageFunction};
pub use payments::ProcessPaymentFunction;
pub use reservations::CheckReservationAvailabilityFunction;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::Result as SqliteResult;
use serde_json::{json, Value};

use super::types::{spoken_list, FunctionContext};
use crate::db::Database;
use crate::integrations::Integrations;
use crate::models::Service;
use crate::personality::Phrase;
use crate::phone::normalize_phone;
use crate::scheduling::{
    format_spoken_time, free_slots, local_to_utc, BookingRejection, Interval, PreferredTime, Slot,
    DEFAULT_DURATION_MINUTES,
};

/// Busy time on a business's connected calendar. The lookup is advisory: when
/// it fails the caller still gets an answer based on the appointment book alone.
pub(crate) async fn calendar_busy_for(
    db: &Database,
    integrations: &Integrations,
    business_id: &str,
    window: Interval,
    now: DateTime<Utc>,
) -> Vec<Interval> {
    let integration = match db.get_calendar_integration(business_id) {
        Ok(Some(integration)) => integration,
        Ok(None) => return Vec::new(),
        Err(e) => {
            log::error!("[functions] Failed to load calendar integration for {}: {}", business_id, e);
            return Vec::new();
        }
    };

    match integrations.calendar.busy_intervals(db, &integration, window, now).await {
        Ok(busy) => busy,
        Err(e) => {
            log::warn!("[calendar] Free/busy lookup failed for {}, using bookings only: {}", business_id, e);
            Vec::new()
        }
    }
}

async fn calendar_busy(ctx: &FunctionContext, window: Interval) -> Vec<Interval> {
    calendar_busy_for(&ctx.db, &ctx.integrations, &ctx.business.id, window, ctx.now).await
}

/// Confirmed appointments plus calendar busy time inside `window`
async fn busy_intervals(ctx: &FunctionContext, window: Interval) -> SqliteResult<Vec<Interval>> {
    let mut busy: Vec<Interval> = ctx
        .db
        .confirmed_appointments_between(&ctx.business.id, window.start, window.end)?
        .into_iter()
        .map(|a| Interval::new(a.scheduled_at, a.ends_at))
        .collect();
    busy.extend(calendar_busy(ctx, window).await);
    Ok(busy)
}

/// The named service (if the business offers it) and the appointment length to use
fn resolve_service(ctx: &FunctionContext, name: Option<&str>) -> SqliteResult<(Option<Service>, i64)> {
    let service = match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => ctx.db.find_service_by_name(&ctx.business.id, name)?,
        None => None,
    };
    let duration = service
        .as_ref()
        .map(|s| s.duration_minutes)
        .filter(|d| *d > 0)
        .unwrap_or(DEFAULT_DURATION_MINUTES);
    Ok((service, duration))
}

/// UTC span of a whole local day
fn local_day(ctx: &FunctionContext, date: NaiveDate) -> Option<Interval> {
    let tz = ctx.tz();
    let midnight = chrono::NaiveTime::MIN;
    let start = local_to_utc(&tz, date, midnight)?;
    let end = local_to_utc(&tz, date + Duration::days(1), midnight).unwrap_or(start + Duration::days(1));
    Some(Interval::new(start, end))
}

/// Free slots on one local date, checked against bookings and the calendar
async fn free_slots_on(
    ctx: &FunctionContext,
    date: NaiveDate,
    duration_minutes: i64,
    preferred: Option<PreferredTime>,
) -> SqliteResult<Vec<Slot>> {
    let hours = ctx.db.get_business_hours(&ctx.business.id)?;
    let Some(day) = local_day(ctx, date) else {
        return Ok(Vec::new());
    };
    let busy = busy_intervals(ctx, day).await?;
    Ok(free_slots(&ctx.tz(), &hours, date, duration_minutes, &busy, ctx.now, preferred))
}

/// The caller's number, or the one they gave us
fn contact_number(ctx: &FunctionContext, given: Option<&str>) -> Option<String> {
    given
        .and_then(normalize_phone)
        .or_else(|| ctx.caller_number.clone())
}

fn slot_times(slots: &[Slot]) -> Vec<String> {
    slots.iter().map(|s| format_spoken_time(&s.local_start)).collect()
}

fn slots_json(slots: &[Slot]) -> Value {
    Value::Array(
        slots
            .iter()
            .map(|s| {
                json!({
                    "start": s.start.to_rfc3339(),
                    "end": s.end.to_rfc3339(),
                    "local_time": format_spoken_time(&s.local_start),
                })
            })
            .collect(),
    )
}

/// Spoken alternative times, e.g. " I do have 10:00 AM or 2:30 PM that day."
fn alternatives_sentence(slots: &[Slot]) -> String {
    if slots.is_empty() {
        return String::new();
    }
    format!(" I do have {} that day. Would one of those work?", spoken_list(&slot_times(slots), "or"))
}

fn rejection_sentence(ctx: &FunctionContext, rejection: BookingRejection) -> String {
    match rejection {
        BookingRejection::InPast => "That time has already passed.".to_string(),
        BookingRejection::TooFarAhead => "I can only book appointments up to 90 days out.".to_string(),
        BookingRejection::Closed => "We're closed that day.".to_string(),
        BookingRejection::OutsideHours => "That's outside our business hours.".to_string(),
        BookingRejection::Conflict => ctx.say(Phrase::SlotTaken).to_string(),
    }
}

fn date_not_understood(input: &str) -> String {
    format!(
        "I'm sorry, I didn't quite catch the date \"{}\". Could you say it another way, like \"next Tuesday\" or \"March 5th\"?",
        input.trim()
    )
}

fn time_not_understood(input: &str) -> String {
    format!(
        "I'm sorry, I didn't quite catch the time \"{}\". Could you say it like \"10 AM\" or \"2:30 PM\"?",
        input.trim()
    )
}

use async_trait::async_trait;
use chrono::Duration;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;

use super::{
    alternatives_sentence, busy_intervals, date_not_understood, local_day, rejection_sentence, resolve_service,
    slot_times, slots_json, time_not_understood,
};
use crate::functions::registry::CallFunction;
use crate::functions::types::{
    deserialize_i64_lenient, spoken_list, FunctionContext, FunctionDefinition, FunctionResult, PropertySchema,
};
use crate::personality::Phrase;
use crate::scheduling::{
    format_spoken_date, format_spoken_time, free_slots, hours_for_date, local_to_utc, parse_date, parse_time,
    validate_booking, Interval, PreferredTime, MAX_BOOKING_DAYS_AHEAD,
};

const DEFAULT_DAYS_TO_SEARCH: i64 = 14;
/// Slots offered to the caller at once
const SLOTS_TO_OFFER: usize = 3;

fn parse_preferred(input: Option<&str>) -> Option<PreferredTime> {
    input.and_then(|p| PreferredTime::from_str(p.trim()).ok())
}

/// Find the first day with openings and offer a few times
pub struct FindNextAvailableFunction {
    definition: FunctionDefinition,
}

#[derive(Debug, Deserialize)]
struct FindNextAvailableArgs {
    service: Option<String>,
    preferred_time: Option<String>,
    #[serde(default, deserialize_with = "deserialize_i64_lenient")]
    days_to_search: Option<i64>,
}

impl FindNextAvailableFunction {
    pub fn new() -> Self {
        let definition = FunctionDefinition::new(
            "find_next_available",
            "Find the next open appointment times. Use when the caller asks for the soonest availability.",
        )
        .property("service", PropertySchema::string("Service the caller wants, if mentioned"))
        .property(
            "preferred_time",
            PropertySchema::string("Part of the day the caller prefers").with_enum(&[
                "morning",
                "afternoon",
                "evening",
                "any",
            ]),
        )
        .property(
            "days_to_search",
            PropertySchema::integer("How many days ahead to look (max 90)").with_default(json!(DEFAULT_DAYS_TO_SEARCH)),
        );
        FindNextAvailableFunction { definition }
    }
}

#[async_trait]
impl CallFunction for FindNextAvailableFunction {
    fn definition(&self) -> FunctionDefinition {
        self.definition.clone()
    }

    async fn execute(&self, args: Value, ctx: &FunctionContext) -> FunctionResult {
        let args: FindNextAvailableArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => {
                log::warn!("[find_next_available] Invalid args: {}", e);
                return ctx.fail(Phrase::AvailabilityError);
            }
        };

        let days = args
            .days_to_search
            .unwrap_or(DEFAULT_DAYS_TO_SEARCH)
            .clamp(1, MAX_BOOKING_DAYS_AHEAD);
        let preferred = parse_preferred(args.preferred_time.as_deref());

        let (service, duration) = match resolve_service(ctx, args.service.as_deref()) {
            Ok(found) => found,
            Err(e) => {
                log::error!("[find_next_available] Service lookup failed: {}", e);
                return ctx.fail(Phrase::AvailabilityError);
            }
        };
        let hours = match ctx.db.get_business_hours(&ctx.business.id) {
            Ok(hours) => hours,
            Err(e) => {
                log::error!("[find_next_available] Failed to load hours: {}", e);
                return ctx.fail(Phrase::AvailabilityError);
            }
        };

        let today = ctx.today();
        let last_day = today + Duration::days(days - 1);
        let window_end = local_day(ctx, last_day).map_or(ctx.now + Duration::days(days), |d| d.end);
        let busy = match busy_intervals(ctx, Interval::new(ctx.now, window_end)).await {
            Ok(busy) => busy,
            Err(e) => {
                log::error!("[find_next_available] Failed to load appointments: {}", e);
                return ctx.fail(Phrase::AvailabilityError);
            }
        };

        let tz = ctx.tz();
        for offset in 0..days {
            let date = today + Duration::days(offset);
            if hours_for_date(&hours, date).is_none() {
                continue;
            }
            let slots = free_slots(&tz, &hours, date, duration, &busy, ctx.now, preferred);
            if slots.is_empty() {
                continue;
            }

            let offered = &slots[..slots.len().min(SLOTS_TO_OFFER)];
            let day_phrase = if offset == 0 {
                "today".to_string()
            } else if offset == 1 {
                "tomorrow".to_string()
            } else {
                format_spoken_date(date)
            };
            return FunctionResult::success(format!(
                "The next opening is {}. I have {}. Would any of those work?",
                day_phrase,
                spoken_list(&slot_times(offered), "or")
            ))
            .with_data(json!({
                "available": true,
                "date": date.to_string(),
                "service": service.map(|s| s.name),
                "duration_minutes": duration,
                "slots": slots_json(offered),
            }));
        }

        FunctionResult::success(format!(
            "{} {}",
            ctx.say(Phrase::NoAvailability),
            ctx.say(Phrase::MessageFallback)
        ))
        .with_data(json!({ "available": false, "days_searched": days }))
    }
}

/// Check a date, or a specific time on it
pub struct CheckAvailabilityFunction {
    definition: FunctionDefinition,
}

#[derive(Debug, Deserialize)]
struct CheckAvailabilityArgs {
    date: String,
    time: Option<String>,
    service: Option<String>,
    preferred_time: Option<String>,
}

impl CheckAvailabilityFunction {
    pub fn new() -> Self {
        let definition = FunctionDefinition::new(
            "check_availability",
            "Check open appointment times on a specific date, or whether a specific time is free.",
        )
        .required_property(
            "date",
            PropertySchema::string("Date the caller asked about, e.g. 2030-03-05, tomorrow, next Friday, March 5"),
        )
        .property("time", PropertySchema::string("Specific time, e.g. 2:30 PM"))
        .property("service", PropertySchema::string("Service the caller wants, if mentioned"))
        .property(
            "preferred_time",
            PropertySchema::string("Part of the day the caller prefers").with_enum(&[
                "morning",
                "afternoon",
                "evening",
                "any",
            ]),
        );
        CheckAvailabilityFunction { definition }
    }
}

#[async_trait]
impl CallFunction for CheckAvailabilityFunction {
    fn definition(&self) -> FunctionDefinition {
        self.definition.clone()
    }

    async fn execute(&self, args: Value, ctx: &FunctionContext) -> FunctionResult {
        let args: CheckAvailabilityArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => {
                log::warn!("[check_availability] Invalid args: {}", e);
                return ctx.fail(Phrase::AvailabilityError);
            }
        };

        let today = ctx.today();
        let Some(date) = parse_date(&args.date, today) else {
            return FunctionResult::failure(date_not_understood(&args.date));
        };
        if date < today {
            return FunctionResult::failure("That date has already passed. Is there another day that works for you?");
        }
        if date > today + Duration::days(MAX_BOOKING_DAYS_AHEAD) {
            return FunctionResult::failure("I can only book appointments up to 90 days out.");
        }

        let (_, duration) = match resolve_service(ctx, args.service.as_deref()) {
            Ok(found) => found,
            Err(e) => {
                log::error!("[check_availability] Service lookup failed: {}", e);
                return ctx.fail(Phrase::AvailabilityError);
            }
        };
        let hours = match ctx.db.get_business_hours(&ctx.business.id) {
            Ok(hours) => hours,
            Err(e) => {
                log::error!("[check_availability] Failed to load hours: {}", e);
                return ctx.fail(Phrase::AvailabilityError);
            }
        };

        let spoken_date = format_spoken_date(date);
        if hours_for_date(&hours, date).is_none() {
            return FunctionResult::success(format!(
                "We're closed on {}. Would another day work for you?",
                date.format("%A")
            ))
            .with_data(json!({ "available": false, "date": date.to_string(), "closed": true }));
        }

        let tz = ctx.tz();
        let busy = match local_day(ctx, date) {
            Some(day) => match busy_intervals(ctx, day).await {
                Ok(busy) => busy,
                Err(e) => {
                    log::error!("[check_availability] Failed to load appointments: {}", e);
                    return ctx.fail(Phrase::AvailabilityError);
                }
            },
            None => Vec::new(),
        };
        let preferred = parse_preferred(args.preferred_time.as_deref());
        let slots = free_slots(&tz, &hours, date, duration, &busy, ctx.now, preferred);

        let Some(time_input) = args.time.as_deref().filter(|t| !t.trim().is_empty()) else {
            if slots.is_empty() {
                return FunctionResult::success(format!(
                    "I don't have any openings on {}. Would another day work?",
                    spoken_date
                ))
                .with_data(json!({ "available": false, "date": date.to_string(), "slots": [] }));
            }
            let offered = &slots[..slots.len().min(SLOTS_TO_OFFER)];
            let more = if slots.len() > offered.len() { ", among others" } else { "" };
            return FunctionResult::success(format!(
                "On {} I have {}{}. Which time works best?",
                spoken_date,
                spoken_list(&slot_times(offered), "or"),
                more
            ))
            .with_data(json!({ "available": true, "date": date.to_string(), "slots": slots_json(offered) }));
        };

        let Some(time) = parse_time(time_input) else {
            return FunctionResult::failure(time_not_understood(time_input));
        };
        let Some(start) = local_to_utc(&tz, date, time) else {
            return FunctionResult::success("That time doesn't exist that day because of the clock change. Could we try another time?")
                .with_data(json!({ "available": false }));
        };

        let outcome = validate_booking(&tz, &hours, start, duration, &busy, ctx.now);

        match outcome {
            Ok(()) => FunctionResult::success(format!(
                "Yes, {} on {} is available. Would you like me to book it?",
                format_spoken_time(&start.with_timezone(&tz)),
                spoken_date
            ))
            .with_data(json!({ "available": true, "date": date.to_string(), "start": start.to_rfc3339() })),
            Err(rejection) => {
                let alternatives = &slots[..slots.len().min(SLOTS_TO_OFFER)];
                FunctionResult::success(format!(
                    "{}{}",
                    rejection_sentence(ctx, rejection),
                    alternatives_sentence(alternatives)
                ))
                .with_data(json!({
                    "available": false,
                    "date": date.to_string(),
                    "reason": rejection.to_string(),
                    "alternatives": slots_json(alternatives),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::testing::test_context;
    use crate::models::NewAppointment;
    use chrono::{TimeZone, Utc};

    // Tuesday 2030-03-05, 9:00 AM in New York
    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 3, 5, 14, 0, 0).unwrap()
    }

    fn book(ctx: &FunctionContext, start: chrono::DateTime<Utc>, minutes: i64) {
        ctx.db
            .insert_appointment_if_free(&NewAppointment {
                business_id: ctx.business.id.clone(),
                call_id: None,
                service_id: None,
                service_name: None,
                customer_name: "Existing".to_string(),
                customer_phone: None,
                customer_email: None,
                scheduled_at: start,
                duration_minutes: minutes,
                notes: None,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_find_next_available_today() {
        let ctx = test_context(now());
        let result = FindNextAvailableFunction::new().execute(json!({}), &ctx).await;
        assert!(result.success);
        assert!(result.result.starts_with("The next opening is today"));
        let data = result.data.unwrap();
        assert_eq!(data["date"], "2030-03-05");
        let slots = data["slots"].as_array().unwrap();
        assert_eq!(slots.len(), 3);
        // 9:00 is not strictly after now
        assert_eq!(slots[0]["local_time"], "9:30 AM");
    }

    #[tokio::test]
    async fn test_find_next_available_skips_booked_and_closed_days() {
        // Friday 2030-03-08 at 5 PM local: the rest of Friday and the weekend are unavailable
        let ctx = test_context(Utc.with_ymd_and_hms(2030, 3, 8, 22, 0, 0).unwrap());
        let result = FindNextAvailableFunction::new()
            .execute(json!({"preferred_time": "afternoon"}), &ctx)
            .await;
        let data = result.data.unwrap();
        assert_eq!(data["date"], "2030-03-11");
        assert_eq!(data["slots"][0]["local_time"], "12:00 PM");
    }

    #[tokio::test]
    async fn test_find_next_available_respects_existing_bookings() {
        let ctx = test_context(now());
        // 9:30 to 11:00 local is taken
        book(&ctx, Utc.with_ymd_and_hms(2030, 3, 5, 14, 30, 0).unwrap(), 90);
        let result = FindNextAvailableFunction::new().execute(json!({}), &ctx).await;
        let data = result.data.unwrap();
        assert_eq!(data["slots"][0]["local_time"], "11:00 AM");
    }

    #[tokio::test]
    async fn test_find_next_available_nothing_in_range() {
        // Saturday, searching only the weekend
        let ctx = test_context(Utc.with_ymd_and_hms(2030, 3, 9, 15, 0, 0).unwrap());
        let result = FindNextAvailableFunction::new()
            .execute(json!({"days_to_search": "2"}), &ctx)
            .await;
        assert!(result.success);
        assert_eq!(result.data.unwrap()["available"], false);
        assert!(result.result.starts_with(ctx.say(Phrase::NoAvailability)));
    }

    #[tokio::test]
    async fn test_check_availability_lists_slots() {
        let ctx = test_context(now());
        let result = CheckAvailabilityFunction::new()
            .execute(json!({"date": "tomorrow"}), &ctx)
            .await;
        assert!(result.success);
        assert!(result.result.starts_with("On Wednesday, March 6 I have 9:00 AM, 9:30 AM, or 10:00 AM"));
    }

    #[tokio::test]
    async fn test_check_availability_specific_time() {
        let ctx = test_context(now());
        let free = CheckAvailabilityFunction::new()
            .execute(json!({"date": "2030-03-06", "time": "2pm"}), &ctx)
            .await;
        assert_eq!(free.data.unwrap()["available"], true);

        book(&ctx, Utc.with_ymd_and_hms(2030, 3, 6, 19, 0, 0).unwrap(), 60);
        let taken = CheckAvailabilityFunction::new()
            .execute(json!({"date": "2030-03-06", "time": "2pm"}), &ctx)
            .await;
        assert!(taken.result.starts_with(ctx.say(Phrase::SlotTaken)));
        let data = taken.data.unwrap();
        assert_eq!(data["available"], false);
        assert_eq!(data["alternatives"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_check_availability_outside_hours_and_closed() {
        let ctx = test_context(now());
        let late = CheckAvailabilityFunction::new()
            .execute(json!({"date": "2030-03-06", "time": "4:30 pm"}), &ctx)
            .await;
        assert!(late.result.starts_with("That's outside our business hours."));

        let sunday = CheckAvailabilityFunction::new()
            .execute(json!({"date": "sunday"}), &ctx)
            .await;
        assert!(sunday.result.starts_with("We're closed on Sunday"));
    }

    #[tokio::test]
    async fn test_check_availability_bad_input() {
        let ctx = test_context(now());
        let result = CheckAvailabilityFunction::new()
            .execute(json!({"date": "whenever"}), &ctx)
            .await;
        assert!(!result.success);
        assert!(result.result.contains("whenever"));

        let past = CheckAvailabilityFunction::new()
            .execute(json!({"date": "2030-03-01"}), &ctx)
            .await;
        assert!(!past.success);
    }
}

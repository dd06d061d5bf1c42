use async_trait::async_trait;
use chrono::Duration;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{contact_number, date_not_understood, rejection_sentence, time_not_understood};
use crate::functions::registry::CallFunction;
use crate::functions::types::{
    deserialize_bool_lenient, deserialize_i64_lenient, FunctionContext, FunctionDefinition, FunctionResult,
    PropertySchema,
};
use crate::models::CallOutcome;
use crate::personality::Phrase;
use crate::scheduling::{format_spoken, local_to_utc, parse_date, parse_time, validate_booking};

/// Check table capacity for a party, and optionally hold the table
pub struct CheckReservationAvailabilityFunction {
    definition: FunctionDefinition,
}

#[derive(Debug, Deserialize)]
struct ReservationArgs {
    date: String,
    time: String,
    #[serde(default, deserialize_with = "deserialize_i64_lenient")]
    party_size: Option<i64>,
    customer_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_bool_lenient")]
    confirm: Option<bool>,
}

impl CheckReservationAvailabilityFunction {
    pub fn new() -> Self {
        let definition = FunctionDefinition::new(
            "check_reservation_availability",
            "Check whether a table is available for a party at a date and time. Set confirm to true, with the caller's name, to reserve it.",
        )
        .required_property("date", PropertySchema::string("Reservation date, e.g. Friday or 2030-03-08"))
        .required_property("time", PropertySchema::string("Reservation time, e.g. 7 PM"))
        .required_property("party_size", PropertySchema::integer("Number of guests"))
        .property("customer_name", PropertySchema::string("Name for the reservation"))
        .property(
            "confirm",
            PropertySchema::boolean("Reserve the table if it is available").with_default(json!(false)),
        );
        CheckReservationAvailabilityFunction { definition }
    }
}

#[async_trait]
impl CallFunction for CheckReservationAvailabilityFunction {
    fn definition(&self) -> FunctionDefinition {
        self.definition.clone()
    }

    async fn execute(&self, args: Value, ctx: &FunctionContext) -> FunctionResult {
        let args: ReservationArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => {
                log::warn!("[check_reservation_availability] Invalid args: {}", e);
                return ctx.fail(Phrase::AvailabilityError);
            }
        };

        let Some(party_size) = args.party_size.filter(|p| *p > 0) else {
            return FunctionResult::failure("How many people will be in your party?");
        };
        let Some(date) = parse_date(&args.date, ctx.today()) else {
            return FunctionResult::failure(date_not_understood(&args.date));
        };
        let Some(time) = parse_time(&args.time) else {
            return FunctionResult::failure(time_not_understood(&args.time));
        };

        let settings = match ctx.db.get_reservation_settings(&ctx.business.id) {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                log::info!("[check_reservation_availability] {} has no reservation settings", ctx.business.id);
                return FunctionResult::failure(format!(
                    "I'm not able to take reservations over the phone right now. {}",
                    ctx.say(Phrase::MessageFallback)
                ));
            }
            Err(e) => {
                log::error!("[check_reservation_availability] Failed to load settings: {}", e);
                return ctx.fail(Phrase::AvailabilityError);
            }
        };

        if party_size > settings.max_party_size {
            return FunctionResult::success(format!(
                "For parties larger than {}, we'll need to arrange things directly. {}",
                settings.max_party_size,
                ctx.say(Phrase::MessageFallback)
            ))
            .with_data(json!({ "available": false, "reason": "party_too_large" }));
        }

        let tz = ctx.tz();
        let Some(start) = local_to_utc(&tz, date, time) else {
            return FunctionResult::failure("That time doesn't exist that day because of the clock change. Could we try another time?");
        };
        let hours = match ctx.db.get_business_hours(&ctx.business.id) {
            Ok(hours) => hours,
            Err(e) => {
                log::error!("[check_reservation_availability] Failed to load hours: {}", e);
                return ctx.fail(Phrase::AvailabilityError);
            }
        };
        if let Err(rejection) = validate_booking(&tz, &hours, start, settings.duration_minutes, &[], ctx.now) {
            return FunctionResult::success(format!(
                "{} Would another time work for you?",
                rejection_sentence(ctx, rejection)
            ))
            .with_data(json!({ "available": false, "reason": rejection.to_string() }));
        }

        let end = start + Duration::minutes(settings.duration_minutes);
        let reserved = match ctx.db.reserved_guests_between(&ctx.business.id, start, end) {
            Ok(reserved) => reserved,
            Err(e) => {
                log::error!("[check_reservation_availability] Capacity lookup failed: {}", e);
                return ctx.fail(Phrase::AvailabilityError);
            }
        };
        let remaining = settings.total_capacity - reserved;
        let when = format_spoken(&start.with_timezone(&tz));

        if remaining < party_size {
            return FunctionResult::success(format!(
                "I'm sorry, we're fully booked for a party of {} on {}. Would a different time work?",
                party_size, when
            ))
            .with_data(json!({ "available": false, "remaining_capacity": remaining.max(0) }));
        }

        let name = args.customer_name.as_deref().map(str::trim).filter(|n| !n.is_empty());
        if let (Some(true), Some(name)) = (args.confirm, name) {
            let phone = contact_number(ctx, None);
            return match ctx
                .db
                .insert_reservation(&ctx.business.id, name, phone.as_deref(), party_size, start, end)
            {
                Ok(id) => {
                    log::info!("[check_reservation_availability] Reserved table {} for {}", id, ctx.business.id);
                    ctx.mark_outcome(CallOutcome::Booked);
                    FunctionResult::success(format!(
                        "You're all set! I've reserved a table for {} on {} under {}.",
                        party_size, when, name
                    ))
                    .with_data(json!({ "available": true, "reserved": true, "reservation_id": id }))
                }
                Err(e) => {
                    log::error!("[check_reservation_availability] Insert failed: {}", e);
                    ctx.fail(Phrase::BookingError)
                }
            };
        }

        FunctionResult::success(format!(
            "Good news, we can seat a party of {} on {}. Would you like me to reserve it?",
            party_size, when
        ))
        .with_data(json!({ "available": true, "reserved": false, "remaining_capacity": remaining }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::testing::test_context;
    use crate::models::ReservationSettings;
    use chrono::{TimeZone, Utc};

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 3, 5, 15, 0, 0).unwrap()
    }

    fn with_capacity(ctx: &FunctionContext, total: i64) {
        ctx.db
            .upsert_reservation_settings(&ReservationSettings {
                business_id: ctx.business.id.clone(),
                total_capacity: total,
                max_party_size: 8,
                duration_minutes: 90,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_capacity_check_and_reserve() {
        let ctx = test_context(now());
        with_capacity(&ctx, 10);
        let function = CheckReservationAvailabilityFunction::new();

        let args = json!({"date": "2030-03-06", "time": "12pm", "party_size": "6"});
        let check = function.execute(args.clone(), &ctx).await;
        assert_eq!(check.data.unwrap()["available"], true);

        let mut reserve = args.clone();
        reserve["customer_name"] = json!("Lee");
        reserve["confirm"] = json!(true);
        let reserved = function.execute(reserve, &ctx).await;
        assert_eq!(reserved.data.unwrap()["reserved"], true);

        // 4 seats left for an overlapping party of 6
        let full = function
            .execute(json!({"date": "2030-03-06", "time": "1pm", "party_size": 6}), &ctx)
            .await;
        let data = full.data.unwrap();
        assert_eq!(data["available"], false);
        assert_eq!(data["remaining_capacity"], 4);
    }

    #[tokio::test]
    async fn test_party_too_large_and_outside_hours() {
        let ctx = test_context(now());
        with_capacity(&ctx, 40);
        let function = CheckReservationAvailabilityFunction::new();

        let big = function
            .execute(json!({"date": "2030-03-06", "time": "12pm", "party_size": 12}), &ctx)
            .await;
        assert_eq!(big.data.unwrap()["reason"], "party_too_large");

        let late = function
            .execute(json!({"date": "2030-03-06", "time": "4pm", "party_size": 2}), &ctx)
            .await;
        assert!(late.result.starts_with("That's outside our business hours."));
    }

    #[tokio::test]
    async fn test_no_reservation_settings() {
        let ctx = test_context(now());
        let result = CheckReservationAvailabilityFunction::new()
            .execute(json!({"date": "tomorrow", "time": "noon", "party_size": 2}), &ctx)
            .await;
        assert!(!result.success);
    }
}

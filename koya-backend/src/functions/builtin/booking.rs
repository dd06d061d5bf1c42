use async_trait::async_trait;
use chrono::Duration;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{
    alternatives_sentence, calendar_busy, contact_number, date_not_understood, free_slots_on, local_day,
    rejection_sentence, resolve_service, time_not_understood,
};
use crate::db::InsertOutcome;
use crate::functions::registry::CallFunction;
use crate::functions::types::{FunctionContext, FunctionDefinition, FunctionResult, PropertySchema};
use crate::models::{Appointment, AppointmentStatus, CallOutcome, NewAppointment};
use crate::personality::Phrase;
use crate::phone::last_four;
use crate::scheduling::{
    format_spoken, local_to_utc, parse_date, parse_time, validate_booking, BookingRejection, Interval,
};

/// Alternatives offered after a refused booking
const ALTERNATIVES_TO_OFFER: usize = 3;

/// Book an appointment after validating it against hours, bookings and the calendar
pub struct BookAppointmentFunction {
    definition: FunctionDefinition,
}

#[derive(Debug, Deserialize)]
struct BookAppointmentArgs {
    customer_name: String,
    date: String,
    time: String,
    customer_phone: Option<String>,
    customer_email: Option<String>,
    service: Option<String>,
    notes: Option<String>,
}

impl BookAppointmentFunction {
    pub fn new() -> Self {
        let definition = FunctionDefinition::new(
            "book_appointment",
            "Book an appointment once the caller has confirmed the date and time.",
        )
        .required_property("customer_name", PropertySchema::string("Caller's full name"))
        .required_property("date", PropertySchema::string("Appointment date, e.g. 2030-03-05 or next Tuesday"))
        .required_property("time", PropertySchema::string("Appointment time, e.g. 2:30 PM"))
        .property(
            "customer_phone",
            PropertySchema::string("Phone number for the appointment if different from the calling number"),
        )
        .property("customer_email", PropertySchema::string("Caller's email address"))
        .property("service", PropertySchema::string("Service being booked"))
        .property("notes", PropertySchema::string("Anything the business should know"));
        BookAppointmentFunction { definition }
    }
}

impl BookAppointmentFunction {
    /// The refusal sentence plus a few other times on the same day
    async fn refuse(
        &self,
        ctx: &FunctionContext,
        rejection: BookingRejection,
        date: chrono::NaiveDate,
        duration: i64,
    ) -> FunctionResult {
        let alternatives = match rejection {
            BookingRejection::Conflict | BookingRejection::OutsideHours => {
                match free_slots_on(ctx, date, duration, None).await {
                    Ok(slots) => slots.into_iter().take(ALTERNATIVES_TO_OFFER).collect(),
                    Err(e) => {
                        log::error!("[book_appointment] Failed to load alternatives: {}", e);
                        Vec::new()
                    }
                }
            }
            _ => Vec::new(),
        };

        let follow_up = if alternatives.is_empty() {
            " Would you like to try a different time?".to_string()
        } else {
            alternatives_sentence(&alternatives)
        };
        FunctionResult::failure(format!("{}{}", rejection_sentence(ctx, rejection), follow_up)).with_data(json!({
            "booked": false,
            "reason": rejection.to_string(),
        }))
    }

    async fn send_confirmation(&self, ctx: &FunctionContext, appointment: &Appointment, when: &str) -> bool {
        let Some(phone) = appointment.customer_phone.as_deref() else {
            return false;
        };
        match ctx.db.get_call_settings(&ctx.business.id) {
            Ok(settings) if settings.sms_confirmations => {}
            Ok(_) => return false,
            Err(e) => {
                log::error!("[book_appointment] Failed to load call settings: {}", e);
                return false;
            }
        }

        let body = format!(
            "Your appointment with {} is confirmed for {}. Reply or call us if you need to make changes.",
            ctx.business.name, when
        );
        match ctx.send_sms(phone, &body).await {
            Ok(_) => true,
            Err(e) => {
                log::warn!("[book_appointment] Confirmation SMS to ...{} failed: {}", last_four(phone), e);
                false
            }
        }
    }
}

#[async_trait]
impl CallFunction for BookAppointmentFunction {
    fn definition(&self) -> FunctionDefinition {
        self.definition.clone()
    }

    async fn execute(&self, args: Value, ctx: &FunctionContext) -> FunctionResult {
        let args: BookAppointmentArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => {
                log::warn!("[book_appointment] Invalid args: {}", e);
                return ctx.fail(Phrase::BookingError);
            }
        };

        let Some(date) = parse_date(&args.date, ctx.today()) else {
            return FunctionResult::failure(date_not_understood(&args.date));
        };
        let Some(time) = parse_time(&args.time) else {
            return FunctionResult::failure(time_not_understood(&args.time));
        };
        let tz = ctx.tz();
        let Some(start) = local_to_utc(&tz, date, time) else {
            return FunctionResult::failure(
                "That time doesn't exist that day because of the clock change. Could we try another time?",
            );
        };

        let (service, duration) = match resolve_service(ctx, args.service.as_deref()) {
            Ok(found) => found,
            Err(e) => {
                log::error!("[book_appointment] Service lookup failed: {}", e);
                return ctx.fail(Phrase::BookingError);
            }
        };
        let hours = match ctx.db.get_business_hours(&ctx.business.id) {
            Ok(hours) => hours,
            Err(e) => {
                log::error!("[book_appointment] Failed to load hours: {}", e);
                return ctx.fail(Phrase::BookingError);
            }
        };

        let requested = Interval::new(start, start + Duration::minutes(duration));
        let calendar = calendar_busy(ctx, requested).await;
        if let Err(rejection) = validate_booking(&tz, &hours, start, duration, &calendar, ctx.now) {
            log::info!("[book_appointment] Refused {} for {}: {}", start, ctx.business.id, rejection);
            return self.refuse(ctx, rejection, date, duration).await;
        }

        let new = NewAppointment {
            business_id: ctx.business.id.clone(),
            call_id: ctx.call_id(),
            service_id: service.as_ref().map(|s| s.id),
            service_name: service
                .as_ref()
                .map(|s| s.name.clone())
                .or_else(|| args.service.clone().filter(|s| !s.trim().is_empty())),
            customer_name: args.customer_name.trim().to_string(),
            customer_phone: contact_number(ctx, args.customer_phone.as_deref()),
            customer_email: args.customer_email.filter(|e| e.contains('@')),
            scheduled_at: start,
            duration_minutes: duration,
            notes: args.notes,
        };

        let appointment = match ctx.db.insert_appointment_if_free(&new) {
            Ok(InsertOutcome::Inserted(appointment)) => appointment,
            Ok(InsertOutcome::Conflict(existing)) => {
                log::info!(
                    "[book_appointment] Slot {} already taken by appointment {}",
                    start,
                    existing.id
                );
                return self.refuse(ctx, BookingRejection::Conflict, date, duration).await;
            }
            Err(e) => {
                log::error!("[book_appointment] Insert failed for {}: {}", ctx.business.id, e);
                return ctx.fail(Phrase::BookingError);
            }
        };

        log::info!("[book_appointment] Booked appointment {} for {}", appointment.id, ctx.business.id);
        ctx.mark_outcome(CallOutcome::Booked);

        let when = format_spoken(&start.with_timezone(&tz));
        let texted = self.send_confirmation(ctx, &appointment, &when).await;

        let first_name = appointment.customer_name.split_whitespace().next().unwrap_or_default();
        let what = appointment
            .service_name
            .as_deref()
            .map(|s| format!("your {}", s.to_lowercase()))
            .unwrap_or_else(|| "your appointment".to_string());
        let mut sentence = format!("You're all set, {}! I've booked {} for {}.", first_name, what, when);
        if texted {
            sentence.push_str(" You'll get a text confirmation shortly.");
        }

        FunctionResult::success(sentence).with_data(json!({
            "booked": true,
            "appointment_id": appointment.id,
            "scheduled_at": appointment.scheduled_at.to_rfc3339(),
            "ends_at": appointment.ends_at.to_rfc3339(),
            "sms_sent": texted,
        }))
    }
}

/// Cancel the caller's next confirmed appointment
pub struct CancelAppointmentFunction {
    definition: FunctionDefinition,
}

#[derive(Debug, Deserialize)]
struct CancelAppointmentArgs {
    customer_phone: Option<String>,
    date: Option<String>,
}

impl CancelAppointmentFunction {
    pub fn new() -> Self {
        let definition = FunctionDefinition::new(
            "cancel_appointment",
            "Cancel the caller's upcoming appointment. Confirm with the caller before calling this.",
        )
        .property(
            "customer_phone",
            PropertySchema::string("Phone number the appointment was booked under, if not the calling number"),
        )
        .property("date", PropertySchema::string("Date of the appointment to cancel, if the caller has several"));
        CancelAppointmentFunction { definition }
    }
}

#[async_trait]
impl CallFunction for CancelAppointmentFunction {
    fn definition(&self) -> FunctionDefinition {
        self.definition.clone()
    }

    async fn execute(&self, args: Value, ctx: &FunctionContext) -> FunctionResult {
        let args: CancelAppointmentArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => {
                log::warn!("[cancel_appointment] Invalid args: {}", e);
                return ctx.fail(Phrase::GenericError);
            }
        };

        let Some(phone) = contact_number(ctx, args.customer_phone.as_deref()) else {
            return FunctionResult::failure("What phone number was the appointment booked under?");
        };

        let (from, to) = match args.date.as_deref().filter(|d| !d.trim().is_empty()) {
            Some(input) => {
                let Some(date) = parse_date(input, ctx.today()) else {
                    return FunctionResult::failure(date_not_understood(input));
                };
                match local_day(ctx, date) {
                    Some(day) => (day.start.max(ctx.now), Some(day.end)),
                    None => (ctx.now, None),
                }
            }
            None => (ctx.now, None),
        };

        let appointment = match ctx.db.next_appointment_for_phone(&ctx.business.id, &phone, from, to) {
            Ok(Some(appointment)) => appointment,
            Ok(None) => {
                return FunctionResult::failure(format!(
                    "I couldn't find an upcoming appointment for the number ending in {}. Is there another number it might be under?",
                    last_four(&phone)
                ));
            }
            Err(e) => {
                log::error!("[cancel_appointment] Lookup failed: {}", e);
                return ctx.fail(Phrase::GenericError);
            }
        };

        match ctx
            .db
            .update_appointment_status(&ctx.business.id, appointment.id, AppointmentStatus::Cancelled)
        {
            Ok(Some(_)) => {
                log::info!("[cancel_appointment] Cancelled appointment {} for {}", appointment.id, ctx.business.id);
                ctx.mark_outcome(CallOutcome::Info);
                let when = format_spoken(&appointment.scheduled_at.with_timezone(&ctx.tz()));
                FunctionResult::success(format!(
                    "Okay, I've cancelled your appointment on {}. Would you like to book a new time?",
                    when
                ))
                .with_data(json!({ "cancelled": true, "appointment_id": appointment.id }))
            }
            Ok(None) => ctx.fail(Phrase::GenericError),
            Err(e) => {
                log::error!("[cancel_appointment] Update failed for {}: {}", appointment.id, e);
                ctx.fail(Phrase::GenericError)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::testing::{reload_call, test_context, test_context_with, CALLER_PHONE};
    use crate::integrations::{Integrations, TwilioClient};
    use crate::config::TwilioConfig;
    use chrono::{TimeZone, Utc};
    use mockito::{Matcher, Server};

    // Tuesday 2030-03-05, 9:00 AM in New York
    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 3, 5, 14, 0, 0).unwrap()
    }

    fn booking_args(time: &str) -> Value {
        json!({"customer_name": "Dana Reyes", "date": "2030-03-06", "time": time})
    }

    #[tokio::test]
    async fn test_book_appointment() {
        let ctx = test_context(now());
        let result = BookAppointmentFunction::new().execute(booking_args("10am"), &ctx).await;
        assert!(result.success, "{}", result.result);
        assert_eq!(
            result.result,
            "You're all set, Dana! I've booked your appointment for Wednesday, March 6 at 10:00 AM."
        );
        let data = result.data.unwrap();
        assert_eq!(data["scheduled_at"], "2030-03-06T15:00:00+00:00");
        assert_eq!(data["sms_sent"], false);

        let call = reload_call(&ctx);
        assert_eq!(call.outcome, Some(CallOutcome::Booked));

        let booked = ctx
            .db
            .next_appointment_for_phone(&ctx.business.id, CALLER_PHONE, now(), None)
            .unwrap()
            .unwrap();
        assert_eq!(booked.call_id, Some(call.id));
        assert_eq!(booked.duration_minutes, 60);
    }

    #[tokio::test]
    async fn test_double_booking_refused_with_alternatives() {
        let ctx = test_context(now());
        let function = BookAppointmentFunction::new();
        assert!(function.execute(booking_args("10am"), &ctx).await.success);

        let second = function.execute(booking_args("10:30 am"), &ctx).await;
        assert!(!second.success);
        assert!(second.result.starts_with(ctx.say(Phrase::SlotTaken)));
        assert!(second.result.contains("9:00 AM"));
        assert_eq!(second.data.unwrap()["reason"], BookingRejection::Conflict.to_string());
    }

    #[tokio::test]
    async fn test_booking_validation_order() {
        let ctx = test_context(now());
        let function = BookAppointmentFunction::new();

        let past = function
            .execute(json!({"customer_name": "A", "date": "2030-03-05", "time": "8am"}), &ctx)
            .await;
        assert!(past.result.starts_with("That time has already passed."));

        let far = function
            .execute(json!({"customer_name": "A", "date": "2030-07-01", "time": "10am"}), &ctx)
            .await;
        assert!(far.result.starts_with("I can only book appointments up to 90 days out."));

        let weekend = function
            .execute(json!({"customer_name": "A", "date": "2030-03-09", "time": "10am"}), &ctx)
            .await;
        assert!(weekend.result.starts_with("We're closed that day."));

        let late = function.execute(booking_args("4:30pm"), &ctx).await;
        assert!(late.result.starts_with("That's outside our business hours."));
    }

    #[tokio::test]
    async fn test_booking_uses_service_duration_and_texts_confirmation() {
        let mut server = Server::new_async().await;
        let sms = server
            .mock("POST", "/2010-04-01/Accounts/AC123/Messages.json")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("To".into(), CALLER_PHONE.into()),
                Matcher::Regex("confirmed".into()),
            ]))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"sid":"SM1"}"#)
            .create_async()
            .await;

        let mut integrations = Integrations::disabled();
        integrations.twilio = Some(
            TwilioClient::new(
                reqwest::Client::new(),
                &TwilioConfig {
                    account_sid: "AC123".to_string(),
                    auth_token: "token".to_string(),
                },
            )
            .with_base_url(&server.url()),
        );
        let ctx = test_context_with(now(), integrations);
        ctx.db.create_service(&ctx.business.id, "Cleaning", 30, None).unwrap();

        let mut args = booking_args("4:30pm");
        args["service"] = json!("cleaning");
        let result = BookAppointmentFunction::new().execute(args, &ctx).await;
        assert!(result.success, "{}", result.result);
        assert!(result.result.contains("your cleaning"));
        assert!(result.result.ends_with("You'll get a text confirmation shortly."));
        sms.assert_async().await;
    }

    #[tokio::test]
    async fn test_cancel_next_appointment() {
        let ctx = test_context(now());
        BookAppointmentFunction::new().execute(booking_args("10am"), &ctx).await;

        let result = CancelAppointmentFunction::new().execute(json!({}), &ctx).await;
        assert!(result.success, "{}", result.result);
        assert!(result.result.contains("Wednesday, March 6 at 10:00 AM"));

        let again = CancelAppointmentFunction::new().execute(json!({}), &ctx).await;
        assert!(!again.success);
        assert!(again.result.contains("4567"));
    }

    #[tokio::test]
    async fn test_cancel_on_specific_date() {
        let ctx = test_context(now());
        BookAppointmentFunction::new().execute(booking_args("10am"), &ctx).await;

        let wrong_day = CancelAppointmentFunction::new()
            .execute(json!({"date": "2030-03-07"}), &ctx)
            .await;
        assert!(!wrong_day.success);

        let right_day = CancelAppointmentFunction::new()
            .execute(json!({"date": "wednesday"}), &ctx)
            .await;
        assert!(right_day.success);
    }
}

//! Tenant dashboard: appointments, call log, inbox, settings, services and DNC.
//!
//! Every handler resolves the business from the bearer token first and passes
//! that id into each query, so one tenant can never read another's rows.

use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::json;

use super::{db_error, json_error, not_found, tenant};
use crate::db::{AppointmentFilter, InsertOutcome};
use crate::functions::builtin::calendar_busy_for;
use crate::models::{
    AppointmentStatus, BusinessHours, CreateAppointmentRequest, NewAppointment, UpdateAiConfigRequest,
    UpdateAppointmentStatusRequest, UpdateBusinessRequest,
};
use crate::phone::normalize_phone;
use crate::scheduling::{
    business_tz, local_to_utc, parse_date, parse_time, validate_booking, BookingRejection, Interval,
    DEFAULT_DURATION_MINUTES,
};
use crate::AppState;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;
const MAX_SERVICE_MINUTES: i64 = 8 * 60;

macro_rules! require_tenant {
    ($state:expr, $req:expr) => {
        match tenant(&$state, &$req) {
            Ok(id) => id,
            Err(resp) => return resp,
        }
    };
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/dashboard/appointments")
            .route("", web::get().to(list_appointments))
            .route("", web::post().to(create_appointment))
            .route("/{id}", web::patch().to(update_appointment_status)),
    );
    cfg.service(
        web::scope("/api/dashboard/calls")
            .route("", web::get().to(list_calls))
            .route("/{id}", web::get().to(get_call)),
    );
    cfg.service(
        web::scope("/api/dashboard/inbox")
            .route("", web::get().to(list_inbox))
            .route("/{id}/read", web::post().to(mark_read)),
    );
    cfg.service(
        web::scope("/api/dashboard/settings")
            .route("", web::get().to(get_settings))
            .route("", web::put().to(update_settings))
            .route("/ai", web::get().to(get_ai_settings))
            .route("/ai", web::put().to(update_ai_settings))
            .route("/calls", web::get().to(get_call_settings))
            .route("/calls", web::put().to(update_call_settings)),
    );
    cfg.service(
        web::scope("/api/dashboard/services")
            .route("", web::get().to(list_services))
            .route("", web::post().to(create_service))
            .route("/{id}", web::delete().to(delete_service)),
    );
    cfg.service(
        web::scope("/api/dashboard/dnc")
            .route("", web::get().to(list_dnc))
            .route("", web::post().to(add_dnc))
            .route("/{phone}", web::delete().to(remove_dnc)),
    );
}

fn page_size(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

/// Normalize an optional phone field: None leaves it alone, blank clears it
fn optional_phone(field: &str, value: Option<&str>) -> Result<Option<Option<String>>, HttpResponse> {
    match value.map(str::trim) {
        None => Ok(None),
        Some("") => Ok(Some(None)),
        Some(raw) => normalize_phone(raw)
            .map(|p| Some(Some(p)))
            .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, format!("Invalid {}", field))),
    }
}

// Appointments

#[derive(Debug, Deserialize)]
pub struct AppointmentQuery {
    status: Option<AppointmentStatus>,
    /// Local dates, inclusive
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    limit: Option<i64>,
}

fn local_midnight(tz: &Tz, date: NaiveDate) -> Option<chrono::DateTime<Utc>> {
    local_to_utc(tz, date, NaiveTime::MIN)
}

async fn list_appointments(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<AppointmentQuery>,
) -> impl Responder {
    let business_id = require_tenant!(state, req);
    let business = match state.db.get_business(&business_id) {
        Ok(Some(b)) => b,
        Ok(None) => return not_found("Business"),
        Err(e) => return db_error("load business", e),
    };
    let tz = business_tz(&business.timezone);

    let filter = AppointmentFilter {
        status: query.status,
        from: query.from.and_then(|d| local_midnight(&tz, d)),
        to: query.to.and_then(|d| local_midnight(&tz, d + Duration::days(1))),
        limit: Some(page_size(query.limit)),
    };
    match state.db.list_appointments(&business_id, &filter) {
        Ok(appointments) => HttpResponse::Ok().json(json!({ "success": true, "appointments": appointments })),
        Err(e) => db_error("list appointments", e),
    }
}

fn rejection_status(rejection: BookingRejection) -> StatusCode {
    match rejection {
        BookingRejection::Conflict => StatusCode::CONFLICT,
        _ => StatusCode::BAD_REQUEST,
    }
}

/// Book from the dashboard with the same rules the voice agent follows
async fn create_appointment(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreateAppointmentRequest>,
) -> impl Responder {
    let business_id = require_tenant!(state, req);
    let business = match state.db.get_business(&business_id) {
        Ok(Some(b)) => b,
        Ok(None) => return not_found("Business"),
        Err(e) => return db_error("load business", e),
    };

    let customer_name = body.customer_name.trim();
    if customer_name.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "customer_name is required");
    }
    let customer_phone = match optional_phone("customer_phone", body.customer_phone.as_deref()) {
        Ok(phone) => phone.flatten(),
        Err(resp) => return resp,
    };

    let now = Utc::now();
    let tz = business_tz(&business.timezone);
    let Some(date) = parse_date(&body.date, now.with_timezone(&tz).date_naive()) else {
        return json_error(StatusCode::BAD_REQUEST, "Invalid date");
    };
    let Some(time) = parse_time(&body.time) else {
        return json_error(StatusCode::BAD_REQUEST, "Invalid time");
    };
    let Some(start) = local_to_utc(&tz, date, time) else {
        return json_error(StatusCode::BAD_REQUEST, "That local time does not exist (clock change)");
    };

    let service = match body.service.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => match state.db.find_service_by_name(&business_id, name) {
            Ok(Some(service)) => Some(service),
            Ok(None) => return not_found("Service"),
            Err(e) => return db_error("find service", e),
        },
        None => None,
    };
    let duration = service
        .as_ref()
        .map(|s| s.duration_minutes)
        .filter(|d| *d > 0)
        .unwrap_or(DEFAULT_DURATION_MINUTES);

    let hours = match state.db.get_business_hours(&business_id) {
        Ok(hours) => hours,
        Err(e) => return db_error("load hours", e),
    };
    let requested = Interval::new(start, start + Duration::minutes(duration));
    let busy = calendar_busy_for(&state.db, &state.integrations, &business_id, requested, now).await;
    if let Err(rejection) = validate_booking(&tz, &hours, start, duration, &busy, now) {
        return json_error(rejection_status(rejection), rejection.to_string());
    }

    let new = NewAppointment {
        business_id: business_id.clone(),
        call_id: None,
        service_id: service.as_ref().map(|s| s.id),
        service_name: service.map(|s| s.name),
        customer_name: customer_name.to_string(),
        customer_phone,
        customer_email: body.customer_email.clone().filter(|e| !e.trim().is_empty()),
        scheduled_at: start,
        duration_minutes: duration,
        notes: body.notes.clone(),
    };
    match state.db.insert_appointment_if_free(&new) {
        Ok(InsertOutcome::Inserted(appointment)) => {
            log::info!("[dashboard] Appointment {} booked for {}", appointment.id, business_id);
            HttpResponse::Created().json(json!({ "success": true, "appointment": appointment }))
        }
        Ok(InsertOutcome::Conflict(existing)) => HttpResponse::Conflict().json(json!({
            "success": false,
            "error": BookingRejection::Conflict.to_string(),
            "conflicting_appointment_id": existing.id,
        })),
        Err(e) => db_error("insert appointment", e),
    }
}

async fn update_appointment_status(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<UpdateAppointmentStatusRequest>,
) -> impl Responder {
    let business_id = require_tenant!(state, req);
    let id = path.into_inner();

    let appointment = match state.db.get_appointment(&business_id, id) {
        Ok(Some(a)) => a,
        Ok(None) => return not_found("Appointment"),
        Err(e) => return db_error("load appointment", e),
    };
    if !appointment.status.can_transition_to(body.status) {
        return json_error(
            StatusCode::CONFLICT,
            format!("Cannot change a {} appointment to {}", appointment.status, body.status),
        );
    }
    match state.db.update_appointment_status(&business_id, id, body.status) {
        Ok(Some(updated)) => HttpResponse::Ok().json(json!({ "success": true, "appointment": updated })),
        Ok(None) => not_found("Appointment"),
        Err(e) => db_error("update appointment", e),
    }
}

// Calls

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn list_calls(state: web::Data<AppState>, req: HttpRequest, query: web::Query<PageQuery>) -> impl Responder {
    let business_id = require_tenant!(state, req);
    let offset = query.offset.unwrap_or(0).max(0);
    match state.db.list_calls(&business_id, page_size(query.limit), offset) {
        Ok(calls) => HttpResponse::Ok().json(json!({ "success": true, "calls": calls })),
        Err(e) => db_error("list calls", e),
    }
}

async fn get_call(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    let business_id = require_tenant!(state, req);
    match state.db.get_call(&business_id, path.into_inner()) {
        Ok(Some(call)) => HttpResponse::Ok().json(json!({ "success": true, "call": call })),
        Ok(None) => not_found("Call"),
        Err(e) => db_error("get call", e),
    }
}

// Inbox

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    #[serde(default)]
    unread: bool,
    limit: Option<i64>,
}

async fn list_inbox(state: web::Data<AppState>, req: HttpRequest, query: web::Query<InboxQuery>) -> impl Responder {
    let business_id = require_tenant!(state, req);
    match state.db.list_messages(&business_id, query.unread, page_size(query.limit)) {
        Ok(messages) => HttpResponse::Ok().json(json!({ "success": true, "messages": messages })),
        Err(e) => db_error("list messages", e),
    }
}

async fn mark_read(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    let business_id = require_tenant!(state, req);
    match state.db.mark_message_read(&business_id, path.into_inner()) {
        Ok(true) => HttpResponse::Ok().json(json!({ "success": true })),
        Ok(false) => not_found("Message"),
        Err(e) => db_error("mark message read", e),
    }
}

// Settings

fn settings_response(state: &AppState, business_id: &str) -> HttpResponse {
    let business = match state.db.get_business(business_id) {
        Ok(Some(b)) => b,
        Ok(None) => return not_found("Business"),
        Err(e) => return db_error("load business", e),
    };
    match state.db.get_business_hours(business_id) {
        Ok(hours) => HttpResponse::Ok().json(json!({ "success": true, "business": business, "hours": hours })),
        Err(e) => db_error("load hours", e),
    }
}

fn validate_hours(hours: &[BusinessHours]) -> Result<(), String> {
    for h in hours {
        if h.day_of_week > 6 {
            return Err(format!("day_of_week {} is out of range (0 = Sunday .. 6 = Saturday)", h.day_of_week));
        }
        if !h.is_closed && h.open_time >= h.close_time {
            return Err(format!("Opening time must be before closing time on day {}", h.day_of_week));
        }
    }
    Ok(())
}

async fn get_settings(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let business_id = require_tenant!(state, req);
    settings_response(&state, &business_id)
}

async fn update_settings(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<UpdateBusinessRequest>,
) -> impl Responder {
    let business_id = require_tenant!(state, req);

    let phone_number = match optional_phone("phone_number", body.phone_number.as_deref()) {
        Ok(p) => p.flatten(),
        Err(resp) => return resp,
    };
    let owner_phone = match optional_phone("owner_phone", body.owner_phone.as_deref()) {
        Ok(p) => p.flatten(),
        Err(resp) => return resp,
    };
    if let Some(tz) = body.timezone.as_deref() {
        if tz.parse::<Tz>().is_err() {
            return json_error(StatusCode::BAD_REQUEST, format!("Unknown timezone '{}'", tz));
        }
    }
    if let Some(hours) = &body.hours {
        if let Err(msg) = validate_hours(hours) {
            return json_error(StatusCode::BAD_REQUEST, msg);
        }
    }

    let name = body.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    if let Err(e) = state.db.update_business_profile(
        &business_id,
        name,
        phone_number.as_deref(),
        owner_phone.as_deref(),
        body.owner_email.as_deref(),
        body.timezone.as_deref(),
        body.payment_link_url.as_deref(),
    ) {
        return db_error("update business", e);
    }
    if let Some(hours) = &body.hours {
        if let Err(e) = state.db.set_business_hours(&business_id, hours) {
            return db_error("set hours", e);
        }
    }
    settings_response(&state, &business_id)
}

async fn get_ai_settings(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let business_id = require_tenant!(state, req);
    match state.db.get_ai_config(&business_id) {
        Ok(Some(ai)) => HttpResponse::Ok().json(json!({ "success": true, "ai": ai })),
        Ok(None) => not_found("AI config"),
        Err(e) => db_error("load ai config", e),
    }
}

async fn update_ai_settings(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<UpdateAiConfigRequest>,
) -> impl Responder {
    let business_id = require_tenant!(state, req);
    match state.db.update_ai_config(&business_id, &body) {
        Ok(Some(ai)) => HttpResponse::Ok().json(json!({ "success": true, "ai": ai })),
        Ok(None) => not_found("AI config"),
        Err(e) => db_error("update ai config", e),
    }
}

#[derive(Debug, Deserialize)]
pub struct CallSettingsRequest {
    transfer_number: Option<String>,
    backup_transfer_number: Option<String>,
    transfer_hours_only: Option<bool>,
    sms_confirmations: Option<bool>,
    urgent_message_alerts: Option<bool>,
}

async fn get_call_settings(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let business_id = require_tenant!(state, req);
    match state.db.get_call_settings(&business_id) {
        Ok(settings) => HttpResponse::Ok().json(json!({ "success": true, "settings": settings })),
        Err(e) => db_error("load call settings", e),
    }
}

async fn update_call_settings(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CallSettingsRequest>,
) -> impl Responder {
    let business_id = require_tenant!(state, req);
    let mut settings = match state.db.get_call_settings(&business_id) {
        Ok(settings) => settings,
        Err(e) => return db_error("load call settings", e),
    };

    match optional_phone("transfer_number", body.transfer_number.as_deref()) {
        Ok(Some(number)) => settings.transfer_number = number,
        Ok(None) => {}
        Err(resp) => return resp,
    }
    match optional_phone("backup_transfer_number", body.backup_transfer_number.as_deref()) {
        Ok(Some(number)) => settings.backup_transfer_number = number,
        Ok(None) => {}
        Err(resp) => return resp,
    }
    if let Some(v) = body.transfer_hours_only {
        settings.transfer_hours_only = v;
    }
    if let Some(v) = body.sms_confirmations {
        settings.sms_confirmations = v;
    }
    if let Some(v) = body.urgent_message_alerts {
        settings.urgent_message_alerts = v;
    }

    match state.db.upsert_call_settings(&settings) {
        Ok(saved) => HttpResponse::Ok().json(json!({ "success": true, "settings": saved })),
        Err(e) => db_error("save call settings", e),
    }
}

// Services

#[derive(Debug, Deserialize)]
pub struct CreateServiceRequest {
    name: String,
    duration_minutes: Option<i64>,
    price_cents: Option<i64>,
}

async fn list_services(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let business_id = require_tenant!(state, req);
    match state.db.list_services(&business_id) {
        Ok(services) => HttpResponse::Ok().json(json!({ "success": true, "services": services })),
        Err(e) => db_error("list services", e),
    }
}

async fn create_service(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreateServiceRequest>,
) -> impl Responder {
    let business_id = require_tenant!(state, req);
    let name = body.name.trim();
    if name.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "Service name cannot be empty");
    }
    let duration = body.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
    if !(1..=MAX_SERVICE_MINUTES).contains(&duration) {
        return json_error(
            StatusCode::BAD_REQUEST,
            format!("duration_minutes must be between 1 and {}", MAX_SERVICE_MINUTES),
        );
    }
    if body.price_cents.is_some_and(|p| p < 0) {
        return json_error(StatusCode::BAD_REQUEST, "price_cents cannot be negative");
    }

    match state.db.create_service(&business_id, name, duration, body.price_cents) {
        Ok(service) => HttpResponse::Created().json(json!({ "success": true, "service": service })),
        Err(e) => db_error("create service", e),
    }
}

async fn delete_service(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    let business_id = require_tenant!(state, req);
    match state.db.delete_service(&business_id, path.into_inner()) {
        Ok(true) => HttpResponse::Ok().json(json!({ "success": true })),
        Ok(false) => not_found("Service"),
        Err(e) => db_error("delete service", e),
    }
}

// Do-not-call list

#[derive(Debug, Deserialize)]
pub struct AddDncRequest {
    phone_number: String,
    reason: Option<String>,
}

async fn list_dnc(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let business_id = require_tenant!(state, req);
    match state.db.list_dnc(&business_id) {
        Ok(entries) => HttpResponse::Ok().json(json!({ "success": true, "entries": entries })),
        Err(e) => db_error("list dnc", e),
    }
}

async fn add_dnc(state: web::Data<AppState>, req: HttpRequest, body: web::Json<AddDncRequest>) -> impl Responder {
    let business_id = require_tenant!(state, req);
    let Some(phone) = normalize_phone(&body.phone_number) else {
        return json_error(StatusCode::BAD_REQUEST, "Invalid phone_number");
    };
    match state.db.add_dnc(&business_id, &phone, body.reason.as_deref()) {
        Ok(entry) => HttpResponse::Created().json(json!({ "success": true, "entry": entry })),
        Err(e) => db_error("add dnc", e),
    }
}

async fn remove_dnc(state: web::Data<AppState>, req: HttpRequest, path: web::Path<String>) -> impl Responder {
    let business_id = require_tenant!(state, req);
    let Some(phone) = normalize_phone(&path) else {
        return json_error(StatusCode::BAD_REQUEST, "Invalid phone number");
    };
    match state.db.remove_dnc(&business_id, &phone) {
        Ok(true) => HttpResponse::Ok().json(json!({ "success": true })),
        Ok(false) => not_found("DNC entry"),
        Err(e) => db_error("remove dnc", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::testing::{bearer, seed_business, test_state};
    use actix_web::{test, App};
    use chrono::{Datelike, Weekday};
    use serde_json::Value;

    /// A weekday at least a week out, so the booking is in the future and within hours
    fn next_weekday() -> NaiveDate {
        let mut date = Utc::now().date_naive() + Duration::days(7);
        while matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            date += Duration::days(1);
        }
        date
    }

    #[actix_web::test]
    async fn test_requires_token() {
        let state = test_state();
        let app = test::init_service(App::new().app_data(state).configure(config)).await;
        let req = test::TestRequest::get().uri("/api/dashboard/calls").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401);
    }

    #[actix_web::test]
    async fn test_appointment_create_conflict_and_status() {
        let state = test_state();
        let (_, token) = seed_business(&state);
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;
        let date = next_weekday().format("%Y-%m-%d").to_string();

        let book = |time: &str| {
            test::TestRequest::post()
                .uri("/api/dashboard/appointments")
                .insert_header(bearer(&token))
                .set_json(json!({"date": date, "time": time, "customer_name": "Jo", "customer_phone": "(555) 201-0000"}))
                .to_request()
        };

        let resp = test::call_service(&app, book("10:00")).await;
        assert_eq!(resp.status(), 201);
        let created: Value = test::read_body_json(resp).await;
        assert_eq!(created["appointment"]["customer_phone"], "+15552010000");
        let id = created["appointment"]["id"].as_i64().unwrap();

        assert_eq!(test::call_service(&app, book("10:30")).await.status(), 409);
        assert_eq!(test::call_service(&app, book("20:00")).await.status(), 400);

        let cancel = |status: &str| {
            test::TestRequest::patch()
                .uri(&format!("/api/dashboard/appointments/{}", id))
                .insert_header(bearer(&token))
                .set_json(json!({"status": status}))
                .to_request()
        };
        assert_eq!(test::call_service(&app, cancel("cancelled")).await.status(), 200);
        assert_eq!(test::call_service(&app, cancel("completed")).await.status(), 409);

        // The slot is free again once cancelled
        assert_eq!(test::call_service(&app, book("10:30")).await.status(), 201);
    }

    #[actix_web::test]
    async fn test_other_tenant_cannot_see_rows() {
        let state = test_state();
        let (_, token) = seed_business(&state);
        let other = state
            .db
            .create_business(&crate::models::CreateBusinessRequest {
                name: "Other".to_string(),
                phone_number: None,
                owner_phone: None,
                owner_email: None,
                timezone: None,
            })
            .unwrap();
        let service = state.db.create_service(&other.id, "Secret", 30, None).unwrap();
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::get()
            .uri("/api/dashboard/services")
            .insert_header(bearer(&token))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert!(body["services"].as_array().unwrap().is_empty());

        let req = test::TestRequest::delete()
            .uri(&format!("/api/dashboard/services/{}", service.id))
            .insert_header(bearer(&token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);
    }

    #[actix_web::test]
    async fn test_settings_validation() {
        let state = test_state();
        let (_, token) = seed_business(&state);
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let put = |body: Value| {
            test::TestRequest::put()
                .uri("/api/dashboard/settings")
                .insert_header(bearer(&token))
                .set_json(body)
                .to_request()
        };
        assert_eq!(test::call_service(&app, put(json!({"timezone": "Mars/Olympus"}))).await.status(), 400);
        assert_eq!(test::call_service(&app, put(json!({"owner_phone": "not a phone"}))).await.status(), 400);

        let resp = test::call_service(&app, put(json!({"name": "Harbor Salon & Spa", "timezone": "America/Chicago"}))).await;
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["business"]["name"], "Harbor Salon & Spa");
        assert_eq!(body["business"]["timezone"], "America/Chicago");
        assert_eq!(body["hours"].as_array().unwrap().len(), 7);

        let req = test::TestRequest::put()
            .uri("/api/dashboard/settings/calls")
            .insert_header(bearer(&token))
            .set_json(json!({"transfer_number": "555-201-1111", "transfer_hours_only": true}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["settings"]["transfer_number"], "+15552011111");
        assert_eq!(body["settings"]["transfer_hours_only"], true);
        assert_eq!(body["settings"]["sms_confirmations"], true);
    }

    #[actix_web::test]
    async fn test_dnc_numbers_are_normalized() {
        let state = test_state();
        let (business, token) = seed_business(&state);
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/api/dashboard/dnc")
            .insert_header(bearer(&token))
            .set_json(json!({"phone_number": "(555) 201-2222", "reason": "asked"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 201);
        assert!(state.db.is_on_dnc(&business.id, "+15552012222").unwrap());

        let req = test::TestRequest::delete()
            .uri("/api/dashboard/dnc/5552012222")
            .insert_header(bearer(&token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
        assert!(!state.db.is_on_dnc(&business.id, "+15552012222").unwrap());
    }
}

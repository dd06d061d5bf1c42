use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::json_error;
use crate::campaigns;
use crate::db::Database;
use crate::functions::{FunctionContext, FunctionResult};
use crate::integrations::retell::{now_ms, verify_signature, SIGNATURE_HEADER};
use crate::models::{AiConfig, Business, Call, CallDirection, CallOutcome, NewCall};
use crate::personality::{Personality, Phrase};
use crate::phone::normalize_phone;
use crate::AppState;

/// Calls shorter than this with no recorded outcome count as missed
const MISSED_CALL_MS: i64 = 10_000;

const MS_PER_MINUTE: i64 = 60_000;

/// Billed minutes for a call, rounded up to the next started minute
pub fn billed_minutes(duration_ms: i64) -> i64 {
    if duration_ms <= 0 {
        return 0;
    }
    (duration_ms + MS_PER_MINUTE - 1) / MS_PER_MINUTE
}

/// The `call` object Retell attaches to function calls and lifecycle events
#[derive(Debug, Default, Deserialize)]
pub struct RetellCallInfo {
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub from_number: Option<String>,
    #[serde(default)]
    pub to_number: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub start_timestamp: Option<i64>,
    #[serde(default)]
    pub end_timestamp: Option<i64>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub disconnection_reason: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub call_analysis: Option<CallAnalysis>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallAnalysis {
    #[serde(default)]
    pub call_summary: Option<String>,
}

impl RetellCallInfo {
    fn direction(&self) -> CallDirection {
        match self.direction.as_deref() {
            Some("outbound") => CallDirection::Outbound,
            _ => CallDirection::Inbound,
        }
    }

    /// Number of the person the agent is talking to
    fn caller_number(&self) -> Option<String> {
        let raw = match self.direction() {
            CallDirection::Inbound => self.from_number.as_deref(),
            CallDirection::Outbound => self.to_number.as_deref(),
        };
        raw.and_then(normalize_phone)
    }

    /// The business's own line on this call
    fn business_number(&self) -> Option<String> {
        let raw = match self.direction() {
            CallDirection::Inbound => self.to_number.as_deref(),
            CallDirection::Outbound => self.from_number.as_deref(),
        };
        raw.and_then(normalize_phone)
    }

    fn call_duration_ms(&self) -> i64 {
        self.duration_ms
            .or_else(|| match (self.start_timestamp, self.end_timestamp) {
                (Some(start), Some(end)) if end >= start => Some(end - start),
                _ => None,
            })
            .unwrap_or(0)
            .max(0)
    }

    fn ended_at(&self) -> DateTime<Utc> {
        self.end_timestamp
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Deserialize)]
pub struct FunctionCallRequest {
    #[serde(default)]
    call: RetellCallInfo,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    event: String,
    #[serde(default)]
    call: RetellCallInfo,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/retell")
            .route("/function", web::post().to(function_call))
            .route("/webhook", web::post().to(webhook))
            .route("/functions", web::get().to(list_functions)),
    );
}

/// Check the `x-retell-signature` header against the raw body
fn verify_request(state: &AppState, req: &HttpRequest, body: &[u8]) -> Result<(), HttpResponse> {
    if state.config.retell.allow_unsigned_webhooks {
        return Ok(());
    }
    let Some(api_key) = state.config.retell.api_key.as_deref() else {
        log::warn!("[retell] Rejecting webhook: RETELL_API_KEY is not set");
        return Err(json_error(StatusCode::UNAUTHORIZED, "Webhook signing is not configured"));
    };
    let header = req.headers().get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    verify_signature(api_key, body, header, now_ms()).map_err(|e| {
        log::warn!("[retell] Rejecting webhook: {}", e);
        json_error(StatusCode::UNAUTHORIZED, "Invalid signature")
    })
}

/// Business behind a Retell call: explicit metadata, then the agent id, then the dialed line
fn resolve_business(db: &Database, call: &RetellCallInfo) -> rusqlite::Result<Option<Business>> {
    if let Some(business_id) = call.metadata.get("business_id").and_then(Value::as_str) {
        if let Some(business) = db.get_business(business_id)? {
            return Ok(Some(business));
        }
    }
    if let Some(agent_id) = call.agent_id.as_deref().filter(|a| !a.is_empty()) {
        if let Some(business) = db.get_business_by_agent_id(agent_id)? {
            return Ok(Some(business));
        }
    }
    match call.business_number() {
        Some(number) => db.get_business_by_phone(&number),
        None => Ok(None),
    }
}

/// Call row for a Retell call, created on first sight
fn ensure_call_row(db: &Database, business: &Business, call: &RetellCallInfo) -> rusqlite::Result<Option<Call>> {
    let Some(call_id) = call.call_id.as_deref() else {
        return Ok(None);
    };
    db.ensure_call(&NewCall {
        business_id: business.id.clone(),
        retell_call_id: Some(call_id.to_string()),
        twilio_call_sid: None,
        direction: call.direction(),
        from_number: call.from_number.as_deref().and_then(normalize_phone),
        to_number: call.to_number.as_deref().and_then(normalize_phone),
    })
    .map(Some)
}

fn apology() -> HttpResponse {
    HttpResponse::Ok().json(FunctionResult::failure(Personality::default().phrase(Phrase::GenericError)))
}

async fn function_call(state: web::Data<AppState>, req: HttpRequest, body: web::Bytes) -> impl Responder {
    if let Err(resp) = verify_request(&state, &req, &body) {
        return resp;
    }
    let request: FunctionCallRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            log::warn!("[retell] Unparseable function call: {}", e);
            return json_error(StatusCode::BAD_REQUEST, "Invalid function call payload");
        }
    };

    let business = match resolve_business(&state.db, &request.call) {
        Ok(Some(business)) => business,
        Ok(None) => {
            log::warn!(
                "[retell] No business for call {:?} (agent {:?})",
                request.call.call_id,
                request.call.agent_id
            );
            return apology();
        }
        Err(e) => {
            log::error!("[retell] Tenant lookup failed: {}", e);
            return apology();
        }
    };

    let ai_config = match state.db.get_ai_config(&business.id) {
        Ok(Some(config)) => config,
        Ok(None) => AiConfig::default_for(&business.id, &business.name),
        Err(e) => {
            log::error!("[retell] Failed to load AI config for {}: {}", business.id, e);
            return apology();
        }
    };

    let call = ensure_call_row(&state.db, &business, &request.call).unwrap_or_else(|e| {
        log::error!("[retell] Failed to record call for {}: {}", business.id, e);
        None
    });

    let ctx = FunctionContext {
        db: state.db.clone(),
        integrations: state.integrations.clone(),
        caller_number: request.call.caller_number(),
        business,
        ai_config,
        call,
        now: Utc::now(),
    };
    let result = state.registry.dispatch(&request.name, request.args, &ctx).await;
    HttpResponse::Ok().json(result)
}

fn call_ended(db: &Database, business: &Business, info: &RetellCallInfo) -> rusqlite::Result<()> {
    let Some(call) = ensure_call_row(db, business, info)? else {
        return Ok(());
    };

    let duration_ms = info.call_duration_ms();
    let duration = duration_ms / 1000;
    let default_outcome = if duration_ms < MISSED_CALL_MS {
        CallOutcome::Missed
    } else {
        CallOutcome::Info
    };
    if !db.complete_call(call.id, info.ended_at(), duration, default_outcome)? {
        log::info!("[retell] Call {} already completed", call.id);
        return Ok(());
    }

    let minutes = billed_minutes(duration_ms);
    if minutes > 0 {
        db.add_minutes_used(&business.id, minutes)?;
    }

    if let Some(retell_call_id) = info.call_id.as_deref() {
        let reason = info.disconnection_reason.as_deref();
        let answered = campaigns::was_answered(reason, duration);
        if let Err(e) = campaigns::handle_call_ended(db, retell_call_id, answered, reason, Utc::now()) {
            log::error!("[retell] Failed to settle campaign contact for {}: {}", retell_call_id, e);
        }
    }
    log::info!("[retell] Call {} ended after {}ms, billed {} min", call.id, duration_ms, minutes);
    Ok(())
}

fn handle_event(db: &Database, event: &WebhookEvent) -> rusqlite::Result<()> {
    let Some(business) = resolve_business(db, &event.call)? else {
        log::warn!("[retell] {} for unknown business (call {:?})", event.event, event.call.call_id);
        return Ok(());
    };

    match event.event.as_str() {
        "call_started" => {
            ensure_call_row(db, &business, &event.call)?;
        }
        "call_ended" => call_ended(db, &business, &event.call)?,
        "call_analyzed" => {
            if let Some(call) = ensure_call_row(db, &business, &event.call)? {
                let summary = event.call.call_analysis.as_ref().and_then(|a| a.call_summary.as_deref());
                db.set_call_analysis(call.id, event.call.transcript.as_deref(), summary)?;
            }
        }
        other => log::debug!("[retell] Ignoring event {}", other),
    }
    Ok(())
}

async fn webhook(state: web::Data<AppState>, req: HttpRequest, body: web::Bytes) -> impl Responder {
    if let Err(resp) = verify_request(&state, &req, &body) {
        return resp;
    }
    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => {
            log::warn!("[retell] Unparseable webhook: {}", e);
            return json_error(StatusCode::BAD_REQUEST, "Invalid webhook payload");
        }
    };

    match handle_event(&state.db, &event) {
        Ok(()) => HttpResponse::Ok().json(json!({ "success": true })),
        Err(e) => super::db_error("retell webhook", e),
    }
}

async fn list_functions(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(json!({ "functions": state.registry.definitions() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::testing::{seed_business, test_state, TEST_BUSINESS_PHONE};
    use crate::integrations::retell::sign;
    use actix_web::{test, App};

    const CALLER: &str = "+15550207777";

    fn signed(uri: &str, payload: &Value) -> test::TestRequest {
        let body = serde_json::to_vec(payload).unwrap();
        let signature = sign("retell-test-key", &body, now_ms());
        test::TestRequest::post()
            .uri(uri)
            .insert_header(("content-type", "application/json"))
            .insert_header((SIGNATURE_HEADER, signature))
            .set_payload(body)
    }

    #[actix_web::test]
    async fn test_unsigned_function_call_is_rejected() {
        let state = test_state();
        let app = test::init_service(App::new().app_data(state).configure(config)).await;
        let req = test::TestRequest::post()
            .uri("/api/retell/function")
            .set_json(json!({"name": "end_call", "args": {}}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401);

        let req = test::TestRequest::post()
            .uri("/api/retell/function")
            .insert_header((SIGNATURE_HEADER, "v=1,d=00"))
            .set_json(json!({"name": "end_call", "args": {}}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401);
    }

    #[actix_web::test]
    async fn test_function_call_resolves_business_by_dialed_number() {
        let state = test_state();
        let (business, _) = seed_business(&state);
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let payload = json!({
            "call": {"call_id": "call_abc", "from_number": CALLER, "to_number": TEST_BUSINESS_PHONE},
            "name": "end_call",
            "args": {}
        });
        let resp = test::call_service(&app, signed("/api/retell/function", &payload).to_request()).await;
        assert_eq!(resp.status(), 200);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["end_call"], true);

        let call = state.db.get_call_by_retell_id("call_abc").unwrap().unwrap();
        assert_eq!(call.business_id, business.id);
        assert_eq!(call.from_number.as_deref(), Some(CALLER));
    }

    #[actix_web::test]
    async fn test_unknown_business_gets_spoken_apology() {
        let state = test_state();
        let app = test::init_service(App::new().app_data(state).configure(config)).await;
        let payload = json!({
            "call": {"call_id": "call_x", "to_number": "+15559990000"},
            "name": "check_availability",
            "args": {"date": "tomorrow"}
        });
        let resp = test::call_service(&app, signed("/api/retell/function", &payload).to_request()).await;
        assert_eq!(resp.status(), 200);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert!(!body["result"].as_str().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn test_call_ended_bills_minutes_once() {
        let state = test_state();
        let (business, _) = seed_business(&state);
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let ended = json!({
            "event": "call_ended",
            "call": {
                "call_id": "call_long",
                "from_number": CALLER,
                "to_number": TEST_BUSINESS_PHONE,
                "start_timestamp": 1_700_000_000_000i64,
                "end_timestamp": 1_700_000_125_000i64,
                "disconnection_reason": "user_hangup"
            }
        });
        for _ in 0..2 {
            let resp = test::call_service(&app, signed("/api/retell/webhook", &ended).to_request()).await;
            assert_eq!(resp.status(), 200);
        }

        let call = state.db.get_call_by_retell_id("call_long").unwrap().unwrap();
        assert_eq!(call.duration_seconds, Some(125));
        assert_eq!(call.outcome, Some(CallOutcome::Info));
        assert_eq!(state.db.get_business(&business.id).unwrap().unwrap().minutes_used, 3);

        let analyzed = json!({
            "event": "call_analyzed",
            "call": {
                "call_id": "call_long",
                "to_number": TEST_BUSINESS_PHONE,
                "transcript": "Agent: Hello",
                "call_analysis": {"call_summary": "Asked about hours"}
            }
        });
        test::call_service(&app, signed("/api/retell/webhook", &analyzed).to_request()).await;
        let call = state.db.get_call_by_retell_id("call_long").unwrap().unwrap();
        assert_eq!(call.summary.as_deref(), Some("Asked about hours"));
        assert_eq!(call.transcript.as_deref(), Some("Agent: Hello"));
    }

    #[actix_web::test]
    async fn test_partial_minutes_are_billed() {
        assert_eq!(billed_minutes(0), 0);
        assert_eq!(billed_minutes(60_000), 1);

        let state = test_state();
        let (business, _) = seed_business(&state);
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        for (call_id, ms) in [("call_a", 60_500), ("call_b", 900)] {
            let ended = json!({
                "event": "call_ended",
                "call": {"call_id": call_id, "to_number": TEST_BUSINESS_PHONE, "duration_ms": ms}
            });
            let resp = test::call_service(&app, signed("/api/retell/webhook", &ended).to_request()).await;
            assert_eq!(resp.status(), 200);
        }

        assert_eq!(state.db.get_business(&business.id).unwrap().unwrap().minutes_used, 3);
        let short = state.db.get_call_by_retell_id("call_b").unwrap().unwrap();
        assert_eq!(short.duration_seconds, Some(0));
        assert_eq!(short.outcome, Some(CallOutcome::Missed));
    }

    #[actix_web::test]
    async fn test_short_call_defaults_to_missed() {
        let state = test_state();
        seed_business(&state);
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;
        let ended = json!({
            "event": "call_ended",
            "call": {"call_id": "call_short", "to_number": TEST_BUSINESS_PHONE, "duration_ms": 4000}
        });
        test::call_service(&app, signed("/api/retell/webhook", &ended).to_request()).await;
        let call = state.db.get_call_by_retell_id("call_short").unwrap().unwrap();
        assert_eq!(call.outcome, Some(CallOutcome::Missed));
    }

    #[actix_web::test]
    async fn test_function_definitions_listed() {
        let state = test_state();
        let app = test::init_service(App::new().app_data(state).configure(config)).await;
        let req = test::TestRequest::get().uri("/api/retell/functions").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let names: Vec<&str> = body["functions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"book_appointment"));
        assert!(names.contains(&"process_payment"));
    }
}

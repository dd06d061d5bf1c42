use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde_json::json;

use crate::db::Database;
use crate::integrations::retell::RegisterPhoneCall;
use crate::integrations::twilio::verify_signature;
use crate::integrations::twiml::TwimlBuilder;
use crate::models::{Business, Call, CallDirection, CallOutcome, NewCall, NewMessage};
use crate::phone::{last_four, normalize_phone};
use crate::AppState;

pub const TWILIO_SIGNATURE_HEADER: &str = "x-twilio-signature";

const VOICEMAIL_PATH: &str = "/api/twilio/voicemail";
const DIAL_STATUS_PATH: &str = "/api/twilio/dial-status";

/// Dial outcomes that mean the agent never picked up
const UNANSWERED_DIAL_STATUSES: [&str; 3] = ["failed", "busy", "no-answer"];

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/twilio")
            .route("/voice", web::post().to(voice))
            .route("/voicemail", web::post().to(voicemail))
            .route("/dial-status", web::post().to(dial_status)),
    );
}

/// Form-encoded webhook parameters, kept as pairs for signature checks
struct TwilioParams(Vec<(String, String)>);

impl TwilioParams {
    fn parse(body: &[u8]) -> Self {
        Self(url::form_urlencoded::parse(body).into_owned().collect())
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    fn phone(&self, name: &str) -> Option<String> {
        self.get(name).and_then(normalize_phone)
    }
}

fn twiml(xml: String) -> HttpResponse {
    HttpResponse::Ok().content_type("text/xml").body(xml)
}

fn callback_url(state: &AppState, path: &str) -> String {
    format!("{}{}", state.config.public_base_url, path)
}

/// Validate `X-Twilio-Signature` when Twilio credentials are configured
fn verify_request(state: &AppState, req: &HttpRequest, params: &TwilioParams) -> Result<(), HttpResponse> {
    let Some(twilio) = state.config.twilio.as_ref() else {
        return Ok(());
    };
    let path = req.uri().path_and_query().map(|p| p.as_str()).unwrap_or(req.path());
    let url = callback_url(state, path);
    let signature = req
        .headers()
        .get(TWILIO_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if verify_signature(&twilio.auth_token, signature, &url, &params.0) {
        Ok(())
    } else {
        log::warn!("[twilio] Rejecting webhook for {} with bad signature", url);
        Err(HttpResponse::Forbidden().json(json!({ "success": false, "error": "Invalid signature" })))
    }
}

fn business_for(db: &Database, params: &TwilioParams) -> Option<Business> {
    let to = params.phone("To")?;
    match db.get_business_by_phone(&to) {
        Ok(business) => business,
        Err(e) => {
            log::error!("[twilio] Business lookup for ...{} failed: {}", last_four(&to), e);
            None
        }
    }
}

/// Call row for a Twilio call sid, created on first sight
fn call_for(db: &Database, business: &Business, params: &TwilioParams) -> rusqlite::Result<Option<Call>> {
    let Some(sid) = params.get("CallSid") else {
        return Ok(None);
    };
    if let Some(call) = db.get_call_by_twilio_sid(&business.id, sid)? {
        return Ok(Some(call));
    }
    db.create_call(&NewCall {
        business_id: business.id.clone(),
        retell_call_id: None,
        twilio_call_sid: Some(sid.to_string()),
        direction: CallDirection::Inbound,
        from_number: params.phone("From"),
        to_number: params.phone("To"),
    })
    .map(Some)
}

/// Register the call with Retell and record it, returning the Retell call id
async fn bridge(state: &AppState, business: &Business, params: &TwilioParams) -> Result<String, String> {
    let retell = state.integrations.retell.as_ref().ok_or("Retell is not configured")?;
    let agent_id = state
        .db
        .get_ai_config(&business.id)
        .map_err(|e| e.to_string())?
        .and_then(|c| c.retell_agent_id)
        .ok_or("no inbound agent configured")?;

    let registered = retell
        .register_phone_call(&RegisterPhoneCall {
            agent_id,
            from_number: params.phone("From"),
            to_number: params.phone("To"),
            direction: "inbound",
            metadata: json!({
                "business_id": business.id,
                "twilio_call_sid": params.get("CallSid"),
            }),
        })
        .await
        .map_err(|e| e.to_string())?;

    match call_for(&state.db, business, params) {
        Ok(Some(call)) => {
            if let Err(e) = state.db.set_call_retell_id(call.id, &registered.call_id) {
                log::error!("[twilio] Failed to link call {} to {}: {}", call.id, registered.call_id, e);
            }
        }
        Ok(None) => {}
        Err(e) => log::error!("[twilio] Failed to record call for {}: {}", business.id, e),
    }
    Ok(registered.call_id)
}

async fn voice(state: web::Data<AppState>, req: HttpRequest, body: web::Bytes) -> impl Responder {
    let params = TwilioParams::parse(&body);
    if let Err(resp) = verify_request(&state, &req, &params) {
        return resp;
    }
    let voicemail_action = callback_url(&state, VOICEMAIL_PATH);

    let Some(business) = business_for(&state.db, &params) else {
        log::warn!("[twilio] Inbound call to an unknown number, sending to voicemail");
        return twiml(TwimlBuilder::voicemail(None, &voicemail_action));
    };

    match bridge(&state, &business, &params).await {
        Ok(call_id) => {
            log::info!("[twilio] Bridging call {} for {} to the agent", call_id, business.id);
            twiml(TwimlBuilder::bridge_to_agent(
                &call_id,
                &state.config.retell.sip_domain,
                &callback_url(&state, DIAL_STATUS_PATH),
            ))
        }
        Err(e) => {
            log::warn!("[twilio] Could not bridge call for {}: {}", business.id, e);
            if let Err(e) = call_for(&state.db, &business, &params) {
                log::error!("[twilio] Failed to record call for {}: {}", business.id, e);
            }
            twiml(TwimlBuilder::voicemail(Some(&business.name), &voicemail_action))
        }
    }
}

async fn voicemail(state: web::Data<AppState>, req: HttpRequest, body: web::Bytes) -> impl Responder {
    let params = TwilioParams::parse(&body);
    if let Err(resp) = verify_request(&state, &req, &params) {
        return resp;
    }
    let goodbye = TwimlBuilder::goodbye("Thank you. Your message has been saved. Goodbye.");

    let Some(business) = business_for(&state.db, &params) else {
        log::warn!("[twilio] Voicemail for an unknown number was dropped");
        return twiml(goodbye);
    };

    let call = call_for(&state.db, &business, &params).unwrap_or_else(|e| {
        log::error!("[twilio] Failed to load call for voicemail: {}", e);
        None
    });
    let caller = params.phone("From");
    let body = params
        .get("TranscriptionText")
        .map(str::to_string)
        .unwrap_or_else(|| match caller.as_deref() {
            Some(phone) => format!("Voicemail from {}", phone),
            None => "Voicemail from an unknown caller".to_string(),
        });

    let stored = state.db.insert_message(&NewMessage {
        business_id: business.id.clone(),
        call_id: call.as_ref().map(|c| c.id),
        caller_phone: caller,
        body,
        recording_url: params.get("RecordingUrl").map(str::to_string),
        ..Default::default()
    });
    match stored {
        Ok(message) => {
            log::info!("[twilio] Voicemail {} stored for {}", message.id, business.id);
            if let Some(call) = call {
                if let Err(e) = state.db.set_call_outcome(call.id, CallOutcome::Message) {
                    log::error!("[twilio] Failed to mark call {} as message: {}", call.id, e);
                }
            }
        }
        Err(e) => log::error!("[twilio] Failed to store voicemail for {}: {}", business.id, e),
    }
    twiml(goodbye)
}

/// Twilio reports how the SIP leg ended; only a leg that never connected goes to voicemail
async fn dial_status(state: web::Data<AppState>, req: HttpRequest, body: web::Bytes) -> impl Responder {
    let params = TwilioParams::parse(&body);
    if let Err(resp) = verify_request(&state, &req, &params) {
        return resp;
    }

    let status = params.get("DialCallStatus").unwrap_or("completed");
    if UNANSWERED_DIAL_STATUSES.contains(&status) {
        log::warn!("[twilio] Agent leg ended with {}, falling back to voicemail", status);
        let business = business_for(&state.db, &params);
        return twiml(TwimlBuilder::voicemail(
            business.as_ref().map(|b| b.name.as_str()),
            &callback_url(&state, VOICEMAIL_PATH),
        ));
    }
    twiml(TwimlBuilder::new().hangup().build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, TwilioConfig};
    use crate::controllers::testing::{seed_business, test_state, test_state_with, TEST_BUSINESS_PHONE};
    use crate::integrations::twilio::compute_signature;
    use crate::integrations::{Integrations, RetellClient};
    use crate::models::UpdateAiConfigRequest;
    use actix_web::{test, App};
    use mockito::{Matcher, Server};

    const CALLER: &str = "+15550208888";

    fn form(uri: &str, params: &[(&str, &str)]) -> test::TestRequest {
        test::TestRequest::post()
            .uri(uri)
            .insert_header(("content-type", "application/x-www-form-urlencoded"))
            .set_payload(
                url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(params)
                    .finish(),
            )
    }

    async fn body_text(resp: actix_web::dev::ServiceResponse) -> String {
        String::from_utf8(test::read_body(resp).await.to_vec()).unwrap()
    }

    #[actix_web::test]
    async fn test_unknown_number_gets_voicemail() {
        let state = test_state();
        let app = test::init_service(App::new().app_data(state).configure(config)).await;
        let req = form("/api/twilio/voice", &[("CallSid", "CA1"), ("From", CALLER), ("To", "+15559990000")]);
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), 200);
        let xml = body_text(resp).await;
        assert!(xml.contains("<Record"));
        assert!(xml.contains("https://koya.test/api/twilio/voicemail"));
    }

    #[actix_web::test]
    async fn test_known_business_without_agent_falls_back_with_name() {
        let state = test_state();
        seed_business(&state);
        let app = test::init_service(App::new().app_data(state).configure(config)).await;
        let req = form("/api/twilio/voice", &[("CallSid", "CA2"), ("From", CALLER), ("To", TEST_BUSINESS_PHONE)]);
        let xml = body_text(test::call_service(&app, req.to_request()).await).await;
        assert!(xml.contains("Harbor Salon"));
        assert!(xml.contains("<Record"));
    }

    #[actix_web::test]
    async fn test_inbound_call_bridged_to_agent() {
        let mut server = Server::new_async().await;
        let register = server
            .mock("POST", "/v2/register-phone-call")
            .match_body(Matcher::PartialJson(json!({"agent_id": "agent_in", "direction": "inbound"})))
            .with_status(201)
            .with_body(r#"{"call_id": "call_r1"}"#)
            .create_async()
            .await;
        let integrations = Integrations {
            retell: Some(RetellClient::new(reqwest::Client::new(), "retell-test-key").with_base_url(&server.url())),
            ..Integrations::disabled()
        };
        let state = test_state_with(Config::for_tests(), integrations);
        let (business, _) = seed_business(&state);
        state
            .db
            .update_ai_config(
                &business.id,
                &UpdateAiConfigRequest {
                    greeting: None,
                    personality: None,
                    retell_agent_id: Some("agent_in".to_string()),
                    retell_outbound_agent_id: None,
                },
            )
            .unwrap();
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = form("/api/twilio/voice", &[("CallSid", "CA3"), ("From", CALLER), ("To", TEST_BUSINESS_PHONE)]);
        let xml = body_text(test::call_service(&app, req.to_request()).await).await;
        register.assert_async().await;
        assert!(xml.contains("<Sip>sip:call_r1@"));
        assert!(xml.contains(DIAL_STATUS_PATH));

        let call = state.db.get_call_by_twilio_sid(&business.id, "CA3").unwrap().unwrap();
        assert_eq!(call.retell_call_id.as_deref(), Some("call_r1"));
    }

    #[actix_web::test]
    async fn test_voicemail_lands_in_inbox() {
        let state = test_state();
        let (business, _) = seed_business(&state);
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = form(
            "/api/twilio/voicemail",
            &[
                ("CallSid", "CA4"),
                ("From", CALLER),
                ("To", TEST_BUSINESS_PHONE),
                ("RecordingUrl", "https://api.twilio.test/rec/RE1"),
            ],
        );
        let xml = body_text(test::call_service(&app, req.to_request()).await).await;
        assert!(xml.contains("<Hangup"));

        let messages = state.db.list_messages(&business.id, true, 10).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].recording_url.as_deref(), Some("https://api.twilio.test/rec/RE1"));
        assert_eq!(messages[0].caller_phone.as_deref(), Some(CALLER));
        let call = state.db.get_call_by_twilio_sid(&business.id, "CA4").unwrap().unwrap();
        assert_eq!(call.outcome, Some(CallOutcome::Message));
    }

    #[actix_web::test]
    async fn test_dial_status_only_falls_back_when_unanswered() {
        let state = test_state();
        let app = test::init_service(App::new().app_data(state).configure(config)).await;

        let req = form("/api/twilio/dial-status", &[("DialCallStatus", "busy"), ("To", TEST_BUSINESS_PHONE)]);
        assert!(body_text(test::call_service(&app, req.to_request()).await).await.contains("<Record"));

        let req = form("/api/twilio/dial-status", &[("DialCallStatus", "completed")]);
        let xml = body_text(test::call_service(&app, req.to_request()).await).await;
        assert!(!xml.contains("<Record"));
        assert!(xml.contains("<Hangup"));
    }

    #[actix_web::test]
    async fn test_signature_checked_when_twilio_configured() {
        let mut config_with_twilio = Config::for_tests();
        config_with_twilio.twilio = Some(TwilioConfig {
            account_sid: "AC123".to_string(),
            auth_token: "twilio-token".to_string(),
        });
        let state = test_state_with(config_with_twilio, Integrations::disabled());
        let app = test::init_service(App::new().app_data(state).configure(config)).await;

        let params = [("CallSid", "CA5"), ("From", CALLER), ("To", "+15559990000")];
        let owned: Vec<(String, String)> = params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let signature = compute_signature("twilio-token", "https://koya.test/api/twilio/voice", &owned);

        let req = form("/api/twilio/voice", &params).insert_header((TWILIO_SIGNATURE_HEADER, signature));
        assert_eq!(test::call_service(&app, req.to_request()).await.status(), 200);

        let req = form("/api/twilio/voice", &params).insert_header((TWILIO_SIGNATURE_HEADER, "bm9wZQ=="));
        assert_eq!(test::call_service(&app, req.to_request()).await.status(), 403);
    }
}

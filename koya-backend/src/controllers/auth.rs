use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::{Duration, Utc};
use rand::distributions::{Alphanumeric, DistString};
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::middleware::tenant_auth::{extract_token, hash_api_key};
use crate::models::{ApiKey, API_KEY_PREFIX};
use crate::AppState;

/// Where the dashboard lands after login when `next` is missing or unsafe
pub const DEFAULT_REDIRECT: &str = "/dashboard";

const API_KEY_RANDOM_LEN: usize = 32;
const KEY_PREFIX_LEN: usize = 12;

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    api_key: String,
    next: Option<String>,
}

#[derive(Serialize)]
pub struct SessionResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl SessionResponse {
    fn error(error: &str) -> Self {
        Self {
            success: false,
            token: None,
            expires_at: None,
            redirect: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Serialize)]
pub struct LogoutResponse {
    success: bool,
}

#[derive(Serialize)]
pub struct ValidateResponse {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    business_id: Option<String>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/auth")
            .route("/session", web::post().to(create_session))
            .route("/logout", web::post().to(logout))
            .route("/validate", web::get().to(validate)),
    );
}

/// Keep post-login redirects on this site: a single leading slash, no scheme,
/// no protocol-relative `//` and no backslashes
pub fn sanitize_redirect_path(next: Option<&str>) -> String {
    let Some(path) = next.map(str::trim).filter(|p| !p.is_empty()) else {
        return DEFAULT_REDIRECT.to_string();
    };
    let safe = path.starts_with('/')
        && !path.starts_with("//")
        && !path.contains('\\')
        && !path.contains("://")
        && !path.chars().any(|c| c.is_control());
    if safe {
        path.to_string()
    } else {
        DEFAULT_REDIRECT.to_string()
    }
}

/// New plaintext API key: `koya_` followed by random alphanumerics
pub fn generate_api_key() -> String {
    format!(
        "{}{}",
        API_KEY_PREFIX,
        Alphanumeric.sample_string(&mut rand::thread_rng(), API_KEY_RANDOM_LEN)
    )
}

pub fn generate_session_token() -> String {
    hex::encode(rand::random::<[u8; 32]>())
}

/// Store a new key for a business. The plaintext is returned once and never stored.
pub fn issue_api_key(db: &Database, business_id: &str, name: &str) -> rusqlite::Result<(ApiKey, String)> {
    let plaintext = generate_api_key();
    let key = db.insert_api_key(business_id, name, &plaintext[..KEY_PREFIX_LEN], &hash_api_key(&plaintext))?;
    Ok((key, plaintext))
}

async fn create_session(state: web::Data<AppState>, body: web::Json<CreateSessionRequest>) -> impl Responder {
    let api_key = body.api_key.trim();
    if !api_key.starts_with(API_KEY_PREFIX) {
        return HttpResponse::BadRequest().json(SessionResponse::error("Invalid API key format"));
    }

    let key = match state.db.find_active_api_key(&hash_api_key(api_key)) {
        Ok(Some(key)) => key,
        Ok(None) => return HttpResponse::Unauthorized().json(SessionResponse::error("Invalid or revoked API key")),
        Err(e) => {
            log::error!("[auth] Failed to look up API key: {}", e);
            return HttpResponse::InternalServerError().json(SessionResponse::error("Database error"));
        }
    };

    let token = generate_session_token();
    let expires_at = Utc::now() + Duration::hours(state.config.session_ttl_hours);
    match state.db.create_session(&token, &key.business_id, expires_at) {
        Ok(session) => {
            log::info!("[auth] Session created for business {}", session.business_id);
            HttpResponse::Ok().json(SessionResponse {
                success: true,
                token: Some(session.token),
                expires_at: Some(session.expires_at.timestamp()),
                redirect: Some(sanitize_redirect_path(body.next.as_deref())),
                error: None,
            })
        }
        Err(e) => {
            log::error!("[auth] Failed to create session: {}", e);
            HttpResponse::InternalServerError().json(SessionResponse::error("Failed to create session"))
        }
    }
}

async fn logout(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let Some(token) = extract_token(&req) else {
        return HttpResponse::Ok().json(LogoutResponse { success: true });
    };
    match state.db.delete_session(&token) {
        Ok(_) => HttpResponse::Ok().json(LogoutResponse { success: true }),
        Err(e) => {
            log::error!("[auth] Failed to delete session: {}", e);
            HttpResponse::InternalServerError().json(LogoutResponse { success: false })
        }
    }
}

async fn validate(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let Some(token) = extract_token(&req) else {
        return HttpResponse::Ok().json(ValidateResponse {
            valid: false,
            business_id: None,
        });
    };

    match state.db.validate_session(&token) {
        Ok(session) => HttpResponse::Ok().json(ValidateResponse {
            valid: session.is_some(),
            business_id: session.map(|s| s.business_id),
        }),
        Err(e) => {
            log::error!("[auth] Failed to validate session: {}", e);
            HttpResponse::Ok().json(ValidateResponse {
                valid: false,
                business_id: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::testing::{bearer, seed_business, test_state};
    use actix_web::test::{call_and_read_body_json, call_service, init_service, TestRequest};
    use actix_web::App;
    use serde_json::{json, Value};

    #[test]
    fn test_sanitize_redirect_path() {
        assert_eq!(sanitize_redirect_path(Some("/dashboard/calls?page=2")), "/dashboard/calls?page=2");
        assert_eq!(sanitize_redirect_path(None), DEFAULT_REDIRECT);
        assert_eq!(sanitize_redirect_path(Some("")), DEFAULT_REDIRECT);
        assert_eq!(sanitize_redirect_path(Some("//evil.test/x")), DEFAULT_REDIRECT);
        assert_eq!(sanitize_redirect_path(Some("https://evil.test")), DEFAULT_REDIRECT);
        assert_eq!(sanitize_redirect_path(Some("/\\evil.test")), DEFAULT_REDIRECT);
        assert_eq!(sanitize_redirect_path(Some("dashboard")), DEFAULT_REDIRECT);
        assert_eq!(sanitize_redirect_path(Some("/redirect?to=http://evil.test")), DEFAULT_REDIRECT);
    }

    #[test]
    fn test_generated_credentials() {
        let key = generate_api_key();
        assert!(key.starts_with(API_KEY_PREFIX));
        assert_eq!(key.len(), API_KEY_PREFIX.len() + API_KEY_RANDOM_LEN);
        assert_ne!(generate_api_key(), key);
        assert_eq!(generate_session_token().len(), 64);
    }

    #[actix_web::test]
    async fn test_session_lifecycle() {
        let state = test_state();
        let (business, _) = seed_business(&state);
        let (_, plaintext) = issue_api_key(&state.db, &business.id, "dashboard").unwrap();
        let app = init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = TestRequest::post()
            .uri("/api/auth/session")
            .set_json(json!({"api_key": plaintext, "next": "//evil.test"}))
            .to_request();
        let body: Value = call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["redirect"], DEFAULT_REDIRECT);
        let token = body["token"].as_str().unwrap().to_string();

        let req = TestRequest::get()
            .uri("/api/auth/validate")
            .insert_header(bearer(&token))
            .to_request();
        let body: Value = call_and_read_body_json(&app, req).await;
        assert_eq!(body["valid"], true);
        assert_eq!(body["business_id"], business.id.as_str());

        let req = TestRequest::post()
            .uri("/api/auth/logout")
            .insert_header(bearer(&token))
            .to_request();
        call_service(&app, req).await;

        let req = TestRequest::get()
            .uri("/api/auth/validate")
            .insert_header(bearer(&token))
            .to_request();
        let body: Value = call_and_read_body_json(&app, req).await;
        assert_eq!(body["valid"], false);
    }

    #[actix_web::test]
    async fn test_bad_api_key_is_rejected() {
        let state = test_state();
        let app = init_service(App::new().app_data(state).configure(config)).await;
        let req = TestRequest::post()
            .uri("/api/auth/session")
            .set_json(json!({"api_key": "koya_nope"}))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
    }
}
